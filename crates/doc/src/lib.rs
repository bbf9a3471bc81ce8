pub mod document;
pub mod selection;
pub mod system;

pub use document::Document;
pub use system::{System, SystemConfig};
