pub mod command;
pub mod view;

pub use command::{DrawCommand, TextRun};
pub use view::{View, ViewFlags};
