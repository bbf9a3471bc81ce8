//! Facade crate: re-exports the engine API from the component crates.
//!
//! Hosts embed the engine by creating a [`System`] over a platform
//! [`Backend`], building a [`Document`] tree, and calling
//! [`Document::update`] with a time budget until it reports completion.
//! Rendering goes through a [`View`], which emits a sorted list of
//! [`DrawCommand`]s for a 2D back end.

pub use doc::{Document, System, SystemConfig};
pub use dom::{AttributeError, AttributeOp, Message, MouseButton, NodeId, NodeType};
pub use gfx::{DrawCommand, View, ViewFlags};
pub use layout::{Axis, BoxId, CaretAddress, Rect};
pub use net::{CacheError, UrlCache};
pub use platform::{Backend, FontId, FontMetrics, HeadlessBackend};
pub use style::{Color, DimensionMode, Justification, LayoutClass, WhiteSpace, WrapMode};
