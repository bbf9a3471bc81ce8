//! Interaction messages queued on the document for the host to drain.

use crate::node::NodeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Message {
    /// The pointer moved inside `node`'s box. `topmost` is set on the
    /// deepest box under the cursor only.
    Hit { node: NodeId, x: f32, y: f32, topmost: bool },
    /// The pointer left `node`'s box since the last tick it was hit.
    Unhit { node: NodeId },
    MouseDown { node: NodeId, x: f32, y: f32, button: MouseButton, topmost: bool },
    MouseUp { node: NodeId, x: f32, y: f32, button: MouseButton, topmost: bool },
    /// A hyperlink node was activated (mouse released inside it).
    LinkActivated { node: NodeId },
    /// The document's text selection changed.
    SelectionChanged,
    /// An unhandled key press, forwarded to the host.
    KeyDown { code: u32, ctrl: bool },
}
