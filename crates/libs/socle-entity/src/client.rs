use std::fmt;

/// Opaque identity of a connected client, assigned by the hosting platform.
///
/// Handles are plain ordered values so they can key maps and sets cheaply.
/// They are deliberately **not** serializable: a caller identity only ever
/// enters an invocation from the connection it arrived on, never from
/// argument bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientHandle(u64);

impl ClientHandle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}
