//! Visitor control flow shared by table and scene-graph traversals.

/// What a visitor callback wants the traversal to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Keep going.
    Continue,
    /// Stop: the visitor found what it was looking for.
    Found,
    /// Stop: the visitor hit a condition that makes further work pointless.
    Abort,
}

impl Visit {
    pub const fn is_stop(self) -> bool {
        !matches!(self, Self::Continue)
    }

    pub const fn is_found(self) -> bool {
        matches!(self, Self::Found)
    }
}
