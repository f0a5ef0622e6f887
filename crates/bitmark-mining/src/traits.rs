//! Collaborator seams.

use std::sync::atomic::{AtomicBool, Ordering};

/// View of the peer set: workers refuse to mine stale work while the node
/// has no peers (except on the regression network).
pub trait PeerSet: Send + Sync {
    /// Whether the node currently has no peers.
    fn is_empty(&self) -> bool;
}

/// A peer set with an externally toggled connection state.
#[derive(Debug, Default)]
pub struct StaticPeerSet {
    connected: AtomicBool,
}

impl StaticPeerSet {
    /// Create a peer set in the given state.
    pub fn new(connected: bool) -> Self {
        StaticPeerSet {
            connected: AtomicBool::new(connected),
        }
    }

    /// Flip the connection state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl PeerSet for StaticPeerSet {
    fn is_empty(&self) -> bool {
        !self.connected.load(Ordering::SeqCst)
    }
}
