use {
  crate::relay::{
    config::Config,
    memory::{MemoryTransport, StaticScoring},
    selector::PeerSelector,
    state::RouterState,
  },
  libp2p::PeerId,
  std::{collections::HashSet, sync::Arc},
};

pub const TOPIC: &str = "/waku/2/test/proto";

pub fn peers(n: usize) -> Vec<PeerId> {
  (0..n).map(|_| PeerId::random()).collect()
}

/// Router state plus the collaborators the maintainers need,
/// wired together the way the heartbeat wires them.
pub struct Harness {
  pub config: Config,
  pub scoring: Arc<StaticScoring>,
  pub transport: Arc<MemoryTransport>,
  pub state: RouterState,
}

impl Harness {
  pub fn new() -> Self {
    Self::with_seed(42)
  }

  pub fn with_seed(seed: u64) -> Self {
    Self {
      config: Config::default(),
      scoring: Arc::new(StaticScoring::default()),
      transport: Arc::new(MemoryTransport::default()),
      state: RouterState::new(HashSet::new(), PeerSelector::seeded(seed)),
    }
  }

  /// Announces peers as subscribers of [`TOPIC`].
  pub fn subscribe_peers(&self, peers: &[PeerId]) {
    for peer in peers {
      self.transport.add_peer(TOPIC, *peer);
    }
  }
}
