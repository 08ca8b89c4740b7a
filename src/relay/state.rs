use {
  super::{backoff::Backoff, selector::PeerSelector},
  indexmap::{IndexMap, IndexSet},
  libp2p::PeerId,
  std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Instant,
  },
};

/// Peers we publish to on a topic that we have not joined.
#[derive(Debug, Clone)]
pub struct FanoutState {
  pub peers: IndexSet<PeerId>,
  pub last_publish: Instant,
}

impl FanoutState {
  pub fn new(peers: IndexSet<PeerId>, last_publish: Instant) -> Self {
    Self {
      peers,
      last_publish,
    }
  }
}

/// Everything the heartbeat mutates.
///
/// The state is owned by the relay and only ever touched while holding
/// the [`SharedState`] lock, so the heartbeat and the router never race
/// on the same map. The lock is never held across an `.await`.
#[derive(Debug)]
pub struct RouterState {
  /// Joined topics and the peers we push full messages to.
  pub mesh: IndexMap<String, IndexSet<PeerId>>,

  /// Topics we publish to without having joined them.
  pub fanout: IndexMap<String, FanoutState>,

  pub backoff: Backoff,

  /// Peers that always receive our messages and are
  /// never part of mesh accounting.
  pub direct: HashSet<PeerId>,

  /// Number of heartbeat ticks started.
  pub ticks: u64,

  pub selector: PeerSelector,
}

impl RouterState {
  pub fn new(direct: HashSet<PeerId>, selector: PeerSelector) -> Self {
    Self {
      direct,
      selector,
      ticks: 0,
      mesh: IndexMap::new(),
      fanout: IndexMap::new(),
      backoff: Backoff::new(),
    }
  }

  pub fn is_joined(&self, topic: &str) -> bool {
    self.mesh.contains_key(topic)
  }

  pub fn mesh_peers(&self, topic: &str) -> Vec<PeerId> {
    self
      .mesh
      .get(topic)
      .map(|peers| peers.iter().cloned().collect())
      .unwrap_or_default()
  }

  pub fn fanout_peers(&self, topic: &str) -> Vec<PeerId> {
    self
      .fanout
      .get(topic)
      .map(|f| f.peers.iter().cloned().collect())
      .unwrap_or_default()
  }
}

pub type SharedState = Arc<Mutex<RouterState>>;

/// Locks a mutex, recovering the guard if a previous holder panicked.
///
/// Heartbeat maintenance catches panics per topic with every mesh change
/// already paired with its queued control message, so a poisoned lock
/// still guards consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
