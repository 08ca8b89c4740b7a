//! In-process stand-ins for the network and the scoring subsystem.
//!
//! Used by the simulation binary and by tests. Everything handed to
//! these types is recorded so it can be inspected afterwards.

use {
  super::{
    error::TransportError,
    state::lock,
    transport::{InboundMessage, PeerControl, PeerScoring, PubsubTransport},
  },
  async_trait::async_trait,
  indexmap::IndexSet,
  libp2p::PeerId,
  std::{
    collections::{HashMap, HashSet},
    sync::{
      atomic::{AtomicBool, Ordering},
      Mutex,
    },
  },
  tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
  tracing::trace,
};

#[derive(Debug, Default)]
pub struct MemoryTransport {
  roster: Mutex<HashMap<String, IndexSet<PeerId>>>,
  unreachable: Mutex<HashSet<PeerId>>,
  inbound: Mutex<HashMap<String, UnboundedSender<InboundMessage>>>,
  controls: Mutex<Vec<(PeerId, PeerControl)>>,
  gossip: Mutex<Vec<(String, HashSet<PeerId>)>>,
  published: Mutex<Vec<(String, Vec<u8>)>>,
  failing: AtomicBool,
}

impl MemoryTransport {
  /// Announces `peer` as subscribed to `topic`.
  pub fn add_peer(&self, topic: &str, peer: PeerId) {
    lock(&self.roster)
      .entry(topic.to_owned())
      .or_default()
      .insert(peer);
  }

  pub fn remove_peer(&self, topic: &str, peer: &PeerId) {
    if let Some(peers) = lock(&self.roster).get_mut(topic) {
      peers.shift_remove(peer);
    }
  }

  /// Control messages to this peer will fail from now on.
  pub fn set_unreachable(&self, peer: PeerId) {
    lock(&self.unreachable).insert(peer);
  }

  /// Makes all subsequent publishes fail.
  pub fn fail_publishing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  /// Injects a message as if it was received from the network.
  /// Returns false if we are not subscribed to the topic.
  pub fn deliver(&self, topic: &str, data: Vec<u8>) -> bool {
    match lock(&self.inbound).get(topic) {
      Some(tx) => tx
        .send(InboundMessage {
          topic: topic.to_owned(),
          data,
        })
        .is_ok(),
      None => false,
    }
  }

  pub fn subscriptions(&self) -> Vec<String> {
    lock(&self.inbound).keys().cloned().collect()
  }

  pub fn controls(&self) -> Vec<(PeerId, PeerControl)> {
    lock(&self.controls).clone()
  }

  /// Control messages sent to one peer.
  pub fn controls_for(&self, peer: &PeerId) -> Vec<PeerControl> {
    lock(&self.controls)
      .iter()
      .filter(|(p, _)| p == peer)
      .map(|(_, c)| c.clone())
      .collect()
  }

  pub fn gossip(&self) -> Vec<(String, HashSet<PeerId>)> {
    lock(&self.gossip).clone()
  }

  pub fn published(&self) -> Vec<(String, Vec<u8>)> {
    lock(&self.published).clone()
  }
}

#[async_trait]
impl PubsubTransport for MemoryTransport {
  fn topic_peers(&self, topic: &str) -> Vec<PeerId> {
    lock(&self.roster)
      .get(topic)
      .map(|peers| peers.iter().cloned().collect())
      .unwrap_or_default()
  }

  fn subscribe(
    &self,
    topic: &str,
  ) -> Result<UnboundedReceiver<InboundMessage>, TransportError> {
    let (tx, rx) = unbounded_channel();
    lock(&self.inbound).insert(topic.to_owned(), tx);
    Ok(rx)
  }

  fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
    lock(&self.inbound)
      .remove(topic)
      .map(|_| ())
      .ok_or_else(|| TransportError::TopicNotSubscribed(topic.to_owned()))
  }

  fn emit_control(
    &self,
    peer: &PeerId,
    control: PeerControl,
  ) -> Result<(), TransportError> {
    if lock(&self.unreachable).contains(peer) {
      return Err(TransportError::PeerUnreachable(*peer));
    }
    lock(&self.controls).push((*peer, control));
    Ok(())
  }

  fn emit_gossip(&self, topic: &str, exclude: &HashSet<PeerId>) {
    trace!("IHAVE on {topic} excluding {} peer(s)", exclude.len());
    lock(&self.gossip).push((topic.to_owned(), exclude.clone()));
  }

  async fn publish(
    &self,
    topic: &str,
    data: Vec<u8>,
  ) -> Result<Vec<PeerId>, TransportError> {
    if self.failing.load(Ordering::SeqCst) {
      return Err(TransportError::Closed);
    }

    lock(&self.published).push((topic.to_owned(), data));
    let unreachable = lock(&self.unreachable).clone();
    Ok(
      self
        .topic_peers(topic)
        .into_iter()
        .filter(|p| !unreachable.contains(p))
        .collect(),
    )
  }
}

/// Fixed peer scores, zero unless set otherwise.
#[derive(Debug, Default)]
pub struct StaticScoring {
  scores: Mutex<HashMap<PeerId, f64>>,
  outbound: Mutex<HashSet<PeerId>>,
  grafts: Mutex<Vec<(PeerId, String)>>,
  prunes: Mutex<Vec<(PeerId, String)>>,
}

impl StaticScoring {
  pub fn set_score(&self, peer: PeerId, score: f64) {
    lock(&self.scores).insert(peer, score);
  }

  pub fn set_outbound(&self, peer: PeerId) {
    lock(&self.outbound).insert(peer);
  }

  pub fn grafts(&self) -> Vec<(PeerId, String)> {
    lock(&self.grafts).clone()
  }

  pub fn prunes(&self) -> Vec<(PeerId, String)> {
    lock(&self.prunes).clone()
  }
}

impl PeerScoring for StaticScoring {
  fn score(&self, peer: &PeerId) -> f64 {
    lock(&self.scores).get(peer).cloned().unwrap_or(0.0)
  }

  fn is_outbound(&self, peer: &PeerId) -> bool {
    lock(&self.outbound).contains(peer)
  }

  fn on_graft(&self, peer: &PeerId, topic: &str) {
    lock(&self.grafts).push((*peer, topic.to_owned()));
  }

  fn on_prune(&self, peer: &PeerId, topic: &str) {
    lock(&self.prunes).push((*peer, topic.to_owned()));
  }
}
