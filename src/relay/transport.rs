//! Seams through which the relay talks to the outside world.
//!
//! Neither the wire protocol nor the scoring function live in this crate.
//! The mesh algorithm only needs a handful of questions answered (who is
//! subscribed, how well does a peer behave, did we dial it) and a way to
//! hand off control and data messages.

use {
  super::error::TransportError,
  async_trait::async_trait,
  libp2p::PeerId,
  std::{collections::HashSet, time::Duration},
  tokio::sync::mpsc::UnboundedReceiver,
};

/// Read access to the peer scoring subsystem.
pub trait PeerScoring: Send + Sync {
  /// Current score of a peer, negative scores mark misbehaving peers.
  fn score(&self, peer: &PeerId) -> f64;

  /// True if the connection to this peer was dialed by us.
  fn is_outbound(&self, peer: &PeerId) -> bool;

  /// Invoked when a peer is added to the mesh of a topic.
  fn on_graft(&self, _peer: &PeerId, _topic: &str) {}

  /// Invoked when a peer is removed from the mesh of a topic.
  fn on_prune(&self, _peer: &PeerId, _topic: &str) {}
}

/// A PRUNE instruction for a single topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prune {
  pub topic: String,

  /// How long the pruned peer should wait before grafting us back.
  pub backoff: Duration,

  /// Alternative peers offered to the pruned peer, empty when peer
  /// exchange is disabled or the peer was pruned as a penalty.
  pub peer_exchange: Vec<PeerId>,
}

/// All GRAFT and PRUNE instructions produced for one peer during one
/// heartbeat, sent as a single control message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerControl {
  pub graft: Vec<String>,
  pub prune: Vec<Prune>,
}

impl PeerControl {
  pub fn is_empty(&self) -> bool {
    self.graft.is_empty() && self.prune.is_empty()
  }
}

/// A message received on a subscribed pubsub topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
  pub topic: String,
  pub data: Vec<u8>,
}

/// The wire-level pubsub protocol.
#[async_trait]
pub trait PubsubTransport: Send + Sync {
  /// Live roster of peers that announced a subscription to `topic`.
  fn topic_peers(&self, topic: &str) -> Vec<PeerId>;

  /// Announces our subscription and returns the stream of messages
  /// received on that topic.
  fn subscribe(
    &self,
    topic: &str,
  ) -> Result<UnboundedReceiver<InboundMessage>, TransportError>;

  fn unsubscribe(&self, topic: &str) -> Result<(), TransportError>;

  /// Sends coalesced GRAFT/PRUNE instructions to one peer.
  fn emit_control(
    &self,
    peer: &PeerId,
    control: PeerControl,
  ) -> Result<(), TransportError>;

  /// Emits IHAVE gossip for `topic` to subscribers not in `exclude`.
  /// Peers below the gossip threshold are already in `exclude`.
  fn emit_gossip(&self, topic: &str, exclude: &HashSet<PeerId>);

  /// Publishes a message and returns the peers it was sent to.
  async fn publish(
    &self,
    topic: &str,
    data: Vec<u8>,
  ) -> Result<Vec<PeerId>, TransportError>;
}
