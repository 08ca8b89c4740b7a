use {
  super::transport::{PeerControl, Prune, PubsubTransport},
  indexmap::IndexMap,
  libp2p::PeerId,
  std::collections::HashSet,
  tracing::{debug, trace},
};

/// Control traffic accumulated during one heartbeat.
///
/// Mesh changes across all topics are collected first and then flushed
/// in one go, with all GRAFTs and PRUNEs destined to the same peer merged
/// into a single control message.
#[derive(Debug, Default)]
pub struct ControlBatch {
  graft: IndexMap<PeerId, Vec<String>>,
  prune: IndexMap<PeerId, Vec<Prune>>,
  no_px: HashSet<PeerId>,
  gossip: Vec<(String, HashSet<PeerId>)>,
}

/// What a flush handed to the transport.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushSummary {
  pub control_messages: usize,
  pub grafts: usize,
  pub prunes: usize,
  pub gossip_topics: usize,
  pub unreachable: usize,
}

impl ControlBatch {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn graft(&mut self, peer: PeerId, topic: &str) {
    self.graft.entry(peer).or_default().push(topic.to_owned());
  }

  pub fn prune(&mut self, peer: PeerId, prune: Prune) {
    self.prune.entry(peer).or_default().push(prune);
  }

  /// Marks a peer as not deserving peer exchange in any of the
  /// PRUNEs it receives in this batch.
  pub fn deny_px(&mut self, peer: PeerId) {
    self.no_px.insert(peer);
  }

  pub fn is_px_denied(&self, peer: &PeerId) -> bool {
    self.no_px.contains(peer)
  }

  pub fn gossip(&mut self, topic: &str, exclude: HashSet<PeerId>) {
    self.gossip.push((topic.to_owned(), exclude));
  }

  pub fn grafted(&self, peer: &PeerId) -> &[String] {
    self.graft.get(peer).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn pruned(&self, peer: &PeerId) -> &[Prune] {
    self.prune.get(peer).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn is_empty(&self) -> bool {
    self.graft.is_empty() && self.prune.is_empty() && self.gossip.is_empty()
  }

  /// Merges all instructions per destination peer.
  pub fn into_messages(
    self,
  ) -> (Vec<(PeerId, PeerControl)>, Vec<(String, HashSet<PeerId>)>) {
    let ControlBatch {
      mut graft,
      mut prune,
      no_px,
      gossip,
    } = self;

    let peers: Vec<PeerId> = graft
      .keys()
      .chain(prune.keys())
      .cloned()
      .collect::<indexmap::IndexSet<_>>()
      .into_iter()
      .collect();

    let messages = peers
      .into_iter()
      .map(|peer| {
        let mut prunes = prune.remove(&peer).unwrap_or_default();
        if no_px.contains(&peer) {
          prunes.iter_mut().for_each(|p| p.peer_exchange.clear());
        }
        (peer, PeerControl {
          graft: graft.remove(&peer).unwrap_or_default(),
          prune: prunes,
        })
      })
      .collect();

    (messages, gossip)
  }

  /// Hands the batch over to the transport. Peers that can no longer
  /// be reached are skipped, there is no retry within the same tick.
  pub fn flush(self, transport: &dyn PubsubTransport) -> FlushSummary {
    let mut summary = FlushSummary::default();
    let (messages, gossip) = self.into_messages();

    for (peer, control) in messages {
      let grafts = control.graft.len();
      let prunes = control.prune.len();
      trace!(
        "sending control to {}: {} graft(s), {} prune(s)",
        peer,
        grafts,
        prunes
      );
      match transport.emit_control(&peer, control) {
        Ok(()) => {
          summary.control_messages += 1;
          summary.grafts += grafts;
          summary.prunes += prunes;
        }
        Err(e) => {
          debug!("dropping control message for {peer}: {e}");
          summary.unreachable += 1;
        }
      }
    }

    for (topic, exclude) in gossip {
      transport.emit_gossip(&topic, &exclude);
      summary.gossip_topics += 1;
    }

    summary
  }
}
