use {
  super::{
    config::Config,
    control::ControlBatch,
    mesh::ScoreCache,
    state::{FanoutState, RouterState},
    transport::{PeerScoring, PubsubTransport},
  },
  indexmap::IndexSet,
  libp2p::PeerId,
  std::{collections::HashSet, time::Instant},
  tracing::{debug, trace},
};

/// Keeps the peer sets of topics we publish to without having joined
/// them fresh, and forgets them once we stop publishing.
pub struct FanoutMaintainer<'a> {
  config: &'a Config,
  scoring: &'a dyn PeerScoring,
  transport: &'a dyn PubsubTransport,
}

impl<'a> FanoutMaintainer<'a> {
  pub fn new(
    config: &'a Config,
    scoring: &'a dyn PeerScoring,
    transport: &'a dyn PubsubTransport,
  ) -> Self {
    Self {
      config,
      scoring,
      transport,
    }
  }

  pub fn maintain(
    &self,
    state: &mut RouterState,
    scores: &mut ScoreCache,
    batch: &mut ControlBatch,
    now: Instant,
  ) {
    let ttl = self.config.degree.fanout_ttl;
    let threshold = self.config.thresholds.publish_threshold;
    let degree = self.config.degree.d;

    let RouterState {
      fanout,
      direct,
      selector,
      ..
    } = state;

    fanout.retain(|topic, state| {
      let expired = now.saturating_duration_since(state.last_publish) > ttl;
      if expired {
        debug!("HEARTBEAT: fanout of {} expired", topic);
      }
      !expired
    });

    for (topic, state) in fanout.iter_mut() {
      let topic_peers = self.transport.topic_peers(topic);
      let subscribed: HashSet<&PeerId> = topic_peers.iter().collect();

      // drop peers that left the topic or fell below the publish threshold
      state.peers.retain(|p| {
        let keep = subscribed.contains(p) && scores.get(p) >= threshold;
        if !keep {
          trace!("dropping fanout peer {} from {}", p, topic);
        }
        keep
      });

      if state.peers.len() < degree {
        let need = degree - state.peers.len();
        let peers = &state.peers;
        let fresh = selector.select(topic_peers.iter().cloned(), need, |p| {
          !peers.contains(p)
            && !direct.contains(p)
            && scores.get(p) >= threshold
        });
        state.peers.extend(fresh);
      }

      let gossip_threshold = self.config.thresholds.gossip_threshold;
      let mut exclude: HashSet<PeerId> = state.peers.iter().cloned().collect();
      exclude.extend(
        topic_peers
          .iter()
          .filter(|p| scores.get(p) < gossip_threshold)
          .cloned(),
      );
      batch.gossip(topic, exclude);
    }
  }

  /// Records a publish to a topic that has no mesh and returns the
  /// peers the message should go to.
  ///
  /// The first publish to a topic selects up to `D` peers above the
  /// publish threshold. The set is kept even when empty, the next
  /// heartbeat tops it up once peers appear.
  pub fn on_publish(
    &self,
    state: &mut RouterState,
    topic: &str,
    now: Instant,
  ) -> IndexSet<PeerId> {
    let threshold = self.config.thresholds.publish_threshold;
    let RouterState {
      fanout,
      direct,
      selector,
      ..
    } = state;

    if let Some(existing) = fanout.get_mut(topic) {
      existing.last_publish = now;
      return existing.peers.clone();
    }

    let peers = selector.select(
      self.transport.topic_peers(topic),
      self.config.degree.d,
      |p| !direct.contains(p) && self.scoring.score(p) >= threshold,
    );

    debug!("creating fanout of {} peer(s) for {}", peers.len(), topic);
    fanout.insert(topic.to_owned(), FanoutState::new(peers.clone(), now));
    peers
  }
}
