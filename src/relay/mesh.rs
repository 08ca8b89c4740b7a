//! Heartbeat maintenance of topic meshes.
//!
//! Each tick walks every joined topic and rebalances its mesh:
//!
//!   1. peers with a negative score are evicted without peer exchange,
//!   2. an undersized mesh is grafted back up to `D`,
//!   3. an oversized mesh is pruned down to `D`, keeping the `Dscore` best
//!      scoring peers and at least `Dout` outbound peers,
//!   4. a mesh with too few outbound peers gets outbound peers grafted,
//!      even above `D`,
//!   5. every `OpportunisticGraftTicks` a mesh with a poor median score
//!      gets a few better scoring peers grafted,
//!   6. IHAVE gossip is queued for peers outside of the mesh.
//!
//! Pruned peers are backed off for the topic so they are not grafted
//! again until the backoff expires.

use {
  super::{
    backoff::Backoff,
    config::Config,
    control::ControlBatch,
    selector::PeerSelector,
    state::RouterState,
    transport::{PeerScoring, Prune, PubsubTransport},
  },
  indexmap::IndexSet,
  itertools::Itertools,
  libp2p::PeerId,
  std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    panic::{catch_unwind, AssertUnwindSafe},
    time::Instant,
  },
  tracing::{debug, error, trace},
};

/// Memoizes peer scores for the duration of one heartbeat, the
/// scoring function may be expensive and is consulted many times
/// per peer while rebalancing.
pub struct ScoreCache<'a> {
  scoring: &'a dyn PeerScoring,
  scores: HashMap<PeerId, f64>,
}

impl<'a> ScoreCache<'a> {
  pub fn new(scoring: &'a dyn PeerScoring) -> Self {
    Self {
      scoring,
      scores: HashMap::new(),
    }
  }

  pub fn get(&mut self, peer: &PeerId) -> f64 {
    let scoring = self.scoring;
    *self
      .scores
      .entry(*peer)
      .or_insert_with(|| scoring.score(peer))
  }
}

/// Mesh mutations for one topic during one tick.
struct TopicRound<'t> {
  topic: &'t str,
  config: &'t Config,
  scoring: &'t dyn PeerScoring,
  mesh: &'t mut IndexSet<PeerId>,
  backoff: &'t mut Backoff,
  batch: &'t mut ControlBatch,
  pruned: HashSet<PeerId>,
  now: Instant,
}

impl<'t> TopicRound<'t> {
  fn graft(&mut self, peer: PeerId) {
    debug!("HEARTBEAT: Add mesh link to {} in {}", peer, self.topic);
    self.scoring.on_graft(&peer, self.topic);
    self.mesh.insert(peer);
    self.batch.graft(peer, self.topic);
  }

  fn prune(&mut self, peer: PeerId, peer_exchange: Vec<PeerId>) {
    debug!("HEARTBEAT: Remove mesh link to {} in {}", peer, self.topic);
    self.scoring.on_prune(&peer, self.topic);
    self
      .backoff
      .add(self.topic, peer, self.now, self.config.prune_backoff);
    self.mesh.shift_remove(&peer);
    self.pruned.insert(peer);
    self.batch.prune(peer, Prune {
      topic: self.topic.to_owned(),
      backoff: self.config.prune_backoff,
      peer_exchange,
    });
  }

  /// Candidate for a regular graft: not yet in the mesh, not direct,
  /// not backed off and not misbehaving.
  fn graftable(
    &self,
    peer: &PeerId,
    direct: &HashSet<PeerId>,
    scores: &mut ScoreCache,
  ) -> bool {
    !self.mesh.contains(peer)
      && !direct.contains(peer)
      && !self.backoff.is_backed_off(self.topic, peer, self.now)
      && scores.get(peer) >= 0.0
  }

  fn outbound_count(&self) -> usize {
    self
      .mesh
      .iter()
      .filter(|p| self.scoring.is_outbound(p))
      .count()
  }
}

pub struct MeshMaintainer<'a> {
  config: &'a Config,
  scoring: &'a dyn PeerScoring,
  transport: &'a dyn PubsubTransport,
}

impl<'a> MeshMaintainer<'a> {
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

  /// Runs one round of mesh maintenance over all joined topics.
  ///
  /// A panic while rebalancing one topic abandons that topic for this
  /// tick only. Mesh changes made before the panic already have their
  /// GRAFT or PRUNE queued in `batch`, so the batch stays in sync with
  /// the mesh and must still be flushed.
  pub fn maintain(
    &self,
    state: &mut RouterState,
    scores: &mut ScoreCache,
    batch: &mut ControlBatch,
    now: Instant,
  ) {
    let RouterState {
      mesh,
      backoff,
      direct,
      selector,
      ticks,
      ..
    } = state;

    for (topic, peers) in mesh.iter_mut() {
      // direct peers get every message regardless of the mesh,
      // they never take up a mesh slot.
      peers.retain(|p| !direct.contains(p));

      let mut round = TopicRound {
        topic,
        config: self.config,
        scoring: self.scoring,
        mesh: peers,
        backoff: &mut *backoff,
        batch: &mut *batch,
        pruned: HashSet::new(),
        now,
      };

      let tick = *ticks;
      let outcome = catch_unwind(AssertUnwindSafe(|| {
        self.maintain_topic(
          &mut round,
          &*direct,
          &mut *selector,
          &mut *scores,
          tick,
        )
      }));
      if outcome.is_err() {
        error!("HEARTBEAT: maintenance of {} panicked, skipping", topic);
      }
    }
  }

  fn maintain_topic(
    &self,
    round: &mut TopicRound,
    direct: &HashSet<PeerId>,
    selector: &mut PeerSelector,
    scores: &mut ScoreCache,
    tick: u64,
  ) {
    let degree = &self.config.degree;
    let topic_peers = self.transport.topic_peers(round.topic);

    // mesh scores as they were before this tick touched anything,
    // opportunistic grafting judges the mesh by this snapshot.
    let snapshot: Vec<f64> = round
      .mesh
      .iter()
      .map(|p| scores.get(p))
      .sorted_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
      .collect();

    // drop all peers with negative score, without PX
    let negative: Vec<PeerId> = round
      .mesh
      .iter()
      .cloned()
      .filter(|p| scores.get(p) < 0.0)
      .collect();
    for peer in negative {
      debug!(
        "HEARTBEAT: Prune peer {} with negative score: score={}, topic={}",
        peer,
        scores.get(&peer),
        round.topic
      );
      round.batch.deny_px(peer);
      round.prune(peer, vec![]);
    }

    // do we have enough peers?
    if round.mesh.len() < degree.d_lo {
      let need = degree.d - round.mesh.len();
      let selected = selector.select(topic_peers.iter().cloned(), need, |p| {
        round.graftable(p, direct, scores)
      });
      trace!(
        "topic {} below Dlo, grafting {} of {} needed",
        round.topic,
        selected.len(),
        need
      );
      selected.into_iter().for_each(|p| round.graft(p));
    }

    // do we have too many peers?
    if round.mesh.len() > degree.d_hi {
      let keep = self.rank_for_pruning(round, selector, scores);
      let excess: Vec<PeerId> = keep.into_iter().skip(degree.d).collect();
      for peer in excess {
        let px =
          self.peer_exchange(round, &peer, &topic_peers, selector, scores);
        round.prune(peer, px);
      }
    }

    // do we have enough outbound peers?
    if round.mesh.len() >= degree.d_lo {
      let outbound = round.outbound_count();
      if outbound < degree.d_out {
        let need = degree.d_out - outbound;
        let selected = selector.select(topic_peers.iter().cloned(), need, |p| {
          self.scoring.is_outbound(p) && round.graftable(p, direct, scores)
        });
        selected.into_iter().for_each(|p| round.graft(p));
      }
    }

    // should we try to improve the mesh with opportunistic grafting?
    if tick % degree.opportunistic_graft_ticks == 0
      && snapshot.len() > 1
      && degree.opportunistic_graft_peers > 0
    {
      let median = snapshot[snapshot.len() / 2];
      if median < self.config.thresholds.opportunistic_graft_threshold {
        let selected = selector.select(
          topic_peers.iter().cloned(),
          degree.opportunistic_graft_peers,
          |p| {
            !round.mesh.contains(p)
              && !direct.contains(p)
              && !round.backoff.is_backed_off(round.topic, p, round.now)
              && scores.get(p) > median
          },
        );
        for peer in selected {
          debug!(
            "HEARTBEAT: Opportunistically graft peer {} on topic {}",
            peer, round.topic
          );
          round.graft(peer);
        }
      }
    }

    // mesh peers already got the messages pushed to them and the
    // ones pruned this tick are told so explicitly, gossiping IHAVEs
    // to either of them is redundant. Peers below the gossip threshold
    // get none at all.
    let threshold = self.config.thresholds.gossip_threshold;
    let mut exclude: HashSet<PeerId> = round
      .mesh
      .iter()
      .chain(round.pruned.iter())
      .cloned()
      .collect();
    exclude.extend(
      topic_peers
        .iter()
        .filter(|p| scores.get(p) < threshold)
        .cloned(),
    );
    round.batch.gossip(round.topic, exclude);
  }

  /// Orders the mesh for pruning: the `Dscore` best scoring peers first,
  /// then the rest in random order, with outbound peers bubbled into the
  /// first `D` slots until `Dout` of them are kept.
  fn rank_for_pruning(
    &self,
    round: &TopicRound,
    selector: &mut PeerSelector,
    scores: &mut ScoreCache,
  ) -> Vec<PeerId> {
    let degree = &self.config.degree;
    let mut ranked: Vec<PeerId> = round
      .mesh
      .iter()
      .map(|p| (*p, scores.get(p)))
      .sorted_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal))
      .map(|(p, _)| p)
      .collect();

    let top = degree.d_score.min(ranked.len());
    selector.shuffle(&mut ranked[top..]);

    let is_outbound = |p: &PeerId| self.scoring.is_outbound(p);
    let cutoff = degree.d.min(ranked.len());
    let outbound = ranked[..cutoff].iter().filter(|p| is_outbound(*p)).count();

    if outbound < degree.d_out {
      // moves the i-th peer to the front, keeping the relative
      // order of everything that was ahead of it.
      let rotate = |ranked: &mut Vec<PeerId>, i: usize| {
        ranked[..=i].rotate_right(1);
      };

      // first bubble up all outbound peers already in the selection
      let mut ihave = outbound;
      let mut i = 1;
      while i < cutoff && ihave > 0 {
        if is_outbound(&ranked[i]) {
          rotate(&mut ranked, i);
          ihave -= 1;
        }
        i += 1;
      }

      // then bubble up enough outbound peers from outside of it
      let mut ineed = degree.d_out - outbound;
      let mut i = cutoff;
      while i < ranked.len() && ineed > 0 {
        if is_outbound(&ranked[i]) {
          rotate(&mut ranked, i);
          ineed -= 1;
        }
        i += 1;
      }
    }

    ranked
  }

  /// Alternative peers offered to a peer we prune, if enabled.
  fn peer_exchange(
    &self,
    round: &TopicRound,
    pruned: &PeerId,
    topic_peers: &[PeerId],
    selector: &mut PeerSelector,
    scores: &mut ScoreCache,
  ) -> Vec<PeerId> {
    if !self.config.do_px
      || self.config.prune_peers == 0
      || round.batch.is_px_denied(pruned)
    {
      return vec![];
    }

    selector
      .select(topic_peers.iter().cloned(), self.config.prune_peers, |p| {
        p != pruned && scores.get(p) >= 0.0
      })
      .into_iter()
      .collect()
  }

  /// Joins a topic mesh.
  ///
  /// If we have been publishing to the topic, its fanout peers become
  /// the initial mesh (minus the negative scoring ones), topped up with
  /// fresh peers up to `D`. Every initial mesh peer is sent a GRAFT.
  pub fn join(
    &self,
    state: &mut RouterState,
    topic: &str,
    batch: &mut ControlBatch,
    now: Instant,
  ) -> Vec<PeerId> {
    if state.is_joined(topic) {
      return vec![];
    }

    let mut scores = ScoreCache::new(self.scoring);
    let RouterState {
      mesh,
      fanout,
      backoff,
      direct,
      selector,
      ..
    } = state;

    let mut peers = match fanout.shift_remove(topic) {
      Some(fanout) => {
        // these peers have a score above the publish threshold,
        // which may be negative, so drop the ones with a negative score
        let mut peers = fanout.peers;
        peers.retain(|p| scores.get(p) >= 0.0);
        peers
      }
      None => IndexSet::new(),
    };

    if peers.len() < self.config.degree.d {
      let need = self.config.degree.d - peers.len();
      let fresh = selector.select(self.transport.topic_peers(topic), need, |p| {
        !peers.contains(p)
          && !direct.contains(p)
          && !backoff.is_backed_off(topic, p, now)
          && scores.get(p) >= 0.0
      });
      peers.extend(fresh);
    }

    for peer in &peers {
      debug!("JOIN: Add mesh link to {} in {}", peer, topic);
      self.scoring.on_graft(peer, topic);
      batch.graft(*peer, topic);
    }

    let joined = peers.iter().cloned().collect();
    mesh.insert(topic.to_owned(), peers);
    joined
  }

  /// Leaves a topic mesh, pruning every mesh peer.
  pub fn leave(
    &self,
    state: &mut RouterState,
    topic: &str,
    batch: &mut ControlBatch,
    now: Instant,
  ) -> Vec<PeerId> {
    let RouterState {
      mesh,
      backoff,
      selector,
      ..
    } = state;

    let mut peers = match mesh.shift_remove(topic) {
      Some(peers) => peers,
      None => return vec![],
    };

    let topic_peers = self.transport.topic_peers(topic);
    let mut scores = ScoreCache::new(self.scoring);
    let mut round = TopicRound {
      topic,
      config: self.config,
      scoring: self.scoring,
      mesh: &mut peers,
      backoff,
      batch,
      pruned: HashSet::new(),
      now,
    };

    let leaving: Vec<PeerId> = round.mesh.iter().cloned().collect();
    for peer in &leaving {
      debug!("LEAVE: Remove mesh link to {} in {}", peer, topic);
      let px =
        self.peer_exchange(&round, peer, &topic_peers, selector, &mut scores);
      round.prune(*peer, px);
    }

    leaving
  }
}

#[cfg(test)]
mod tests {
  use {
    super::{MeshMaintainer, ScoreCache},
    crate::{
      relay::{
        config::DegreeParameters,
        control::ControlBatch,
        transport::PeerScoring,
      },
      test::utils::{peers, Harness, TOPIC},
    },
    indexmap::IndexSet,
    libp2p::PeerId,
    std::{
      collections::HashSet,
      time::{Duration, Instant},
    },
  };

  fn run(h: &mut Harness, now: Instant) -> ControlBatch {
    let mut batch = ControlBatch::new();
    let mut scores = ScoreCache::new(&*h.scoring);
    MeshMaintainer::new(&h.config, &*h.scoring, &*h.transport).maintain(
      &mut h.state,
      &mut scores,
      &mut batch,
      now,
    );
    batch
  }

  fn mesh(h: &Harness) -> HashSet<PeerId> {
    h.state.mesh_peers(TOPIC).into_iter().collect()
  }

  /// Joined topic with `in_mesh` mesh peers and `candidates` extra
  /// subscribers, all with a zero score.
  fn seeded(
    h: &mut Harness,
    in_mesh: usize,
    candidates: usize,
  ) -> (Vec<PeerId>, Vec<PeerId>) {
    let members = peers(in_mesh);
    let others = peers(candidates);
    h.subscribe_peers(&members);
    h.subscribe_peers(&others);
    h.state.mesh.insert(
      TOPIC.to_owned(),
      members.iter().cloned().collect::<IndexSet<_>>(),
    );
    (members, others)
  }

  #[test]
  fn low_degree_mesh_is_grafted_up_to_d() {
    let mut h = Harness::new();
    let (members, others) = seeded(&mut h, 2, 5);

    let batch = run(&mut h, Instant::now());

    let mesh = mesh(&h);
    assert_eq!(mesh.len(), 6);
    assert!(members.iter().all(|p| mesh.contains(p)));

    let grafted: Vec<_> = others
      .iter()
      .filter(|p| !batch.grafted(p).is_empty())
      .collect();
    assert_eq!(grafted.len(), 4);
  }

  #[test]
  fn high_degree_mesh_is_pruned_down_to_d() {
    let mut h = Harness::new();
    let (members, _) = seeded(&mut h, 15, 0);
    let now = Instant::now();

    let batch = run(&mut h, now);

    let mesh = mesh(&h);
    assert_eq!(mesh.len(), 6);

    let pruned: Vec<_> = members.iter().filter(|p| !mesh.contains(p)).collect();
    assert_eq!(pruned.len(), 9);
    for peer in pruned {
      assert_eq!(batch.pruned(peer).len(), 1);
      assert!(h.state.backoff.is_backed_off(TOPIC, peer, now));
    }
  }

  #[test]
  fn pruning_keeps_the_best_scoring_peers() {
    let mut h = Harness::new();
    let (members, _) = seeded(&mut h, 14, 0);
    let best: Vec<_> = members.iter().take(4).cloned().collect();
    for peer in &best {
      h.scoring.set_score(*peer, 100.0);
    }

    run(&mut h, Instant::now());

    let mesh = mesh(&h);
    assert_eq!(mesh.len(), 6);
    assert!(best.iter().all(|p| mesh.contains(p)));
  }

  #[test]
  fn pruning_preserves_outbound_quota() {
    for seed in 0..20 {
      let mut h = Harness::with_seed(seed);
      let (members, _) = seeded(&mut h, 15, 0);

      // the best scoring peers are all inbound, only two
      // low scoring peers are outbound connections.
      for peer in members.iter().take(4) {
        h.scoring.set_score(*peer, 50.0);
      }
      let outbound: Vec<_> = members.iter().rev().take(2).cloned().collect();
      for peer in &outbound {
        h.scoring.set_outbound(*peer);
      }

      run(&mut h, Instant::now());

      let mesh = mesh(&h);
      assert_eq!(mesh.len(), 6, "seed {seed}");
      assert!(outbound.iter().all(|p| mesh.contains(p)), "seed {seed}");
    }
  }

  #[test]
  fn negative_peers_are_evicted_without_px() {
    let mut h = Harness::new();
    h.config.do_px = true;
    let (members, _) = seeded(&mut h, 6, 4);
    let bad = members[0];
    h.scoring.set_score(bad, -5.0);
    let now = Instant::now();

    let batch = run(&mut h, now);

    let mesh = mesh(&h);
    assert!(!mesh.contains(&bad));
    assert!(h.state.backoff.is_backed_off(TOPIC, &bad, now));
    assert!(batch.is_px_denied(&bad));
    assert_eq!(batch.pruned(&bad).len(), 1);
  }

  #[test]
  fn negative_candidates_are_never_grafted() {
    let mut h = Harness::new();
    let (_, others) = seeded(&mut h, 1, 8);
    for peer in others.iter().take(6) {
      h.scoring.set_score(*peer, -1.0);
    }

    run(&mut h, Instant::now());

    let mesh = mesh(&h);
    assert_eq!(mesh.len(), 3);
    assert!(mesh.iter().all(|p| h.scoring.score(p) >= 0.0));
  }

  #[test]
  fn backed_off_peers_are_not_grafted_until_expiry() {
    let mut h = Harness::new();
    let (members, _) = seeded(&mut h, 3, 0);
    let now = Instant::now();

    // all candidates were pruned a moment ago
    let backoff = h.config.prune_backoff;
    let candidates = peers(5);
    h.subscribe_peers(&candidates);
    for peer in &candidates {
      h.state.backoff.add(TOPIC, *peer, now, backoff);
    }

    run(&mut h, now + Duration::from_secs(1));
    assert_eq!(mesh(&h), members.iter().cloned().collect());

    run(&mut h, now + backoff);
    assert_eq!(mesh(&h).len(), 6);
  }

  #[test]
  fn direct_peers_stay_out_of_the_mesh() {
    let mut h = Harness::new();
    let direct = peers(3);
    h.subscribe_peers(&direct);
    h.state.direct.extend(direct.iter().cloned());
    seeded(&mut h, 0, 2);
    h.state.mesh.get_mut(TOPIC).unwrap().insert(direct[0]);

    let batch = run(&mut h, Instant::now());

    let mesh = mesh(&h);
    assert_eq!(mesh.len(), 2);
    assert!(direct.iter().all(|p| !mesh.contains(p)));
    assert!(direct.iter().all(|p| batch.pruned(p).is_empty()));
  }

  #[test]
  fn outbound_quota_is_topped_up_above_d() {
    let mut h = Harness::new();
    let (_, others) = seeded(&mut h, 6, 4);
    for peer in &others {
      h.scoring.set_outbound(*peer);
    }

    run(&mut h, Instant::now());

    let mesh = mesh(&h);
    assert_eq!(mesh.len(), 8);
    assert_eq!(others.iter().filter(|p| mesh.contains(p)).count(), 2);
  }

  #[test]
  fn opportunistic_graft_improves_poor_mesh() {
    let mut h = Harness::new();
    h.config.degree = DegreeParameters {
      opportunistic_graft_ticks: 1,
      ..h.config.degree.clone()
    };
    let (_, others) = seeded(&mut h, 6, 5);
    let good: Vec<_> = others.iter().take(3).cloned().collect();
    for peer in &good {
      h.scoring.set_score(*peer, 30.0);
    }

    run(&mut h, Instant::now());

    let mesh = mesh(&h);
    assert_eq!(mesh.len(), 8);
    assert_eq!(good.iter().filter(|p| mesh.contains(p)).count(), 2);
  }

  #[test]
  fn opportunistic_graft_waits_for_its_tick() {
    let mut h = Harness::new();
    let (_, others) = seeded(&mut h, 6, 5);
    for peer in &others {
      h.scoring.set_score(*peer, 30.0);
    }
    h.state.ticks = 1;

    run(&mut h, Instant::now());
    assert_eq!(mesh(&h).len(), 6);
  }

  #[test]
  fn gossip_excludes_mesh_and_pruned_peers() {
    let mut h = Harness::new();
    let (members, _) = seeded(&mut h, 13, 0);

    let batch = run(&mut h, Instant::now());
    let (_, gossip) = batch.into_messages();

    assert_eq!(gossip.len(), 1);
    let (topic, exclude) = &gossip[0];
    assert_eq!(topic, TOPIC);
    assert!(members.iter().all(|p| exclude.contains(p)));
  }

  #[test]
  fn gossip_skips_peers_below_gossip_threshold() {
    let mut h = Harness::new();
    let (members, others) = seeded(&mut h, 6, 3);
    let (shunned, tolerated) = (others[0], others[1]);
    h.scoring.set_score(shunned, -20.0);
    h.scoring.set_score(tolerated, -5.0);

    let batch = run(&mut h, Instant::now());
    let (_, gossip) = batch.into_messages();

    let (_, exclude) = &gossip[0];
    assert!(exclude.contains(&shunned));
    assert!(!exclude.contains(&tolerated));
    assert!(!exclude.contains(&others[2]));
    assert!(members.iter().all(|p| exclude.contains(p)));
  }

  #[test]
  fn join_promotes_fanout_and_tops_up() {
    let mut h = Harness::new();
    let fanout = peers(3);
    let others = peers(10);
    h.subscribe_peers(&fanout);
    h.subscribe_peers(&others);
    h.scoring.set_score(fanout[0], -20.0);
    h.state.fanout.insert(
      TOPIC.to_owned(),
      crate::relay::state::FanoutState::new(
        fanout.iter().cloned().collect(),
        Instant::now(),
      ),
    );

    let mut batch = ControlBatch::new();
    let joined = MeshMaintainer::new(&h.config, &*h.scoring, &*h.transport)
      .join(&mut h.state, TOPIC, &mut batch, Instant::now());

    assert_eq!(joined.len(), 6);
    assert!(!joined.contains(&fanout[0]));
    assert!(joined.contains(&fanout[1]) && joined.contains(&fanout[2]));
    assert!(h.state.fanout.is_empty());
    assert!(joined.iter().all(|p| batch.grafted(p) == [TOPIC.to_owned()]));
  }

  #[test]
  fn leave_prunes_every_mesh_peer() {
    let mut h = Harness::new();
    let (members, _) = seeded(&mut h, 5, 0);
    let now = Instant::now();

    let mut batch = ControlBatch::new();
    let left = MeshMaintainer::new(&h.config, &*h.scoring, &*h.transport)
      .leave(&mut h.state, TOPIC, &mut batch, now);

    assert_eq!(left.len(), 5);
    assert!(!h.state.is_joined(TOPIC));
    assert_eq!(h.scoring.prunes().len(), 5);
    for peer in &members {
      assert_eq!(batch.pruned(peer).len(), 1);
      assert!(h.state.backoff.is_backed_off(TOPIC, peer, now));
    }
  }
}
