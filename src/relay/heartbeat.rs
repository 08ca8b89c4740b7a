use {
  super::{
    config::{Config, DegreeParameters},
    control::{ControlBatch, FlushSummary},
    fanout::FanoutMaintainer,
    mesh::{MeshMaintainer, ScoreCache},
    state::{lock, SharedState},
    transport::{PeerScoring, PubsubTransport},
  },
  std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
      atomic::{AtomicBool, Ordering},
      Arc,
    },
    time::Instant,
  },
  tokio::{sync::watch, time::MissedTickBehavior},
  tracing::{debug, error, trace},
};

/// Publishes the number of the last finished tick.
pub(crate) type TickNotifier = Arc<watch::Sender<u64>>;

/// Outcome of a single heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
  pub tick: u64,
  pub mesh_topics: usize,
  pub fanout_topics: usize,
  pub flush: FlushSummary,
}

/// One round of periodic maintenance over the shared router state.
#[derive(Clone)]
pub struct Heartbeat {
  config: Arc<Config>,
  state: SharedState,
  scoring: Arc<dyn PeerScoring>,
  transport: Arc<dyn PubsubTransport>,
  notifier: TickNotifier,
}

impl Heartbeat {
  pub(crate) fn new(
    config: Arc<Config>,
    state: SharedState,
    scoring: Arc<dyn PeerScoring>,
    transport: Arc<dyn PubsubTransport>,
    notifier: TickNotifier,
  ) -> Self {
    Self {
      config,
      state,
      scoring,
      transport,
      notifier,
    }
  }

  /// Runs mesh and fanout maintenance for all topics, then hands the
  /// resulting control traffic to the transport.
  ///
  /// The state lock is released before anything is emitted. Once the
  /// control traffic is out, the tick number is published to everyone
  /// waiting on the mesh to change.
  pub fn tick(&self, now: Instant) -> TickSummary {
    let (batch, tick, mesh_topics, fanout_topics) = {
      let mut state = lock(&self.state);
      state.ticks += 1;
      state.backoff.clear_expired(now);

      let mut scores = ScoreCache::new(&*self.scoring);
      let mut batch = ControlBatch::new();

      MeshMaintainer::new(&self.config, &*self.scoring, &*self.transport)
        .maintain(&mut state, &mut scores, &mut batch, now);
      let fanout =
        FanoutMaintainer::new(&self.config, &*self.scoring, &*self.transport);
      if catch_unwind(AssertUnwindSafe(|| {
        fanout.maintain(&mut state, &mut scores, &mut batch, now)
      }))
      .is_err()
      {
        error!("HEARTBEAT: fanout maintenance panicked, skipping");
      }

      trace!(
        "heartbeat {}: {} backoff record(s) pending",
        state.ticks,
        state.backoff.len()
      );
      (batch, state.ticks, state.mesh.len(), state.fanout.len())
    };

    let summary = TickSummary {
      tick,
      mesh_topics,
      fanout_topics,
      flush: batch.flush(&*self.transport),
    };

    // nobody listening is fine
    let _ = self.notifier.send(tick);
    summary
  }
}

/// Drives a [`Heartbeat`] on a background task.
///
/// The first tick runs after `HeartbeatInitialDelay`, then one every
/// `HeartbeatInterval`. A tick that overruns its slot delays the next
/// one instead of triggering a burst of catch-up ticks.
#[must_use = "the heartbeat stops as soon as its scheduler is dropped"]
pub struct HeartbeatScheduler {
  shutdown: watch::Sender<bool>,
  stopped: AtomicBool,
}

impl HeartbeatScheduler {
  pub fn start(heartbeat: Heartbeat, params: &DegreeParameters) -> Self {
    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let initial_delay = params.heartbeat_initial_delay;
    let period = params.heartbeat_interval;

    tokio::spawn(async move {
      tokio::select! {
        biased;
        _ = shutdown_rx.changed() => return,
        _ = tokio::time::sleep(initial_delay) => {}
      }

      let mut interval = tokio::time::interval(period);
      interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

      loop {
        tokio::select! {
          biased;
          _ = shutdown_rx.changed() => break,
          _ = interval.tick() => {
            let now = tokio::time::Instant::now().into_std();
            match catch_unwind(AssertUnwindSafe(|| heartbeat.tick(now))) {
              Ok(summary) => trace!("heartbeat: {summary:?}"),
              Err(_) => error!("heartbeat tick panicked, rescheduling"),
            }
          }
        }
      }

      debug!("heartbeat stopped");
    });

    Self {
      shutdown,
      stopped: AtomicBool::new(false),
    }
  }

  /// Cancels all future ticks. A tick in progress runs to completion.
  pub fn stop(&self) {
    if !self.stopped.swap(true, Ordering::SeqCst) {
      // the task may already be gone, nothing left to cancel then
      let _ = self.shutdown.send(true);
    }
  }

  pub fn is_stopped(&self) -> bool {
    self.stopped.load(Ordering::SeqCst)
  }
}

impl Drop for HeartbeatScheduler {
  fn drop(&mut self) {
    self.stop();
  }
}

#[cfg(test)]
mod tests {
  use {
    super::{Heartbeat, HeartbeatScheduler},
    crate::{
      relay::{
        config::Config,
        memory::{MemoryTransport, StaticScoring},
        selector::PeerSelector,
        state::{lock, RouterState, SharedState},
        transport::{PeerControl, PeerScoring},
      },
      test::utils::{peers, TOPIC},
    },
    libp2p::PeerId,
    std::{
      collections::HashSet,
      sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Mutex,
      },
      time::Duration,
    },
    tokio::sync::watch,
  };

  struct Flaky {
    calls: AtomicUsize,
  }

  impl PeerScoring for Flaky {
    fn score(&self, _: &PeerId) -> f64 {
      if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
        panic!("scoring backend went away");
      }
      0.0
    }

    fn is_outbound(&self, _: &PeerId) -> bool {
      false
    }
  }

  fn shared_state() -> SharedState {
    Arc::new(Mutex::new(RouterState::new(
      HashSet::new(),
      PeerSelector::seeded(7),
    )))
  }

  fn heartbeat(
    state: &SharedState,
    scoring: Arc<dyn PeerScoring>,
    transport: Arc<MemoryTransport>,
  ) -> Heartbeat {
    Heartbeat::new(
      Arc::new(Config::default()),
      state.clone(),
      scoring,
      transport,
      Arc::new(watch::channel(0).0),
    )
  }

  /// Scoring backend that blows up when asked about one peer.
  struct PanicsOn(PeerId);

  impl PeerScoring for PanicsOn {
    fn score(&self, peer: &PeerId) -> f64 {
      if *peer == self.0 {
        panic!("no score for {peer}");
      }
      0.0
    }

    fn is_outbound(&self, _: &PeerId) -> bool {
      false
    }
  }

  #[tokio::test(start_paused = true)]
  async fn ticks_until_stopped() {
    let state = shared_state();
    let transport = Arc::new(MemoryTransport::default());
    let scoring = Arc::new(StaticScoring::default());
    let scheduler = HeartbeatScheduler::start(
      heartbeat(&state, scoring, transport),
      &Config::default().degree,
    );

    // initial delay of 100ms, then one tick per second
    tokio::time::sleep(Duration::from_millis(3150)).await;
    assert_eq!(lock(&state).ticks, 4);

    scheduler.stop();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(lock(&state).ticks, 4);
    assert!(scheduler.is_stopped());
  }

  #[tokio::test(start_paused = true)]
  async fn stop_is_idempotent() {
    let state = shared_state();
    let scheduler = HeartbeatScheduler::start(
      heartbeat(
        &state,
        Arc::new(StaticScoring::default()),
        Arc::new(MemoryTransport::default()),
      ),
      &Config::default().degree,
    );

    // stopped before the initial delay elapsed, no tick ever runs
    scheduler.stop();
    scheduler.stop();
    drop(scheduler);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(lock(&state).ticks, 0);
  }

  #[tokio::test(start_paused = true)]
  async fn survives_a_panicking_tick() {
    let state = shared_state();
    let transport = Arc::new(MemoryTransport::default());
    let members = peers(5);
    for peer in &members {
      transport.add_peer(TOPIC, *peer);
    }
    lock(&state)
      .mesh
      .insert(TOPIC.to_owned(), members.iter().cloned().collect());

    let scoring = Arc::new(Flaky {
      calls: AtomicUsize::new(0),
    });
    let _scheduler = HeartbeatScheduler::start(
      heartbeat(&state, scoring.clone(), transport),
      &Config::default().degree,
    );

    tokio::time::sleep(Duration::from_millis(2150)).await;

    // the first scoring call panicked and that topic was skipped,
    // the following ticks ran against an intact mesh.
    assert_eq!(lock(&state).ticks, 3);
    assert!(scoring.calls.load(Ordering::SeqCst) > 1);
    assert_eq!(lock(&state).mesh_peers(TOPIC).len(), 5);
  }

  #[test]
  fn tick_clears_expired_backoff() {
    let state = shared_state();
    let peer = PeerId::random();
    let now = std::time::Instant::now();
    lock(&state)
      .backoff
      .add(TOPIC, peer, now, Duration::from_secs(60));

    let hb = heartbeat(
      &state,
      Arc::new(StaticScoring::default()),
      Arc::new(MemoryTransport::default()),
    );

    hb.tick(now + Duration::from_secs(30));
    assert_eq!(lock(&state).backoff.len(), 1);

    let summary = hb.tick(now + Duration::from_secs(60));
    assert!(lock(&state).backoff.is_empty());
    assert_eq!(summary.tick, 2);
  }

  #[test]
  fn panic_in_one_topic_still_sends_grafts_of_others() {
    let state = shared_state();
    let transport = Arc::new(MemoryTransport::default());
    let healthy = peers(10);
    let bad = PeerId::random();
    for peer in &healthy {
      transport.add_peer("/a", *peer);
    }
    transport.add_peer("/b", bad);

    {
      let mut state = lock(&state);
      state
        .mesh
        .insert("/a".to_owned(), healthy.iter().take(2).cloned().collect());
      state.mesh.insert("/b".to_owned(), [bad].into_iter().collect());
    }

    let hb = heartbeat(&state, Arc::new(PanicsOn(bad)), transport.clone());
    let summary = hb.tick(std::time::Instant::now());

    let mesh = lock(&state).mesh_peers("/a");
    assert_eq!(mesh.len(), 6);
    assert_eq!(summary.flush.grafts, 4);

    // every peer that entered the mesh was told so
    for peer in mesh.iter().skip(2) {
      assert_eq!(transport.controls_for(peer), vec![PeerControl {
        graft: vec!["/a".to_owned()],
        prune: vec![],
      }]);
    }
    assert_eq!(lock(&state).mesh_peers("/b"), vec![bad]);
  }

  #[test]
  fn unreachable_peer_does_not_stall_the_tick() {
    let state = shared_state();
    let transport = Arc::new(MemoryTransport::default());
    let scoring = Arc::new(StaticScoring::default());
    let members = peers(6);
    for peer in &members {
      transport.add_peer(TOPIC, *peer);
    }
    lock(&state)
      .mesh
      .insert(TOPIC.to_owned(), [members[0]].into_iter().collect());

    // all five remaining subscribers get grafted, one of them is gone
    let gone = members[3];
    transport.set_unreachable(gone);

    let hb = heartbeat(&state, scoring.clone(), transport.clone());
    let summary = hb.tick(std::time::Instant::now());

    assert_eq!(summary.tick, 1);
    assert_eq!(summary.flush.unreachable, 1);
    assert_eq!(summary.flush.control_messages, 4);
    assert_eq!(summary.flush.grafts, 4);
    assert!(transport.controls_for(&gone).is_empty());
    for peer in members.iter().skip(1).filter(|p| **p != gone) {
      assert_eq!(transport.controls_for(peer).len(), 1);
    }
    assert_eq!(scoring.grafts().len(), 5);
    assert_eq!(lock(&state).mesh_peers(TOPIC).len(), 6);
  }

  #[test]
  fn tick_number_is_published() {
    let state = shared_state();
    let (tx, rx) = watch::channel(0);
    let hb = Heartbeat::new(
      Arc::new(Config::default()),
      state.clone(),
      Arc::new(StaticScoring::default()),
      Arc::new(MemoryTransport::default()),
      Arc::new(tx),
    );

    let now = std::time::Instant::now();
    hb.tick(now);
    hb.tick(now);
    assert_eq!(*rx.borrow(), 2);
  }
}
