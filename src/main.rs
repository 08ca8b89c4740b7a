mod cli;

use {
  clap::Parser,
  cli::CliOpts,
  libp2p::PeerId,
  meshrelay::relay::{
    memory::{MemoryTransport, StaticScoring},
    DecodedMessage,
    Encoder,
    Message,
    PeerSelector,
    PlainDecoder,
    PlainEncoder,
    RelayRouter,
  },
  rand::{Rng, SeedableRng},
  rand_chacha::ChaCha20Rng,
  std::{sync::Arc, time::Duration},
  tracing::{debug, info, warn, Level},
};

/// Fills the simulated network with peers of random quality.
fn populate(
  transport: &MemoryTransport,
  scoring: &StaticScoring,
  topic: &str,
  count: usize,
  outbound: f64,
  rng: &mut ChaCha20Rng,
) -> Vec<PeerId> {
  (0..count)
    .map(|_| {
      let peer = PeerId::random();
      transport.add_peer(topic, peer);
      scoring.set_score(peer, rng.gen_range(-20.0..60.0));
      if rng.gen_bool(outbound) {
        scoring.set_outbound(peer);
      }
      peer
    })
    .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let opts = CliOpts::parse();

  tracing_subscriber::fmt()
    .with_max_level(match opts.verbose {
      1 => Level::DEBUG,
      2 => Level::TRACE,
      _ => Level::INFO,
    })
    .init();

  let config = opts.config()?;
  let topic = config.pubsub_topic.clone();

  info!("Starting meshrelay simulation");
  info!("Version: {}", env!("CARGO_PKG_VERSION"));
  info!("Config: {:#?}", config);

  let mut rng = match opts.seed {
    Some(seed) => ChaCha20Rng::seed_from_u64(seed),
    None => ChaCha20Rng::from_entropy(),
  };
  let selector = match opts.seed {
    Some(seed) => PeerSelector::seeded(seed),
    None => PeerSelector::from_entropy(),
  };

  let transport = Arc::new(MemoryTransport::default());
  let scoring = Arc::new(StaticScoring::default());
  let peers = populate(
    &transport,
    &scoring,
    &topic,
    opts.peers,
    opts.outbound(),
    &mut rng,
  );

  let router = RelayRouter::with_selector(
    config,
    transport.clone(),
    scoring.clone(),
    selector,
  )?;

  router.subscribe(&topic)?;
  let decoder = PlainDecoder::new(&opts.content_topic);
  let _observer = router.add_observer(decoder, |msg: DecodedMessage| {
    info!("received {} bytes on {}", msg.payload.len(), msg.content_topic);
  });

  let heartbeat = router.start_heartbeat();
  let waiting = router.wait_for_peers(Some(&topic));
  match tokio::time::timeout(Duration::from_secs(10), waiting).await {
    Ok(()) => info!("mesh of {topic} is up"),
    Err(_) => warn!("no mesh peers on {topic} yet, publishing anyway"),
  }
  let encoder = PlainEncoder::new(opts.content_topic.clone());

  let deadline = async {
    match opts.duration() {
      Some(duration) => tokio::time::sleep(duration).await,
      None => futures::future::pending().await,
    }
  };
  tokio::pin!(deadline);

  let mut ticker = tokio::time::interval(Duration::from_secs(1));
  let mut seq = 0u64;

  // simulation runloop
  loop {
    tokio::select! {
      _ = ticker.tick() => {
        seq += 1;

        // peer quality drifts over time
        if !peers.is_empty() {
          let peer = peers[rng.gen_range(0..peers.len())];
          let score = rng.gen_range(-20.0..60.0);
          debug!("rescoring {peer} to {score:.2}");
          scoring.set_score(peer, score);
        }

        let message = Message::new(format!("message #{seq}"));
        let result = router.send(&encoder, &message).await;
        if let Some(failure) = &result.failure {
          warn!("message #{seq} not sent: {failure}");
        }

        // loop the message back as if a mesh peer relayed it to us
        if let Some(bytes) = encoder.encode(&message).await {
          transport.deliver(&topic, bytes);
        }

        info!(
          "mesh of {} has {} peer(s), message #{} reached {} peer(s)",
          topic,
          router.get_mesh_peers(Some(&topic)).len(),
          seq,
          result.recipients.len()
        );
      }
      _ = &mut deadline => {
        info!("simulation time is up");
        break;
      }
      _ = tokio::signal::ctrl_c() => {
        info!("interrupted");
        break;
      }
    }
  }

  heartbeat.stop();
  router.unsubscribe(&topic)?;
  Ok(())
}
