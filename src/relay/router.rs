use {
  super::{
    config::Config,
    control::ControlBatch,
    error::{ConfigError, SendFailure, TransportError},
    fanout::FanoutMaintainer,
    heartbeat::{Heartbeat, HeartbeatScheduler, TickNotifier},
    mesh::MeshMaintainer,
    message::{Decoder, Encoder, Message},
    observer::{ObserverRegistry, Unsubscribe},
    selector::PeerSelector,
    state::{lock, RouterState, SharedState},
    transport::{PeerScoring, PubsubTransport},
  },
  libp2p::PeerId,
  std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Instant,
  },
  tokio::{sync::watch, task::JoinHandle},
  tracing::{debug, info, warn},
};

/// Outcome of [`RelayRouter::send`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendResult {
  /// Peers the transport handed the message to.
  pub recipients: Vec<PeerId>,

  /// Set when the message was not sent.
  pub failure: Option<SendFailure>,
}

impl SendResult {
  fn failed(failure: SendFailure) -> Self {
    Self {
      recipients: vec![],
      failure: Some(failure),
    }
  }

  pub fn is_ok(&self) -> bool {
    self.failure.is_none()
  }
}

/// Entry point of the relay.
///
/// Owns the mesh and fanout state of all pubsub topics, routes outbound
/// messages to the transport and inbound messages to the observers of
/// their content topic.
pub struct RelayRouter {
  config: Arc<Config>,
  state: SharedState,
  scoring: Arc<dyn PeerScoring>,
  transport: Arc<dyn PubsubTransport>,
  observers: Arc<ObserverRegistry>,
  inbound: Mutex<HashMap<String, JoinHandle<()>>>,
  notifier: TickNotifier,
  ticks: watch::Receiver<u64>,
}

impl RelayRouter {
  pub fn new(
    config: Config,
    transport: Arc<dyn PubsubTransport>,
    scoring: Arc<dyn PeerScoring>,
  ) -> Result<Self, ConfigError> {
    let selector = PeerSelector::from_entropy();
    Self::with_selector(config, transport, scoring, selector)
  }

  /// Same as [`RelayRouter::new`] but with an explicit source of
  /// randomness for peer selection.
  pub fn with_selector(
    config: Config,
    transport: Arc<dyn PubsubTransport>,
    scoring: Arc<dyn PeerScoring>,
    selector: PeerSelector,
  ) -> Result<Self, ConfigError> {
    config.validate()?;
    let direct = config.direct_peers()?;
    let (notifier, ticks) = watch::channel(0);

    Ok(Self {
      config: Arc::new(config),
      state: Arc::new(Mutex::new(RouterState::new(direct, selector))),
      scoring,
      transport,
      observers: Arc::new(ObserverRegistry::new()),
      inbound: Mutex::new(HashMap::new()),
      notifier: Arc::new(notifier),
      ticks,
    })
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Joins the mesh of a pubsub topic and starts routing its inbound
  /// messages to observers. Subscribing twice is a no-op.
  ///
  /// Must be called from within a tokio runtime.
  pub fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
    let mut inbound = lock(&self.inbound);
    if inbound.contains_key(topic) {
      return Ok(());
    }

    let mut rx = self.transport.subscribe(topic)?;

    let mut batch = ControlBatch::new();
    let joined = {
      let mut state = lock(&self.state);
      MeshMaintainer::new(&self.config, &*self.scoring, &*self.transport)
        .join(&mut state, topic, &mut batch, Instant::now())
    };
    batch.flush(&*self.transport);
    info!("joined {topic} with {} mesh peer(s)", joined.len());

    let observers = Arc::clone(&self.observers);
    let handle = tokio::spawn(async move {
      while let Some(message) = rx.recv().await {
        observers.dispatch(&message.topic, &message.data).await;
      }
    });

    inbound.insert(topic.to_owned(), handle);
    Ok(())
  }

  /// Leaves the mesh of a pubsub topic, every mesh peer gets a PRUNE.
  /// Unsubscribing from a topic we are not subscribed to is a no-op.
  pub fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
    let handle = match lock(&self.inbound).remove(topic) {
      Some(handle) => handle,
      None => return Ok(()),
    };
    handle.abort();

    let mut batch = ControlBatch::new();
    let left = {
      let mut state = lock(&self.state);
      MeshMaintainer::new(&self.config, &*self.scoring, &*self.transport)
        .leave(&mut state, topic, &mut batch, Instant::now())
    };
    batch.flush(&*self.transport);
    info!("left {topic}, pruned {} mesh peer(s)", left.len());

    self.transport.unsubscribe(topic)
  }

  /// Encodes a message and publishes it on the configured pubsub topic.
  ///
  /// Never fails outright, problems are reported in the result.
  pub async fn send(
    &self,
    encoder: &dyn Encoder,
    message: &Message,
  ) -> SendResult {
    let topic = &self.config.pubsub_topic;

    let bytes = match encoder.encode(message).await {
      Some(bytes) if !bytes.is_empty() => bytes,
      _ => {
        debug!("nothing to send for {}", encoder.content_topic());
        return SendResult::failed(SendFailure::EncodeFailed);
      }
    };

    if bytes.len() > self.config.max_message_size {
      return SendResult::failed(SendFailure::SizeTooBig {
        size: bytes.len(),
        limit: self.config.max_message_size,
      });
    }

    {
      let mut state = lock(&self.state);
      if !state.is_joined(topic) {
        FanoutMaintainer::new(&self.config, &*self.scoring, &*self.transport)
          .on_publish(&mut state, topic, Instant::now());
      }
    }

    match self.transport.publish(topic, bytes).await {
      Ok(recipients) => SendResult {
        recipients,
        failure: None,
      },
      Err(e) => {
        warn!("Failed to publish on {topic}: {e}");
        SendResult::failed(SendFailure::PublishFailed(e.to_string()))
      }
    }
  }

  /// Registers a callback for messages on the decoder's content topic.
  pub fn add_observer<D, F>(&self, decoder: D, callback: F) -> Unsubscribe
  where
    D: Decoder + 'static,
    F: Fn(D::Message) + Send + Sync + 'static,
  {
    debug!("adding observer for {}", decoder.content_topic());
    self.observers.add(decoder, callback)
  }

  /// Routes one inbound message to its observers, returns how many
  /// of them consumed it.
  pub async fn handle_message(
    &self,
    pubsub_topic: &str,
    bytes: &[u8],
  ) -> usize {
    self.observers.dispatch(pubsub_topic, bytes).await
  }

  /// Mesh peers of `topic`, or of the configured pubsub topic.
  pub fn get_mesh_peers(&self, topic: Option<&str>) -> Vec<PeerId> {
    let topic = topic.unwrap_or(self.config.pubsub_topic.as_str());
    lock(&self.state).mesh_peers(topic)
  }

  /// Resolves once the mesh of `topic`, or of the configured pubsub
  /// topic, has at least one peer. The mesh is checked again after every
  /// heartbeat tick, so this never resolves if no heartbeat is running
  /// and the mesh is empty.
  pub async fn wait_for_peers(&self, topic: Option<&str>) {
    let mut ticks = self.ticks.clone();
    while self.get_mesh_peers(topic).is_empty() {
      // the router owns a sender, the channel outlives this call
      if ticks.changed().await.is_err() {
        return;
      }
    }
  }

  pub fn get_fanout_peers(&self, topic: &str) -> Vec<PeerId> {
    lock(&self.state).fanout_peers(topic)
  }

  /// Content topics that have at least one observer.
  pub fn active_subscriptions(&self) -> Vec<String> {
    self.observers.content_topics()
  }

  /// Pubsub topics we are subscribed to.
  pub fn subscribed_topics(&self) -> Vec<String> {
    lock(&self.inbound).keys().cloned().collect()
  }

  pub fn heartbeat(&self) -> Heartbeat {
    Heartbeat::new(
      Arc::clone(&self.config),
      Arc::clone(&self.state),
      Arc::clone(&self.scoring),
      Arc::clone(&self.transport),
      Arc::clone(&self.notifier),
    )
  }

  /// Starts periodic mesh maintenance. The heartbeat stops when the
  /// returned scheduler is stopped or dropped.
  pub fn start_heartbeat(&self) -> HeartbeatScheduler {
    HeartbeatScheduler::start(self.heartbeat(), &self.config.degree)
  }
}

impl Drop for RelayRouter {
  fn drop(&mut self) {
    for (_, handle) in lock(&self.inbound).drain() {
      handle.abort();
    }
  }
}
