use {
  super::{
    error::DecodeError,
    message::{content_topic_of, Decoder},
  },
  async_trait::async_trait,
  dashmap::DashMap,
  futures::{future::join_all, FutureExt},
  std::{
    panic::AssertUnwindSafe,
    sync::{
      atomic::{AtomicU64, Ordering},
      Arc,
      Weak,
    },
  },
  tracing::{error, trace, warn},
};

/// Identifies a single observer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

/// A decoder paired with the callback that consumes its output, with
/// the decoded message type erased so observers of different decoders
/// can share one registry.
#[async_trait]
trait Deliver: Send + Sync {
  async fn deliver(
    &self,
    pubsub_topic: &str,
    bytes: &[u8],
  ) -> Result<(), DecodeError>;
}

struct Observer<D, F> {
  decoder: D,
  callback: F,
}

#[async_trait]
impl<D, F> Deliver for Observer<D, F>
where
  D: Decoder,
  F: Fn(D::Message) + Send + Sync,
{
  async fn deliver(
    &self,
    pubsub_topic: &str,
    bytes: &[u8],
  ) -> Result<(), DecodeError> {
    let message = self.decoder.decode(pubsub_topic, bytes).await?;
    (self.callback)(message);
    Ok(())
  }
}

/// Content topic keyed observers of inbound messages.
#[derive(Default)]
pub struct ObserverRegistry {
  next_id: AtomicU64,
  observers: DashMap<String, Vec<(RegistrationId, Arc<dyn Deliver>)>>,
}

impl ObserverRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers `callback` for messages on the decoder's content topic.
  /// The returned handle removes exactly this registration.
  pub fn add<D, F>(self: &Arc<Self>, decoder: D, callback: F) -> Unsubscribe
  where
    D: Decoder + 'static,
    F: Fn(D::Message) + Send + Sync + 'static,
  {
    let id = RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed));
    let content_topic = decoder.content_topic().to_owned();
    let observer: Arc<dyn Deliver> = Arc::new(Observer { decoder, callback });

    self
      .observers
      .entry(content_topic.clone())
      .or_default()
      .push((id, observer));

    Unsubscribe {
      registry: Arc::downgrade(self),
      content_topic,
      id,
    }
  }

  /// Removes one registration, returns false if it was already gone.
  pub fn remove(&self, content_topic: &str, id: RegistrationId) -> bool {
    let removed = match self.observers.get_mut(content_topic) {
      Some(mut observers) => {
        let before = observers.len();
        observers.retain(|(i, _)| *i != id);
        observers.len() != before
      }
      None => false,
    };

    self
      .observers
      .remove_if(content_topic, |_, observers| observers.is_empty());
    removed
  }

  /// Content topics with at least one observer.
  pub fn content_topics(&self) -> Vec<String> {
    self
      .observers
      .iter()
      .filter(|e| !e.value().is_empty())
      .map(|e| e.key().clone())
      .collect()
  }

  pub fn is_empty(&self) -> bool {
    self.observers.is_empty()
  }

  /// Hands an inbound message to every observer of its content topic.
  ///
  /// All observers decode and consume the message concurrently. One
  /// observer failing to decode, or panicking, does not affect the
  /// others. Returns the number of observers that consumed the message.
  pub async fn dispatch(&self, pubsub_topic: &str, bytes: &[u8]) -> usize {
    let content_topic = match content_topic_of(bytes) {
      Ok(topic) => topic,
      Err(e) => {
        warn!("dropping message on {pubsub_topic}: {e}");
        return 0;
      }
    };

    // observers may be added or removed while decoders are running,
    // work on a snapshot and don't hold the map shard across awaits.
    let observers: Vec<Arc<dyn Deliver>> =
      match self.observers.get(&content_topic) {
        Some(entry) => entry.iter().map(|(_, o)| Arc::clone(o)).collect(),
        None => {
          trace!("no observers for {content_topic} on {pubsub_topic}");
          return 0;
        }
      };

    let results = join_all(observers.iter().map(|observer| {
      AssertUnwindSafe(observer.deliver(pubsub_topic, bytes)).catch_unwind()
    }))
    .await;

    results
      .into_iter()
      .filter(|result| match result {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
          error!("Failed to decode message on {content_topic}: {e}");
          false
        }
        Err(_) => {
          error!("Observer of {content_topic} panicked");
          false
        }
      })
      .count()
  }
}

/// Handle returned when registering an observer.
///
/// Dropping the handle keeps the observer registered.
#[derive(Debug)]
pub struct Unsubscribe {
  registry: Weak<ObserverRegistry>,
  content_topic: String,
  id: RegistrationId,
}

impl Unsubscribe {
  pub fn id(&self) -> RegistrationId {
    self.id
  }

  pub fn content_topic(&self) -> &str {
    &self.content_topic
  }

  pub fn unsubscribe(self) -> bool {
    match self.registry.upgrade() {
      Some(registry) => registry.remove(&self.content_topic, self.id),
      None => false,
    }
  }
}
