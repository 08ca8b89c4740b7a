use {
  libp2p::PeerId,
  std::{
    collections::HashMap,
    time::{Duration, Instant},
  },
};

/// Tracks when recently pruned peers become eligible for grafting again.
///
/// Each topic keeps its own expiry per peer. A peer is backed off for a
/// topic for as long as `now` has not reached its expiry; the entry is
/// then garbage collected by [`Backoff::clear_expired`].
#[derive(Debug, Default)]
pub struct Backoff {
  topics: HashMap<String, HashMap<PeerId, Instant>>,
}

impl Backoff {
  pub fn new() -> Self {
    Self::default()
  }

  /// Records a backoff for `peer` on `topic` ending at `now + duration`.
  /// An existing longer backoff is never shortened.
  pub fn add(
    &mut self,
    topic: &str,
    peer: PeerId,
    now: Instant,
    duration: Duration,
  ) {
    let expiry = now + duration;
    let entry = self
      .topics
      .entry(topic.to_owned())
      .or_default()
      .entry(peer)
      .or_insert(expiry);
    if *entry < expiry {
      *entry = expiry;
    }
  }

  pub fn is_backed_off(
    &self,
    topic: &str,
    peer: &PeerId,
    now: Instant,
  ) -> bool {
    self
      .topics
      .get(topic)
      .and_then(|peers| peers.get(peer))
      .map(|expiry| now < *expiry)
      .unwrap_or(false)
  }

  /// Time left until `peer` can be grafted again on `topic`.
  pub fn remaining(
    &self,
    topic: &str,
    peer: &PeerId,
    now: Instant,
  ) -> Option<Duration> {
    self
      .topics
      .get(topic)
      .and_then(|peers| peers.get(peer))
      .and_then(|expiry| expiry.checked_duration_since(now))
      .filter(|d| !d.is_zero())
  }

  /// Drops all backoff records that expired at or before `now`.
  pub fn clear_expired(&mut self, now: Instant) {
    self.topics.retain(|_, peers| {
      peers.retain(|_, expiry| *expiry > now);
      !peers.is_empty()
    });
  }

  pub fn len(&self) -> usize {
    self.topics.values().map(HashMap::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.topics.is_empty()
  }
}
