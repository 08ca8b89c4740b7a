use {
  indexmap::IndexSet,
  libp2p::PeerId,
  rand::{seq::SliceRandom, RngCore, SeedableRng},
  rand_chacha::ChaCha20Rng,
};

/// Random, filtered sampling of peers.
///
/// Every mesh and fanout decision that picks "some peers" goes through
/// here, so the source of randomness can be swapped for a seeded one
/// and graft/prune outcomes become reproducible.
pub struct PeerSelector {
  rng: Box<dyn RngCore + Send>,
}

impl PeerSelector {
  pub fn new(rng: impl RngCore + Send + 'static) -> Self {
    Self { rng: Box::new(rng) }
  }

  pub fn from_entropy() -> Self {
    Self::new(ChaCha20Rng::from_entropy())
  }

  pub fn seeded(seed: u64) -> Self {
    Self::new(ChaCha20Rng::seed_from_u64(seed))
  }

  /// Picks at most `count` distinct peers out of `peers` that satisfy
  /// `filter`, in random order. A `count` of zero means no limit, the
  /// whole filtered set is returned (still shuffled).
  pub fn select<F>(
    &mut self,
    peers: impl IntoIterator<Item = PeerId>,
    count: usize,
    mut filter: F,
  ) -> IndexSet<PeerId>
  where
    F: FnMut(&PeerId) -> bool,
  {
    let mut candidates: Vec<_> = peers
      .into_iter()
      .collect::<IndexSet<_>>()
      .into_iter()
      .filter(|p| filter(p))
      .collect();

    // an unbiased Fisher-Yates shuffle, list position must
    // not influence the odds of being picked.
    candidates.shuffle(&mut self.rng);

    if count > 0 {
      candidates.truncate(count);
    }

    candidates.into_iter().collect()
  }

  /// Shuffles a slice of peers in place.
  pub fn shuffle(&mut self, peers: &mut [PeerId]) {
    peers.shuffle(&mut self.rng);
  }
}

impl Default for PeerSelector {
  fn default() -> Self {
    Self::from_entropy()
  }
}

impl std::fmt::Debug for PeerSelector {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_tuple("PeerSelector").field(&"[rng]").finish()
  }
}
