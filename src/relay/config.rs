use {
  super::error::ConfigError,
  libp2p::PeerId,
  serde::{Deserialize, Serialize},
  std::{collections::HashSet, path::Path, str::FromStr, time::Duration},
};

/// The default pubsub topic on which all Waku relay nodes meet.
pub const DEFAULT_PUBSUB_TOPIC: &str = "/waku/2/default-waku/proto";

/// Mesh degree and heartbeat timing parameters.
///
/// Field names on the wire/config file are the ones used by the
/// GossipSub literature (`D`, `Dlo`, `Dhi`, ...), so a config file
/// reads the same as the protocol documentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegreeParameters {
  /// Target number of peers in a topic mesh.
  #[serde(rename = "D")]
  pub d: usize,

  /// Below this many mesh peers the heartbeat grafts back up to `D`.
  #[serde(rename = "Dlo")]
  pub d_lo: usize,

  /// Above this many mesh peers the heartbeat prunes down to `D`.
  #[serde(rename = "Dhi")]
  pub d_hi: usize,

  /// How many of the best scoring peers survive a prune unconditionally.
  #[serde(rename = "Dscore")]
  pub d_score: usize,

  /// Minimum number of outbound-connection peers kept in each mesh.
  #[serde(rename = "Dout")]
  pub d_out: usize,

  /// Opportunistic grafting runs once every this many heartbeat ticks.
  #[serde(rename = "OpportunisticGraftTicks")]
  pub opportunistic_graft_ticks: u64,

  /// Upper bound on peers grafted by one opportunistic round.
  #[serde(rename = "OpportunisticGraftPeers")]
  pub opportunistic_graft_peers: usize,

  /// How long a fanout set survives without us publishing to its topic.
  #[serde(rename = "FanoutTTL", with = "humantime_serde")]
  pub fanout_ttl: Duration,

  #[serde(rename = "HeartbeatInterval", with = "humantime_serde")]
  pub heartbeat_interval: Duration,

  #[serde(rename = "HeartbeatInitialDelay", with = "humantime_serde")]
  pub heartbeat_initial_delay: Duration,
}

impl DegreeParameters {
  /// Rejects parameter combinations under which the heartbeat
  /// would oscillate or never converge.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if !(self.d_lo <= self.d && self.d <= self.d_hi) {
      return Err(ConfigError::DegreeBounds {
        d: self.d,
        d_lo: self.d_lo,
        d_hi: self.d_hi,
      });
    }

    if self.d_score > self.d {
      return Err(ConfigError::ScoreDegree {
        d: self.d,
        d_score: self.d_score,
      });
    }

    // outbound peers must fit under the low watermark and must not
    // crowd out more than half of the mesh.
    if self.d_out >= self.d_lo || self.d_out > self.d / 2 {
      return Err(ConfigError::OutboundDegree {
        d: self.d,
        d_lo: self.d_lo,
        d_out: self.d_out,
      });
    }

    if self.opportunistic_graft_ticks == 0 {
      return Err(ConfigError::ZeroGraftTicks);
    }

    if self.heartbeat_interval.is_zero() {
      return Err(ConfigError::ZeroHeartbeatInterval);
    }

    Ok(())
  }
}

impl Default for DegreeParameters {
  fn default() -> Self {
    Self {
      d: 6,
      d_lo: 4,
      d_hi: 12,
      d_score: 4,
      d_out: 2,
      opportunistic_graft_ticks: 60,
      opportunistic_graft_peers: 2,
      fanout_ttl: Duration::from_secs(60),
      heartbeat_interval: Duration::from_secs(1),
      heartbeat_initial_delay: Duration::from_millis(100),
    }
  }
}

/// Score levels that gate mesh and fanout membership. The score
/// itself is computed outside of this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreThresholds {
  /// Peers below this score receive no IHAVE gossip.
  pub gossip_threshold: f64,

  /// Peers below this score are not used for fanout publishing.
  pub publish_threshold: f64,

  /// When the median mesh score drops below this value the
  /// heartbeat grafts a few better scoring peers.
  pub opportunistic_graft_threshold: f64,
}

impl Default for ScoreThresholds {
  fn default() -> Self {
    Self {
      gossip_threshold: -10.0,
      publish_threshold: -50.0,
      opportunistic_graft_threshold: 20.0,
    }
  }
}

/// Configuration of a relay node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
  pub degree: DegreeParameters,

  pub thresholds: ScoreThresholds,

  /// The pubsub topic used by `send` and by `get_mesh_peers`
  /// when no explicit topic is given.
  pub pubsub_topic: String,

  /// How long a pruned peer must wait before it can be grafted
  /// again into the same topic mesh.
  #[serde(with = "humantime_serde")]
  pub prune_backoff: Duration,

  /// Number of alternative peers handed to a pruned peer when
  /// peer exchange is enabled.
  pub prune_peers: usize,

  /// Enables peer exchange on PRUNE.
  pub do_px: bool,

  /// Largest encoded message `send` will hand to the transport.
  pub max_message_size: usize,

  /// Base58 ids of peers that are always treated as connected
  /// and are never part of mesh accounting.
  pub direct_peers: Vec<String>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      degree: DegreeParameters::default(),
      thresholds: ScoreThresholds::default(),
      pubsub_topic: DEFAULT_PUBSUB_TOPIC.to_owned(),
      prune_backoff: Duration::from_secs(60),
      prune_peers: 16,
      do_px: false,
      max_message_size: 1024 * 1024, // 1 MiB
      direct_peers: vec![],
    }
  }
}

impl Config {
  /// Reads a JSON config file. Missing fields take their default values.
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref().to_string_lossy().to_string();
    let path = shellexpand::full(&path)
      .map_err(|e| ConfigError::Path(e.to_string()))?
      .to_string();
    let json = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&json)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    self.degree.validate()?;
    self.direct_peers()?;
    Ok(())
  }

  pub fn direct_peers(&self) -> Result<HashSet<PeerId>, ConfigError> {
    self
      .direct_peers
      .iter()
      .map(|p| {
        PeerId::from_str(p).map_err(|_| ConfigError::InvalidPeerId(p.clone()))
      })
      .collect()
  }
}
