use {libp2p::PeerId, thiserror::Error};

/// Errors associated with loading and validating relay configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("Mesh degree bounds violated: Dlo={d_lo} <= D={d} <= Dhi={d_hi}")]
  DegreeBounds { d: usize, d_lo: usize, d_hi: usize },

  #[error("Dscore={d_score} must not exceed D={d}")]
  ScoreDegree { d: usize, d_score: usize },

  #[error("Dout={d_out} must be below Dlo={d_lo} and at most D/2 (D={d})")]
  OutboundDegree { d: usize, d_lo: usize, d_out: usize },

  #[error("OpportunisticGraftTicks must be greater than zero")]
  ZeroGraftTicks,

  #[error("HeartbeatInterval must be greater than zero")]
  ZeroHeartbeatInterval,

  #[error("Invalid peer id: {0}")]
  InvalidPeerId(String),

  #[error("Invalid config path: {0}")]
  Path(String),

  #[error("Malformed config file: {0}")]
  Json(#[from] serde_json::Error),

  #[error("IO Error: {0}")]
  Io(#[from] std::io::Error),
}

/// Errors reported by the external pubsub transport.
#[derive(Debug, Error)]
pub enum TransportError {
  #[error("Peer {0} is not reachable")]
  PeerUnreachable(PeerId),

  #[error("Attempt to use an unsubscribed topic {0}")]
  TopicNotSubscribed(String),

  #[error("Transport channel closed")]
  Closed,

  #[error("IO Error: {0}")]
  Io(#[from] std::io::Error),
}

/// Errors associated with converting a wire payload into
/// an application message.
#[derive(Debug, Error)]
pub enum DecodeError {
  #[error("Malformed protobuf: {0}")]
  Protobuf(#[from] prost::DecodeError),

  #[error("Message has no content topic")]
  MissingContentTopic,

  #[error("Expected content topic {expected}, got {actual}")]
  ContentTopicMismatch { expected: String, actual: String },

  #[error("Unsupported message version {0}")]
  UnsupportedVersion(u32),

  #[error("Decoder failure: {0}")]
  Other(String),
}

/// Reasons why `send` did not hand a message to the transport,
/// or why the transport refused it. These are reported back inside
/// the send result and never raised to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendFailure {
  #[error("Failed to encode message")]
  EncodeFailed,

  #[error("Encoded message of {size} bytes exceeds the {limit} bytes limit")]
  SizeTooBig { size: usize, limit: usize },

  #[error("Publish failed: {0}")]
  PublishFailed(String),
}
