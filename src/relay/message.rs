use {
  super::error::DecodeError,
  async_trait::async_trait,
  prost::Message as _,
  std::time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Wire representation of a relayed message.
#[derive(Clone, PartialEq, prost::Message)]
pub struct WakuMessage {
  #[prost(bytes = "vec", tag = "1")]
  pub payload: Vec<u8>,

  #[prost(string, tag = "2")]
  pub content_topic: String,

  #[prost(uint32, optional, tag = "3")]
  pub version: Option<u32>,

  /// Nanoseconds since the unix epoch.
  #[prost(sint64, optional, tag = "10")]
  pub timestamp: Option<i64>,

  #[prost(bytes = "vec", optional, tag = "11")]
  pub meta: Option<Vec<u8>>,

  #[prost(bool, optional, tag = "31")]
  pub ephemeral: Option<bool>,
}

/// Cheap partial view of a [`WakuMessage`], only the content topic is
/// parsed, everything else is skipped by the protobuf decoder.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TopicOnlyMessage {
  #[prost(string, tag = "2")]
  pub content_topic: String,
}

/// Reads the content topic out of an encoded message.
pub fn content_topic_of(bytes: &[u8]) -> Result<String, DecodeError> {
  let envelope = TopicOnlyMessage::decode(bytes)?;
  if envelope.content_topic.is_empty() {
    return Err(DecodeError::MissingContentTopic);
  }
  Ok(envelope.content_topic)
}

/// A message as produced by the application, before encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
  pub payload: Vec<u8>,

  /// Defaults to the time of encoding when not set.
  pub timestamp: Option<SystemTime>,

  pub meta: Option<Vec<u8>>,

  /// Ephemeral messages are not meant to be stored by peers.
  pub ephemeral: bool,
}

impl Message {
  pub fn new(payload: impl Into<Vec<u8>>) -> Self {
    Self {
      payload: payload.into(),
      ..Default::default()
    }
  }
}

/// A message received from the network and accepted by a decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
  pub pubsub_topic: String,
  pub content_topic: String,
  pub payload: Vec<u8>,
  pub timestamp: Option<SystemTime>,
  pub version: u32,
  pub meta: Option<Vec<u8>>,
  pub ephemeral: bool,
}

/// Turns application messages into wire bytes for one content topic.
#[async_trait]
pub trait Encoder: Send + Sync {
  fn content_topic(&self) -> &str;

  /// Returns `None` when the message cannot be encoded, in which case
  /// nothing is sent.
  async fn encode(&self, message: &Message) -> Option<Vec<u8>>;
}

/// Turns wire bytes of one content topic back into messages.
#[async_trait]
pub trait Decoder: Send + Sync {
  type Message: Send + 'static;

  fn content_topic(&self) -> &str;

  async fn decode(
    &self,
    pubsub_topic: &str,
    bytes: &[u8],
  ) -> Result<Self::Message, DecodeError>;
}

fn to_nanos(time: SystemTime) -> Option<i64> {
  time
    .duration_since(UNIX_EPOCH)
    .ok()
    .and_then(|d| i64::try_from(d.as_nanos()).ok())
}

fn from_nanos(nanos: i64) -> Option<SystemTime> {
  u64::try_from(nanos)
    .ok()
    .map(|n| UNIX_EPOCH + Duration::from_nanos(n))
}

/// Version 0 encoder, the payload travels unencrypted.
#[derive(Debug, Clone)]
pub struct PlainEncoder {
  content_topic: String,
}

impl PlainEncoder {
  pub fn new(content_topic: impl Into<String>) -> Self {
    Self {
      content_topic: content_topic.into(),
    }
  }
}

#[async_trait]
impl Encoder for PlainEncoder {
  fn content_topic(&self) -> &str {
    &self.content_topic
  }

  async fn encode(&self, message: &Message) -> Option<Vec<u8>> {
    if self.content_topic.is_empty() {
      return None;
    }

    let timestamp = message.timestamp.unwrap_or_else(SystemTime::now);
    let wire = WakuMessage {
      payload: message.payload.clone(),
      content_topic: self.content_topic.clone(),
      version: Some(0),
      timestamp: to_nanos(timestamp),
      meta: message.meta.clone(),
      ephemeral: Some(message.ephemeral),
    };

    Some(wire.encode_to_vec())
  }
}

/// Version 0 decoder for a single content topic.
#[derive(Debug, Clone)]
pub struct PlainDecoder {
  content_topic: String,
}

impl PlainDecoder {
  pub fn new(content_topic: impl Into<String>) -> Self {
    Self {
      content_topic: content_topic.into(),
    }
  }
}

#[async_trait]
impl Decoder for PlainDecoder {
  type Message = DecodedMessage;

  fn content_topic(&self) -> &str {
    &self.content_topic
  }

  async fn decode(
    &self,
    pubsub_topic: &str,
    bytes: &[u8],
  ) -> Result<DecodedMessage, DecodeError> {
    let wire = WakuMessage::decode(bytes)?;

    let version = wire.version.unwrap_or(0);
    if version != 0 {
      return Err(DecodeError::UnsupportedVersion(version));
    }

    if wire.content_topic.is_empty() {
      return Err(DecodeError::MissingContentTopic);
    }

    if wire.content_topic != self.content_topic {
      return Err(DecodeError::ContentTopicMismatch {
        expected: self.content_topic.clone(),
        actual: wire.content_topic,
      });
    }

    Ok(DecodedMessage {
      pubsub_topic: pubsub_topic.to_owned(),
      content_topic: wire.content_topic,
      payload: wire.payload,
      timestamp: wire.timestamp.and_then(from_nanos),
      version,
      meta: wire.meta,
      ephemeral: wire.ephemeral.unwrap_or(false),
    })
  }
}

#[cfg(test)]
mod tests {
  use {
    super::*,
    crate::test::utils::TOPIC,
    prost::Message as _,
  };

  #[tokio::test]
  async fn plain_codec_preserves_fields() {
    let encoder = PlainEncoder::new("/app/1/chat/proto");
    let decoder = PlainDecoder::new("/app/1/chat/proto");
    let sent = Message {
      payload: b"hello".to_vec(),
      timestamp: Some(UNIX_EPOCH + Duration::from_millis(1_650_000_000_123)),
      meta: Some(vec![1, 2, 3]),
      ephemeral: true,
    };

    let bytes = encoder.encode(&sent).await.unwrap();
    assert_eq!(content_topic_of(&bytes).unwrap(), "/app/1/chat/proto");

    let received = decoder.decode(TOPIC, &bytes).await.unwrap();
    assert_eq!(received.pubsub_topic, TOPIC);
    assert_eq!(received.payload, b"hello");
    assert_eq!(received.timestamp, sent.timestamp);
    assert_eq!(received.meta, Some(vec![1, 2, 3]));
    assert!(received.ephemeral);
    assert_eq!(received.version, 0);
  }

  #[tokio::test]
  async fn empty_content_topic_encodes_nothing() {
    let encoder = PlainEncoder::new("");
    assert_eq!(encoder.encode(&Message::new("x")).await, None);
  }

  #[tokio::test]
  async fn decoder_rejects_foreign_messages() {
    let decoder = PlainDecoder::new("/app/1/chat/proto");

    let other = PlainEncoder::new("/app/1/other/proto")
      .encode(&Message::new("x"))
      .await
      .unwrap();
    assert!(matches!(
      decoder.decode(TOPIC, &other).await,
      Err(DecodeError::ContentTopicMismatch { .. })
    ));

    let versioned = WakuMessage {
      content_topic: "/app/1/chat/proto".to_owned(),
      version: Some(1),
      ..Default::default()
    }
    .encode_to_vec();
    assert!(matches!(
      decoder.decode(TOPIC, &versioned).await,
      Err(DecodeError::UnsupportedVersion(1))
    ));

    assert!(matches!(
      decoder.decode(TOPIC, &[0xff, 0xff, 0xff]).await,
      Err(DecodeError::Protobuf(_))
    ));
  }

  #[test]
  fn topic_only_view_requires_content_topic() {
    let bytes = WakuMessage {
      payload: vec![1],
      ..Default::default()
    }
    .encode_to_vec();
    assert!(matches!(
      content_topic_of(&bytes),
      Err(DecodeError::MissingContentTopic)
    ));
  }
}
