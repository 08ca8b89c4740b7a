//! Score driven GossipSub mesh maintenance for a Waku style relay.
//!
//! Every subscribed pubsub topic keeps a mesh of peers that receive full
//! messages from us. A periodic heartbeat keeps each mesh between the
//! `Dlo` and `Dhi` watermarks, biased towards well scoring peers while
//! keeping a minimum of peers whose connections we dialed ourselves, so
//! an attacker that floods us with inbound connections cannot take over
//! the mesh. Topics we publish to without subscribing get a short lived
//! fanout set instead.
//!
//! Inbound messages are routed by their content topic to observers, each
//! observer bringing its own decoder.
//!
//! # Usage Examples
//!
//! ```ignore
//! let router = RelayRouter::new(Config::default(), transport, scoring)?;
//! router.subscribe(DEFAULT_PUBSUB_TOPIC)?;
//! let _heartbeat = router.start_heartbeat();
//! router.wait_for_peers(None).await;
//!
//! router.add_observer(PlainDecoder::new("/app/1/chat/proto"), |msg| {
//!   println!("got a message: {:?}", msg.payload);
//! });
//!
//! let result = router
//!   .send(&PlainEncoder::new("/app/1/chat/proto"), &Message::new("hi"))
//!   .await;
//! ```

mod backoff;
mod control;
mod error;
mod fanout;
mod heartbeat;
mod mesh;
mod observer;
mod router;

pub(crate) mod selector;
pub(crate) mod state;

pub mod config;
pub mod memory;
pub mod message;
pub mod transport;

pub use {
  config::{Config, DegreeParameters, ScoreThresholds, DEFAULT_PUBSUB_TOPIC},
  control::FlushSummary,
  error::{ConfigError, DecodeError, SendFailure, TransportError},
  heartbeat::{Heartbeat, HeartbeatScheduler, TickSummary},
  message::{
    DecodedMessage,
    Decoder,
    Encoder,
    Message,
    PlainDecoder,
    PlainEncoder,
  },
  observer::{RegistrationId, Unsubscribe},
  router::{RelayRouter, SendResult},
  selector::PeerSelector,
  transport::{InboundMessage, PeerControl, PeerScoring, Prune, PubsubTransport},
};
