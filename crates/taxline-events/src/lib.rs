#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/taxline/taxline/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Event-driven cache invalidation.
//!
//! - [`DecoderChain`] - Turns raw message values into [`BusinessEvent`]s
//! - [`SchemaRegistry`] - Writer schemas by id for Avro payloads
//! - [`EventSource`] - Subscription the consume loop reads from
//! - [`CacheInvalidator`] - The consume loop and its lifecycle

/// Payload decoders.
pub mod decode;
/// Consume loop and lifecycle.
pub mod invalidator;
/// Schema registry client.
pub mod registry;
/// Embedded Avro schema.
pub mod schema;
/// Message sources.
pub mod source;

/// Kafka source.
#[cfg(feature = "kafka")]
pub mod kafka;

pub use decode::{AvroDecoder, BusinessEvent, DecodeFailure, DecoderChain, JsonDecoder, PayloadDecoder};
pub use invalidator::{CacheInvalidator, InvalidatorState, StopOutcome};
pub use registry::SchemaRegistry;
pub use source::{ChannelEventSource, EventSource, SourceError, SourceMessage};

#[cfg(feature = "kafka")]
pub use kafka::{KafkaEventSource, KafkaSettings};
