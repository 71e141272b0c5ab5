//! Payload decoding for business update events.
//!
//! Decoders are tried in order by a [`DecoderChain`]; the first one that succeeds
//! wins. When every decoder fails the message is dropped by the caller.

use std::sync::Arc;

use apache_avro::Schema;
use apache_avro::types::Value as AvroValue;
use async_trait::async_trait;
use taxline_core::{DataError, Result, Rut};
use tracing::{debug, trace, warn};

use crate::registry::SchemaRegistry;
use crate::schema::BUSINESS_UPDATE_SCHEMA;

/// Confluent wire format: magic byte followed by a 4-byte big-endian schema id.
const CONFLUENT_MAGIC: u8 = 0;
const CONFLUENT_HEADER_LEN: usize = 5;

/// The fields of a business update the invalidator cares about.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BusinessEvent {
    /// Numeric business id, when the payload carries one.
    pub business_id: Option<i64>,
    /// What happened to the business (e.g. `"update"`).
    pub action_type: Option<String>,
    /// Business identifier whose cache must be refreshed. Empty values are `None`.
    pub rut: Option<Rut>,
}

impl BusinessEvent {
    fn with_rut(rut: Option<String>) -> Self {
        Self {
            rut: rut.filter(|r| !r.is_empty()).map(Rut::new),
            ..Default::default()
        }
    }
}

/// Why a single decoder rejected a payload.
#[derive(Debug, thiserror::Error)]
pub enum DecodeFailure {
    /// The payload does not start with the Confluent header.
    #[error("not Confluent-framed ({len} bytes, first byte {first:?})")]
    NotFramed {
        /// Payload length.
        len: usize,
        /// First byte, if any.
        first: Option<u8>,
    },
    /// The writer schema for the frame's id could not be resolved.
    #[error("schema {id}: {reason}")]
    Registry {
        /// Schema id from the frame.
        id: u32,
        /// Registry error.
        reason: String,
    },
    /// Avro datum decoding failed.
    #[error("Avro: {0}")]
    Avro(String),
    /// JSON parsing failed.
    #[error("JSON: {0}")]
    Json(String),
    /// The payload decoded to something other than a record/object.
    #[error("expected a record, got {0}")]
    NotARecord(String),
}

/// One payload decoding strategy.
#[async_trait]
pub trait PayloadDecoder: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Decode a raw message value.
    async fn decode(&self, payload: &[u8]) -> std::result::Result<BusinessEvent, DecodeFailure>;
}

/// Avro decoder for Confluent-framed values.
///
/// With a [`SchemaRegistry`], the frame's schema id selects the writer schema and the
/// datum is resolved into the embedded business update schema, so fields added or
/// reordered by producers are tolerated. Without a registry, or while the registry is
/// unreachable, the embedded schema is used as the writer schema.
#[derive(Debug, Clone)]
pub struct AvroDecoder {
    reader: Arc<Schema>,
    registry: Option<Arc<SchemaRegistry>>,
}

impl AvroDecoder {
    /// Create a decoder using the embedded business update schema.
    ///
    /// # Errors
    /// Returns [`DataError::Configuration`] if the schema does not parse.
    pub fn new() -> Result<Self> {
        Self::with_schema(BUSINESS_UPDATE_SCHEMA)
    }

    /// Create a decoder for a custom writer schema.
    ///
    /// # Errors
    /// Returns [`DataError::Configuration`] if the schema does not parse.
    pub fn with_schema(schema: &str) -> Result<Self> {
        let schema = Schema::parse_str(schema)
            .map_err(|e| DataError::Configuration(format!("invalid Avro schema: {e}")))?;
        Ok(Self {
            reader: Arc::new(schema),
            registry: None,
        })
    }

    /// Resolve writer schemas through `registry`.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<SchemaRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Writer schema for `id`, or `None` to decode with the reader schema alone.
    async fn writer_schema(&self, id: u32) -> std::result::Result<Option<Arc<Schema>>, DecodeFailure> {
        let Some(registry) = &self.registry else {
            return Ok(None);
        };
        match registry.schema(id).await {
            Ok(schema) => Ok(Some(schema)),
            Err(e @ DataError::Transport(_)) => {
                warn!(schema_id = id, error = %e, "Schema registry unreachable; using embedded schema");
                Ok(None)
            }
            Err(e) => Err(DecodeFailure::Registry {
                id,
                reason: e.to_string(),
            }),
        }
    }
}

fn avro_string(value: &AvroValue) -> Option<String> {
    match value {
        AvroValue::String(s) | AvroValue::Enum(_, s) => Some(s.clone()),
        AvroValue::Union(_, inner) => avro_string(inner),
        _ => None,
    }
}

fn avro_long(value: &AvroValue) -> Option<i64> {
    match value {
        AvroValue::Int(i) => Some(i64::from(*i)),
        AvroValue::Long(l) => Some(*l),
        AvroValue::Union(_, inner) => avro_long(inner),
        _ => None,
    }
}

#[async_trait]
impl PayloadDecoder for AvroDecoder {
    fn name(&self) -> &'static str {
        "avro"
    }

    async fn decode(&self, payload: &[u8]) -> std::result::Result<BusinessEvent, DecodeFailure> {
        if payload.len() <= CONFLUENT_HEADER_LEN || payload[0] != CONFLUENT_MAGIC {
            return Err(DecodeFailure::NotFramed {
                len: payload.len(),
                first: payload.first().copied(),
            });
        }
        let schema_id = u32::from_be_bytes([payload[1], payload[2], payload[3], payload[4]]);
        trace!(schema_id, "Confluent frame");

        let writer = self.writer_schema(schema_id).await?;
        let mut body = &payload[CONFLUENT_HEADER_LEN..];
        let value = match writer {
            Some(writer) => apache_avro::from_avro_datum(&writer, &mut body, Some(&self.reader)),
            None => apache_avro::from_avro_datum(&self.reader, &mut body, None),
        }
        .map_err(|e| DecodeFailure::Avro(e.to_string()))?;

        let AvroValue::Record(fields) = value else {
            return Err(DecodeFailure::NotARecord(format!("{value:?}")));
        };

        let mut event = BusinessEvent::default();
        for (name, value) in &fields {
            match name.as_str() {
                "businessId" => event.business_id = avro_long(value),
                "actionType" => event.action_type = avro_string(value),
                "rut" => event.rut = BusinessEvent::with_rut(avro_string(value)).rut,
                _ => {}
            }
        }
        Ok(event)
    }
}

/// Decoder for UTF-8 JSON objects using the same field names as the Avro schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

#[async_trait]
impl PayloadDecoder for JsonDecoder {
    fn name(&self) -> &'static str {
        "json"
    }

    async fn decode(&self, payload: &[u8]) -> std::result::Result<BusinessEvent, DecodeFailure> {
        let value: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| DecodeFailure::Json(e.to_string()))?;

        let serde_json::Value::Object(object) = value else {
            return Err(DecodeFailure::NotARecord(value.to_string()));
        };

        let mut event = BusinessEvent::with_rut(
            object
                .get("rut")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
        );
        event.business_id = object.get("businessId").and_then(serde_json::Value::as_i64);
        event.action_type = object
            .get("actionType")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        Ok(event)
    }
}

/// Ordered list of decoders, tried until one succeeds.
pub struct DecoderChain {
    decoders: Vec<Box<dyn PayloadDecoder>>,
}

impl std::fmt::Debug for DecoderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.decoders.iter().map(|d| d.name()))
            .finish()
    }
}

impl DecoderChain {
    /// Create a chain from explicit decoders.
    #[must_use]
    pub fn new(decoders: Vec<Box<dyn PayloadDecoder>>) -> Self {
        Self { decoders }
    }

    /// Avro first, then JSON.
    ///
    /// # Errors
    /// Returns [`DataError::Configuration`] if the embedded schema does not parse.
    pub fn standard() -> Result<Self> {
        Ok(Self::new(vec![
            Box::new(AvroDecoder::new()?),
            Box::new(JsonDecoder),
        ]))
    }

    /// Avro with writer schemas from `registry`, then JSON.
    ///
    /// # Errors
    /// Returns [`DataError::Configuration`] if the embedded schema does not parse.
    pub fn with_registry(registry: Arc<SchemaRegistry>) -> Result<Self> {
        Ok(Self::new(vec![
            Box::new(AvroDecoder::new()?.with_registry(registry)),
            Box::new(JsonDecoder),
        ]))
    }

    /// Decode a payload with the first decoder that accepts it.
    ///
    /// # Errors
    /// Returns [`DataError::Decode`] listing every decoder's failure.
    pub async fn decode(&self, payload: &[u8]) -> Result<BusinessEvent> {
        let mut failures = Vec::with_capacity(self.decoders.len());
        for decoder in &self.decoders {
            match decoder.decode(payload).await {
                Ok(event) => {
                    debug!(decoder = decoder.name(), "Decoded event");
                    return Ok(event);
                }
                Err(e) => {
                    debug!(decoder = decoder.name(), error = %e, "Decoder rejected payload");
                    failures.push(format!("{}: {e}", decoder.name()));
                }
            }
        }
        Err(DataError::Decode(failures.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use serde_json::json;

    fn null_string() -> AvroValue {
        AvroValue::Union(1, Box::new(AvroValue::Null))
    }

    fn update_fields(rut: &str) -> Vec<(String, AvroValue)> {
        vec![
            ("businessId".into(), AvroValue::Int(42)),
            ("actionType".into(), AvroValue::String("update".into())),
            ("rut".into(), AvroValue::String(rut.into())),
            ("mobileDefaultChannel".into(), AvroValue::String("whatsapp".into())),
            (
                "name".into(),
                AvroValue::Union(0, Box::new(AvroValue::String("Comercial Uno".into()))),
            ),
            ("team".into(), null_string()),
            ("fantasyName".into(), null_string()),
            ("legalName".into(), null_string()),
            ("phone".into(), null_string()),
            ("email".into(), null_string()),
            ("address".into(), null_string()),
            ("commune".into(), null_string()),
            ("economicActivity".into(), null_string()),
            ("status".into(), AvroValue::Union(0, Box::new(AvroValue::Int(1)))),
            ("adminUserId".into(), null_string()),
            ("clientDocumentDayExpiration".into(), null_string()),
            ("providerDocumentDayExpiration".into(), null_string()),
            ("deletedAt".into(), null_string()),
            ("adminUser".into(), AvroValue::Union(0, Box::new(AvroValue::Null))),
            ("subscriptions".into(), AvroValue::Array(vec![])),
            ("users".into(), AvroValue::Array(vec![])),
            ("settings".into(), AvroValue::Array(vec![])),
        ]
    }

    fn frame(schema_id: u32, datum: Vec<u8>) -> Vec<u8> {
        let mut payload = vec![CONFLUENT_MAGIC];
        payload.extend(schema_id.to_be_bytes());
        payload.extend(datum);
        payload
    }

    fn framed_update(rut: &str) -> Vec<u8> {
        let schema = Schema::parse_str(BUSINESS_UPDATE_SCHEMA).unwrap();
        let datum = apache_avro::to_avro_datum(&schema, AvroValue::Record(update_fields(rut))).unwrap();
        frame(7, datum)
    }

    /// The business update schema with a `country` field ahead of `rut`, as a newer
    /// producer would write it.
    fn evolved_schema() -> String {
        let mut schema: serde_json::Value = serde_json::from_str(BUSINESS_UPDATE_SCHEMA).unwrap();
        let fields = schema["fields"].as_array_mut().unwrap();
        let at = fields.iter().position(|f| f["name"] == "rut").unwrap();
        fields.insert(at, json!({"name": "country", "type": "string"}));
        schema.to_string()
    }

    fn framed_evolved_update(schema_id: u32, rut: &str) -> Vec<u8> {
        let schema = Schema::parse_str(&evolved_schema()).unwrap();
        let mut fields = update_fields(rut);
        let at = fields.iter().position(|(name, _)| name == "rut").unwrap();
        fields.insert(at, ("country".into(), AvroValue::String("CL".into())));
        let datum = apache_avro::to_avro_datum(&schema, AvroValue::Record(fields)).unwrap();
        frame(schema_id, datum)
    }

    #[tokio::test]
    async fn test_avro_decodes_confluent_frame() {
        let event = AvroDecoder::new()
            .unwrap()
            .decode(&framed_update("76637851-k"))
            .await
            .unwrap();
        assert_eq!(event.rut, Some(Rut::new("76637851-k")));
        assert_eq!(event.business_id, Some(42));
        assert_eq!(event.action_type.as_deref(), Some("update"));
    }

    #[tokio::test]
    async fn test_avro_rejects_unframed_payload() {
        let decoder = AvroDecoder::new().unwrap();
        assert!(matches!(
            decoder.decode(br#"{"rut":"1"}"#).await,
            Err(DecodeFailure::NotFramed { .. })
        ));
        assert!(matches!(
            decoder.decode(&[0, 0, 0, 0, 1]).await,
            Err(DecodeFailure::NotFramed { len: 5, .. })
        ));
        assert!(matches!(
            decoder.decode(&[0, 0, 0, 0, 1, 0xff]).await,
            Err(DecodeFailure::Avro(_))
        ));
    }

    #[tokio::test]
    async fn test_registry_writer_schema_is_resolved() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/schemas/ids/8");
                then.status(200).json_body(json!({ "schema": evolved_schema() }));
            })
            .await;

        let registry = Arc::new(SchemaRegistry::new(server.base_url()).unwrap());
        let chain = DecoderChain::with_registry(registry).unwrap();

        let first = chain.decode(&framed_evolved_update(8, "76637851-k")).await.unwrap();
        let second = chain.decode(&framed_evolved_update(8, "76111111-1")).await.unwrap();

        assert_eq!(first.rut, Some(Rut::new("76637851-k")));
        assert_eq!(first.business_id, Some(42));
        assert_eq!(second.rut, Some(Rut::new("76111111-1")));
        assert_eq!(mock.hits_async().await, 1);
    }

    #[tokio::test]
    async fn test_evolved_payload_needs_the_registry() {
        let chain = DecoderChain::standard().unwrap();
        let rut = chain
            .decode(&framed_evolved_update(8, "76637851-k"))
            .await
            .ok()
            .and_then(|e| e.rut);
        assert_ne!(rut, Some(Rut::new("76637851-k")));
    }

    #[tokio::test]
    async fn test_unreachable_registry_falls_back_to_embedded_schema() {
        let registry = Arc::new(SchemaRegistry::new("http://127.0.0.1:9").unwrap());
        let decoder = AvroDecoder::new().unwrap().with_registry(registry);

        let event = decoder.decode(&framed_update("76222222-2")).await.unwrap();
        assert_eq!(event.rut, Some(Rut::new("76222222-2")));
    }

    #[tokio::test]
    async fn test_unknown_schema_id_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/schemas/ids/7");
                then.status(404).json_body(json!({"error_code": 40403}));
            })
            .await;

        let registry = Arc::new(SchemaRegistry::new(server.base_url()).unwrap());
        let decoder = AvroDecoder::new().unwrap().with_registry(registry);
        assert!(matches!(
            decoder.decode(&framed_update("1-9")).await,
            Err(DecodeFailure::Registry { id: 7, .. })
        ));
    }

    #[tokio::test]
    async fn test_json_decoder() {
        let event = JsonDecoder
            .decode(br#"{"businessId": 7, "actionType": "create", "rut": "76111111-1"}"#)
            .await
            .unwrap();
        assert_eq!(event.rut, Some(Rut::new("76111111-1")));
        assert_eq!(event.business_id, Some(7));

        let no_rut = JsonDecoder
            .decode(br#"{"businessId": 7, "rut": ""}"#)
            .await
            .unwrap();
        assert_eq!(no_rut.rut, None);

        assert!(matches!(
            JsonDecoder.decode(b"[1, 2]").await,
            Err(DecodeFailure::NotARecord(_))
        ));
    }

    #[tokio::test]
    async fn test_chain_falls_back_to_json() {
        let chain = DecoderChain::standard().unwrap();

        let avro = chain.decode(&framed_update("761")).await.unwrap();
        assert_eq!(avro.rut, Some(Rut::new("761")));

        let json = chain.decode(br#"{"rut": "762"}"#).await.unwrap();
        assert_eq!(json.rut, Some(Rut::new("762")));

        let err = chain.decode(b"\x01garbage").await.unwrap_err();
        match err {
            DataError::Decode(msg) => {
                assert!(msg.contains("avro:"));
                assert!(msg.contains("json:"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
