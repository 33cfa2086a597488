use crate::{ProtocolError, Result, MAX_ENVELOPE_SIZE};
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use task_queue_core::{ResultEnvelope, TaskEnvelope};

/// Encoding used for queue items. Producer and worker must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Text encoding, `["add",[2,3],"c1"]`.
    #[default]
    Json,
    /// Compact binary encoding.
    Bincode,
}

impl WireFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            WireFormat::Json => "json",
            WireFormat::Bincode => "bincode",
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WireFormat {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(WireFormat::Json),
            "bincode" => Ok(WireFormat::Bincode),
            other => Err(ProtocolError::UnknownFormat(other.to_string())),
        }
    }
}

fn bincode_options() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_ENVELOPE_SIZE as u64)
}

/// Turns envelopes into queue items and back.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeCodec {
    format: WireFormat,
}

impl EnvelopeCodec {
    pub fn new(format: WireFormat) -> Self {
        EnvelopeCodec { format }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    pub fn encode_task(&self, envelope: &TaskEnvelope) -> Result<Vec<u8>> {
        self.encode(envelope)
    }

    pub fn decode_task(&self, bytes: &[u8]) -> Result<TaskEnvelope> {
        self.decode(bytes)
    }

    pub fn encode_result(&self, envelope: &ResultEnvelope) -> Result<Vec<u8>> {
        self.encode(envelope)
    }

    pub fn decode_result(&self, bytes: &[u8]) -> Result<ResultEnvelope> {
        self.decode(bytes)
    }

    fn encode<T: Serialize>(&self, item: &T) -> Result<Vec<u8>> {
        let bytes = match self.format {
            WireFormat::Json => serde_json::to_vec(item)?,
            WireFormat::Bincode => bincode_options().serialize(item)?,
        };

        if bytes.len() > MAX_ENVELOPE_SIZE {
            return Err(ProtocolError::MessageTooLarge(bytes.len()));
        }

        Ok(bytes)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        if bytes.len() > MAX_ENVELOPE_SIZE {
            return Err(ProtocolError::MessageTooLarge(bytes.len()));
        }

        match self.format {
            WireFormat::Json => Ok(serde_json::from_slice(bytes)?),
            WireFormat::Bincode => Ok(bincode_options().deserialize(bytes)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use task_queue_core::{CorrelationId, Value};

    #[test]
    fn test_json_task_bytes() {
        let codec = EnvelopeCodec::new(WireFormat::Json);
        let envelope = TaskEnvelope::correlated(
            "add",
            vec![Value::Int(2), Value::Int(3)],
            CorrelationId::new("c1"),
        );

        let bytes = codec.encode_task(&envelope).unwrap();
        assert_eq!(bytes, br#"["add",[2,3],"c1"]"#.to_vec());
        assert_eq!(codec.decode_task(&bytes).unwrap(), envelope);
    }

    #[test]
    fn test_bincode_result_roundtrip() {
        let codec = EnvelopeCodec::new(WireFormat::Bincode);
        let result = ResultEnvelope::new(
            CorrelationId::new("c1"),
            Value::List(vec![Value::Float(1.5), Value::from("ok")]),
        );

        let bytes = codec.encode_result(&result).unwrap();
        assert_eq!(codec.decode_result(&bytes).unwrap(), result);
    }

    #[test]
    fn test_garbage_is_serialization_error() {
        let codec = EnvelopeCodec::new(WireFormat::Json);
        let err = codec.decode_task(b"not json at all").unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));

        let core_err: task_queue_core::TaskError = err.into();
        assert!(matches!(
            core_err,
            task_queue_core::TaskError::Serialization(_)
        ));
    }

    #[test]
    fn test_formats_do_not_mix() {
        let envelope = TaskEnvelope::fire_and_forget("echo", vec![Value::Int(1)]);
        let bytes = EnvelopeCodec::new(WireFormat::Json)
            .encode_task(&envelope)
            .unwrap();

        assert!(EnvelopeCodec::new(WireFormat::Bincode)
            .decode_task(&bytes)
            .is_err());
    }

    #[test]
    fn test_oversized_input_rejected() {
        let codec = EnvelopeCodec::new(WireFormat::Json);
        let huge = vec![b' '; MAX_ENVELOPE_SIZE + 1];
        assert!(matches!(
            codec.decode_task(&huge),
            Err(ProtocolError::MessageTooLarge(_))
        ));
    }

    #[test]
    fn test_wire_format_parse() {
        assert_eq!("json".parse::<WireFormat>().unwrap(), WireFormat::Json);
        assert_eq!("bincode".parse::<WireFormat>().unwrap(), WireFormat::Bincode);
        assert!("msgpack".parse::<WireFormat>().is_err());
        assert_eq!(WireFormat::Bincode.to_string(), "bincode");
    }
}
