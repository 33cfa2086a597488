// Malformed queue items must decode to an error, never take the process down

use task_queue_core::{CorrelationId, ResultEnvelope, TaskEnvelope, Value, MAX_NESTING_DEPTH};
use task_queue_protocol::{EnvelopeCodec, WireFormat, MAX_ENVELOPE_SIZE};

// Operation "a", one argument, then `levels` single-element lists ending in Null.
fn deeply_nested_task(levels: usize) -> Vec<u8> {
    let mut bytes = vec![0x01, b'a', 0x01];
    for _ in 0..levels {
        bytes.extend_from_slice(&[5, 1]);
    }
    bytes.extend_from_slice(&[0, 0]);
    bytes
}

#[test]
fn test_deep_bincode_nesting_is_rejected() {
    let bytes = deeply_nested_task(1_000_000);
    assert!(bytes.len() < MAX_ENVELOPE_SIZE);

    let codec = EnvelopeCodec::new(WireFormat::Bincode);
    assert!(codec.decode_task(&bytes).is_err());
}

#[test]
fn test_nesting_at_limit_still_decodes() {
    let mut nested = Value::Null;
    for _ in 0..MAX_NESTING_DEPTH {
        nested = Value::List(vec![nested]);
    }

    let codec = EnvelopeCodec::new(WireFormat::Bincode);
    let result = ResultEnvelope::new(CorrelationId::new("c1"), nested);
    let bytes = codec.encode_result(&result).unwrap();
    assert_eq!(codec.decode_result(&bytes).unwrap(), result);
}

#[test]
fn test_deep_json_nesting_is_rejected() {
    let depth = 100_000;
    let mut text = String::from(r#"["a",["#);
    text.push_str(&"[".repeat(depth));
    text.push_str(&"]".repeat(depth));
    text.push_str("],null]");

    let codec = EnvelopeCodec::new(WireFormat::Json);
    assert!(codec.decode_task(text.as_bytes()).is_err());
}

#[test]
fn test_non_finite_float_does_not_encode_as_null() {
    let codec = EnvelopeCodec::new(WireFormat::Json);
    let task = TaskEnvelope::fire_and_forget("echo", vec![Value::Float(f64::INFINITY)]);
    assert!(codec.encode_task(&task).is_err());
}
