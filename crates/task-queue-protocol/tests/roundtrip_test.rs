use proptest::prelude::*;
use task_queue_core::{Correlation, CorrelationId, ResultEnvelope, TaskEnvelope, Value};
use task_queue_protocol::{EnvelopeCodec, WireFormat};

fn value_strategy() -> impl Strategy<Value = Value> {
    // Quarter steps are exact in binary and in decimal text.
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        any::<i32>().prop_map(|n| Value::Float(f64::from(n) / 4.0 + 0.25)),
        "[a-zA-Z0-9 _-]{0,16}".prop_map(Value::Str),
    ];

    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::List),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..4).prop_map(Value::Map),
        ]
    })
}

fn envelope_strategy() -> impl Strategy<Value = TaskEnvelope> {
    (
        "[a-z_]{1,12}",
        prop::collection::vec(value_strategy(), 0..5),
        prop::option::of("[a-f0-9-]{1,36}"),
    )
        .prop_map(|(operation, arguments, id)| {
            TaskEnvelope::new(operation, arguments, Correlation::from(id.map(CorrelationId::new)))
        })
}

proptest! {
    #[test]
    fn json_task_roundtrip(envelope in envelope_strategy()) {
        let codec = EnvelopeCodec::new(WireFormat::Json);
        let bytes = codec.encode_task(&envelope).unwrap();
        prop_assert_eq!(codec.decode_task(&bytes).unwrap(), envelope);
    }

    #[test]
    fn bincode_task_roundtrip(envelope in envelope_strategy()) {
        let codec = EnvelopeCodec::new(WireFormat::Bincode);
        let bytes = codec.encode_task(&envelope).unwrap();
        prop_assert_eq!(codec.decode_task(&bytes).unwrap(), envelope);
    }

    #[test]
    fn result_roundtrip(id in "[a-f0-9-]{1,36}", value in value_strategy()) {
        let result = ResultEnvelope::new(CorrelationId::new(id), value);
        for format in [WireFormat::Json, WireFormat::Bincode] {
            let codec = EnvelopeCodec::new(format);
            let bytes = codec.encode_result(&result).unwrap();
            prop_assert_eq!(codec.decode_result(&bytes).unwrap(), result.clone());
        }
    }
}
