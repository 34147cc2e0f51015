use burrow_fabric::{
    codec::{Codec, JsonCodec},
    error::Error,
    Arguments, Envelope,
};

fn roundtrip(envelope: &Envelope) -> Envelope {
    let bytes = JsonCodec.encode(envelope).unwrap();
    JsonCodec.decode(&bytes).unwrap()
}

fn decode(json: &str) -> Result<Envelope, Error> {
    JsonCodec.decode(json.as_bytes())
}

#[test]
fn roundtrip_preserves_empty_argument_map() {
    let envelope = Envelope::new("tcpWorker", "Message");
    assert_eq!(roundtrip(&envelope), envelope);
}

#[test]
fn roundtrip_preserves_binary_and_empty_values() {
    let envelope = Envelope::new("组件", "op with spaces")
        .with_arg("empty", Vec::new())
        .with_arg("binary", vec![0u8, 255, 10, 13, 0x80])
        .with_arg("requestId", 7u32.to_le_bytes().to_vec())
        .with_arg("", b"unnamed".to_vec());

    let decoded = roundtrip(&envelope);
    assert_eq!(decoded, envelope);
    assert_eq!(decoded.arg("empty"), Some(&[][..]));
}

#[test]
fn encoding_is_readable_json_with_base64_values() {
    let envelope = Envelope::new("tcpWorker", "Register").with_arg("domain", "a.test");
    let bytes = JsonCodec.encode(&envelope).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(value["component"], "tcpWorker");
    assert_eq!(value["operation"], "Register");
    assert_eq!(value["arguments"]["domain"], "YS50ZXN0");
}

#[test]
fn decodes_hand_written_envelope() {
    let envelope =
        decode(r#"{"component":"c","operation":"o","arguments":{"k":"aGk="}}"#).unwrap();

    let mut expected = Arguments::new();
    expected.insert("k".to_string(), b"hi".to_vec());
    assert_eq!(envelope.arguments, expected);
}

#[test]
fn missing_field_is_malformed() {
    let result = decode(r#"{"component":"c","arguments":{}}"#);
    assert!(matches!(result, Err(Error::Codec(_))));
}

#[test]
fn wrong_field_type_is_malformed() {
    let result = decode(r#"{"component":"c","operation":5,"arguments":{}}"#);
    assert!(matches!(result, Err(Error::Codec(_))));
}

#[test]
fn non_base64_value_is_malformed() {
    let result = decode(r#"{"component":"c","operation":"o","arguments":{"k":"%%%"}}"#);
    match result {
        Err(Error::Codec(msg)) => assert!(msg.contains("base64")),
        other => panic!("Expected Codec error, got {:?}", other),
    }
}

#[test]
fn garbage_is_malformed() {
    assert!(matches!(
        JsonCodec.decode::<Envelope>(b"\x00\x01 not json"),
        Err(Error::Codec(_))
    ));
}
