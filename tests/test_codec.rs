//! Unit tests for `LineCodec`
//!
//! Tests line splitting, partial line retention and recovery from bad output

use provider_bridge::transport::DecodedLine;
use provider_bridge::LineCodec;
use serde_json::json;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::Decoder;

fn decode_all(codec: &mut LineCodec, buf: &mut BytesMut) -> Vec<DecodedLine> {
    let mut out = Vec::new();
    while let Some(item) = codec.decode(buf).unwrap() {
        out.push(item);
    }
    out
}

#[test]
fn test_partial_line_is_retained_across_chunks() {
    let mut codec = LineCodec::default();
    let mut buf = BytesMut::from(&b"{\"a\":1}\n{\"b\""[..]);

    let first = decode_all(&mut codec, &mut buf);
    assert_eq!(first, vec![DecodedLine::Message(json!({"a": 1}))]);
    assert_eq!(&buf[..], b"{\"b\"");

    buf.extend_from_slice(b":2}\n");
    let second = decode_all(&mut codec, &mut buf);
    assert_eq!(second, vec![DecodedLine::Message(json!({"b": 2}))]);
    assert!(buf.is_empty());
}

#[test]
fn test_blank_lines_and_carriage_returns() {
    let mut codec = LineCodec::default();
    let mut buf = BytesMut::from(&b"\n   \n{\"a\":1}\r\n\r\n"[..]);

    let items = decode_all(&mut codec, &mut buf);
    assert_eq!(items, vec![DecodedLine::Message(json!({"a": 1}))]);
}

#[test]
fn test_malformed_line_between_valid_lines() {
    let mut codec = LineCodec::default();
    let mut buf = BytesMut::from(&b"{\"n\":1}\nnot json\n{\"n\":2}\n"[..]);

    let items = decode_all(&mut codec, &mut buf);
    assert_eq!(items.len(), 3);
    assert_eq!(items[0], DecodedLine::Message(json!({"n": 1})));
    match &items[1] {
        DecodedLine::Malformed { line, .. } => assert_eq!(line, "not json"),
        other => panic!("expected malformed line, got {other:?}"),
    }
    assert_eq!(items[2], DecodedLine::Message(json!({"n": 2})));
}

#[test]
fn test_oversized_line_in_one_chunk() {
    let mut codec = LineCodec::new(8);
    let mut buf = BytesMut::from(&b"{\"aaaaaaaaaa\":1}\n{\"b\":1}\n"[..]);

    let items = decode_all(&mut codec, &mut buf);
    assert_eq!(
        items,
        vec![
            DecodedLine::Oversized { len: 16 },
            DecodedLine::Message(json!({"b": 1})),
        ]
    );
}

#[test]
fn test_oversized_line_across_chunks_is_discarded() {
    let mut codec = LineCodec::new(16);
    let mut buf = BytesMut::from(&[b'x'; 40][..]);

    assert!(decode_all(&mut codec, &mut buf).is_empty());
    assert!(buf.is_empty(), "oversized bytes should not be buffered");

    buf.extend_from_slice(b"xyz\n{\"ok\":1}\n");
    let items = decode_all(&mut codec, &mut buf);
    assert_eq!(
        items,
        vec![
            DecodedLine::Oversized { len: 43 },
            DecodedLine::Message(json!({"ok": 1})),
        ]
    );
}

#[test]
fn test_unterminated_final_line_is_parsed_at_eof() {
    let mut codec = LineCodec::default();
    let mut buf = BytesMut::from(&b"{\"a\":1}\n{\"last\":true}"[..]);

    assert_eq!(
        codec.decode_eof(&mut buf).unwrap(),
        Some(DecodedLine::Message(json!({"a": 1})))
    );
    assert_eq!(
        codec.decode_eof(&mut buf).unwrap(),
        Some(DecodedLine::Message(json!({"last": true})))
    );
    assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
}
