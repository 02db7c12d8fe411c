//! Unit tests for delivery sinks

use std::time::Duration;

use axum::http::HeaderMap;
use axum::http::header::ACCEPT;
use provider_bridge::delivery::stream_channel;
use provider_bridge::{DeliveryMode, DeliverySink, PollBuffer};
use serde_json::json;

#[test]
fn test_delivery_mode_from_accept_header() {
    let mut headers = HeaderMap::new();
    assert_eq!(DeliveryMode::from_headers(&headers), DeliveryMode::Pull);

    headers.insert(ACCEPT, "application/json".parse().unwrap());
    assert_eq!(DeliveryMode::from_headers(&headers), DeliveryMode::Pull);

    headers.insert(ACCEPT, "application/json, text/event-stream".parse().unwrap());
    assert_eq!(DeliveryMode::from_headers(&headers), DeliveryMode::Push);
}

#[test]
fn test_poll_buffer_keeps_order() {
    let mut buffer = PollBuffer::new();
    buffer.deliver(vec![json!(2), json!(3)]).unwrap();
    buffer.prepend(vec![json!(0), json!(1)]);

    assert_eq!(buffer.len(), 4);
    assert_eq!(buffer.pop_front(), Some(json!(0)));
    assert_eq!(buffer.drain_all(), vec![json!(1), json!(2), json!(3)]);
    assert!(buffer.is_empty());
}

#[tokio::test]
async fn test_stream_sink_delivers_and_returns_residue() {
    let (mut sink, receiver) = stream_channel(7);
    assert_eq!(sink.generation(), 7);

    sink.deliver(vec![json!(1), json!(2), json!(3)]).unwrap();
    assert_eq!(receiver.recv().await, Some(json!(1)));

    let residue = sink.close();
    assert_eq!(residue, vec![json!(2), json!(3)]);
    assert!(sink.is_closed());
    assert_eq!(receiver.recv().await, None);

    let refused = sink.deliver(vec![json!(4)]).unwrap_err();
    assert_eq!(refused, vec![json!(4)]);
}

#[tokio::test]
async fn test_stream_receiver_wakes_on_delivery() {
    let (mut sink, receiver) = stream_channel(1);

    let waiter = tokio::spawn(async move { receiver.recv().await });
    tokio::task::yield_now().await;
    sink.deliver(vec![json!({"late": true})]).unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, Some(json!({"late": true})));
}

#[test]
fn test_stream_receiver_pending_until_delivery() {
    let (mut sink, receiver) = stream_channel(2);
    let mut recv = tokio_test::task::spawn(receiver.recv());

    tokio_test::assert_pending!(recv.poll());
    sink.deliver(vec![json!("x")]).unwrap();
    assert!(recv.is_woken());
    assert_eq!(tokio_test::assert_ready!(recv.poll()), Some(json!("x")));
}
