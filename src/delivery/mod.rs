//! Delivery sinks for provider output
//!
//! A session hands decoded provider messages to exactly one sink at a time:
//! either the push stream of an attached SSE client or the poll buffer that
//! collects messages for a later pull. Both implement [`DeliverySink`].

use std::collections::VecDeque;
use std::sync::Arc;

use axum::http::HeaderMap;
use axum::http::header::ACCEPT;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

// ============================================================================
// DELIVERY MODE
// ============================================================================

/// How a request wants provider output delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Hold the connection open and stream messages as server-sent events
    Push,
    /// Answer synchronously from buffered messages
    Pull,
}

impl DeliveryMode {
    /// Choose the mode from the `Accept` header
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let wants_stream = headers
            .get_all(ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.contains("text/event-stream"));
        if wants_stream { Self::Push } else { Self::Pull }
    }
}

// ============================================================================
// SINK CAPABILITY
// ============================================================================

/// Destination for decoded provider messages
pub trait DeliverySink {
    /// Deliver messages in order
    ///
    /// # Errors
    /// Returns the messages that could not be delivered, in their original
    /// order, so the caller can keep them
    fn deliver(&mut self, messages: Vec<Value>) -> Result<(), Vec<Value>>;
}

// ============================================================================
// POLL BUFFER
// ============================================================================

/// FIFO of messages waiting for a poll or a stream attach
#[derive(Debug, Default)]
pub struct PollBuffer {
    messages: VecDeque<Value>,
}

impl PollBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Oldest buffered message
    pub fn pop_front(&mut self) -> Option<Value> {
        self.messages.pop_front()
    }

    /// Take every buffered message, oldest first
    pub fn drain_all(&mut self) -> Vec<Value> {
        self.messages.drain(..).collect()
    }

    /// Put messages back in front of everything buffered
    pub fn prepend(&mut self, messages: Vec<Value>) {
        for message in messages.into_iter().rev() {
            self.messages.push_front(message);
        }
    }

    /// Number of buffered messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl DeliverySink for PollBuffer {
    fn deliver(&mut self, messages: Vec<Value>) -> Result<(), Vec<Value>> {
        self.messages.extend(messages);
        Ok(())
    }
}

// ============================================================================
// STREAM SINK
// ============================================================================

#[derive(Debug, Default)]
struct SinkQueue {
    messages: VecDeque<Value>,
    closed: bool,
}

#[derive(Debug, Default)]
struct SinkShared {
    queue: Mutex<SinkQueue>,
    notify: Notify,
}

/// Producer half of a push stream
///
/// Messages queued here and not yet taken by the [`StreamReceiver`] can be
/// recovered with [`StreamSink::close`], so a detach never loses output.
#[derive(Debug)]
pub struct StreamSink {
    generation: u64,
    shared: Arc<SinkShared>,
}

/// Consumer half of a push stream
#[derive(Debug)]
pub struct StreamReceiver {
    shared: Arc<SinkShared>,
}

/// Create a connected sink/receiver pair tagged with an attach generation
#[must_use]
pub fn stream_channel(generation: u64) -> (StreamSink, StreamReceiver) {
    let shared = Arc::new(SinkShared::default());
    (
        StreamSink {
            generation,
            shared: Arc::clone(&shared),
        },
        StreamReceiver { shared },
    )
}

impl StreamSink {
    /// Attach generation this sink was created for
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop accepting messages and return the ones the receiver never took
    ///
    /// The receiver sees end of stream once it has drained what is left.
    pub fn close(&self) -> Vec<Value> {
        let residue = {
            let mut queue = self.shared.queue.lock();
            queue.closed = true;
            queue.messages.drain(..).collect()
        };
        self.shared.notify.notify_one();
        residue
    }

    /// Whether the sink has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.queue.lock().closed
    }
}

impl DeliverySink for StreamSink {
    fn deliver(&mut self, messages: Vec<Value>) -> Result<(), Vec<Value>> {
        {
            let mut queue = self.shared.queue.lock();
            if queue.closed {
                return Err(messages);
            }
            queue.messages.extend(messages);
        }
        self.shared.notify.notify_one();
        Ok(())
    }
}

impl StreamReceiver {
    /// Wait for the next message; `None` once the sink is closed and drained
    pub async fn recv(&self) -> Option<Value> {
        loop {
            {
                let mut queue = self.shared.queue.lock();
                if let Some(message) = queue.messages.pop_front() {
                    return Some(message);
                }
                if queue.closed {
                    return None;
                }
            }
            // notify_one stores a permit, so a delivery between the check
            // above and this await is not missed
            self.shared.notify.notified().await;
        }
    }
}
