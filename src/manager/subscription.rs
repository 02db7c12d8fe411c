//! Push stream subscriptions
//!
//! A [`SessionSubscription`] is the consumer side of a session's push sink.
//! Dropping it (the SSE client went away) detaches the sink and, depending on
//! the disconnect policy, tears the session down.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use serde_json::Value;

use super::session::BridgeSession;
use super::session_manager::{SessionMap, teardown};
use crate::delivery::StreamReceiver;

/// Live stream of one session's output
pub struct SessionSubscription {
    session: Arc<BridgeSession>,
    generation: u64,
    inner: Pin<Box<dyn Stream<Item = Value> + Send>>,
    /// Set when the session should be torn down on disconnect
    registry: Option<SessionMap>,
}

impl SessionSubscription {
    pub(crate) fn new(
        session: Arc<BridgeSession>,
        generation: u64,
        receiver: StreamReceiver,
        registry: Option<SessionMap>,
    ) -> Self {
        let inner = futures::stream::unfold(receiver, |receiver| async move {
            let message = receiver.recv().await?;
            Some((message, receiver))
        });
        Self {
            session,
            generation,
            inner: Box::pin(inner),
            registry,
        }
    }

    /// Session this subscription belongs to
    #[must_use]
    pub fn session(&self) -> &Arc<BridgeSession> {
        &self.session
    }

    /// Attach generation of this subscription
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Stream for SessionSubscription {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        // Replaced by a newer attach, or already detached by a teardown
        if !self.session.detach_sink(self.generation) {
            return;
        }
        log::debug!("[{}] stream client disconnected", self.session.label());

        let Some(registry) = self.registry.take() else {
            return;
        };
        let session = Arc::clone(&self.session);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let removed = {
                        let mut sessions = registry.write().await;
                        match sessions.get(session.id()) {
                            Some(current) if Arc::ptr_eq(current, &session) => {
                                sessions.remove(session.id())
                            }
                            _ => None,
                        }
                    };
                    if removed.is_some() {
                        log::info!(
                            "[{}] terminating session after stream disconnect",
                            session.label()
                        );
                        teardown(&session).await;
                    }
                });
            }
            Err(_) => {
                log::warn!(
                    "[{}] no runtime to terminate session after disconnect",
                    self.session.label()
                );
            }
        }
    }
}
