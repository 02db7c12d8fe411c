//! Output reading for subprocess transport

use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::ChildStderr;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;

use crate::error::BridgeError;

use super::codec::{DecodedLine, LineCodec};
use super::transport::SubprocessTransport;

impl SubprocessTransport {
    /// Spawn the stdout reader and return the message channel
    ///
    /// Lines that fail to decode are logged and skipped. The channel closes
    /// when stdout reaches end of file. Calling this twice, or before
    /// `connect`, yields a channel that is already closed.
    pub(super) fn read_messages_impl(&mut self) -> mpsc::UnboundedReceiver<serde_json::Value> {
        let (tx, rx) = mpsc::unbounded_channel();

        let Some(stdout) = self.stdout.take() else {
            log::debug!("[{}] stdout not available for reading", self.label);
            return rx;
        };
        let label = self.label.clone();
        let codec = LineCodec::new(self.options.max_line_bytes);

        let task = tokio::spawn(async move {
            let mut lines = FramedRead::new(stdout, codec);

            while let Some(item) = lines.next().await {
                match item {
                    Ok(DecodedLine::Message(message)) => {
                        if tx.send(message).is_err() {
                            // Receiver dropped, stop reading
                            break;
                        }
                    }
                    Ok(DecodedLine::Malformed { reason, line }) => {
                        log::warn!("[{label}] {}", BridgeError::malformed_line(reason, line));
                    }
                    Ok(DecodedLine::Oversized { len }) => {
                        log::warn!("[{label}] dropped oversized output line ({len} bytes)");
                    }
                    Err(e) => {
                        log::warn!("[{label}] error reading provider output: {e}");
                        break;
                    }
                }
            }
            log::debug!("[{label}] provider output closed");
        });

        self.reader_task = Some(task);
        rx
    }
}

/// Forward provider stderr to the bridge log, one line at a time
pub(super) async fn forward_stderr(stderr: ChildStderr, label: String) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let text = text.trim_end();
                if !text.is_empty() {
                    log::warn!("[{label}] stderr: {text}");
                }
            }
            Err(e) => {
                log::debug!("[{label}] stderr read failed: {e}");
                break;
            }
        }
    }
}
