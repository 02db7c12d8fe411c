//! Lifecycle management for subprocess transport (connect, close)

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{BridgeError, Result};
use crate::transport::ProcessExit;

use super::command::CommandBuilder;
use super::reader::forward_stderr;
use super::transport::SubprocessTransport;

/// Time the output tasks get to drain after the process is gone
const DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

impl SubprocessTransport {
    /// Spawn the provider process and set up stdio pipes
    ///
    /// # Errors
    /// Returns `BridgeError::Spawn` if the process cannot be started or its
    /// stdio handles cannot be obtained
    pub(super) async fn connect_impl(&mut self) -> Result<()> {
        if self.exit_task.is_some() {
            return Ok(());
        }
        let kind = self.spec.kind.clone();
        let exit_tx = self
            .exit_tx
            .take()
            .ok_or_else(|| BridgeError::spawn(&kind, "transport cannot be reused"))?;

        let mut cmd = CommandBuilder::new(&self.spec).build();
        let mut child = cmd.spawn().map_err(|e| {
            if let Some(ref cwd) = self.spec.cwd
                && !cwd.exists()
            {
                return BridgeError::spawn(
                    &kind,
                    format!("working directory does not exist: {}", cwd.display()),
                );
            }
            BridgeError::spawn(&kind, format!("{}: {e}", self.spec.program.display()))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::spawn(&kind, "failed to get stdin handle"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::spawn(&kind, "failed to get stdout handle"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BridgeError::spawn(&kind, "failed to get stderr handle"))?;

        self.pid = child.id();
        log::info!(
            "[{}] started {} (pid {})",
            self.label,
            self.spec.program.display(),
            self.pid.map_or_else(|| "?".to_string(), |p| p.to_string())
        );

        self.exit_task = Some(tokio::spawn(watch_exit(
            child,
            self.kill.clone(),
            exit_tx,
            self.label.clone(),
        )));
        self.stderr_task = Some(tokio::spawn(forward_stderr(stderr, self.label.clone())));
        self.stdin = Some(stdin);
        self.stdout = Some(stdout);
        self.ready.store(true, Ordering::SeqCst);

        Ok(())
    }

    /// Close stdin, give the process `terminate_timeout` to exit, then kill it
    ///
    /// Safe to call more than once.
    ///
    /// # Errors
    /// Currently infallible; kept fallible for the `Transport` contract
    pub(super) async fn close_impl(&mut self) -> Result<()> {
        self.ready.store(false, Ordering::SeqCst);

        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.shutdown().await;
        }

        if self.exit_task.is_some() {
            let mut exit_rx = self.exit_rx.clone();
            let exited = tokio::time::timeout(
                self.options.terminate_timeout,
                exit_rx.wait_for(Option::is_some),
            )
            .await
            .is_ok();

            if !exited {
                log::warn!(
                    "[{}] provider did not exit within {:?}, killing",
                    self.label,
                    self.options.terminate_timeout
                );
                self.kill.cancel();
                let _ = exit_rx.wait_for(Option::is_some).await;
            }
        }

        if let Some(mut task) = self.reader_task.take()
            && tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await.is_err()
        {
            task.abort();
        }
        if let Some(mut task) = self.stderr_task.take()
            && tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await.is_err()
        {
            task.abort();
        }
        self.stdout = None;

        Ok(())
    }

    /// Handle Drop cleanup
    pub(super) fn drop_impl(&mut self) {
        self.ready.store(false, Ordering::SeqCst);
        self.stdin = None;

        // The exit task kills the child once the token is cancelled
        self.kill.cancel();
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

/// Own the child until it exits and publish its status exactly once
async fn watch_exit(
    mut child: Child,
    kill: CancellationToken,
    exit_tx: watch::Sender<Option<ProcessExit>>,
    label: String,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        () = kill.cancelled() => {
            if let Err(e) = child.start_kill() {
                log::debug!("[{label}] kill failed: {e}");
            }
            child.wait().await
        }
    };

    let exit = match status {
        Ok(status) => ProcessExit::from(status),
        Err(e) => {
            log::warn!("[{label}] failed to collect exit status: {e}");
            ProcessExit::unknown()
        }
    };
    log::info!("[{label}] provider exited ({exit})");
    exit_tx.send_replace(Some(exit));
}
