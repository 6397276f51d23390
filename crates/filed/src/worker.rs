//! Worker unit: owns one reply connection and executes dispatched commands.
//!
//! A worker connects to the broker's internal routing endpoint, then loops:
//! receive a frame, decode, dispatch, encode, send the reply. Transport
//! failures are retried locally with back-off; consecutive failures past
//! the configured threshold retire the worker. Whatever kills the loop
//! (clean shutdown, threshold exhaustion, or a panic inside a handler),
//! the recovery boundary in [`Worker::spawn`] logs the cause and pushes
//! the worker's identity onto the broker's death-notification queue
//! exactly once, so the supervising loop always learns of the exit.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{FutureExt, SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LinesCodec};

use crate::config::Config;
use crate::dispatch::{Dispatcher, Disposition};
use crate::wire;

type WorkerFrames = Framed<UnixStream, LinesCodec>;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to open worker connection: {0}")]
    Connect(#[source] std::io::Error),
    #[error("consecutive receive failures exceeded threshold {0}")]
    ReceiveThreshold(u32),
    #[error("consecutive send failures exceeded threshold {0}")]
    SendThreshold(u32),
}

pub struct Worker {
    id: u64,
    config: Arc<Config>,
    dispatcher: Arc<Dispatcher>,
    broker_active: Arc<AtomicBool>,
    active: bool,
}

impl Worker {
    pub fn new(
        id: u64,
        config: Arc<Config>,
        dispatcher: Arc<Dispatcher>,
        broker_active: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            config,
            dispatcher,
            broker_active,
            active: true,
        }
    }

    /// Launch the worker task inside its recovery boundary.
    ///
    /// The retirement sequence (log + notify) runs regardless of how the
    /// loop ended; it is cleanup, not control flow.
    pub fn spawn(self, notify: mpsc::Sender<u64>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let id = self.id;
            match AssertUnwindSafe(self.run()).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(worker = id, error = %e, "worker died"),
                Err(panic) => {
                    let cause = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!(worker = id, %cause, "worker died");
                }
            }
            tracing::info!(worker = id, "retired");
            if notify.send(id).await.is_err() {
                tracing::warn!(worker = id, "broker no longer listening for retirements");
            }
        })
    }

    async fn run(mut self) -> Result<(), WorkerError> {
        let stream = UnixStream::connect(&self.config.worker_socket_file)
            .await
            .map_err(WorkerError::Connect)?;
        let mut frames = Framed::new(stream, LinesCodec::new());
        tracing::info!(worker = self.id, "online and listening");

        // Resets on every successful receive; persists across requests.
        let mut receive_failures = 0u32;

        while self.active && self.broker_active.load(Ordering::SeqCst) {
            match frames.next().await {
                Some(Ok(frame)) => {
                    receive_failures = 0;
                    self.handle_request(&frame, &mut frames).await?;
                }
                Some(Err(e)) => {
                    self.receive_failed(&mut receive_failures, &e.to_string())
                        .await?;
                }
                None => {
                    self.receive_failed(&mut receive_failures, "connection closed")
                        .await?;
                }
            }
        }

        Ok(())
    }

    async fn receive_failed(&self, failures: &mut u32, cause: &str) -> Result<(), WorkerError> {
        tracing::error!(worker = self.id, error = cause, "error reading request");
        *failures += 1;
        if *failures > self.config.failure_threshold {
            return Err(WorkerError::ReceiveThreshold(self.config.failure_threshold));
        }
        tokio::time::sleep(self.config.failure_backoff()).await;
        Ok(())
    }

    async fn handle_request(
        &mut self,
        frame: &str,
        frames: &mut WorkerFrames,
    ) -> Result<(), WorkerError> {
        let (command, params) = wire::decode_request(frame, &self.config.delimiter);
        tracing::debug!(worker = self.id, %command, "handling request");

        let reply = match self.dispatcher.dispatch(&command, &params).await {
            Disposition::Reply(Ok(chunks)) => {
                wire::encode_reply(true, &chunks, &self.config.delimiter)
            }
            Disposition::Reply(Err(e)) => {
                wire::encode_reply(false, &[e.to_string()], &self.config.delimiter)
            }
            Disposition::Shutdown => {
                tracing::info!(worker = self.id, "shutdown requested");
                self.active = false;
                self.broker_active.store(false, Ordering::SeqCst);
                wire::encode_reply(true, &[], &self.config.delimiter)
            }
        };

        self.send_reply(&reply, frames).await
    }

    /// Retry the send until it lands or the threshold is exceeded. The
    /// failure counter is local to this invocation; it does not carry over
    /// to the next request.
    async fn send_reply(&self, reply: &str, frames: &mut WorkerFrames) -> Result<(), WorkerError> {
        let mut send_failures = 0u32;
        loop {
            match frames.send(reply).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::error!(worker = self.id, error = %e, "error sending reply");
                    send_failures += 1;
                    if send_failures > self.config.failure_threshold {
                        return Err(WorkerError::SendThreshold(self.config.failure_threshold));
                    }
                    tokio::time::sleep(self.config.failure_backoff()).await;
                }
            }
        }
    }
}
