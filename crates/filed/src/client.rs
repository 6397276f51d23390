//! Reliable request/reply for callers of the daemon.
//!
//! One call sends an already-encoded request frame and waits for the reply
//! with a bounded retry budget. The transport carries no sequence numbers,
//! so after a timeout the connection must be discarded before resending: a
//! buffered late reply on the old connection could otherwise be accepted
//! as the answer to the retried request. Every attempt therefore gets a
//! fresh connection.
//!
//! Used by external callers and by the broker's own endpoint self-repair.

use std::path::PathBuf;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio_util::codec::{Framed, LinesCodec};

use crate::config::Config;
use crate::wire;

#[derive(Debug, Clone)]
pub struct CallConfig {
    /// Public endpoint to connect to.
    pub socket: PathBuf,
    pub delimiter: String,
    /// Total attempt budget; must be at least 1.
    pub retries: u32,
    /// Per-attempt reply timeout.
    pub timeout: Duration,
    /// Echo attempt progress to stderr.
    pub verbose: bool,
}

impl CallConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            socket: config.socket_file.clone(),
            delimiter: config.delimiter.clone(),
            retries: config.client_retries,
            timeout: config.client_timeout(),
            verbose: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// Every attempt in the retry budget went unanswered.
    #[error("server seems to be offline, abandoning")]
    Offline,
    /// The daemon answered with a failure reply.
    #[error("{0}")]
    Remote(String),
}

/// Send one request frame and return the decoded reply message.
pub async fn call(frame: &str, config: &CallConfig) -> Result<String, CallError> {
    let mut retries_left = config.retries.max(1);
    if config.verbose {
        eprintln!(
            "A: attempting command {frame} socket {} timeout {:?} tries {retries_left}",
            config.socket.display(),
            config.timeout
        );
    }

    loop {
        if let Some(line) = attempt(frame, config).await {
            let reply = wire::decode_reply(&line, &config.delimiter);
            if config.verbose {
                eprintln!("I: server replied ({line})");
            }
            return if reply.success {
                Ok(reply.message)
            } else {
                Err(CallError::Remote(reply.message))
            };
        }

        retries_left -= 1;
        if retries_left == 0 {
            if config.verbose {
                eprintln!("E: server seems to be offline, abandoning");
            }
            return Err(CallError::Offline);
        }
        tracing::warn!(frame, "no response from server, retrying");
        if config.verbose {
            eprintln!("W: no response from server, retrying...");
        }
        // The stale connection was dropped at the end of the attempt; the
        // next pass starts over on a fresh one.
    }
}

/// One attempt on one fresh connection. Any failure mode (refusal, send
/// error, peer close, timeout) reads as "no reply".
async fn attempt(frame: &str, config: &CallConfig) -> Option<String> {
    let stream = match UnixStream::connect(&config.socket).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::debug!(error = %e, socket = %config.socket.display(), "connect failed");
            return None;
        }
    };
    let mut framed = Framed::new(stream, LinesCodec::new());

    if let Err(e) = framed.send(frame).await {
        tracing::debug!(error = %e, "request send failed");
        return None;
    }

    match tokio::time::timeout(config.timeout, framed.next()).await {
        Ok(Some(Ok(line))) => Some(line),
        Ok(Some(Err(e))) => {
            tracing::debug!(error = %e, "reply read failed");
            None
        }
        Ok(None) => {
            tracing::debug!("server closed the connection without replying");
            None
        }
        Err(_) => None,
    }
}
