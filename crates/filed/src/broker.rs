//! Broker: public endpoint, routing proxy, and worker supervision.
//!
//! The broker binds two Unix socket endpoints. External callers connect to
//! the public one; workers connect to the internal one. A routing proxy
//! moves each caller request to exactly one idle worker and the reply back
//! to the originating caller. The supervising loop is the sole owner of
//! the worker registry: workers report their own death over a notification
//! channel and never touch the registry, so no lock guards the hot path.

use std::collections::HashMap;
use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::codec::{Framed, LinesCodec};

use crate::client::{self, CallConfig};
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::wire;
use crate::worker::Worker;

/// Mode the public socket file must carry: any local user may submit
/// requests.
const PUBLIC_SOCKET_MODE: u32 = 0o777;

/// Retry budget and timeout for the self-repair call; a failed repair is
/// retried at the next tick.
const SELF_REPAIR_RETRIES: u32 = 1;
const SELF_REPAIR_TIMEOUT: Duration = Duration::from_secs(10);

type WorkerConn = Framed<UnixStream, LinesCodec>;
type IdleQueue = Arc<Mutex<mpsc::UnboundedReceiver<WorkerConn>>>;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("failed to bind public endpoint {path}: {source}")]
    BindPublic {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to bind worker endpoint {path}: {source}")]
    BindWorker {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to set public endpoint permissions: {0}")]
    SocketMode(#[source] std::io::Error),
}

/// Extension point for how pool workers are brought up. The default spawns
/// [`Worker`] tasks; tests substitute their own to exercise the
/// supervising loop.
pub trait WorkerSpawner: Send + Sync {
    fn spawn(&self, id: u64, notify: mpsc::Sender<u64>) -> JoinHandle<()>;
}

struct TaskSpawner {
    config: Arc<Config>,
    dispatcher: Arc<Dispatcher>,
    active: Arc<AtomicBool>,
}

impl WorkerSpawner for TaskSpawner {
    fn spawn(&self, id: u64, notify: mpsc::Sender<u64>) -> JoinHandle<()> {
        Worker::new(
            id,
            Arc::clone(&self.config),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.active),
        )
        .spawn(notify)
    }
}

pub struct Broker {
    config: Arc<Config>,
    active: Arc<AtomicBool>,
    spawner: Arc<dyn WorkerSpawner>,
    // Mirrors the registry size; the registry itself is owned by the
    // supervising loop alone.
    pool_size: AtomicUsize,
}

impl Broker {
    pub fn new(config: Arc<Config>) -> Self {
        let active = Arc::new(AtomicBool::new(false));
        let spawner = Arc::new(TaskSpawner {
            config: Arc::clone(&config),
            dispatcher: Arc::new(Dispatcher::new()),
            active: Arc::clone(&active),
        });
        Self {
            config,
            active,
            spawner,
            pool_size: AtomicUsize::new(0),
        }
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn WorkerSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Current worker pool size as last observed by the supervising loop.
    pub fn worker_count(&self) -> usize {
        self.pool_size.load(Ordering::Relaxed)
    }

    /// Bind the endpoints, launch the proxy and the worker pool, then
    /// supervise until a `shutdown` command clears the active flag.
    ///
    /// Shutdown is eventual: the loop stops respawning and returns, but
    /// workers already serving requests run to completion on their own.
    pub async fn start(&self) -> Result<(), BrokerError> {
        self.active.store(true, Ordering::SeqCst);

        let public = bind_socket(&self.config.socket_file).map_err(|source| {
            BrokerError::BindPublic {
                path: self.config.socket_file.clone(),
                source,
            }
        })?;
        std::fs::set_permissions(
            &self.config.socket_file,
            Permissions::from_mode(PUBLIC_SOCKET_MODE),
        )
        .map_err(BrokerError::SocketMode)?;

        let internal = bind_socket(&self.config.worker_socket_file).map_err(|source| {
            BrokerError::BindWorker {
                path: self.config.worker_socket_file.clone(),
                source,
            }
        })?;

        let (idle_tx, idle_rx) = mpsc::unbounded_channel::<WorkerConn>();
        let idle_rx: IdleQueue = Arc::new(Mutex::new(idle_rx));
        let worker_accept = tokio::spawn(accept_workers(internal, idle_tx.clone()));
        let caller_accept = tokio::spawn(accept_callers(public, idle_tx, Arc::clone(&idle_rx)));

        let (notify_tx, notify_rx) = mpsc::channel::<u64>(self.config.workers.max(1));

        tracing::info!(
            socket = %self.config.socket_file.display(),
            workers = self.config.workers,
            "server online"
        );

        self.supervise(notify_rx, notify_tx).await;

        tracing::info!("server shutdown detected");
        worker_accept.abort();
        caller_accept.abort();
        let _ = std::fs::remove_file(&self.config.socket_file);
        let _ = std::fs::remove_file(&self.config.worker_socket_file);
        Ok(())
    }

    /// The single writer of the worker registry.
    ///
    /// Two wake sources: a death notification (remove the dead worker,
    /// spawn a replacement while still active) and the periodic tick (run
    /// the endpoint self-check). Identities increase monotonically and are
    /// never reused.
    async fn supervise(&self, mut notify_rx: mpsc::Receiver<u64>, notify_tx: mpsc::Sender<u64>) {
        let mut registry: HashMap<u64, JoinHandle<()>> = HashMap::new();
        let mut next_id: u64 = 0;

        for _ in 0..self.config.workers {
            let id = next_id;
            next_id += 1;
            registry.insert(id, self.spawner.spawn(id, notify_tx.clone()));
        }
        self.pool_size.store(registry.len(), Ordering::Relaxed);

        // First tick fires immediately, which doubles as the startup check.
        let mut tick = tokio::time::interval(self.config.self_check_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.active.load(Ordering::SeqCst) {
            tokio::select! {
                Some(dead) = notify_rx.recv() => {
                    registry.remove(&dead);
                    if self.active.load(Ordering::SeqCst) {
                        let id = next_id;
                        next_id += 1;
                        tracing::info!(dead, replacement = id, "respawning worker");
                        registry.insert(id, self.spawner.spawn(id, notify_tx.clone()));
                    }
                    self.pool_size.store(registry.len(), Ordering::Relaxed);
                }
                _ = tick.tick() => {
                    self.verify_socket_mode().await;
                }
            }
        }
    }

    /// Self-healing permission check.
    ///
    /// The socket file's bits can drift under external tooling; when they
    /// do, the broker issues a `chmod` at its own public endpoint through
    /// the ordinary client protocol. Repair failure is logged and retried
    /// at the next tick.
    async fn verify_socket_mode(&self) {
        let mode = match std::fs::metadata(&self.config.socket_file) {
            Ok(meta) => meta.permissions().mode() & 0o7777,
            Err(e) => {
                tracing::error!(error = %e, "unable to stat public endpoint");
                return;
            }
        };
        if mode == PUBLIC_SOCKET_MODE {
            return;
        }

        tracing::warn!(mode = %format!("{mode:o}"), "public endpoint is not globally writable");
        let frame = wire::encode_request(
            "chmod",
            &[
                "write".to_string(),
                "false".to_string(),
                self.config.socket_file.display().to_string(),
            ],
            &self.config.delimiter,
        );
        let call_config = CallConfig {
            socket: self.config.socket_file.clone(),
            delimiter: self.config.delimiter.clone(),
            retries: SELF_REPAIR_RETRIES,
            timeout: SELF_REPAIR_TIMEOUT,
            verbose: false,
        };
        if let Err(e) = client::call(&frame, &call_config).await {
            tracing::error!(error = %e, "unable to repair public endpoint permissions");
        }
    }
}

fn bind_socket(path: &Path) -> std::io::Result<UnixListener> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    UnixListener::bind(path)
}

/// Feed newly connected workers into the idle queue.
async fn accept_workers(listener: UnixListener, idle_tx: mpsc::UnboundedSender<WorkerConn>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                tracing::debug!("worker connected to routing endpoint");
                if idle_tx
                    .send(Framed::new(stream, LinesCodec::new()))
                    .is_err()
                {
                    return;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "worker accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Accept external callers and serve each on its own task.
async fn accept_callers(
    listener: UnixListener,
    idle_tx: mpsc::UnboundedSender<WorkerConn>,
    idle_rx: IdleQueue,
) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                tokio::spawn(serve_caller(
                    Framed::new(stream, LinesCodec::new()),
                    idle_tx.clone(),
                    Arc::clone(&idle_rx),
                ));
            }
            Err(e) => {
                tracing::error!(error = %e, "caller accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Route each request from one caller connection through exactly one idle
/// worker. If the worker path fails mid-exchange, the caller connection is
/// dropped: the request is lost and the caller's retry protocol recovers.
async fn serve_caller(
    mut caller: Framed<UnixStream, LinesCodec>,
    idle_tx: mpsc::UnboundedSender<WorkerConn>,
    idle_rx: IdleQueue,
) {
    while let Some(request) = caller.next().await {
        let request = match request {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(error = %e, "caller read failed");
                return;
            }
        };

        let Some(reply) = exchange(&request, &idle_tx, &idle_rx).await else {
            return;
        };

        // The caller may have timed out and hung up; its retry already owns
        // recovery, so a failed write just ends this connection.
        if caller.send(reply).await.is_err() {
            return;
        }
    }
}

/// One request/reply round trip against a single worker. The connection
/// stays out of the idle queue for the whole exchange, which is what
/// guarantees at most one in-flight request per worker.
async fn exchange(
    request: &str,
    idle_tx: &mpsc::UnboundedSender<WorkerConn>,
    idle_rx: &IdleQueue,
) -> Option<String> {
    let mut worker = idle_rx.lock().await.recv().await?;

    if let Err(e) = worker.send(request).await {
        tracing::warn!(error = %e, "request forward failed, discarding worker connection");
        return None;
    }

    match worker.next().await {
        Some(Ok(reply)) => {
            let _ = idle_tx.send(worker);
            Some(reply)
        }
        Some(Err(e)) => {
            tracing::warn!(error = %e, "reply read failed, discarding worker connection");
            None
        }
        None => {
            tracing::warn!("worker connection closed mid-request");
            None
        }
    }
}
