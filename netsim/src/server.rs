//! The server half of the transport surface: listens on a `SimNode` port for encoded RPC
//! requests and dispatches them to registered handlers, replying on the same port. The
//! `RaftNetwork` trait only defines the client half; an in-process test router never needs a
//! server side at all since it calls `RaftCore` handles directly. Simulated nodes that only
//! see each other over the network need something to listen on, which is what this module
//! provides.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::node::SimNode;
use raft_core::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use raft_core::{AppData, RaftError};

const DEDUP_CAPACITY: usize = 4096;
const POLL_TIMEOUT: Duration = Duration::from_millis(200);

pub type AppendEntriesHandler<D> =
    Arc<dyn Fn(AppendEntriesRequest<D>) -> BoxFuture<'static, Result<AppendEntriesResponse, RaftError>> + Send + Sync>;
pub type VoteHandler =
    Arc<dyn Fn(VoteRequest) -> BoxFuture<'static, Result<VoteResponse, RaftError>> + Send + Sync>;
pub type InstallSnapshotHandler = Arc<
    dyn Fn(InstallSnapshotRequest) -> BoxFuture<'static, Result<InstallSnapshotResponse, RaftError>> + Send + Sync,
>;

#[derive(Serialize, Deserialize)]
enum Envelope<D: AppData> {
    AppendEntries { dedup_token: u64, rpc: AppendEntriesRequest<D> },
    Vote { dedup_token: u64, rpc: VoteRequest },
    InstallSnapshot { dedup_token: u64, rpc: InstallSnapshotRequest },
}

#[derive(Serialize, Deserialize)]
enum Reply {
    AppendEntries(AppendEntriesResponse),
    Vote(VoteResponse),
    InstallSnapshot(InstallSnapshotResponse),
    Error(String),
}

struct Handlers<D: AppData> {
    append_entries: Option<AppendEntriesHandler<D>>,
    vote: Option<VoteHandler>,
    install_snapshot: Option<InstallSnapshotHandler>,
}

impl<D: AppData> Default for Handlers<D> {
    fn default() -> Self {
        Self { append_entries: None, vote: None, install_snapshot: None }
    }
}

/// A dedup cache bounded by insertion count, evicting the oldest token once full. Lets the
/// server answer a retransmitted request with its original reply instead of re-running a
/// handler that may not be idempotent.
#[derive(Default)]
struct DedupCache {
    order: VecDeque<u64>,
    replies: HashMap<u64, Vec<u8>>,
}

impl DedupCache {
    fn get(&self, token: u64) -> Option<Vec<u8>> {
        self.replies.get(&token).cloned()
    }

    fn insert(&mut self, token: u64, reply: Vec<u8>) {
        if self.replies.insert(token, reply).is_none() {
            self.order.push_back(token);
            if self.order.len() > DEDUP_CAPACITY {
                if let Some(oldest) = self.order.pop_front() {
                    self.replies.remove(&oldest);
                }
            }
        }
    }
}

/// A registered-handler RPC endpoint bound to one `SimNode` port.
pub struct NetworkServer<D: AppData> {
    node: Arc<SimNode>,
    port: u16,
    handlers: Mutex<Handlers<D>>,
    dedup: Mutex<DedupCache>,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    /// A handle back to this server's own `Arc`, so `start()` can hand a clone to its spawned
    /// dispatch task without requiring every caller to plumb `Arc<Self>` through by value.
    self_handle: std::sync::Weak<Self>,
}

impl<D: AppData> NetworkServer<D> {
    pub fn new(node: Arc<SimNode>, port: u16) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new_cyclic(|weak| Self {
            node,
            port,
            handlers: Mutex::new(Handlers::default()),
            dedup: Mutex::new(DedupCache::default()),
            running: AtomicBool::new(false),
            shutdown,
            task: Mutex::new(None),
            self_handle: weak.clone(),
        })
    }

    pub async fn register_append_entries_handler(&self, handler: AppendEntriesHandler<D>) {
        self.handlers.lock().await.append_entries = Some(handler);
    }

    pub async fn register_vote_handler(&self, handler: VoteHandler) {
        self.handlers.lock().await.vote = Some(handler);
    }

    pub async fn register_install_snapshot_handler(&self, handler: InstallSnapshotHandler) {
        self.handlers.lock().await.install_snapshot = Some(handler);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Binds the port and spawns the dispatch loop. A no-op if already running.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.node.bind_port(self.port).await;
        let mut shutdown_rx = self.shutdown.subscribe();
        let server = self.self_handle.upgrade().expect("server outlives its own dispatch task");
        let handle = tokio::spawn(async move {
            loop {
                let recv = server.node.receive_on_port(server.port, POLL_TIMEOUT);
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    msg = recv => {
                        if let Some(msg) = msg {
                            server.dispatch(msg.src_addr, msg.src_port, msg.payload).await;
                        }
                    }
                }
            }
        });
        *self.task.lock().await = Some(handle);
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }
        self.node.release_port(self.port).await;
    }

    async fn dispatch(&self, src: raft_core::NodeId, src_port: u16, payload: Vec<u8>) {
        let envelope: Envelope<D> = match serde_json::from_slice(&payload) {
            Ok(e) => e,
            Err(_) => return,
        };

        let (token, reply) = match envelope {
            Envelope::AppendEntries { dedup_token, rpc } => {
                if let Some(cached) = self.dedup.lock().await.get(dedup_token) {
                    (dedup_token, cached)
                } else {
                    let handler = self.handlers.lock().await.append_entries.clone();
                    let reply = match handler {
                        Some(h) => match h(rpc).await {
                            Ok(resp) => Reply::AppendEntries(resp),
                            Err(e) => Reply::Error(e.to_string()),
                        },
                        None => Reply::Error("no append_entries handler registered".into()),
                    };
                    let bytes = serde_json::to_vec(&reply).unwrap_or_default();
                    self.dedup.lock().await.insert(dedup_token, bytes.clone());
                    (dedup_token, bytes)
                }
            }
            Envelope::Vote { dedup_token, rpc } => {
                if let Some(cached) = self.dedup.lock().await.get(dedup_token) {
                    (dedup_token, cached)
                } else {
                    let handler = self.handlers.lock().await.vote.clone();
                    let reply = match handler {
                        Some(h) => match h(rpc).await {
                            Ok(resp) => Reply::Vote(resp),
                            Err(e) => Reply::Error(e.to_string()),
                        },
                        None => Reply::Error("no vote handler registered".into()),
                    };
                    let bytes = serde_json::to_vec(&reply).unwrap_or_default();
                    self.dedup.lock().await.insert(dedup_token, bytes.clone());
                    (dedup_token, bytes)
                }
            }
            Envelope::InstallSnapshot { dedup_token, rpc } => {
                if let Some(cached) = self.dedup.lock().await.get(dedup_token) {
                    (dedup_token, cached)
                } else {
                    let handler = self.handlers.lock().await.install_snapshot.clone();
                    let reply = match handler {
                        Some(h) => match h(rpc).await {
                            Ok(resp) => Reply::InstallSnapshot(resp),
                            Err(e) => Reply::Error(e.to_string()),
                        },
                        None => Reply::Error("no install_snapshot handler registered".into()),
                    };
                    let bytes = serde_json::to_vec(&reply).unwrap_or_default();
                    self.dedup.lock().await.insert(dedup_token, bytes.clone());
                    (dedup_token, bytes)
                }
            }
        };
        let _ = token;
        let _ = self.node.send_from(self.port, src, src_port, reply).await;
    }
}
