//! An in-memory implementation of `raft_core::RaftStorage`, plus a trivial key-value-ish
//! state machine, used to exercise `raft-core` in its own test suite and in downstream
//! examples. Not suitable for production: nothing here survives a process restart.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::io::Cursor;
use std::ops::RangeBounds;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::anyhow;
use anyhow::Result;
use raft_core::async_trait::async_trait;
use raft_core::raft::Entry;
use raft_core::raft::EntryPayload;
use raft_core::raft::MembershipConfig;
use raft_core::serde_support::RaftCodec;
use raft_core::storage::HardState;
use raft_core::storage::InitialState;
use raft_core::storage::Snapshot;
use raft_core::storage::SnapshotMeta;
use raft_core::AppData;
use raft_core::AppDataResponse;
use raft_core::LogId;
use raft_core::NodeId;
use raft_core::RaftStorage;
use raft_core::RaftStorageDebug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;

/// The `RaftCodec` implementation backing this crate's log/snapshot (de)serialization: plain
/// `serde_json`, matching this crate's existing choice of wire format for its own snapshots.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl RaftCodec for JsonCodec {
    type Error = serde_json::Error;

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, Self::Error> {
        serde_json::to_vec(value)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, Self::Error> {
        serde_json::from_slice(bytes)
    }
}

/// The application data type carried by a `ClientWriteRequest` in these tests: set a named
/// client's status string, tagged with a serial number for idempotence bookkeeping.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientRequest {
    pub client: String,
    pub serial: u64,
    pub status: String,
}

impl AppData for ClientRequest {}

/// The response to a `ClientRequest`: the previous status recorded for this client, if any.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientResponse(pub Option<String>);

impl AppDataResponse for ClientResponse {}

/// Error returned from `apply_to_state_machine` indicating the storage engine wants Raft to
/// shut down, per the `RaftStorage::ShutdownError` associated type contract.
#[derive(Clone, Debug, Error)]
#[error("memstore shutdown: {0}")]
pub struct ShutdownError(pub String);

/// The in-memory state machine: the last applied log id, plus per-client serial/response
/// bookkeeping used to make client writes idempotent across retries, plus the last-written
/// status per client (the "business data" of this toy application).
#[derive(Clone, Debug, Default)]
pub struct MemStoreStateMachine {
    pub last_applied_log: LogId,
    pub client_serial_responses: HashMap<String, (u64, Option<String>)>,
    pub client_status: BTreeMap<String, String>,
}

struct MemStoreSnapshot {
    pub meta: SnapshotMeta,
    pub data: Vec<u8>,
}

/// An in-memory `RaftStorage` implementation, backing a single Raft node.
pub struct MemStore {
    id: NodeId,
    log: RwLock<BTreeMap<u64, Entry<ClientRequest>>>,
    sm: RwLock<MemStoreStateMachine>,
    hs: RwLock<Option<HardState>>,
    current_snapshot: RwLock<Option<MemStoreSnapshot>>,
    snapshot_idx: AtomicU64,
}

impl MemStore {
    /// Create a new, pristine instance for the given node id.
    pub fn new(id: NodeId) -> Self {
        let log = RwLock::new(BTreeMap::new());
        let sm = RwLock::new(MemStoreStateMachine::default());
        let hs = RwLock::new(None);
        let current_snapshot = RwLock::new(None);
        Self {
            id,
            log,
            sm,
            hs,
            current_snapshot,
            snapshot_idx: AtomicU64::new(0),
        }
    }

    /// A write-locked handle to the raw log, for tests that need to splice in entries by hand
    /// (e.g. simulating a partially-completed joint-consensus membership change).
    pub async fn get_log(&self) -> tokio::sync::RwLockWriteGuard<'_, BTreeMap<u64, Entry<ClientRequest>>> {
        self.log.write().await
    }
}

fn entry_membership(entry: &Entry<ClientRequest>) -> Option<MembershipConfig> {
    match &entry.payload {
        EntryPayload::ConfigChange(c) => Some(c.membership.clone()),
        _ => None,
    }
}

#[async_trait]
impl RaftStorage<ClientRequest, ClientResponse> for MemStore {
    type SnapshotData = Cursor<Vec<u8>>;
    type ShutdownError = ShutdownError;

    async fn get_membership_config(&self) -> Result<MembershipConfig> {
        let log = self.log.read().await;
        let cfg_opt = log.values().rev().find_map(entry_membership);
        if let Some(cfg) = cfg_opt {
            return Ok(cfg);
        }
        if let Some(snap) = self.current_snapshot.read().await.as_ref() {
            return Ok(snap.meta.membership.clone());
        }
        Ok(MembershipConfig::new_initial(self.id))
    }

    async fn get_initial_state(&self) -> Result<InitialState> {
        let membership = self.get_membership_config().await?;
        let mut hs = self.hs.write().await;
        let log = self.log.read().await;
        let sm = self.sm.read().await;

        match &*hs {
            Some(inner) => {
                let last_log_id = match log.values().next_back() {
                    Some(entry) => entry.log_id,
                    None => sm.last_applied_log,
                };
                Ok(InitialState {
                    last_log_id,
                    last_applied_log: sm.last_applied_log,
                    hard_state: inner.clone(),
                    membership,
                })
            }
            None => {
                let new = InitialState::new_initial(self.id);
                *hs = Some(new.hard_state.clone());
                Ok(new)
            }
        }
    }

    async fn save_hard_state(&self, hs: &HardState) -> Result<()> {
        *self.hs.write().await = Some(hs.clone());
        Ok(())
    }

    async fn get_log_entries<RNG: RangeBounds<u64> + Clone + std::fmt::Debug + Send + Sync>(
        &self,
        range: RNG,
    ) -> Result<Vec<Entry<ClientRequest>>> {
        let log = self.log.read().await;
        Ok(log.range(range).map(|(_, entry)| entry.clone()).collect())
    }

    async fn try_get_log_entry(&self, log_index: u64) -> Result<Option<Entry<ClientRequest>>> {
        let log = self.log.read().await;
        Ok(log.get(&log_index).cloned())
    }

    async fn get_last_log_id(&self) -> Result<LogId> {
        let log = self.log.read().await;
        let sm = self.sm.read().await;
        match log.values().next_back() {
            Some(entry) => Ok(entry.log_id),
            None => Ok(sm.last_applied_log),
        }
    }

    async fn delete_logs_from<RNG: RangeBounds<u64> + Clone + std::fmt::Debug + Send + Sync>(
        &self,
        range: RNG,
    ) -> Result<()> {
        let mut log = self.log.write().await;
        let keys = log.range(range).map(|(k, _)| *k).collect::<Vec<_>>();
        for key in keys {
            log.remove(&key);
        }
        Ok(())
    }

    async fn append_to_log(&self, entries: &[&Entry<ClientRequest>]) -> Result<()> {
        let mut log = self.log.write().await;
        for entry in entries {
            log.insert(entry.log_id.index, (*entry).clone());
        }
        Ok(())
    }

    async fn apply_to_state_machine(&self, entries: &[&Entry<ClientRequest>]) -> Result<Vec<ClientResponse>> {
        let mut sm = self.sm.write().await;
        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            sm.last_applied_log = entry.log_id;

            match &entry.payload {
                EntryPayload::Blank => results.push(ClientResponse(None)),
                EntryPayload::ConfigChange(_) => results.push(ClientResponse(None)),
                EntryPayload::PurgedMarker => results.push(ClientResponse(None)),
                EntryPayload::Normal(norm) => {
                    let req = &norm.data;
                    if let Some((serial, resp)) = sm.client_serial_responses.get(&req.client) {
                        if *serial == req.serial {
                            results.push(ClientResponse(resp.clone()));
                            continue;
                        }
                    }
                    let previous = sm.client_status.insert(req.client.clone(), req.status.clone());
                    sm.client_serial_responses.insert(req.client.clone(), (req.serial, previous.clone()));
                    results.push(ClientResponse(previous));
                }
            }
        }
        Ok(results)
    }

    async fn do_log_compaction(&self) -> Result<Snapshot<Self::SnapshotData>> {
        let (data, last_applied_log) = {
            let sm = self.sm.read().await;
            let data = serde_json::to_vec(&(&sm.client_serial_responses, &sm.client_status))?;
            (data, sm.last_applied_log)
        };

        let membership = self.get_membership_config().await?;

        let snapshot_idx = self.snapshot_idx.fetch_add(1, Ordering::Relaxed) + 1;
        let snapshot_id = format!("{}-{}-{}", last_applied_log.term, last_applied_log.index, snapshot_idx);

        let meta = SnapshotMeta {
            last_log_id: last_applied_log,
            membership,
            snapshot_id,
        };

        {
            let mut current = self.current_snapshot.write().await;
            *current = Some(MemStoreSnapshot {
                meta: meta.clone(),
                data: data.clone(),
            });
        }

        {
            let mut log = self.log.write().await;
            let keep_from = last_applied_log.index + 1;
            let below = log.range(..keep_from).map(|(k, _)| *k).collect::<Vec<_>>();
            for key in below {
                log.remove(&key);
            }
            log.insert(
                last_applied_log.index,
                Entry::new_purged_marker(last_applied_log),
            );
        }

        Ok(Snapshot {
            meta,
            snapshot: Box::new(Cursor::new(data)),
        })
    }

    async fn begin_receiving_snapshot(&self) -> Result<Box<Self::SnapshotData>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn finalize_snapshot_installation(&self, meta: &SnapshotMeta, snapshot: Box<Self::SnapshotData>) -> Result<()> {
        let data = snapshot.into_inner();

        {
            let mut log = self.log.write().await;
            let below = log.range(..=meta.last_log_id.index).map(|(k, _)| *k).collect::<Vec<_>>();
            for key in below {
                log.remove(&key);
            }
            log.insert(meta.last_log_id.index, Entry::new_purged_marker(meta.last_log_id));
        }

        let (serials, statuses): (HashMap<String, (u64, Option<String>)>, BTreeMap<String, String>) =
            serde_json::from_slice(&data).map_err(|e| anyhow!("failed to decode memstore snapshot: {}", e))?;

        {
            let mut sm = self.sm.write().await;
            sm.last_applied_log = meta.last_log_id;
            sm.client_serial_responses = serials;
            sm.client_status = statuses;
        }

        {
            let mut current = self.current_snapshot.write().await;
            *current = Some(MemStoreSnapshot {
                meta: meta.clone(),
                data,
            });
        }

        Ok(())
    }

    async fn get_current_snapshot(&self) -> Result<Option<Snapshot<Self::SnapshotData>>> {
        match &*self.current_snapshot.read().await {
            Some(snap) => {
                let reader = snap.data.clone();
                Ok(Some(Snapshot {
                    meta: snap.meta.clone(),
                    snapshot: Box::new(Cursor::new(reader)),
                }))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl RaftStorageDebug<MemStoreStateMachine> for MemStore {
    async fn get_state_machine(&self) -> MemStoreStateMachine {
        self.sm.read().await.clone()
    }

    async fn read_hard_state(&self) -> Option<HardState> {
        self.hs.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_codec_round_trips_client_request() {
        let codec = JsonCodec::default();
        let req = ClientRequest {
            client: "c0".into(),
            serial: 1,
            status: "up".into(),
        };
        let encoded = codec.encode(&req).expect("encode");
        let decoded: ClientRequest = codec.decode(&encoded).expect("decode");
        assert_eq!(decoded.client, req.client);
        assert_eq!(decoded.serial, req.serial);
        assert_eq!(decoded.status, req.status);
    }

    #[test]
    fn json_codec_round_trips_log_id() {
        let codec = JsonCodec::default();
        let id = LogId { term: 4, index: 9 };
        let encoded = codec.encode(&id).expect("encode");
        let decoded: LogId = codec.decode(&encoded).expect("decode");
        assert_eq!(decoded, id);
    }
}
