use crate::core::ConsensusState;
use crate::core::LeaderState;
use crate::core::ReplicationState;
use crate::core::State;
use crate::error::RaftResult;
use crate::replication::ReplicaEvent;
use crate::replication::ReplicationMetrics;
use crate::replication::ReplicationStream;
use crate::storage::Snapshot;
use crate::AppData;
use crate::AppDataResponse;
use crate::LogId;
use crate::MessageSummary;
use crate::NodeId;
use crate::RaftNetwork;
use crate::RaftStorage;

impl<'a, D: AppData, R: AppDataResponse, N: RaftNetwork<D>, S: RaftStorage<D, R>> LeaderState<'a, D, R, N, S> {
    /// Spawn a new replication stream for the given target, returning the leader-side tracking
    /// state for it.
    #[tracing::instrument(level = "trace", skip(self))]
    pub(super) fn spawn_replication_stream(&mut self, target: NodeId) -> ReplicationState<D> {
        let replstream = ReplicationStream::new(
            self.core.id,
            target,
            self.core.current_term,
            self.core.config.clone(),
            self.core.last_log_id,
            self.core.commit_index,
            self.core.network.clone(),
            self.core.storage.clone(),
            self.replication_tx.clone(),
        );

        ReplicationState {
            matched: LogId::default(),
            remove_after_commit: None,
            replstream,
        }
    }

    /// Handle an event arriving on `replication_rx` from one of this leader's replication streams.
    #[tracing::instrument(level = "trace", skip(self, event), fields(event=%event.summary()))]
    pub(super) async fn handle_replica_event(&mut self, event: ReplicaEvent<S::SnapshotData>) {
        let res = match event {
            ReplicaEvent::RateUpdate { target, is_line_rate } => {
                tracing::debug!(target, is_line_rate, "replication rate update");
                Ok(())
            }
            ReplicaEvent::RevertToFollower { target, term } => self.handle_revert_to_follower(target, term).await,
            ReplicaEvent::UpdateMatchIndex { target, matched } => self.handle_update_match_index(target, matched).await,
            ReplicaEvent::NeedsSnapshot { target, tx } => self.handle_needs_snapshot(target, tx).await,
            ReplicaEvent::Shutdown => {
                self.core.set_target_state(State::Shutdown);
                Ok(())
            }
        };

        if let Err(err) = res {
            tracing::error!(error=%err, "error while processing replication stream event");
        }
    }

    /// A replication stream observed a response from a higher term; step down to follower.
    #[tracing::instrument(level = "trace", skip(self))]
    async fn handle_revert_to_follower(&mut self, target: NodeId, term: u64) -> RaftResult<()> {
        if term > self.core.current_term {
            self.core.update_current_term(term, None);
            self.core.set_target_state(State::Follower);
            tracing::debug!(target, term, "reverting to follower after observing a higher term");
        }
        Ok(())
    }

    /// A replication stream has advanced the match index for its target; recompute the commit
    /// index (and, if it moved, apply newly committed entries) and progress membership changes.
    #[tracing::instrument(level = "trace", skip(self))]
    async fn handle_update_match_index(&mut self, target: NodeId, matched: LogId) -> RaftResult<()> {
        let mut newly_ready_non_voter = None;

        if let Some(state) = self.nodes.get_mut(&target) {
            state.matched = matched;
        } else if let Some(non_voter) = self.non_voters.get_mut(&target) {
            non_voter.state.matched = matched;
            if !non_voter.is_ready_to_join && matched.index >= self.core.last_log_id.index {
                non_voter.is_ready_to_join = true;
                newly_ready_non_voter = Some(target);
            }
        }

        self.leader_metrics.replication.insert(target, ReplicationMetrics { matched });
        self.update_commit_index().await?;
        self.leader_report_metrics();

        if let Some(target) = newly_ready_non_voter {
            self.advance_non_voter_sync(target).await;
        }

        Ok(())
    }

    /// A non-voter just became ready to join the cluster. If a `change_membership` call is
    /// waiting on a set of non-voters to catch up and this was the last one, re-drive the
    /// membership change now that every new node is synced.
    async fn advance_non_voter_sync(&mut self, target: NodeId) {
        if let ConsensusState::NonVoterSync { awaiting, .. } = &mut self.consensus_state {
            awaiting.remove(&target);
            if !awaiting.is_empty() {
                return;
            }
        } else {
            return;
        }

        if let ConsensusState::NonVoterSync { members, tx, .. } =
            std::mem::replace(&mut self.consensus_state, ConsensusState::Uniform)
        {
            self.change_membership(members, tx).await;
        }
    }

    /// Recompute `commit_index` as the highest index replicated to a majority of both the old and
    /// (if in joint consensus) new membership groups, then apply anything newly committed.
    #[tracing::instrument(level = "trace", skip(self))]
    async fn update_commit_index(&mut self) -> RaftResult<()> {
        let mut old_matched: Vec<u64> = self.core.membership.members.iter().map(|id| self.matched_index_of(*id)).collect();
        old_matched.sort_unstable();
        let old_commit = old_matched[(old_matched.len().saturating_sub(1)) / 2];

        let candidate = if let Some(new_members) = &self.core.membership.members_after_consensus {
            let mut new_matched: Vec<u64> = new_members.iter().map(|id| self.matched_index_of(*id)).collect();
            new_matched.sort_unstable();
            let new_commit = new_matched[(new_matched.len().saturating_sub(1)) / 2];
            old_commit.min(new_commit)
        } else {
            old_commit
        };

        if candidate > self.core.commit_index {
            self.core.commit_index = candidate;
            self.apply_newly_committed_requests().await?;
        }
        Ok(())
    }

    /// The leader always counts itself as matched up to its own last log index.
    fn matched_index_of(&self, id: NodeId) -> u64 {
        if id == self.core.id {
            return self.core.last_log_id.index;
        }
        self.nodes.get(&id).map(|s| s.matched.index).unwrap_or(0)
    }

    /// Drive `awaiting_committed` forward: any buffered client request whose index is now
    /// `<= commit_index` has been committed to the cluster and can be applied/acknowledged.
    #[tracing::instrument(level = "trace", skip(self))]
    async fn apply_newly_committed_requests(&mut self) -> RaftResult<()> {
        let commit_index = self.core.commit_index;
        let mut remaining = Vec::with_capacity(self.awaiting_committed.len());
        let mut ready = Vec::new();
        for req in self.awaiting_committed.drain(..) {
            if req.entry.log_id.index <= commit_index {
                ready.push(req);
            } else {
                remaining.push(req);
            }
        }
        self.awaiting_committed = remaining;

        for req in ready {
            self.client_request_post_commit(req).await;
        }

        Ok(())
    }

    /// A replication stream fell far enough behind that it now needs a snapshot rather than a
    /// stream of individual log entries; hand it the current snapshot.
    #[tracing::instrument(level = "trace", skip(self, tx))]
    async fn handle_needs_snapshot(
        &mut self,
        target: NodeId,
        tx: tokio::sync::oneshot::Sender<Snapshot<S::SnapshotData>>,
    ) -> RaftResult<()> {
        let snapshot = self.core.storage.get_current_snapshot().await.map_err(|err| self.core.map_fatal_storage_error(err))?;

        match snapshot {
            Some(snapshot) => {
                let _ = tx.send(snapshot);
            }
            None => tracing::debug!(target, "no snapshot available to satisfy replication stream's request"),
        }
        Ok(())
    }
}
