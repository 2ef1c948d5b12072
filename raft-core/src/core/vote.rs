use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio::time::Duration;

use crate::core::CandidateState;
use crate::core::RaftCore;
use crate::core::State;
use crate::core::UpdateCurrentLeader;
use crate::error::RaftResult;
use crate::raft::VoteRequest;
use crate::raft::VoteResponse;
use crate::AppData;
use crate::AppDataResponse;
use crate::MessageSummary;
use crate::RaftNetwork;
use crate::RaftStorage;
use crate::Update;

impl<D: AppData, R: AppDataResponse, N: RaftNetwork<D>, S: RaftStorage<D, R>> RaftCore<D, R, N, S> {
    /// Handle a `RequestVote` RPC from a candidate (§5.2, §5.4).
    ///
    /// A vote is granted iff: the candidate's term is not stale, this node has not already voted
    /// for a different candidate in the candidate's term, and the candidate's log is at least as
    /// up-to-date as this node's log (greater last-log-term, or equal term with an index at least
    /// as large).
    #[tracing::instrument(level = "debug", skip(self, req), fields(req=%req.summary()))]
    pub(super) async fn handle_vote_request(&mut self, req: VoteRequest) -> RaftResult<VoteResponse> {
        // If candidate's term is less than this node's current term, reject.
        if req.term < self.current_term {
            tracing::debug!(
                req.term,
                self.current_term,
                "rejecting vote request as candidate's term is less than current term"
            );
            return Ok(VoteResponse {
                term: self.current_term,
                vote_granted: false,
            });
        }

        // A new term has been observed. Become a follower of no one in particular, clear our
        // prior vote, and persist the new term before evaluating the rest of the request.
        if req.term > self.current_term {
            self.update_current_term(req.term, None);
            self.update_current_leader(UpdateCurrentLeader::Unknown);
            self.save_hard_state().await?;
        }

        // Do not grant a vote if we've already voted for a different candidate in this term.
        if let Some(candidate_id) = self.voted_for {
            if candidate_id != req.candidate_id {
                tracing::debug!(
                    candidate_id,
                    req.candidate_id,
                    "rejecting vote request as this node has already voted for a different candidate this term"
                );
                return Ok(VoteResponse {
                    term: self.current_term,
                    vote_granted: false,
                });
            }
        }

        // Reject if the candidate's log is not at least as up-to-date as this node's log.
        let is_log_current = (req.last_log_term, req.last_log_index) >= (self.last_log_id.term, self.last_log_id.index);
        if !is_log_current {
            tracing::debug!(
                req.last_log_term,
                req.last_log_index,
                self.last_log_id.term,
                self.last_log_id.index,
                "rejecting vote request as candidate's log is not as up-to-date as this node's log"
            );
            return Ok(VoteResponse {
                term: self.current_term,
                vote_granted: false,
            });
        }

        // Candidate's log is acceptable, and this node has not voted for anyone else this term.
        self.voted_for = Some(req.candidate_id);
        self.save_hard_state().await?;
        self.update_next_election_timeout(true);

        // Non-voters never campaign themselves, but they do grant votes and reset their own
        // deadline so they don't spuriously think the cluster has gone silent.
        if !self.target_state.is_non_voter() {
            self.set_target_state(State::Follower);
        }

        tracing::debug!(req.candidate_id, "vote granted");

        Ok(VoteResponse {
            term: self.current_term,
            vote_granted: true,
        })
    }
}

impl<'a, D: AppData, R: AppDataResponse, N: RaftNetwork<D>, S: RaftStorage<D, R>> CandidateState<'a, D, R, N, S> {
    /// Send a `RequestVote` RPC to every peer in the current (and, if applicable, joint) config
    /// in parallel, returning a channel on which each response arrives as it completes.
    #[tracing::instrument(level = "trace", skip(self))]
    pub(super) fn spawn_parallel_vote_requests(&self) -> mpsc::Receiver<(anyhow::Result<VoteResponse>, u64)> {
        let targets = self
            .core
            .membership
            .all_nodes()
            .into_iter()
            .filter(|elem| elem != &self.core.id)
            .collect::<Vec<_>>();

        let (tx, rx) = mpsc::channel(targets.len().max(1));
        let rpc = VoteRequest {
            term: self.core.current_term,
            candidate_id: self.core.id,
            last_log_index: self.core.last_log_id.index,
            last_log_term: self.core.last_log_id.term,
        };
        let ttl = Duration::from_millis(self.core.config.request_vote_timeout);

        for target in targets {
            let rpc = rpc.clone();
            let network = self.core.network.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let res = match timeout(ttl, network.send_vote(target, rpc)).await {
                    Ok(res) => res,
                    Err(_) => Err(anyhow::anyhow!("timeout waiting for vote response")),
                };
                let _ = tx.send((res, target)).await;
            });
        }

        rx
    }

    /// Handle the response to a previously sent `RequestVote` RPC.
    #[tracing::instrument(level = "trace", skip(self, res))]
    pub(super) async fn handle_vote_response(&mut self, res: anyhow::Result<VoteResponse>, target: u64) -> RaftResult<()> {
        let res = match res {
            Ok(res) => res,
            Err(err) => {
                tracing::error!(target, error=%err, "error while requesting vote");
                return Ok(());
            }
        };

        // If peer's term is greater, step down and become a follower of no one in particular.
        if res.term > self.core.current_term {
            self.core.update_current_term(res.term, None);
            self.core.update_current_leader(UpdateCurrentLeader::Unknown);
            self.core.save_hard_state().await?;
            self.core.set_target_state(State::Follower);
            return Ok(());
        }

        if !res.vote_granted {
            return Ok(());
        }

        // Is the node to which we just granted a vote a member of the current (old) config?
        if self.core.membership.members.contains(&target) {
            self.votes_granted_old += 1;
        }
        // Is the node to which we just granted a vote a member of the new (joint) config, if applicable?
        if self
            .core
            .membership
            .members_after_consensus
            .as_ref()
            .map(|new| new.contains(&target))
            .unwrap_or(false)
        {
            self.votes_granted_new += 1;
        }

        // Determine if we have reached a majority for both the old & new configs, if applicable.
        let has_quorum_old = self.votes_granted_old >= self.votes_needed_old;
        let has_quorum_new = self.votes_needed_new == 0 || self.votes_granted_new >= self.votes_needed_new;

        if has_quorum_old && has_quorum_new {
            tracing::debug!(self.core.id, "transitioning to leader state as vote quorum has been reached");
            self.core.set_target_state(State::Leader);
            self.core.report_metrics(Update::Ignore);
        }

        Ok(())
    }
}
