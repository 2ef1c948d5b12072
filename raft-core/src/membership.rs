//! The joint-consensus-aware quorum manager.
//!
//! Wraps the free-standing [`crate::raft::MembershipConfig`] plus [`crate::quorum::majority_of`]
//! into a single object that answers "what does a quorum require right now" without the caller
//! having to remember to check both subsets of a joint configuration by hand.

use crate::quorum;
use crate::raft::MembershipConfig;
use crate::raft_types::NodeId;
use std::collections::BTreeSet;

/// Which side(s) of a (possibly joint) configuration a quorum must be computed over.
///
/// During joint consensus an index is only committed, and a candidate only elected, when
/// it has a majority in *both* the old and the new subset. [`Membership::quorum_size`] and
/// [`Membership::is_majority`] take this as an explicit parameter rather than silently
/// picking one side, so call sites can't accidentally check only half of a joint config.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    /// Count only `members` (the "new" or sole configuration).
    Current,
    /// Count only `members_after_consensus` (the "old" side of a joint config). Callers
    /// must not ask for this phase on a non-joint configuration.
    Old,
    /// Require a majority in both subsets (the real joint-consensus rule).
    Joint,
}

/// Wraps a [`MembershipConfig`] active at some log index and answers quorum questions
/// about it.
#[derive(Clone, Debug)]
pub struct Membership {
    config: MembershipConfig,
}

impl Membership {
    pub fn new(config: MembershipConfig) -> Self {
        Self { config }
    }

    /// The union of every node in the current (and, if joint, the old) configuration.
    pub fn current_nodes(&self) -> BTreeSet<NodeId> {
        self.config.all_nodes()
    }

    /// Whether this configuration is mid joint-consensus.
    pub fn is_joint(&self) -> bool {
        self.config.is_in_joint_consensus()
    }

    /// The old subset of a joint configuration, if any.
    pub fn old_nodes(&self) -> Option<&BTreeSet<NodeId>> {
        self.config.members_after_consensus.as_ref()
    }

    /// The size of a majority for the requested phase of this configuration.
    ///
    /// `Phase::Joint` has no single count: the caller must satisfy the new-subset size
    /// and the old-subset size independently, so this returns the new subset's majority
    /// and callers checking joint quorum should use [`Membership::is_majority`] instead
    /// of comparing a raw ack count against this value.
    pub fn quorum_size(&self, phase: Phase) -> u64 {
        match phase {
            Phase::Current => quorum::majority_of(self.config.members.len() as u64),
            Phase::Old => quorum::majority_of(
                self.config
                    .members_after_consensus
                    .as_ref()
                    .map(|m| m.len())
                    .unwrap_or(0) as u64,
            ),
            Phase::Joint => quorum::majority_of(self.config.members.len() as u64),
        }
    }

    /// Whether the node ids in `acked` constitute a majority for the requested phase.
    ///
    /// For `Phase::Joint`, both the new-subset majority and the old-subset majority must
    /// hold independently among `acked`, matching Raft's `C_old,new` joint-consensus commit
    /// rule.
    pub fn is_majority(&self, acked: &BTreeSet<NodeId>, phase: Phase) -> bool {
        match phase {
            Phase::Current => {
                let hits = acked.intersection(&self.config.members).count() as u64;
                quorum::is_majority(hits, self.config.members.len() as u64)
            }
            Phase::Old => match &self.config.members_after_consensus {
                None => false,
                Some(old) => {
                    let hits = acked.intersection(old).count() as u64;
                    quorum::is_majority(hits, old.len() as u64)
                }
            },
            Phase::Joint => {
                let new_ok = self.is_majority(acked, Phase::Current);
                match &self.config.members_after_consensus {
                    None => new_ok,
                    Some(_) => new_ok && self.is_majority(acked, Phase::Old),
                }
            }
        }
    }

    pub fn config(&self) -> &MembershipConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreeset;

    fn joint(members: &[NodeId], old: &[NodeId]) -> MembershipConfig {
        MembershipConfig {
            members: members.iter().copied().collect(),
            members_after_consensus: Some(old.iter().copied().collect()),
        }
    }

    #[test]
    fn single_config_majority() {
        let m = Membership::new(MembershipConfig {
            members: btreeset! {1, 2, 3},
            members_after_consensus: None,
        });
        assert_eq!(m.quorum_size(Phase::Current), 2);
        assert!(m.is_majority(&btreeset! {1, 2}, Phase::Joint));
        assert!(!m.is_majority(&btreeset! {1}, Phase::Joint));
    }

    #[test]
    fn joint_config_requires_both_sides() {
        let m = Membership::new(joint(&[1, 2, 3, 4, 5], &[1, 2, 3]));
        assert!(m.is_joint());
        // Majority of new (5 members -> 3) but not of old (3 members -> 2, only 1 acked).
        assert!(!m.is_majority(&btreeset! {1, 4, 5}, Phase::Joint));
        // Majority of both.
        assert!(m.is_majority(&btreeset! {1, 2, 4, 5}, Phase::Joint));
    }
}
