//! Replica ordering and quorum decision-making, decoupled from the
//! dispatch skeleton so the same `Operation` loop can eventually serve
//! Put (N-of-M write quorum) and Delete (at-least-one) by swapping the
//! policy implementation.

use blobcoord_types::ReplicaId;
use std::collections::VecDeque;

/// Outcome of `OperationPolicy::is_complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Succeeded,
    Failed,
    Pending,
}

/// Decides which replica to try next and whether the operation has
/// succeeded, failed, or must continue.
pub trait OperationPolicy: Send {
    /// Returns the next replica to try, removing it from the candidate
    /// set and counting it against `in_flight`. Local-DC replicas are
    /// always exhausted before remote ones. Returns `None` once every
    /// replica has been tried.
    fn next_replica(&mut self) -> Option<ReplicaId>;

    /// True iff another dispatch is both allowed (`in_flight < parallelism`)
    /// and possible (a replica remains). Does not mutate state.
    fn may_dispatch(&self) -> bool;

    /// Records a successful response and frees one in-flight slot.
    fn on_success(&mut self);

    /// Records a failed response and frees one in-flight slot.
    fn on_failure(&mut self);

    /// Current terminal/non-terminal state of the operation.
    fn is_complete(&self) -> Decision;
}

/// `OperationPolicy` for Get: two concurrent attempts, any single success
/// wins.
#[derive(Debug, Clone)]
pub struct GetOperationPolicy {
    replicas_local: VecDeque<ReplicaId>,
    replicas_remote: VecDeque<ReplicaId>,
    in_flight: usize,
    successes: usize,
    failures: usize,
    parallelism: usize,
    success_target: usize,
}

impl GetOperationPolicy {
    /// Builds a Get policy from a replica set already split into
    /// local-DC and remote-DC order. `parallelism` defaults to 2 and
    /// `success_target` to 1, matching spec.md's Get flavor.
    pub fn new(replicas_local: Vec<ReplicaId>, replicas_remote: Vec<ReplicaId>) -> Self {
        Self {
            replicas_local: replicas_local.into(),
            replicas_remote: replicas_remote.into(),
            in_flight: 0,
            successes: 0,
            failures: 0,
            parallelism: 2,
            success_target: 1,
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        assert!(parallelism > 0, "parallelism must be positive");
        self.parallelism = parallelism;
        self
    }

    pub fn with_success_target(mut self, success_target: usize) -> Self {
        assert!(success_target > 0, "success_target must be positive");
        self.success_target = success_target;
        self
    }

    /// Total number of replicas known to this operation, used by
    /// `GetOperation` to size its Not-Found/Deleted/Expired thresholds.
    pub fn replica_count(&self) -> usize {
        self.replicas_local.len() + self.replicas_remote.len() + self.in_flight + self.successes + self.failures
    }

    fn remaining(&self) -> usize {
        self.replicas_local.len() + self.replicas_remote.len()
    }
}

impl OperationPolicy for GetOperationPolicy {
    fn next_replica(&mut self) -> Option<ReplicaId> {
        let replica = self
            .replicas_local
            .pop_front()
            .or_else(|| self.replicas_remote.pop_front())?;
        self.in_flight += 1;
        Some(replica)
    }

    fn may_dispatch(&self) -> bool {
        self.in_flight < self.parallelism && self.remaining() > 0
    }

    fn on_success(&mut self) {
        self.successes += 1;
        self.in_flight -= 1;
    }

    fn on_failure(&mut self) {
        self.failures += 1;
        self.in_flight -= 1;
    }

    fn is_complete(&self) -> Decision {
        if self.successes >= self.success_target {
            Decision::Succeeded
        } else if self.remaining() == 0 && self.in_flight == 0 {
            Decision::Failed
        } else {
            Decision::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobcoord_types::DatacenterId;
    use proptest::prelude::*;

    fn replica(node: u32) -> ReplicaId {
        ReplicaId::new(node, DatacenterId(1))
    }

    #[test]
    fn local_replicas_are_tried_before_remote() {
        let mut policy = GetOperationPolicy::new(vec![replica(1), replica(2)], vec![replica(3)]);
        assert_eq!(policy.next_replica(), Some(replica(1)));
        assert_eq!(policy.next_replica(), Some(replica(2)));
        assert_eq!(policy.next_replica(), Some(replica(3)));
        assert_eq!(policy.next_replica(), None);
    }

    #[test]
    fn may_dispatch_respects_parallelism_cap() {
        let mut policy = GetOperationPolicy::new(vec![replica(1), replica(2), replica(3)], vec![])
            .with_parallelism(2);
        assert!(policy.may_dispatch());
        policy.next_replica();
        assert!(policy.may_dispatch());
        policy.next_replica();
        assert!(!policy.may_dispatch(), "in_flight == parallelism must block further dispatch");
    }

    #[test]
    fn may_dispatch_false_when_exhausted() {
        let mut policy = GetOperationPolicy::new(vec![replica(1)], vec![]);
        policy.next_replica();
        assert!(!policy.may_dispatch());
    }

    #[test]
    fn success_reaching_target_completes_the_operation() {
        let mut policy = GetOperationPolicy::new(vec![replica(1)], vec![]);
        policy.next_replica();
        assert_eq!(policy.is_complete(), Decision::Pending);
        policy.on_success();
        assert_eq!(policy.is_complete(), Decision::Succeeded);
    }

    #[test]
    fn failure_on_last_replica_completes_as_failed() {
        let mut policy = GetOperationPolicy::new(vec![replica(1)], vec![]);
        policy.next_replica();
        policy.on_failure();
        assert_eq!(policy.is_complete(), Decision::Failed);
    }

    #[test]
    fn pending_while_replicas_remain_untried() {
        let policy = GetOperationPolicy::new(vec![replica(1)], vec![]);
        assert_eq!(policy.is_complete(), Decision::Pending);
    }

    proptest! {
        #[test]
        fn invariant_accounting_never_exceeds_replica_count(n in 1usize..20) {
            let replicas: Vec<ReplicaId> = (0..n as u32).map(replica).collect();
            let mut policy = GetOperationPolicy::new(replicas, vec![]).with_parallelism(n.min(4));
            let mut dispatched = 0;
            while let Some(_r) = policy.next_replica() {
                dispatched += 1;
                policy.on_failure();
                if dispatched > n {
                    break;
                }
            }
            prop_assert_eq!(dispatched, n);
            prop_assert_eq!(policy.is_complete(), Decision::Failed);
        }
    }
}
