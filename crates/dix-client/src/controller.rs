//! Redundancy and retry control
//!
//! Each logical item of a request (a key, a record, an index) gets an
//! [`ItemTracker`] that judges the replies of its targets:
//!
//! ```text
//! Pending -> Collecting -> Satisfied
//!                |  ^
//!                v  |
//!          DegradedRetry -> Failed
//! ```
//!
//! Satisfied, Failed and Cancelled are terminal. Replies that arrive after
//! that are ignored.

use dix_core::Target;

use crate::error::DixError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    Collecting,
    Satisfied,
    DegradedRetry,
    Failed,
    Cancelled,
}

impl ItemState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Satisfied | ItemState::Failed | ItemState::Cancelled)
    }
}

/// When an item counts as satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// One successful reply; failures move on to the next candidate
    FirstSuccess,
    /// Every target must succeed; the item settles once all have answered
    AllTargets,
}

/// What the executor should do after a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// More replies are expected
    Wait,
    /// The item reached a terminal state with this reply
    Done,
    /// Send the item to this target next
    Retry(Target),
    /// The item was already terminal
    Ignored,
}

#[derive(Debug)]
pub struct ItemTracker<T> {
    state: ItemState,
    policy: Policy,
    candidates: Vec<Target>,
    next: usize,
    replies: usize,
    acked: Vec<Target>,
    first_error: Option<DixError>,
    value: Option<T>,
}

impl<T> ItemTracker<T> {
    /// Satisfied by the first target that answers successfully, tried in order
    pub fn first_success(candidates: Vec<Target>) -> Self {
        Self::new(Policy::FirstSuccess, candidates)
    }

    /// Satisfied once every target has answered successfully
    pub fn all_targets(targets: Vec<Target>) -> Self {
        Self::new(Policy::AllTargets, targets)
    }

    fn new(policy: Policy, candidates: Vec<Target>) -> Self {
        Self {
            state: ItemState::Pending,
            policy,
            candidates,
            next: 0,
            replies: 0,
            acked: Vec::new(),
            first_error: None,
            value: None,
        }
    }

    /// Begin collecting; returns the targets to contact now
    pub fn start(&mut self) -> Vec<Target> {
        if self.state != ItemState::Pending {
            return Vec::new();
        }
        if self.candidates.is_empty() {
            self.fail(DixError::Layout("item has no targets".into()));
            return Vec::new();
        }
        self.state = ItemState::Collecting;
        match self.policy {
            Policy::FirstSuccess => {
                self.next = 1;
                vec![self.candidates[0].clone()]
            }
            Policy::AllTargets => self.candidates.clone(),
        }
    }

    /// Judge the reply of target `from` for this item
    pub fn on_reply(&mut self, from: &Target, outcome: Result<T, DixError>) -> Verdict {
        if self.state.is_terminal() {
            tracing::trace!(state = ?self.state, "ignoring late reply");
            return Verdict::Ignored;
        }

        match (self.policy, outcome) {
            (Policy::FirstSuccess, Ok(value)) => {
                self.acked.push(from.clone());
                self.value = Some(value);
                self.state = ItemState::Satisfied;
                Verdict::Done
            }
            (Policy::FirstSuccess, Err(err)) => {
                let retry = err.is_retryable_read() && self.next < self.candidates.len();
                self.first_error.get_or_insert(err);
                if retry {
                    let target = self.candidates[self.next].clone();
                    self.next += 1;
                    self.state = ItemState::DegradedRetry;
                    Verdict::Retry(target)
                } else {
                    self.state = ItemState::Failed;
                    Verdict::Done
                }
            }
            (Policy::AllTargets, outcome) => {
                self.replies += 1;
                match outcome {
                    Ok(value) => {
                        self.acked.push(from.clone());
                        self.value = Some(value);
                    }
                    Err(err) => {
                        self.first_error.get_or_insert(err);
                    }
                }
                if self.replies < self.candidates.len() {
                    return Verdict::Wait;
                }
                self.state = if self.first_error.is_some() {
                    ItemState::Failed
                } else {
                    ItemState::Satisfied
                };
                Verdict::Done
            }
        }
    }

    /// Targets that answered this item successfully
    pub fn acked(&self) -> &[Target] {
        &self.acked
    }

    /// Fail a non-terminal item, keeping an earlier error if there is one
    pub fn fail(&mut self, err: DixError) {
        if self.state.is_terminal() {
            return;
        }
        self.first_error.get_or_insert(err);
        self.state = ItemState::Failed;
    }

    pub fn cancel(&mut self) {
        if !self.state.is_terminal() {
            self.state = ItemState::Cancelled;
        }
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Final outcome of the item
    pub fn into_result(self) -> Result<T, DixError> {
        match self.state {
            ItemState::Satisfied => self
                .value
                .ok_or_else(|| DixError::Protocol("satisfied item without a value".into())),
            ItemState::Failed => Err(self
                .first_error
                .unwrap_or_else(|| DixError::Protocol("item failed without an error".into()))),
            ItemState::Cancelled => Err(DixError::Cancelled),
            ItemState::Pending | ItemState::Collecting | ItemState::DegradedRetry => {
                Err(DixError::NotComplete)
            }
        }
    }
}

/// Check that at most `tolerated` of the per-target results failed
///
/// Returns the first failure when too many targets are missing.
pub fn check_quorum<T>(results: &[Result<T, DixError>], tolerated: usize) -> Result<(), DixError> {
    let mut failures = results.iter().filter_map(|r| r.as_ref().err());
    let failed = failures.clone().count();
    if failed > tolerated {
        let first = failures.next().cloned().unwrap_or(DixError::NotComplete);
        tracing::warn!(failed, tolerated, error = %first, "too many targets failed");
        return Err(first);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dix_core::{DeviceState, UnitKind};

    fn targets(n: u32) -> Vec<Target> {
        (0..n)
            .map(|i| Target {
                unit: i,
                device: 10 + i,
                service: format!("http://svc-{}", i),
                kind: UnitKind::Data,
                state: DeviceState::Online,
            })
            .collect()
    }

    #[test]
    fn test_first_success_retries_in_group_order() {
        let group = targets(3);
        let mut item: ItemTracker<Vec<u8>> = ItemTracker::first_success(group.clone());
        assert_eq!(item.start(), vec![group[0].clone()]);
        assert_eq!(item.state(), ItemState::Collecting);

        assert_eq!(
            item.on_reply(&group[0], Err(DixError::NotFound)),
            Verdict::Retry(group[1].clone())
        );
        assert_eq!(item.state(), ItemState::DegradedRetry);
        assert_eq!(item.on_reply(&group[1], Ok(b"v".to_vec())), Verdict::Done);
        assert_eq!(item.state(), ItemState::Satisfied);
        assert_eq!(item.acked(), &group[1..2]);
        assert_eq!(item.into_result(), Ok(b"v".to_vec()));
    }

    #[test]
    fn test_exhausted_group_fails_with_not_found() {
        let group = targets(3);
        let mut item: ItemTracker<Vec<u8>> = ItemTracker::first_success(group.clone());
        item.start();
        assert_eq!(
            item.on_reply(&group[0], Err(DixError::NotFound)),
            Verdict::Retry(group[1].clone())
        );
        assert_eq!(
            item.on_reply(&group[1], Err(DixError::NotFound)),
            Verdict::Retry(group[2].clone())
        );
        assert_eq!(item.on_reply(&group[2], Err(DixError::NotFound)), Verdict::Done);
        assert_eq!(item.into_result(), Err(DixError::NotFound));
    }

    #[test]
    fn test_non_retryable_error_stops_reads() {
        let group = targets(3);
        let mut item: ItemTracker<Vec<u8>> = ItemTracker::first_success(group.clone());
        item.start();
        assert_eq!(item.on_reply(&group[0], Err(DixError::AlreadyExists)), Verdict::Done);
        assert_eq!(item.into_result(), Err(DixError::AlreadyExists));
    }

    #[test]
    fn test_first_error_is_kept() {
        let group = targets(2);
        let mut item: ItemTracker<Vec<u8>> = ItemTracker::first_success(group.clone());
        item.start();
        item.on_reply(&group[0], Err(DixError::Transport("reset".into())));
        item.on_reply(&group[1], Err(DixError::NotFound));
        assert_eq!(item.into_result(), Err(DixError::Transport("reset".into())));
    }

    #[test]
    fn test_all_targets_needs_every_reply() {
        let group = targets(3);
        let mut item: ItemTracker<()> = ItemTracker::all_targets(group.clone());
        assert_eq!(item.start().len(), 3);
        assert_eq!(item.on_reply(&group[2], Ok(())), Verdict::Wait);
        assert_eq!(item.on_reply(&group[0], Ok(())), Verdict::Wait);
        assert_eq!(item.on_reply(&group[1], Ok(())), Verdict::Done);
        assert_eq!(item.acked().len(), 3);
        assert_eq!(item.into_result(), Ok(()));
    }

    #[test]
    fn test_all_targets_collects_every_reply_before_failing() {
        let group = targets(3);
        let mut item: ItemTracker<()> = ItemTracker::all_targets(group.clone());
        item.start();
        assert_eq!(item.on_reply(&group[0], Ok(())), Verdict::Wait);
        assert_eq!(
            item.on_reply(&group[1], Err(DixError::ResourceExhausted)),
            Verdict::Wait
        );
        assert_eq!(item.state(), ItemState::Collecting);
        assert_eq!(item.on_reply(&group[2], Ok(())), Verdict::Done);
        assert_eq!(item.state(), ItemState::Failed);
        assert_eq!(item.acked(), &[group[0].clone(), group[2].clone()]);
        assert_eq!(item.on_reply(&group[1], Err(DixError::AlreadyExists)), Verdict::Ignored);
        assert_eq!(item.into_result(), Err(DixError::ResourceExhausted));
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let group = targets(2);
        let mut item: ItemTracker<Vec<u8>> = ItemTracker::first_success(group.clone());
        item.start();
        assert_eq!(item.on_reply(&group[0], Ok(b"a".to_vec())), Verdict::Done);
        assert_eq!(item.on_reply(&group[1], Ok(b"b".to_vec())), Verdict::Ignored);
        assert_eq!(item.on_reply(&group[1], Err(DixError::NotFound)), Verdict::Ignored);
        item.cancel();
        assert_eq!(item.state(), ItemState::Satisfied);
        assert_eq!(item.into_result(), Ok(b"a".to_vec()));
    }

    #[test]
    fn test_cancel_pending_item() {
        let group = targets(2);
        let mut item: ItemTracker<()> = ItemTracker::all_targets(group.clone());
        item.start();
        item.cancel();
        assert_eq!(item.on_reply(&group[0], Ok(())), Verdict::Ignored);
        assert!(item.acked().is_empty());
        assert_eq!(item.into_result(), Err(DixError::Cancelled));
    }

    #[test]
    fn test_empty_group_fails() {
        let mut item: ItemTracker<()> = ItemTracker::first_success(Vec::new());
        assert!(item.start().is_empty());
        assert!(matches!(item.into_result(), Err(DixError::Layout(_))));
    }

    #[test]
    fn test_quorum() {
        let ok: Result<(), DixError> = Ok(());
        let bad: Result<(), DixError> = Err(DixError::Unavailable { device: 3 });
        assert!(check_quorum(&[ok.clone(), bad.clone(), ok.clone()], 1).is_ok());
        assert_eq!(
            check_quorum(&[bad.clone(), bad, ok], 1),
            Err(DixError::Unavailable { device: 3 })
        );
    }
}
