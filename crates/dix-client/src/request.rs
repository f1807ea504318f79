//! Index requests
//!
//! A [`DixRequest`] carries one operation over a batch of items. Posting an
//! operation validates its arguments, then hands execution to a background
//! task; [`DixRequest::wait`] suspends until the request is final.
//!
//! ```text
//! Initialised -> Executing -> Final
//!                          -> Failed
//! ```
//!
//! `Final` means every item has its own outcome, which may still be an
//! error. `Failed` means the request as a whole could not run, or was
//! cancelled.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use dix_core::{IndexId, IndexLayout, LayoutDescriptor, OpKind, Record};

use crate::client::ClientInner;
use crate::error::{DixError, Result};
use crate::exec::{self, ItemReply, Operation, Outcome};
use crate::merge::NextWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReqState {
    Initialised,
    Executing,
    Final,
    Failed,
}

impl ReqState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReqState::Final | ReqState::Failed)
    }
}

impl fmt::Display for ReqState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReqState::Initialised => write!(f, "initialised"),
            ReqState::Executing => write!(f, "executing"),
            ReqState::Final => write!(f, "final"),
            ReqState::Failed => write!(f, "failed"),
        }
    }
}

/// An index as handed to a request
///
/// Without a layout the client looks the index up in the layout
/// meta-index; a layout id is resolved through the descriptor meta-index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DixIndex {
    pub id: IndexId,
    pub layout: Option<IndexLayout>,
}

impl DixIndex {
    pub fn new(id: IndexId) -> Self {
        Self { id, layout: None }
    }

    pub fn with_layout(mut self, layout: IndexLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn with_descriptor(self, descr: LayoutDescriptor) -> Self {
        self.with_layout(IndexLayout::Descr(descr))
    }

    pub fn with_layout_id(self, id: u64) -> Self {
        self.with_layout(IndexLayout::ById(id))
    }
}

/// One operation over a batch of items
///
/// Dropping a request cancels whatever is still outstanding.
pub struct DixRequest {
    inner: Arc<ClientInner>,
    kind: Option<OpKind>,
    state: watch::Receiver<ReqState>,
    state_tx: Option<watch::Sender<ReqState>>,
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<Outcome>>,
    outcome: Option<Settled>,
}

/// Outcome split into status and movable replies
struct Settled {
    state: ReqState,
    generic: std::result::Result<(), DixError>,
    statuses: Vec<std::result::Result<(), DixError>>,
    replies: Vec<Option<ItemReply>>,
}

impl From<Outcome> for Settled {
    fn from(outcome: Outcome) -> Self {
        let mut statuses = Vec::with_capacity(outcome.items.len());
        let mut replies = Vec::with_capacity(outcome.items.len());
        for item in outcome.items {
            match item {
                Ok(reply) => {
                    statuses.push(Ok(()));
                    replies.push(Some(reply));
                }
                Err(e) => {
                    statuses.push(Err(e));
                    replies.push(None);
                }
            }
        }
        Self {
            state: outcome.state,
            generic: outcome.generic,
            statuses,
            replies,
        }
    }
}

impl DixRequest {
    pub(crate) fn new(inner: Arc<ClientInner>) -> Self {
        let (state_tx, state) = watch::channel(ReqState::Initialised);
        let (cancel, _) = watch::channel(false);
        Self {
            inner,
            kind: None,
            state,
            state_tx: Some(state_tx),
            cancel,
            task: None,
            outcome: None,
        }
    }

    /// Create the component catalogues of `indices`
    ///
    /// Layouts given with the indices are recorded in the layout meta-index
    /// when the client has one.
    pub fn create(&mut self, indices: Vec<DixIndex>) -> Result<()> {
        non_empty(&indices, "index list")?;
        self.post(Operation::Create(indices))
    }

    /// Delete the component catalogues of `indices`
    pub fn delete(&mut self, indices: Vec<DixIndex>) -> Result<()> {
        non_empty(&indices, "index list")?;
        self.post(Operation::Delete(indices))
    }

    /// Check that every component catalogue of `indices` exists
    pub fn lookup(&mut self, indices: Vec<DixIndex>) -> Result<()> {
        non_empty(&indices, "index list")?;
        self.post(Operation::Lookup(indices))
    }

    /// List up to `count` known indices from `start` on
    pub fn list(&mut self, start: IndexId, count: u32) -> Result<()> {
        if count == 0 {
            return Err(DixError::InvalidArgument("list count is zero".into()));
        }
        self.post(Operation::List { start, count })
    }

    /// Insert records; with `overwrite` existing values are replaced
    pub fn put(&mut self, index: &DixIndex, records: Vec<Record>, overwrite: bool) -> Result<()> {
        non_empty(&records, "record list")?;
        self.post(Operation::Put {
            index: index.clone(),
            records,
            overwrite,
        })
    }

    pub fn get(&mut self, index: &DixIndex, keys: Vec<Vec<u8>>) -> Result<()> {
        non_empty(&keys, "key list")?;
        self.post(Operation::Get {
            index: index.clone(),
            keys,
        })
    }

    /// Scan up to `counts[i]` records from each `start_keys[i]` on
    pub fn next(
        &mut self,
        index: &DixIndex,
        start_keys: Vec<Vec<u8>>,
        counts: Vec<u32>,
    ) -> Result<()> {
        non_empty(&start_keys, "start key list")?;
        if start_keys.len() != counts.len() {
            return Err(DixError::InvalidArgument(format!(
                "{} start keys but {} counts",
                start_keys.len(),
                counts.len()
            )));
        }
        if counts.contains(&0) {
            return Err(DixError::InvalidArgument("record count is zero".into()));
        }
        let mut seen = HashSet::with_capacity(start_keys.len());
        if !start_keys.iter().all(|k| seen.insert(k.as_slice())) {
            return Err(DixError::InvalidArgument("duplicate start keys".into()));
        }
        self.post(Operation::Next {
            index: index.clone(),
            start_keys,
            counts,
        })
    }

    pub fn del(&mut self, index: &DixIndex, keys: Vec<Vec<u8>>) -> Result<()> {
        non_empty(&keys, "key list")?;
        self.post(Operation::Del {
            index: index.clone(),
            keys,
        })
    }

    fn post(&mut self, op: Operation) -> Result<()> {
        let Some(state_tx) = self.state_tx.take() else {
            return Err(DixError::InvalidArgument("request already posted".into()));
        };
        let kind = op.kind();
        tracing::debug!(op = %kind, items = op.item_count(), "posting request");

        self.kind = Some(kind);
        state_tx.send_replace(ReqState::Executing);
        let inner = self.inner.clone();
        let cancel = self.cancel.subscribe();
        self.task = Some(tokio::spawn(async move {
            let outcome = exec::execute(inner, op, cancel).await;
            state_tx.send_replace(outcome.state);
            outcome
        }));
        Ok(())
    }

    /// Current state, without blocking
    pub fn state(&self) -> ReqState {
        match &self.outcome {
            Some(settled) => settled.state,
            None => *self.state.borrow(),
        }
    }

    pub fn kind(&self) -> Option<OpKind> {
        self.kind
    }

    /// Wait until the request is `Final` or `Failed`
    ///
    /// Returns immediately for a request that was never posted.
    pub async fn wait(&mut self) -> ReqState {
        if let Some(task) = self.task.as_mut() {
            let joined = task.await;
            self.settle(joined);
        }
        self.state()
    }

    /// Like [`DixRequest::wait`], giving up after `deadline`
    ///
    /// `None` when the deadline passed first; the request keeps running.
    pub async fn wait_timeout(&mut self, deadline: Duration) -> Option<ReqState> {
        if let Some(task) = self.task.as_mut() {
            match tokio::time::timeout(deadline, task).await {
                Ok(joined) => self.settle(joined),
                Err(_) => return None,
            }
        }
        Some(self.state())
    }

    fn settle(&mut self, joined: std::result::Result<Outcome, tokio::task::JoinError>) {
        self.task = None;
        let outcome = joined.unwrap_or_else(|e| {
            tracing::error!(error = %e, "request task failed");
            Outcome::failed(DixError::Protocol(format!("request task failed: {}", e)), 0)
        });
        self.outcome = Some(outcome.into());
    }

    /// Abort outstanding work; items not yet done end up `Cancelled`
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    fn settled(&self) -> Result<&Settled> {
        self.outcome.as_ref().ok_or(DixError::NotComplete)
    }

    /// Overall result: `Ok` only if every item succeeded
    pub fn generic_result(&self) -> Result<()> {
        self.settled()?.generic.clone()
    }

    pub fn item_count(&self) -> usize {
        self.outcome.as_ref().map_or(0, |s| s.statuses.len())
    }

    /// Result of item `i`
    pub fn item_result(&self, i: usize) -> Result<()> {
        let settled = self.settled()?;
        settled
            .statuses
            .get(i)
            .cloned()
            .unwrap_or_else(|| Err(DixError::InvalidArgument(format!("no item {}", i))))
    }

    /// Values of a GET, moved out of the request
    pub fn take_get_replies(&mut self) -> Result<Vec<Result<Vec<u8>>>> {
        self.take_replies(OpKind::Get, |reply| match reply {
            ItemReply::Value(v) => Ok(v),
            _ => Err(DixError::Protocol("not a value".into())),
        })
    }

    /// Windows of a NEXT, one per start key, moved out of the request
    pub fn take_next_replies(&mut self) -> Result<Vec<Result<NextWindow>>> {
        self.take_replies(OpKind::Next, |reply| match reply {
            ItemReply::Window(w) => Ok(w),
            _ => Err(DixError::Protocol("not a window".into())),
        })
    }

    /// Indices found by a LIST
    pub fn take_indices(&mut self) -> Result<Vec<IndexId>> {
        self.take_replies(OpKind::List, |reply| match reply {
            ItemReply::Index(id) => Ok(id),
            _ => Err(DixError::Protocol("not an index".into())),
        })?
        .into_iter()
        .collect()
    }

    fn take_replies<T>(
        &mut self,
        kind: OpKind,
        convert: impl Fn(ItemReply) -> Result<T>,
    ) -> Result<Vec<Result<T>>> {
        if self.kind != Some(kind) {
            return Err(DixError::InvalidArgument(format!(
                "request is not a {} request",
                kind
            )));
        }
        let settled = self.outcome.as_mut().ok_or(DixError::NotComplete)?;
        if settled.replies.iter().all(Option::is_none)
            && settled.statuses.iter().any(Result::is_ok)
        {
            return Err(DixError::InvalidArgument("replies already taken".into()));
        }
        Ok(settled
            .statuses
            .iter()
            .zip(settled.replies.iter_mut())
            .map(|(status, reply)| match (status, reply.take()) {
                (Err(e), _) => Err(e.clone()),
                (Ok(()), Some(reply)) => convert(reply),
                (Ok(()), None) => Err(DixError::Protocol("reply missing".into())),
            })
            .collect())
    }
}

impl Drop for DixRequest {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.cancel.send_replace(true);
        }
    }
}

fn non_empty<T>(items: &[T], what: &str) -> Result<()> {
    if items.is_empty() {
        return Err(DixError::InvalidArgument(format!("empty {}", what)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{CatalogueTransport, TransportError};
    use crate::DixClient;
    use async_trait::async_trait;
    use dix_core::{CasReply, CasRequest, HashFunction, Imask, PoolMap, PoolVersion};

    struct Unreachable;

    #[async_trait]
    impl CatalogueTransport for Unreachable {
        async fn execute(
            &self,
            service: &str,
            _request: CasRequest,
        ) -> std::result::Result<CasReply, TransportError> {
            Err(TransportError::Connect {
                service: service.to_string(),
                message: "refused".into(),
            })
        }
    }

    fn client() -> DixClient {
        let pool = (0..3).fold(PoolVersion::new(1, 1, 1), |p, i| {
            p.with_device(format!("http://svc-{}", i))
        });
        DixClient::builder()
            .pools(PoolMap::new().with_version(pool))
            .transport(Arc::new(Unreachable))
            .build()
            .unwrap()
    }

    fn index() -> DixIndex {
        DixIndex::new(IndexId::new(1, 1)).with_descriptor(LayoutDescriptor::new(
            1,
            HashFunction::Fnv1,
            Imask::empty(),
        ))
    }

    #[tokio::test]
    async fn test_rejects_empty_batches() {
        let client = client();
        let mut req = client.request();
        assert!(matches!(req.get(&index(), vec![]), Err(DixError::InvalidArgument(_))));
        assert!(matches!(req.create(vec![]), Err(DixError::InvalidArgument(_))));
        assert!(matches!(req.list(IndexId::new(0, 0), 0), Err(DixError::InvalidArgument(_))));
        assert_eq!(req.state(), ReqState::Initialised);
    }

    #[tokio::test]
    async fn test_rejects_bad_next_arguments() {
        let client = client();
        let mut req = client.request();
        assert!(matches!(
            req.next(&index(), vec![vec![1], vec![2]], vec![1]),
            Err(DixError::InvalidArgument(_))
        ));
        assert!(matches!(
            req.next(&index(), vec![vec![1]], vec![0]),
            Err(DixError::InvalidArgument(_))
        ));
        assert!(matches!(
            req.next(&index(), vec![vec![1], vec![1]], vec![1, 1]),
            Err(DixError::InvalidArgument(_))
        ));
        assert_eq!(req.state(), ReqState::Initialised);
    }

    #[tokio::test]
    async fn test_results_before_completion() {
        let client = client();
        let req = client.request();
        assert_eq!(req.generic_result(), Err(DixError::NotComplete));
        assert_eq!(req.item_result(0), Err(DixError::NotComplete));
        assert_eq!(req.item_count(), 0);
    }

    #[tokio::test]
    async fn test_post_once() {
        let client = client();
        let mut req = client.request();
        req.get(&index(), vec![vec![1]]).unwrap();
        assert!(matches!(req.del(&index(), vec![vec![1]]), Err(DixError::InvalidArgument(_))));
        assert_eq!(req.kind(), Some(OpKind::Get));
    }

    #[tokio::test]
    async fn test_unreachable_services() {
        let client = client();
        let mut req = client.request();
        req.get(&index(), vec![vec![1], vec![2]]).unwrap();
        assert_eq!(req.wait().await, ReqState::Final);
        assert!(matches!(req.item_result(0), Err(DixError::Transport(_))));
        assert!(matches!(req.generic_result(), Err(DixError::Transport(_))));

        let replies = req.take_get_replies().unwrap();
        assert_eq!(replies.len(), 2);
        assert!(matches!(req.take_next_replies(), Err(DixError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_wait_unposted() {
        let client = client();
        let mut req = client.request();
        assert_eq!(req.wait().await, ReqState::Initialised);
    }
}
