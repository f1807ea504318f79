//! Request execution
//!
//! The executor owns one request from layout discovery to the final item
//! outcomes. Items bound for the same device are batched into one catalogue
//! request per round; retries form new rounds.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

use dix_core::meta::{self, decode_descr, decode_index_key, decode_layout, layout_id_key};
use dix_core::{
    CasReply, CasRequest, CatalogueId, IndexId, IndexLayout, LayoutDescriptor, OpKind, Record,
    Target, TargetRouter, LAYOUT_INDEX, LDESCR_INDEX,
};

use crate::client::ClientInner;
use crate::controller::{check_quorum, ItemState, ItemTracker, Verdict};
use crate::driver::{Completion, Dispatch, Driver};
use crate::error::DixError;
use crate::merge::{NextResultSet, NextWindow, TargetWindows};
use crate::request::{DixIndex, ReqState};

/// A posted operation with its inputs
#[derive(Debug)]
pub(crate) enum Operation {
    Create(Vec<DixIndex>),
    Delete(Vec<DixIndex>),
    Lookup(Vec<DixIndex>),
    List {
        start: IndexId,
        count: u32,
    },
    Put {
        index: DixIndex,
        records: Vec<Record>,
        overwrite: bool,
    },
    Get {
        index: DixIndex,
        keys: Vec<Vec<u8>>,
    },
    Next {
        index: DixIndex,
        start_keys: Vec<Vec<u8>>,
        counts: Vec<u32>,
    },
    Del {
        index: DixIndex,
        keys: Vec<Vec<u8>>,
    },
}

impl Operation {
    pub(crate) fn kind(&self) -> OpKind {
        match self {
            Operation::Create(_) => OpKind::Create,
            Operation::Delete(_) => OpKind::Delete,
            Operation::Lookup(_) => OpKind::Lookup,
            Operation::List { .. } => OpKind::List,
            Operation::Put { .. } => OpKind::Put,
            Operation::Get { .. } => OpKind::Get,
            Operation::Next { .. } => OpKind::Next,
            Operation::Del { .. } => OpKind::Del,
        }
    }

    pub(crate) fn item_count(&self) -> usize {
        match self {
            Operation::Create(indices)
            | Operation::Delete(indices)
            | Operation::Lookup(indices) => indices.len(),
            Operation::List { .. } => 0,
            Operation::Put { records, .. } => records.len(),
            Operation::Get { keys, .. } | Operation::Del { keys, .. } => keys.len(),
            Operation::Next { start_keys, .. } => start_keys.len(),
        }
    }
}

/// Successful result of one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ItemReply {
    Done,
    Value(Vec<u8>),
    Window(NextWindow),
    Index(IndexId),
}

/// Terminal result of a request
#[derive(Debug)]
pub(crate) struct Outcome {
    pub state: ReqState,
    pub generic: Result<(), DixError>,
    pub items: Vec<Result<ItemReply, DixError>>,
}

impl Outcome {
    /// The whole request failed before item results existed
    pub(crate) fn failed(err: DixError, items: usize) -> Self {
        Self {
            state: ReqState::Failed,
            generic: Err(err.clone()),
            items: (0..items).map(|_| Err(err.clone())).collect(),
        }
    }
}

/// Per-item payload carried in a catalogue reply
pub(crate) trait ItemPayload: Sized + Send {
    /// Split a reply into one result per item it carries
    fn split(reply: CasReply, items: usize) -> Vec<Result<Self, DixError>>;
}

fn unexpected<T>(items: usize) -> Vec<Result<T, DixError>> {
    (0..items)
        .map(|_| Err(DixError::Protocol("reply does not match request".into())))
        .collect()
}

impl ItemPayload for () {
    fn split(reply: CasReply, items: usize) -> Vec<Result<Self, DixError>> {
        match reply {
            CasReply::Status { results } if results.len() == items => {
                results.into_iter().map(|r| r.map_err(DixError::from)).collect()
            }
            _ => unexpected(items),
        }
    }
}

impl ItemPayload for Vec<u8> {
    fn split(reply: CasReply, items: usize) -> Vec<Result<Self, DixError>> {
        match reply {
            CasReply::Values { results } if results.len() == items => results
                .into_iter()
                .map(|r| r.map(|record| record.val).map_err(DixError::from))
                .collect(),
            _ => unexpected(items),
        }
    }
}

impl ItemPayload for TargetWindows {
    fn split(reply: CasReply, items: usize) -> Vec<Result<Self, DixError>> {
        match reply {
            CasReply::Next { windows } if items == 1 => vec![Ok(windows)],
            _ => unexpected(items),
        }
    }
}

/// Items grouped by destination device
#[derive(Default)]
struct Batches {
    by_device: BTreeMap<(String, u32), (Target, Vec<usize>)>,
}

impl Batches {
    fn add(&mut self, target: Target, position: usize) {
        self.by_device
            .entry((target.service.clone(), target.device))
            .or_insert_with(|| (target, Vec::new()))
            .1
            .push(position);
    }
}

/// Resolves once cancellation is requested or the requester is gone
async fn cancel_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

pub(crate) struct Executor {
    router: TargetRouter,
    driver: Driver,
    cancel: watch::Receiver<bool>,
    cancelled: bool,
    meta_layout: Option<Arc<LayoutDescriptor>>,
}

/// Run `op` to completion
pub(crate) async fn execute(
    inner: Arc<ClientInner>,
    op: Operation,
    cancel: watch::Receiver<bool>,
) -> Outcome {
    let kind = op.kind();
    let items = op.item_count();
    let started = Instant::now();
    let mut exec = Executor::new(&inner, cancel);

    let outcome = match op {
        Operation::Create(indices) => exec.create(indices).await,
        Operation::Delete(indices) => exec.delete(indices).await,
        Operation::Lookup(indices) => exec.lookup(indices).await,
        Operation::List { start, count } => exec.list(start, count).await,
        Operation::Put {
            index,
            records,
            overwrite,
        } => exec.put(index, records, overwrite).await,
        Operation::Get { index, keys } => exec.get(index, keys).await,
        Operation::Next {
            index,
            start_keys,
            counts,
        } => exec.next(index, start_keys, counts).await,
        Operation::Del { index, keys } => exec.del(index, keys).await,
    };

    let failed_items = outcome.items.iter().filter(|r| r.is_err()).count();
    tracing::debug!(
        op = %kind,
        items,
        failed_items,
        state = %outcome.state,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request finished"
    );
    outcome
}

impl Executor {
    pub(crate) fn new(inner: &ClientInner, cancel: watch::Receiver<bool>) -> Self {
        Self {
            router: TargetRouter::new(inner.pools.load_full()),
            driver: Driver::new(inner.transport.clone(), inner.timeout),
            cancel,
            cancelled: false,
            meta_layout: inner.meta_layout.clone(),
        }
    }

    async fn create(&mut self, indices: Vec<DixIndex>) -> Outcome {
        let descrs = self.discover(&indices).await;
        let trackers = self.index_op(OpKind::Create, &indices, descrs).await;
        self.undo_partial_create(&indices, &trackers).await;
        let mut results: Vec<_> = trackers
            .into_iter()
            .map(ItemTracker::into_result)
            .collect();

        if let Some(meta_layout) = self.meta_layout.clone() {
            let mut positions = Vec::new();
            let mut records = Vec::new();
            for (pos, index) in indices.iter().enumerate() {
                let Some(layout) = &index.layout else { continue };
                if index.id.is_meta() || results[pos].is_err() {
                    continue;
                }
                match meta::encode_layout(layout) {
                    Ok(val) => {
                        positions.push(pos);
                        records.push(Record::new(index.id.to_bytes().to_vec(), val));
                    }
                    Err(e) => results[pos] = Err(e.into()),
                }
            }
            if !records.is_empty() {
                let stored = self.put_records(meta_layout, LAYOUT_INDEX, &records, true).await;
                for (pos, r) in positions.into_iter().zip(stored) {
                    if let Err(e) = r {
                        results[pos] = Err(e);
                    }
                }
            }
        }
        self.finish(results.into_iter().map(|r| r.map(|_| ItemReply::Done)).collect())
    }

    async fn delete(&mut self, indices: Vec<DixIndex>) -> Outcome {
        let descrs = self.discover(&indices).await;
        let results: Vec<_> = self
            .index_op(OpKind::Delete, &indices, descrs)
            .await
            .into_iter()
            .map(ItemTracker::into_result)
            .collect();

        if let Some(meta_layout) = self.meta_layout.clone() {
            let keys: Vec<Vec<u8>> = indices
                .iter()
                .zip(&results)
                .filter(|(index, r)| r.is_ok() && !index.id.is_meta())
                .map(|(index, _)| index.id.to_bytes().to_vec())
                .collect();
            if !keys.is_empty() {
                for r in self.del_keys(meta_layout, LAYOUT_INDEX, &keys).await {
                    match r {
                        Err(e) if !e.is_not_found() => {
                            tracing::warn!(error = %e, "failed to remove layout record")
                        }
                        _ => {}
                    }
                }
            }
        }
        self.finish(results.into_iter().map(|r| r.map(|_| ItemReply::Done)).collect())
    }

    async fn lookup(&mut self, indices: Vec<DixIndex>) -> Outcome {
        let descrs = self.discover(&indices).await;
        let results: Vec<_> = self
            .index_op(OpKind::Lookup, &indices, descrs)
            .await
            .into_iter()
            .map(ItemTracker::into_result)
            .collect();
        self.finish(results.into_iter().map(|r| r.map(|_| ItemReply::Done)).collect())
    }

    async fn list(&mut self, start: IndexId, count: u32) -> Outcome {
        let Some(meta_layout) = self.meta_layout.clone() else {
            return Outcome::failed(DixError::Layout("no meta layout configured".into()), 0);
        };
        let window = match self
            .next_windows(meta_layout, LAYOUT_INDEX, &[start.to_bytes().to_vec()], &[count])
            .await
            .map(|mut w| w.pop())
        {
            Ok(Some(window)) => window,
            Ok(None) => return Outcome::failed(DixError::Protocol("empty scan".into()), 0),
            Err(e) => return Outcome::failed(e, 0),
        };
        if let Some(err) = window.terminal.as_ref().filter(|e| !e.is_not_found()) {
            if window.records.is_empty() {
                return Outcome::failed(err.clone(), 0);
            }
        }
        let items = window
            .records
            .iter()
            .map(|r| {
                decode_index_key(&r.key)
                    .map(ItemReply::Index)
                    .map_err(DixError::from)
            })
            .collect();
        self.finish(items)
    }

    async fn put(&mut self, index: DixIndex, records: Vec<Record>, overwrite: bool) -> Outcome {
        let descr = match self.resolve_one(&index).await {
            Ok(d) => d,
            Err(e) => return Outcome::failed(e, records.len()),
        };
        let results = self.put_records(descr, index.id, &records, overwrite).await;
        self.finish(results.into_iter().map(|r| r.map(|_| ItemReply::Done)).collect())
    }

    async fn get(&mut self, index: DixIndex, keys: Vec<Vec<u8>>) -> Outcome {
        let descr = match self.resolve_one(&index).await {
            Ok(d) => d,
            Err(e) => return Outcome::failed(e, keys.len()),
        };
        let results = self.get_values(descr, index.id, &keys).await;
        self.finish(results.into_iter().map(|r| r.map(ItemReply::Value)).collect())
    }

    async fn next(
        &mut self,
        index: DixIndex,
        start_keys: Vec<Vec<u8>>,
        counts: Vec<u32>,
    ) -> Outcome {
        let descr = match self.resolve_one(&index).await {
            Ok(d) => d,
            Err(e) => return Outcome::failed(e, start_keys.len()),
        };
        match self.next_windows(descr, index.id, &start_keys, &counts).await {
            Ok(windows) => self.finish(
                windows
                    .into_iter()
                    .map(|w| Ok(ItemReply::Window(w)))
                    .collect(),
            ),
            Err(DixError::Cancelled) => Outcome::failed(DixError::Cancelled, start_keys.len()),
            Err(e) => self.finish((0..start_keys.len()).map(|_| Err(e.clone())).collect()),
        }
    }

    async fn del(&mut self, index: DixIndex, keys: Vec<Vec<u8>>) -> Outcome {
        let descr = match self.resolve_one(&index).await {
            Ok(d) => d,
            Err(e) => return Outcome::failed(e, keys.len()),
        };
        let results = self.del_keys(descr, index.id, &keys).await;
        self.finish(results.into_iter().map(|r| r.map(|_| ItemReply::Done)).collect())
    }

    fn finish(&self, items: Vec<Result<ItemReply, DixError>>) -> Outcome {
        if self.cancelled {
            return Outcome {
                state: ReqState::Failed,
                generic: Err(DixError::Cancelled),
                items,
            };
        }
        let generic = items
            .iter()
            .find_map(|r| r.as_ref().err().cloned())
            .map_or(Ok(()), Err);
        Outcome {
            state: ReqState::Final,
            generic,
            items,
        }
    }

    /// Layout descriptors of `indices`, looked up in the meta-indices where needed
    pub(crate) async fn discover(
        &mut self,
        indices: &[DixIndex],
    ) -> Vec<Result<Arc<LayoutDescriptor>, DixError>> {
        let mut out: Vec<Option<Result<Arc<LayoutDescriptor>, DixError>>> =
            vec![None; indices.len()];
        let mut by_index: Vec<(usize, IndexId)> = Vec::new();
        let mut by_id: Vec<(usize, u64)> = Vec::new();

        for (pos, index) in indices.iter().enumerate() {
            match &index.layout {
                Some(IndexLayout::Descr(d)) => out[pos] = Some(Ok(Arc::new(d.clone()))),
                Some(IndexLayout::ById(id)) => by_id.push((pos, *id)),
                None => by_index.push((pos, index.id)),
            }
        }

        if !by_index.is_empty() || !by_id.is_empty() {
            tracing::debug!(
                by_index = by_index.len(),
                by_id = by_id.len(),
                "discovering layouts"
            );
        }

        if !by_index.is_empty() {
            match self.meta_layout.clone() {
                None => {
                    for (pos, id) in &by_index {
                        out[*pos] = Some(Err(DixError::Layout(format!(
                            "no layout for {} and no meta layout configured",
                            id
                        ))));
                    }
                }
                Some(meta_layout) => {
                    let keys: Vec<Vec<u8>> = by_index
                        .iter()
                        .map(|(_, id)| id.to_bytes().to_vec())
                        .collect();
                    let values = self.get_values(meta_layout, LAYOUT_INDEX, &keys).await;
                    for ((pos, _), value) in by_index.iter().zip(values) {
                        match value.and_then(|v| decode_layout(&v).map_err(DixError::from)) {
                            Ok(IndexLayout::Descr(d)) => out[*pos] = Some(Ok(Arc::new(d))),
                            Ok(IndexLayout::ById(id)) => by_id.push((*pos, id)),
                            Err(e) => out[*pos] = Some(Err(e)),
                        }
                    }
                }
            }
        }

        if !by_id.is_empty() {
            match self.meta_layout.clone() {
                None => {
                    for (pos, id) in &by_id {
                        out[*pos] = Some(Err(DixError::Layout(format!(
                            "layout {} needs a meta layout to resolve",
                            id
                        ))));
                    }
                }
                Some(meta_layout) => {
                    let keys: Vec<Vec<u8>> =
                        by_id.iter().map(|(_, id)| layout_id_key(*id)).collect();
                    let values = self.get_values(meta_layout, LDESCR_INDEX, &keys).await;
                    for ((pos, _), value) in by_id.iter().zip(values) {
                        out[*pos] = Some(
                            value
                                .and_then(|v| decode_descr(&v).map_err(DixError::from))
                                .map(Arc::new),
                        );
                    }
                }
            }
        }

        out.into_iter()
            .map(|o| o.unwrap_or_else(|| Err(DixError::Protocol("layout not resolved".into()))))
            .collect()
    }

    async fn resolve_one(&mut self, index: &DixIndex) -> Result<Arc<LayoutDescriptor>, DixError> {
        let resolved = self.discover(std::slice::from_ref(index)).await.pop();
        if self.cancelled {
            return Err(DixError::Cancelled);
        }
        resolved.unwrap_or_else(|| Err(DixError::Protocol("layout not resolved".into())))
    }

    /// Create, delete or look up the component catalogues of indices
    async fn index_op(
        &mut self,
        kind: OpKind,
        indices: &[DixIndex],
        descrs: Vec<Result<Arc<LayoutDescriptor>, DixError>>,
    ) -> Vec<ItemTracker<()>> {
        let mut trackers: Vec<ItemTracker<()>> = descrs
            .into_iter()
            .map(|descr| {
                match descr.and_then(|d| self.router.instance(d).map_err(DixError::from)) {
                    Ok(inst) => ItemTracker::all_targets(inst.all_targets()),
                    Err(e) => {
                        let mut tracker = ItemTracker::all_targets(Vec::new());
                        tracker.fail(e);
                        tracker
                    }
                }
            })
            .collect();

        let ids: Vec<IndexId> = indices.iter().map(|index| index.id).collect();
        self.catalogue_op(kind, &ids, &mut trackers).await;
        trackers
    }

    async fn catalogue_op(
        &mut self,
        kind: OpKind,
        ids: &[IndexId],
        trackers: &mut [ItemTracker<()>],
    ) {
        self.fan_out(trackers, |target, positions| {
            let catalogues = positions
                .iter()
                .map(|&p| CatalogueId::new(ids[p], target.device))
                .collect();
            match kind {
                OpKind::Create => CasRequest::Create { catalogues },
                OpKind::Delete => CasRequest::Delete { catalogues },
                _ => CasRequest::Lookup { catalogues },
            }
        })
        .await;
    }

    /// Delete the catalogues of failed creates from the devices that accepted them
    async fn undo_partial_create(&mut self, indices: &[DixIndex], trackers: &[ItemTracker<()>]) {
        let (ids, mut undo): (Vec<IndexId>, Vec<ItemTracker<()>>) = indices
            .iter()
            .zip(trackers)
            .filter(|(_, t)| t.state() == ItemState::Failed && !t.acked().is_empty())
            .map(|(index, t)| (index.id, ItemTracker::all_targets(t.acked().to_vec())))
            .unzip();
        if ids.is_empty() {
            return;
        }

        tracing::debug!(items = ids.len(), "undoing partially created indices");
        self.catalogue_op(OpKind::Delete, &ids, &mut undo).await;
        for (id, tracker) in ids.iter().zip(undo) {
            if let Err(e) = tracker.into_result() {
                tracing::warn!(index = %id, error = %e, "failed to undo partial create");
            }
        }
    }

    /// Store records on every storing unit of their groups
    pub(crate) async fn put_records(
        &mut self,
        descr: Arc<LayoutDescriptor>,
        index: IndexId,
        records: &[Record],
        overwrite: bool,
    ) -> Vec<Result<(), DixError>> {
        let inst = match self.router.instance(descr) {
            Ok(inst) => inst,
            Err(e) => return fail_all(records.len(), e.into()),
        };
        let mut trackers: Vec<ItemTracker<()>> = records
            .iter()
            .map(|r| ItemTracker::all_targets(inst.locate(&r.key).storing().to_vec()))
            .collect();

        self.fan_out(&mut trackers, |target, positions| CasRequest::Put {
            catalogue: CatalogueId::new(index, target.device),
            records: positions.iter().map(|&p| records[p].clone()).collect(),
            overwrite,
        })
        .await;
        trackers.into_iter().map(ItemTracker::into_result).collect()
    }

    /// Fetch values, walking each key's group until a unit has it
    pub(crate) async fn get_values(
        &mut self,
        descr: Arc<LayoutDescriptor>,
        index: IndexId,
        keys: &[Vec<u8>],
    ) -> Vec<Result<Vec<u8>, DixError>> {
        let inst = match self.router.instance(descr) {
            Ok(inst) => inst,
            Err(e) => return fail_all(keys.len(), e.into()),
        };
        let mut trackers: Vec<ItemTracker<Vec<u8>>> = keys
            .iter()
            .map(|k| ItemTracker::first_success(inst.locate(k).targets().to_vec()))
            .collect();

        self.fan_out(&mut trackers, |target, positions| CasRequest::Get {
            catalogue: CatalogueId::new(index, target.device),
            keys: positions.iter().map(|&p| keys[p].clone()).collect(),
        })
        .await;
        trackers.into_iter().map(ItemTracker::into_result).collect()
    }

    /// Remove keys from every storing unit of their groups
    pub(crate) async fn del_keys(
        &mut self,
        descr: Arc<LayoutDescriptor>,
        index: IndexId,
        keys: &[Vec<u8>],
    ) -> Vec<Result<(), DixError>> {
        let inst = match self.router.instance(descr) {
            Ok(inst) => inst,
            Err(e) => return fail_all(keys.len(), e.into()),
        };
        let mut trackers: Vec<ItemTracker<()>> = keys
            .iter()
            .map(|k| ItemTracker::all_targets(inst.locate(k).storing().to_vec()))
            .collect();

        self.fan_out(&mut trackers, |target, positions| CasRequest::Del {
            catalogue: CatalogueId::new(index, target.device),
            keys: positions.iter().map(|&p| keys[p].clone()).collect(),
        })
        .await;
        trackers.into_iter().map(ItemTracker::into_result).collect()
    }

    /// Scan every device of the pool and merge the replies per start key
    ///
    /// Up to `K` devices may fail; their records are expected to be
    /// replicated elsewhere.
    pub(crate) async fn next_windows(
        &mut self,
        descr: Arc<LayoutDescriptor>,
        index: IndexId,
        start_keys: &[Vec<u8>],
        counts: &[u32],
    ) -> Result<Vec<NextWindow>, DixError> {
        let inst = self.router.instance(descr)?;
        let tolerated = inst.pool().k as usize;
        let mut trackers: Vec<ItemTracker<TargetWindows>> = inst
            .all_targets()
            .into_iter()
            .map(|t| ItemTracker::first_success(vec![t]))
            .collect();

        self.fan_out(&mut trackers, |target, _positions| CasRequest::Next {
            catalogue: CatalogueId::new(index, target.device),
            start_keys: start_keys.to_vec(),
            counts: counts.to_vec(),
        })
        .await;
        if self.cancelled {
            return Err(DixError::Cancelled);
        }

        let results: Vec<Result<TargetWindows, DixError>> =
            trackers.into_iter().map(ItemTracker::into_result).collect();
        check_quorum(&results, tolerated)?;

        let mut set = NextResultSet::new(counts.to_vec(), results.len());
        for (pos, result) in results.into_iter().enumerate() {
            if let Ok(windows) = result {
                set.set_reply(pos, windows);
            }
        }
        Ok(set.merge())
    }

    /// Drive the trackers until every item is terminal
    async fn fan_out<T, F>(&mut self, trackers: &mut [ItemTracker<T>], build: F)
    where
        T: ItemPayload,
        F: Fn(&Target, &[usize]) -> CasRequest,
    {
        if self.cancelled {
            trackers.iter_mut().for_each(ItemTracker::cancel);
            return;
        }

        let mut batches = Batches::default();
        for (pos, tracker) in trackers.iter_mut().enumerate() {
            for target in tracker.start() {
                batches.add(target, pos);
            }
        }
        self.flush(batches, &build);

        while !self.cancelled && !trackers.iter().all(|t| t.is_terminal()) {
            let completion = tokio::select! {
                biased;
                _ = cancel_requested(&mut self.cancel) => {
                    tracing::debug!(outstanding = self.driver.outstanding(), "request cancelled");
                    self.cancelled = true;
                    break;
                }
                completion = self.driver.next_completion() => completion,
            };
            let Some(completion) = completion else { break };

            let mut retries = Batches::default();
            absorb(trackers, completion, &mut retries);
            self.flush(retries, &build);
        }

        if self.cancelled {
            trackers.iter_mut().for_each(ItemTracker::cancel);
        } else {
            for tracker in trackers.iter_mut() {
                tracker.fail(DixError::Protocol("no reply for item".into()));
            }
        }
        self.driver.cancel_all();
    }

    fn flush<F>(&mut self, batches: Batches, build: &F)
    where
        F: Fn(&Target, &[usize]) -> CasRequest,
    {
        for (_, (target, positions)) in batches.by_device {
            let request = build(&target, &positions);
            self.driver.issue(Dispatch {
                target,
                positions,
                request,
            });
        }
    }
}

/// Feed one completion to the trackers of the items it carried
fn absorb<T: ItemPayload>(
    trackers: &mut [ItemTracker<T>],
    completion: Completion,
    retries: &mut Batches,
) {
    let Completion {
        target,
        positions,
        outcome,
    } = completion;

    let outcomes: Vec<Result<T, DixError>> = match outcome {
        Ok(reply) => T::split(reply, positions.len()),
        Err(failure) => {
            let err = DixError::from(failure);
            tracing::debug!(
                service = %target.service,
                device = target.device,
                error = %err,
                "target failed"
            );
            positions.iter().map(|_| Err(err.clone())).collect()
        }
    };

    for (&pos, outcome) in positions.iter().zip(outcomes) {
        if let Verdict::Retry(next) = trackers[pos].on_reply(&target, outcome) {
            tracing::debug!(
                item = pos,
                from_device = target.device,
                to_device = next.device,
                unit = next.unit,
                "retrying on next unit"
            );
            retries.add(next, pos);
        }
    }
}

fn fail_all<T>(items: usize, err: DixError) -> Vec<Result<T, DixError>> {
    (0..items).map(|_| Err(err.clone())).collect()
}
