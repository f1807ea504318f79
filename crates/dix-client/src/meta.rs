//! Meta-index operations
//!
//! The layout and layout-descriptor meta-indices are ordinary distributed
//! indices with reserved ids, placed with the client's meta layout.

use dix_core::meta::{self, decode_descr, decode_layout, layout_id_key};
use dix_core::{
    IndexId, IndexLayout, LayoutDescriptor, LayoutId, Record, LAYOUT_INDEX, LDESCR_INDEX,
};

use crate::client::DixClient;
use crate::error::{DixError, Result};
use crate::request::{DixIndex, DixRequest, ReqState};

impl DixClient {
    fn meta_indices(&self) -> Result<Vec<DixIndex>> {
        let layout = self.meta_layout()?;
        Ok(vec![
            DixIndex::new(LAYOUT_INDEX).with_descriptor(layout.clone()),
            DixIndex::new(LDESCR_INDEX).with_descriptor(layout),
        ])
    }

    /// Create both meta-indices
    ///
    /// Either both exist afterwards or neither was created by this call.
    pub async fn meta_create(&self) -> Result<()> {
        let indices = self.meta_indices()?;
        let mut req = self.request();
        req.create(indices.clone())?;
        req.wait().await;

        let Err(err) = req.generic_result() else {
            tracing::info!("meta-indices created");
            return Ok(());
        };

        let created: Vec<DixIndex> = indices
            .into_iter()
            .enumerate()
            .filter(|(i, _)| req.item_result(*i).is_ok())
            .map(|(_, index)| index)
            .collect();
        if !created.is_empty() {
            let mut undo = self.request();
            undo.delete(created)?;
            undo.wait().await;
            if let Err(e) = undo.generic_result() {
                tracing::warn!(error = %e, "failed to roll back meta-index creation");
            }
        }
        Err(err)
    }

    /// True if both meta-indices exist
    pub async fn meta_check(&self) -> Result<bool> {
        let mut req = self.request();
        req.lookup(self.meta_indices()?)?;
        req.wait().await;
        match req.generic_result() {
            Ok(()) => Ok(true),
            Err(DixError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete both meta-indices
    pub async fn meta_destroy(&self) -> Result<()> {
        let mut req = self.request();
        req.delete(self.meta_indices()?)?;
        req.wait().await;
        req.generic_result()
    }

    /// Record `index id -> layout` mappings
    pub async fn layout_put(
        &self,
        items: &[(IndexId, IndexLayout)],
        overwrite: bool,
    ) -> Result<Vec<Result<()>>> {
        let batch = meta::encode_layouts(items)?;
        self.meta_put(LAYOUT_INDEX, batch.into_records(), overwrite).await
    }

    pub async fn layout_get(&self, ids: &[IndexId]) -> Result<Vec<Result<IndexLayout>>> {
        let keys = ids.iter().map(|id| id.to_bytes().to_vec()).collect();
        let values = self.meta_get(LAYOUT_INDEX, keys).await?;
        Ok(values
            .into_iter()
            .map(|v| v.and_then(|bytes| decode_layout(&bytes).map_err(DixError::from)))
            .collect())
    }

    pub async fn layout_del(&self, ids: &[IndexId]) -> Result<Vec<Result<()>>> {
        let keys = ids.iter().map(|id| id.to_bytes().to_vec()).collect();
        self.meta_del(LAYOUT_INDEX, keys).await
    }

    /// Record `layout id -> descriptor` mappings
    pub async fn ldescr_put(
        &self,
        items: &[(LayoutId, LayoutDescriptor)],
        overwrite: bool,
    ) -> Result<Vec<Result<()>>> {
        let batch = meta::encode_ldescrs(items)?;
        self.meta_put(LDESCR_INDEX, batch.into_records(), overwrite).await
    }

    pub async fn ldescr_get(&self, ids: &[LayoutId]) -> Result<Vec<Result<LayoutDescriptor>>> {
        let keys = ids.iter().map(|id| layout_id_key(*id)).collect();
        let values = self.meta_get(LDESCR_INDEX, keys).await?;
        Ok(values
            .into_iter()
            .map(|v| v.and_then(|bytes| decode_descr(&bytes).map_err(DixError::from)))
            .collect())
    }

    pub async fn ldescr_del(&self, ids: &[LayoutId]) -> Result<Vec<Result<()>>> {
        let keys = ids.iter().map(|id| layout_id_key(*id)).collect();
        self.meta_del(LDESCR_INDEX, keys).await
    }

    /// Up to `count` index ids recorded in the layout meta-index, from `start` on
    pub async fn index_list(&self, start: IndexId, count: u32) -> Result<Vec<IndexId>> {
        let mut req = self.request();
        req.list(start, count)?;
        req.wait().await;
        req.generic_result()?;
        req.take_indices()
    }

    fn meta_index(&self, id: IndexId) -> Result<DixIndex> {
        Ok(DixIndex::new(id).with_descriptor(self.meta_layout()?))
    }

    async fn meta_put(
        &self,
        id: IndexId,
        records: Vec<(Vec<u8>, Vec<u8>)>,
        overwrite: bool,
    ) -> Result<Vec<Result<()>>> {
        let records = records.into_iter().map(|(k, v)| Record::new(k, v)).collect();
        let mut req = self.request();
        req.put(&self.meta_index(id)?, records, overwrite)?;
        item_results(req).await
    }

    async fn meta_get(&self, id: IndexId, keys: Vec<Vec<u8>>) -> Result<Vec<Result<Vec<u8>>>> {
        let mut req = self.request();
        req.get(&self.meta_index(id)?, keys)?;
        if req.wait().await == ReqState::Failed {
            req.generic_result()?;
        }
        req.take_get_replies()
    }

    async fn meta_del(&self, id: IndexId, keys: Vec<Vec<u8>>) -> Result<Vec<Result<()>>> {
        let mut req = self.request();
        req.del(&self.meta_index(id)?, keys)?;
        item_results(req).await
    }
}

async fn item_results(mut req: DixRequest) -> Result<Vec<Result<()>>> {
    if req.wait().await == ReqState::Failed {
        req.generic_result()?;
    }
    Ok((0..req.item_count()).map(|i| req.item_result(i)).collect())
}
