//! In-memory component catalogues

use std::collections::{BTreeMap, BTreeSet};

use dix_core::{CasError, CasReply, CasRequest, CatalogueId, IndexId, Record};

/// Ordered key/value catalogues of one service
#[derive(Debug, Default)]
pub struct CatalogueStore {
    catalogues: BTreeMap<CatalogueId, BTreeMap<Vec<u8>, Vec<u8>>>,
    /// Record limit across all catalogues
    capacity: Option<usize>,
    records: usize,
}

impl CatalogueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    pub fn catalogue_count(&self) -> usize {
        self.catalogues.len()
    }

    pub fn record_count(&self) -> usize {
        self.records
    }

    pub fn contains(&self, catalogue: &CatalogueId) -> bool {
        self.catalogues.contains_key(catalogue)
    }

    /// Value of `key` in `catalogue`, if both exist
    pub fn value(&self, catalogue: &CatalogueId, key: &[u8]) -> Option<&[u8]> {
        self.catalogues.get(catalogue)?.get(key).map(Vec::as_slice)
    }

    /// Answer one request
    pub fn execute(&mut self, request: CasRequest) -> CasReply {
        match request {
            CasRequest::Create { catalogues } => CasReply::Status {
                results: catalogues.into_iter().map(|c| self.create(c)).collect(),
            },
            CasRequest::Delete { catalogues } => CasReply::Status {
                results: catalogues.into_iter().map(|c| self.delete(&c)).collect(),
            },
            CasRequest::Lookup { catalogues } => CasReply::Status {
                results: catalogues
                    .iter()
                    .map(|c| if self.contains(c) { Ok(()) } else { Err(CasError::NotFound) })
                    .collect(),
            },
            CasRequest::List { start, count } => CasReply::List {
                indices: self.list(start, count as usize),
            },
            CasRequest::Put {
                catalogue,
                records,
                overwrite,
            } => CasReply::Status {
                results: records
                    .into_iter()
                    .map(|r| self.put(&catalogue, r, overwrite))
                    .collect(),
            },
            CasRequest::Get { catalogue, keys } => CasReply::Values {
                results: keys.into_iter().map(|k| self.get(&catalogue, k)).collect(),
            },
            CasRequest::Next {
                catalogue,
                start_keys,
                counts,
            } => CasReply::Next {
                windows: start_keys
                    .iter()
                    .zip(counts)
                    .map(|(start, count)| self.next(&catalogue, start, count as usize))
                    .collect(),
            },
            CasRequest::Del { catalogue, keys } => CasReply::Status {
                results: keys.iter().map(|k| self.del(&catalogue, k)).collect(),
            },
        }
    }

    fn create(&mut self, catalogue: CatalogueId) -> Result<(), CasError> {
        if self.catalogues.contains_key(&catalogue) {
            return Err(CasError::AlreadyExists);
        }
        self.catalogues.insert(catalogue, BTreeMap::new());
        Ok(())
    }

    fn delete(&mut self, catalogue: &CatalogueId) -> Result<(), CasError> {
        let removed = self.catalogues.remove(catalogue).ok_or(CasError::NotFound)?;
        self.records -= removed.len();
        Ok(())
    }

    fn list(&self, start: IndexId, count: usize) -> Vec<IndexId> {
        let indices: BTreeSet<IndexId> = self
            .catalogues
            .keys()
            .map(|c| c.index)
            .filter(|id| *id >= start)
            .collect();
        indices.into_iter().take(count).collect()
    }

    fn put(
        &mut self,
        catalogue: &CatalogueId,
        record: Record,
        overwrite: bool,
    ) -> Result<(), CasError> {
        let at_capacity = self.capacity.is_some_and(|cap| self.records >= cap);
        let cat = self.catalogues.get_mut(catalogue).ok_or(CasError::NotFound)?;
        match cat.get_mut(&record.key) {
            Some(_) if !overwrite => Err(CasError::AlreadyExists),
            Some(val) => {
                *val = record.val;
                Ok(())
            }
            None if at_capacity => Err(CasError::ResourceExhausted),
            None => {
                cat.insert(record.key, record.val);
                self.records += 1;
                Ok(())
            }
        }
    }

    fn get(&self, catalogue: &CatalogueId, key: Vec<u8>) -> Result<Record, CasError> {
        let val = self.value(catalogue, &key).ok_or(CasError::NotFound)?.to_vec();
        Ok(Record { key, val })
    }

    fn next(
        &self,
        catalogue: &CatalogueId,
        start: &[u8],
        count: usize,
    ) -> Vec<Result<Record, CasError>> {
        let Some(cat) = self.catalogues.get(catalogue) else {
            return vec![Err(CasError::NotFound)];
        };
        let records: Vec<Result<Record, CasError>> = cat
            .range(start.to_vec()..)
            .take(count)
            .map(|(k, v)| Ok(Record::new(k.clone(), v.clone())))
            .collect();
        if records.is_empty() {
            vec![Err(CasError::NotFound)]
        } else {
            records
        }
    }

    fn del(&mut self, catalogue: &CatalogueId, key: &[u8]) -> Result<(), CasError> {
        let cat = self.catalogues.get_mut(catalogue).ok_or(CasError::NotFound)?;
        cat.remove(key).ok_or(CasError::NotFound)?;
        self.records -= 1;
        Ok(())
    }
}
