//! In-memory index backend.

use super::{in_scope, rank};
use crate::models::{Resource, ResourceId, SearchIndexRequest, SearchIndexResponse, is_within};
use crate::query::Query;
use crate::storage::sqlite::{
    acquire_lock, in_transaction, index_text, initialize_text_schema, match_text,
    record_operation_metrics, remove_text,
};
use crate::storage::traits::IndexBackend;
use crate::{Error, Result};
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::instrument;

type Entries = BTreeMap<ResourceId, Resource>;

/// Index backend holding all entries in a map.
///
/// Body text goes to an FTS5 index on a private in-memory `SQLite`
/// connection; nothing is written to disk. Cascades run under a single write
/// lock and never touch the text index, which is keyed by id only.
pub struct MemoryBackend {
    entries: RwLock<Entries>,
    text: Mutex<Connection>,
}

impl MemoryBackend {
    /// Creates an empty index.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory text index cannot be created.
    pub fn new() -> Result<Self> {
        let text =
            Connection::open_in_memory().map_err(|e| Error::operation("open_text_index", e))?;
        initialize_text_schema(&text)?;
        Ok(Self {
            entries: RwLock::new(Entries::new()),
            text: Mutex::new(text),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(|poisoned| {
            tracing::warn!("memory index lock was poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(|poisoned| {
            tracing::warn!("memory index lock was poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    fn require<'a>(entries: &'a mut Entries, id: &ResourceId) -> Result<&'a mut Resource> {
        entries
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("resource {id} is not indexed")))
    }

    /// Applies `f` to every entry strictly below `path` in `root_id`.
    fn for_each_descendant(
        entries: &mut Entries,
        root_id: &ResourceId,
        path: &str,
        mut f: impl FnMut(&mut Resource),
    ) -> usize {
        let mut count = 0;
        for resource in entries.values_mut() {
            if resource.root_id == *root_id
                && resource.path != path
                && is_within(&resource.path, path)
            {
                f(resource);
                count += 1;
            }
        }
        count
    }

    fn set_deleted(&self, id: &ResourceId, deleted: bool) -> Result<usize> {
        let mut entries = self.write();
        let resource = Self::require(&mut entries, id)?;
        resource.deleted = deleted;
        if !resource.resource_type.is_container() {
            return Ok(0);
        }

        let (root_id, path) = (resource.root_id.clone(), resource.path.clone());
        Ok(Self::for_each_descendant(&mut entries, &root_id, &path, |child| {
            child.deleted = deleted;
        }))
    }
}

impl IndexBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    #[instrument(
        skip(self, request),
        fields(operation = "search", backend = "memory", query = %request.query)
    )]
    fn search(&self, request: &SearchIndexRequest) -> Result<SearchIndexResponse> {
        let start = Instant::now();
        let result = (|| {
            let query = Query::parse(&request.query)?;
            let scope = request.reference.as_ref();
            let text = match_text(
                &acquire_lock(&self.text),
                &query,
                scope.map(|s| &s.resource_id),
            )?;
            let entries = self.read();

            let pinned = text
                .candidate_ids(&query)
                .map(|ids| ids.into_iter().map(str::to_string).collect::<Vec<_>>())
                .or_else(|| query.required_id().map(|id| vec![id.to_string()]));
            let candidates: Vec<Resource> = match pinned {
                Some(ids) => ids
                    .iter()
                    .filter_map(|id| ResourceId::parse(id).ok())
                    .filter_map(|id| entries.get(&id))
                    .filter(|resource| in_scope(resource, scope))
                    .cloned()
                    .collect(),
                None => entries
                    .values()
                    .filter(|resource| in_scope(resource, scope))
                    .cloned()
                    .collect(),
            };
            drop(entries);

            Ok(rank(&query, &text, candidates, request.page_size))
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("memory", "search", start, status);
        result
    }

    #[instrument(
        skip(self, resource),
        fields(operation = "upsert", backend = "memory", resource.id = %resource.id, path = %resource.path)
    )]
    fn upsert(&self, resource: &Resource) -> Result<()> {
        let start = Instant::now();
        let result = (|| {
            let mut entries = self.write();
            in_transaction(&acquire_lock(&self.text), |conn| index_text(conn, resource))?;
            entries.insert(resource.id.clone(), resource.clone());
            Ok(())
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("memory", "upsert", start, status);
        result
    }

    #[instrument(skip(self), fields(operation = "move", backend = "memory", resource.id = %id))]
    fn move_resource(&self, id: &ResourceId, parent_id: &ResourceId, new_path: &str) -> Result<()> {
        let start = Instant::now();
        let result = (|| {
            let mut entries = self.write();
            let resource = Self::require(&mut entries, id)?;
            let old_path = resource.path.clone();
            resource.relocate(parent_id.clone(), new_path);

            if !resource.resource_type.is_container() || old_path == resource.path {
                return Ok(());
            }

            let (root_id, new_path) = (resource.root_id.clone(), resource.path.clone());
            let rewritten =
                Self::for_each_descendant(&mut entries, &root_id, &old_path, |child| {
                    child.rebase(&old_path, &new_path);
                });
            tracing::debug!(descendants = rewritten, "moved resource");
            Ok(())
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("memory", "move", start, status);
        result
    }

    #[instrument(skip(self), fields(operation = "delete", backend = "memory", resource.id = %id))]
    fn delete(&self, id: &ResourceId) -> Result<()> {
        let start = Instant::now();
        let result = self
            .set_deleted(id, true)
            .map(|cascaded| tracing::debug!(descendants = cascaded, "marked resource deleted"));

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("memory", "delete", start, status);
        result
    }

    #[instrument(skip(self), fields(operation = "restore", backend = "memory", resource.id = %id))]
    fn restore(&self, id: &ResourceId) -> Result<()> {
        let start = Instant::now();
        let result = self
            .set_deleted(id, false)
            .map(|cascaded| tracing::debug!(descendants = cascaded, "restored resource"));

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("memory", "restore", start, status);
        result
    }

    #[instrument(skip(self), fields(operation = "purge", backend = "memory", resource.id = %id))]
    fn purge(&self, id: &ResourceId) -> Result<bool> {
        let start = Instant::now();
        let result = (|| {
            let mut entries = self.write();
            in_transaction(&acquire_lock(&self.text), |conn| remove_text(conn, id))?;
            Ok(entries.remove(id).is_some())
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("memory", "purge", start, status);
        result
    }

    fn get(&self, id: &ResourceId) -> Result<Option<Resource>> {
        Ok(self.read().get(id).cloned())
    }

    fn doc_count(&self) -> Result<u64> {
        Ok(self.read().len() as u64)
    }
}
