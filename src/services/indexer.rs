//! Change-aware indexing of storage spaces.

use crate::extract::{Extractor, structural_document};
use crate::gateway::{StorageGateway, WalkControl};
use crate::models::{
    Reference, Resource, ResourceId, ResourceInfo, SearchIndexRequest, SpaceId, Token, UserId,
    make_relative_path,
};
use crate::query::escape_term;
use crate::storage::IndexBackend;
use crate::{Error, Result};
use chrono::SecondsFormat;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Counters of a single space walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Resources the walk visited.
    pub visited: usize,
    /// Resources written to the index.
    pub upserted: usize,
    /// Resources (or whole subtrees) found unchanged.
    pub skipped: usize,
}

/// Keeps the index in sync with storage.
///
/// All operations authenticate against the gateway as the acting user with
/// the machine auth key.
pub struct Indexer {
    gateway: Arc<dyn StorageGateway>,
    index: Arc<dyn IndexBackend>,
    extractor: Arc<dyn Extractor>,
    machine_auth_key: SecretString,
}

impl Indexer {
    /// Creates a new indexer.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn StorageGateway>,
        index: Arc<dyn IndexBackend>,
        extractor: Arc<dyn Extractor>,
        machine_auth_key: SecretString,
    ) -> Self {
        Self {
            gateway,
            index,
            extractor,
            machine_auth_key,
        }
    }

    /// Returns the index this indexer writes to.
    #[must_use]
    pub fn index(&self) -> &Arc<dyn IndexBackend> {
        &self.index
    }

    fn authenticate(&self, user: &UserId) -> Result<Token> {
        self.gateway
            .authenticate(user, self.machine_auth_key.expose_secret())
    }

    /// Reconciles the index with the current state of a space.
    ///
    /// Walks the space depth first. A resource whose index entry is at least
    /// as new as its mtime is skipped; for a container the whole subtree is
    /// skipped. Everything else is extracted and upserted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] for an incomplete space id, and any
    /// gateway or index error, which aborts the walk. Entries written before
    /// the failure stay in the index.
    #[instrument(skip(self), fields(space_id = %space_id, user = %user))]
    pub fn index_space(&self, space_id: &SpaceId, user: &UserId) -> Result<IndexStats> {
        let start = Instant::now();
        if space_id.storage_id.is_empty() || space_id.space_id.is_empty() {
            return Err(Error::BadRequest(format!("invalid space id: {space_id}")));
        }

        let token = self.authenticate(user)?;
        let root = space_id.root();
        let mut stats = IndexStats::default();

        self.gateway.walk_tree(&token, &root, &mut |path, info| {
            stats.visited += 1;
            if self.is_unchanged(info) {
                stats.skipped += 1;
                metrics::counter!("indexer_resources_skipped_total").increment(1);
                if info.resource_type.is_container() {
                    tracing::debug!(path, "Subtree has not changed, skipping");
                    return Ok(WalkControl::SkipSubtree);
                }
                tracing::debug!(path, "Resource has not changed, skipping");
                return Ok(WalkControl::Continue);
            }

            self.index_resource(&token, &root, path, info)?;
            stats.upserted += 1;
            Ok(WalkControl::Continue)
        })?;

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            visited = stats.visited,
            upserted = stats.upserted,
            skipped = stats.skipped,
            duration_ms,
            "Indexed space"
        );
        self.log_doc_count();
        Ok(stats)
    }

    /// Returns true if the index holds the resource with an mtime at least
    /// as new as the one in `info`.
    fn is_unchanged(&self, info: &ResourceInfo) -> bool {
        let Some(mtime) = info.mtime else {
            return false;
        };

        let query = format!(
            "+ID:{} +Mtime:>=\"{}\"",
            escape_term(&info.id.to_string()),
            mtime.to_rfc3339_opts(SecondsFormat::Nanos, true)
        );
        match self
            .index
            .search(&SearchIndexRequest::new(query).with_page_size(1))
        {
            Ok(response) => response.total_matches > 0,
            Err(e) => {
                tracing::warn!(resource.id = %info.id, error = %e, "Watermark lookup failed");
                false
            },
        }
    }

    /// Extracts and upserts one resource, then writes typed metadata back.
    fn index_resource(
        &self,
        token: &Token,
        root: &ResourceId,
        path: &str,
        info: &ResourceInfo,
    ) -> Result<Resource> {
        let document = self.extractor.extract(token, info).unwrap_or_else(|e| {
            tracing::warn!(
                resource.id = %info.id,
                path,
                error = %e,
                "Extraction failed, indexing structural metadata only"
            );
            structural_document(info)
        });

        let resource = Resource::new(
            info.id.clone(),
            root.clone(),
            info.parent_id.clone(),
            path,
            info.resource_type,
            document,
        );
        self.index.upsert(&resource)?;
        metrics::counter!("indexer_resources_upserted_total").increment(1);

        if resource.document.has_media() {
            let metadata = resource.document.media_metadata();
            let reference = Reference::new(root.clone(), &resource.path);
            if let Err(e) = self
                .gateway
                .set_arbitrary_metadata(token, &reference, &metadata)
            {
                tracing::error!(
                    resource.id = %resource.id,
                    error = %e,
                    "Failed to store media metadata"
                );
            }
        }

        Ok(resource)
    }

    /// Stats a reference and resolves its path within its space.
    fn resolve(&self, token: &Token, reference: &Reference) -> Result<(ResourceInfo, String)> {
        let info = self.gateway.stat(token, reference)?;
        let path = make_relative_path(&self.gateway.get_path(token, &info.id)?);
        Ok((info, path))
    }

    /// Indexes a single resource regardless of its watermark.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be resolved or written.
    #[instrument(skip(self), fields(path = %reference.path))]
    pub fn upsert_item(&self, reference: &Reference, user: &UserId) -> Result<Resource> {
        let token = self.authenticate(user)?;
        let (info, path) = self.resolve(&token, reference)?;
        let resource = self.index_resource(&token, &info.id.space_root(), &path, &info)?;
        self.log_doc_count();
        Ok(resource)
    }

    /// Marks an entry and its descendants deleted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entry is not indexed.
    #[instrument(skip(self), fields(resource.id = %id))]
    pub fn trash_item(&self, id: &ResourceId) -> Result<()> {
        self.index.delete(id)
    }

    /// Restores an entry and its descendants after a trash restore.
    ///
    /// The reference is re-stat'ed to get the id the item has now.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be resolved or is not indexed.
    #[instrument(skip(self), fields(path = %reference.path))]
    pub fn restore_item(&self, reference: &Reference, user: &UserId) -> Result<()> {
        let token = self.authenticate(user)?;
        let (info, _) = self.resolve(&token, reference)?;
        self.index.restore(&info.id)
    }

    /// Applies a move or rename to an entry and its descendants.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be resolved or is not indexed.
    #[instrument(skip(self), fields(path = %reference.path))]
    pub fn move_item(&self, reference: &Reference, user: &UserId) -> Result<()> {
        let token = self.authenticate(user)?;
        let (info, path) = self.resolve(&token, reference)?;
        let parent_id = info
            .parent_id
            .clone()
            .ok_or_else(|| Error::BadRequest(format!("space root {} cannot be moved", info.id)))?;
        self.index.move_resource(&info.id, &parent_id, &path)
    }

    fn log_doc_count(&self) {
        match self.index.doc_count() {
            Ok(count) => tracing::debug!(documents = count, "Index document count"),
            Err(e) => tracing::warn!(error = %e, "Failed to read index document count"),
        }
    }
}
