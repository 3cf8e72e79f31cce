//! Federated search across a user's storage spaces.
//!
//! # Fan-out
//!
//! ```text
//! list_storage_spaces
//!   ├── trashed          → skipped
//!   ├── mountpoint       → only recorded (grant root → mountpoint root)
//!   ├── personal/project → searched at its own root
//!   └── grant            → searched at the owner's root, scoped to the
//!                          grant's path, matches relocated under the
//!                          mountpoint root
//! ```
//!
//! Per-space searches run on up to `fanout_workers` threads. Results are
//! merged, ranked by descending score and truncated to the page size; the
//! returned total is the sum of the per-space totals.

use crate::gateway::StorageGateway;
use crate::models::{
    Match, Reference, ResourceId, ResourcePermissions, SHARE_STORAGE_SPACE_ID,
    SearchIndexRequest, SearchRequest, SearchResponse, SpaceFilter, SpaceType, StorageSpace,
    UserContext, base_name, effective_limit, is_within, make_relative_path, sort_by_score,
};
use crate::query::escape_pattern;
use crate::storage::IndexBackend;
use crate::{Error, Result};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tracing::instrument;

/// Default number of threads searching spaces concurrently.
pub const DEFAULT_FANOUT_WORKERS: usize = 4;

/// Space searches slower than this are logged at info level.
pub const DEFAULT_SLOW_QUERY: Duration = Duration::from_millis(500);

static SCOPE_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"scope:\s*(\S*)").ok());

/// Where and how one space is searched.
struct SpaceTarget<'a> {
    space: &'a StorageSpace,
    request: SearchIndexRequest,
    /// Path of the grant root inside the owner's space (`.` for own spaces).
    mountpoint_prefix: String,
    /// Root the matches are reported under.
    result_root: Option<ResourceId>,
    share_root_name: Option<String>,
    remote_item_id: Option<ResourceId>,
    permissions: ResourcePermissions,
    is_grant: bool,
}

/// Results of one space search.
struct SpaceResult {
    matches: Vec<Match>,
    total_matches: i32,
}

/// Answers user searches by fanning out over every visible space.
pub struct SearchService {
    gateway: Arc<dyn StorageGateway>,
    index: Arc<dyn IndexBackend>,
    machine_auth_key: SecretString,
    slow_query: Duration,
    fanout_workers: usize,
}

impl SearchService {
    /// Creates a new search service.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn StorageGateway>,
        index: Arc<dyn IndexBackend>,
        machine_auth_key: SecretString,
    ) -> Self {
        Self {
            gateway,
            index,
            machine_auth_key,
            slow_query: DEFAULT_SLOW_QUERY,
            fanout_workers: DEFAULT_FANOUT_WORKERS,
        }
    }

    /// Sets the threshold above which space searches are logged at info.
    #[must_use]
    pub const fn with_slow_query(mut self, slow_query: Duration) -> Self {
        self.slow_query = slow_query;
        self
    }

    /// Sets the number of threads searching spaces concurrently.
    ///
    /// `1` searches the spaces one after another on the calling thread.
    #[must_use]
    pub fn with_fanout_workers(mut self, workers: usize) -> Self {
        self.fanout_workers = workers.max(1);
        self
    }

    /// Searches every space visible to `user`.
    ///
    /// A `scope:<resource id>` token in the query restricts the search to
    /// the folder it names, like an explicit reference does.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] for an empty query, or the first error
    /// raised by the gateway or the index. No partial results are returned.
    #[instrument(skip(self, user, request), fields(user = %user.user_id, page_size = request.page_size))]
    pub fn search(&self, user: &UserContext, request: &SearchRequest) -> Result<SearchResponse> {
        let start = Instant::now();
        let result = self.search_inner(user, request);

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::counter!("search_requests_total", "status" => status).increment(1);
        metrics::histogram!("search_duration_ms").record(start.elapsed().as_secs_f64() * 1000.0);
        result
    }

    fn search_inner(&self, user: &UserContext, request: &SearchRequest) -> Result<SearchResponse> {
        let (query, scope) = parse_scope(&request.query);
        if query.is_empty() {
            return Err(Error::BadRequest("empty query provided".to_string()));
        }
        let query = format_query(&query);

        let reference = match scope {
            Some(scope) => Some(self.resolve_scope(user, &scope)?),
            None => request.reference.clone(),
        };

        let spaces = self
            .gateway
            .list_storage_spaces(&user.token, &SpaceFilter::all())?;

        let mountpoints: HashMap<ResourceId, &StorageSpace> = spaces
            .iter()
            .filter(|s| s.space_type == SpaceType::Mountpoint)
            .filter_map(|s| s.grant_id().map(|grant| (grant, s)))
            .collect();

        let mut targets = Vec::new();
        for space in &spaces {
            if space.is_trashed() || space.space_type == SpaceType::Mountpoint {
                continue;
            }
            if reference
                .as_ref()
                .is_some_and(|r| r.resource_id.space() != space.root.space())
            {
                continue;
            }
            if let Some(target) =
                self.plan_space(user, space, &mountpoints, reference.as_ref(), &query, request)?
            {
                targets.push(target);
            }
        }

        let results = self.run_targets(&targets, reference.as_ref())?;

        let mut matches = Vec::new();
        let mut total_matches: i32 = 0;
        for result in results {
            total_matches = total_matches.saturating_add(result.total_matches);
            matches.extend(result.matches);
        }
        sort_by_score(&mut matches);
        if let Some(limit) = effective_limit(request.page_size) {
            matches.truncate(limit);
        }

        tracing::debug!(
            spaces = targets.len(),
            hits = matches.len(),
            total_matches,
            "Federated search finished"
        );
        Ok(SearchResponse {
            matches,
            total_matches,
        })
    }

    /// Turns a `scope:` id into a space root plus path reference.
    fn resolve_scope(&self, user: &UserContext, scope: &str) -> Result<Reference> {
        let id = ResourceId::parse(scope)?;
        let info = self
            .gateway
            .stat(&user.token, &Reference::to_id(id))?;
        let path = self.gateway.get_path(&user.token, &info.id)?;
        Ok(Reference::new(info.id.space_root(), &path))
    }

    /// Decides how a space is searched, or `None` if it is skipped.
    fn plan_space<'a>(
        &self,
        user: &UserContext,
        space: &'a StorageSpace,
        mountpoints: &HashMap<ResourceId, &StorageSpace>,
        reference: Option<&Reference>,
        query: &str,
        request: &SearchRequest,
    ) -> Result<Option<SpaceTarget<'a>>> {
        let mut search_prefix = reference.map(|r| r.path.clone());
        let permissions = space
            .root_info
            .as_ref()
            .map(|info| info.permission_set)
            .unwrap_or_default();

        let mut target = SpaceTarget {
            space,
            request: SearchIndexRequest::new(query),
            mountpoint_prefix: ".".to_string(),
            result_root: None,
            share_root_name: None,
            remote_item_id: None,
            permissions,
            is_grant: false,
        };

        if space.space_type == SpaceType::Grant {
            let Some(mountpoint) = mountpoints.get(&space.root) else {
                tracing::debug!(space_id = %space.id, "Grant has no mountpoint, skipping");
                return Ok(None);
            };

            let Some(grant_path) = self.grant_root_path(space) else {
                return Ok(None);
            };

            let share_id = &mountpoint.root.opaque_id;
            let hidden = match self.gateway.get_received_share(&user.token, share_id) {
                Ok(share) => share.is_some_and(|share| share.hidden),
                Err(e) => {
                    tracing::error!(
                        space_id = %space.id,
                        share_id = %share_id,
                        error = %e,
                        "Failed to load received share, treating it as visible"
                    );
                    false
                },
            };
            if hidden {
                tracing::debug!(
                    space_id = %space.id,
                    share_id = %share_id,
                    "Share is hidden, skipping"
                );
                return Ok(None);
            }

            target.share_root_name = Some(format!("/{}", base_name(&grant_path)));
            target.remote_item_id = Some(
                space
                    .root_info
                    .as_ref()
                    .map_or_else(|| space.root.clone(), |info| info.id.clone()),
            );
            target.result_root = Some(mountpoint.root.clone());
            search_prefix.get_or_insert_with(|| grant_path.clone());
            target.mountpoint_prefix = grant_path;
            target.is_grant = true;
        }

        let prefix = search_prefix.unwrap_or_else(|| ".".to_string());
        target.request = SearchIndexRequest::new(query)
            .scoped(space.root.space_root(), &prefix)
            .with_page_size(request.page_size);
        Ok(Some(target))
    }

    /// Resolves the path of a grant root inside its owner's space.
    fn grant_root_path(&self, space: &StorageSpace) -> Option<String> {
        let path = self
            .gateway
            .authenticate(&space.owner, self.machine_auth_key.expose_secret())
            .and_then(|token| self.gateway.get_path(&token, &space.root));
        match path {
            Ok(path) => Some(make_relative_path(&path)),
            Err(e) => {
                tracing::warn!(
                    space_id = %space.id,
                    owner = %space.owner,
                    error = %e,
                    "Failed to resolve grant root path, skipping"
                );
                None
            },
        }
    }

    /// Searches every target, in parallel when more than one worker is set.
    fn run_targets(
        &self,
        targets: &[SpaceTarget<'_>],
        reference: Option<&Reference>,
    ) -> Result<Vec<SpaceResult>> {
        if self.fanout_workers <= 1 || targets.len() <= 1 {
            return targets
                .iter()
                .map(|target| self.search_space(target, reference))
                .collect();
        }

        let chunk_size = targets.len().div_ceil(self.fanout_workers);
        std::thread::scope(|scope| {
            let handles: Vec<_> = targets
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|target| self.search_space(target, reference))
                            .collect::<Result<Vec<_>>>()
                    })
                })
                .collect();

            let mut results = Vec::with_capacity(targets.len());
            for handle in handles {
                let chunk = handle
                    .join()
                    .map_err(|_| Error::operation("search_space", "search worker panicked"))??;
                results.extend(chunk);
            }
            Ok(results)
        })
    }

    /// Searches one space and translates its matches into the user's view.
    fn search_space(
        &self,
        target: &SpaceTarget<'_>,
        reference: Option<&Reference>,
    ) -> Result<SpaceResult> {
        let start = Instant::now();
        let response = self.index.search(&target.request)?;

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        if start.elapsed() > self.slow_query {
            tracing::info!(
                space_id = %target.space.id,
                query = %target.request.query,
                hits = response.matches.len(),
                duration_ms,
                "Slow space search"
            );
        } else {
            tracing::debug!(
                space_id = %target.space.id,
                hits = response.matches.len(),
                duration_ms,
                "Searched space"
            );
        }

        let mut matches = Vec::with_capacity(response.matches.len());
        for mut hit in response.matches {
            let original_path = hit.entity.reference.path.clone();
            // the scope folder itself is not a result
            if reference.is_some_and(|r| r.path == original_path) {
                continue;
            }

            let path = relative_to(&original_path, &target.mountpoint_prefix);
            let root = target
                .result_root
                .clone()
                .unwrap_or_else(|| hit.entity.reference.resource_id.clone());

            let is_shared = target.is_grant && root.space_id == SHARE_STORAGE_SPACE_ID;
            let is_mountpoint = is_shared && path == ".";
            let is_dir = hit.entity.resource_type.is_container();

            hit.entity.reference = Reference::new(root, &path);
            hit.entity.share_root_name.clone_from(&target.share_root_name);
            hit.entity.remote_item_id.clone_from(&target.remote_item_id);
            hit.entity.permissions = target
                .permissions
                .to_webdav(is_shared, is_mountpoint, is_dir);
            matches.push(hit);
        }

        Ok(SpaceResult {
            matches,
            total_matches: response.total_matches,
        })
    }
}

/// Re-expresses `path` relative to `prefix`.
fn relative_to(path: &str, prefix: &str) -> String {
    if prefix == "." || !is_within(path, prefix) {
        return make_relative_path(path);
    }
    make_relative_path(&path[prefix.len()..])
}

/// Prepares a user query for the index.
///
/// Field-qualified queries (containing `:`) pass through unchanged; field
/// names are matched case-insensitively by the index. Anything else becomes
/// a case-insensitive substring match on the name.
///
/// ```
/// use spacesearch::services::format_query;
///
/// assert_eq!(format_query("Annual Report"), r"Name:*annual\ report*");
/// assert_eq!(format_query("mimetype:image/*"), "mimetype:image/*");
/// ```
#[must_use]
pub fn format_query(query: &str) -> String {
    if query.contains(':') {
        return query.to_string();
    }
    format!("Name:*{}*", escape_pattern(&query.to_lowercase()))
}

/// Splits a `scope:<resource id>` token off a query.
///
/// Returns the remaining query, trimmed, and the scope if one was given.
///
/// ```
/// use spacesearch::services::parse_scope;
///
/// let (query, scope) = parse_scope("report scope:st$sp!folder");
/// assert_eq!(query, "report");
/// assert_eq!(scope.as_deref(), Some("st$sp!folder"));
/// ```
#[must_use]
pub fn parse_scope(query: &str) -> (String, Option<String>) {
    let Some(pattern) = SCOPE_PATTERN.as_ref() else {
        return (query.trim().to_string(), None);
    };
    let Some(captures) = pattern.captures(query) else {
        return (query.trim().to_string(), None);
    };

    let scope = captures
        .get(1)
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty());
    let rest = pattern.replace(query, "");
    let rest = rest.split_whitespace().collect::<Vec<_>>().join(" ");
    (rest, scope)
}
