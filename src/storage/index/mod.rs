//! Index backend implementations.
//!
//! All backends keep body text in the FTS5 index of
//! [`crate::storage::sqlite`] and share the query evaluation in
//! [`crate::query`]: a backend runs the full-text clauses, narrows the
//! candidate set to the requested scope (to the text hits, or to a single id
//! when the query pins one), and [`rank`] scores, sorts and truncates.

mod memory;
mod scaled;
mod sqlite;

pub use memory::MemoryBackend;
pub use scaled::ScaledSqliteBackend;
pub use sqlite::SqliteBackend;

use crate::models::{
    Entity, Match, Reference, Resource, SearchIndexResponse, effective_limit, is_within,
    sort_by_score,
};
use crate::query::{Query, TextMatches};

/// Returns true if a live entry lies inside the optional scope.
pub(crate) fn in_scope(resource: &Resource, scope: Option<&Reference>) -> bool {
    !resource.deleted
        && scope.is_none_or(|scope| {
            resource.root_id == scope.resource_id && is_within(&resource.path, &scope.path)
        })
}

/// Scores candidates, sorts by descending score and applies the page size.
///
/// `total_matches` counts every match before truncation.
pub(crate) fn rank(
    query: &Query,
    text: &TextMatches,
    candidates: impl IntoIterator<Item = Resource>,
    page_size: i32,
) -> SearchIndexResponse {
    let mut matches: Vec<Match> = candidates
        .into_iter()
        .filter_map(|resource| {
            let hit = query.evaluate_with(&resource, text)?;
            let mut entity = Entity::from_resource(&resource);
            entity.highlights = hit.highlights;
            Some(Match {
                score: hit.score,
                entity,
            })
        })
        .collect();

    let total_matches = i32::try_from(matches.len()).unwrap_or(i32::MAX);
    sort_by_score(&mut matches);
    if let Some(limit) = effective_limit(page_size) {
        matches.truncate(limit);
    }

    SearchIndexResponse {
        matches,
        total_matches,
    }
}
