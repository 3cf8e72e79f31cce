//! SQL helper functions for `SQLite` backends.
//!
//! Paths come from user-controlled file names. Subtrees are selected with a
//! half-open range on the `BINARY`-collated `path` column rather than `LIKE`,
//! which folds ASCII case and treats `%` and `_` as wildcards. The range needs
//! no escaping and can use the `(root_id, path)` index.

use crate::models::Reference;

/// Returns the half-open range `[low, high)` holding every path strictly below
/// `path`.
///
/// `'0'` is the byte after `'/'`, so a path lies in the range exactly when it
/// starts with `path` followed by `/`.
///
/// # Examples
///
/// ```
/// use spacesearch::storage::sqlite::descendant_range;
///
/// let (low, high) = descendant_range("./Doc");
/// assert_eq!((low.as_str(), high.as_str()), ("./Doc/", "./Doc0"));
/// assert!(low.as_str() <= "./Doc/a.txt" && "./Doc/a.txt" < high.as_str());
/// assert!(!(low.as_str() <= "./doc/a.txt" && "./doc/a.txt" < high.as_str()));
/// assert!(!(low.as_str() <= "./Doc-2/a.txt" && "./Doc-2/a.txt" < high.as_str()));
/// ```
#[must_use]
pub fn descendant_range(path: &str) -> (String, String) {
    (format!("{path}/"), format!("{path}0"))
}

/// Builds the WHERE clause selecting search candidates.
///
/// Candidates are entries that are not deleted, optionally pinned to a single
/// id, and when a scope is given, under its root and path prefix.
/// Returns the clause with `?N` placeholders and the bound values in order.
#[must_use]
pub fn build_candidate_clause(
    scope: Option<&Reference>,
    required_id: Option<&str>,
) -> (String, Vec<String>) {
    let mut conditions = vec!["deleted = 0".to_string()];
    let mut params = Vec::new();

    if let Some(id) = required_id {
        params.push(id.to_string());
        conditions.push(format!("id = ?{}", params.len()));
    }

    if let Some(scope) = scope {
        params.push(scope.resource_id.to_string());
        conditions.push(format!("root_id = ?{}", params.len()));

        if scope.path != "." {
            let (low, high) = descendant_range(&scope.path);
            params.push(scope.path.clone());
            let exact = params.len();
            params.push(low);
            params.push(high);
            let (low, high) = (exact + 1, exact + 2);
            conditions.push(format!(
                "(path = ?{exact} OR (path >= ?{low} AND path < ?{high}))"
            ));
        }
    }

    (conditions.join(" AND "), params)
}
