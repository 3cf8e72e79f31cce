//! FTS5 full-text index over the body fields of index entries.
//!
//! `Title` and `Content` are tokenized by the `unicode61` tokenizer and ranked
//! with `bm25()`. The index is keyed through `text_keys`, whose rowid is the
//! FTS rowid, so replacing or removing an entry's text is a keyed lookup. The
//! memory backend keeps the same tables on a private in-memory connection.
//!
//! Wildcard terms are expanded against the term dictionary
//! (`resources_vocab`) before matching.

use crate::models::{Resource, ResourceId};
use crate::query::{Clause, Field, Query, Term, TextHit, TextMatches};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

/// Maximum number of dictionary terms a wildcard expands to.
pub const MAX_WILDCARD_EXPANSION: usize = 256;

/// Tokens of context `snippet()` keeps around a content hit.
const SNIPPET_TOKENS: i32 = 16;

/// Creates the full-text tables if they do not exist.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if a statement fails.
pub fn initialize_text_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS text_keys (
            id TEXT PRIMARY KEY,
            root_id TEXT NOT NULL
        );
        CREATE VIRTUAL TABLE IF NOT EXISTS resources_fts USING fts5(
            title,
            content,
            tokenize = 'unicode61 remove_diacritics 2'
        );
        CREATE VIRTUAL TABLE IF NOT EXISTS resources_vocab USING fts5vocab(resources_fts, 'row');",
    )
    .map_err(|e| Error::operation("create_fts_table", e))
}

/// Replaces the indexed body text of an entry.
///
/// Entries without a title or content are dropped from the text index.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if a write fails.
pub fn index_text(conn: &Connection, resource: &Resource) -> Result<()> {
    let document = &resource.document;
    if document.title.is_none() && document.content.is_none() {
        return remove_text(conn, &resource.id);
    }

    let id = resource.id.to_string();
    let rowid: i64 = conn
        .query_row(
            "INSERT INTO text_keys (id, root_id) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET root_id = excluded.root_id
             RETURNING rowid",
            params![id, resource.root_id.to_string()],
            |row| row.get(0),
        )
        .map_err(|e| Error::operation("insert_text_key", e))?;

    conn.execute("DELETE FROM resources_fts WHERE rowid = ?1", params![rowid])
        .map_err(|e| Error::operation("delete_fts", e))?;
    conn.execute(
        "INSERT INTO resources_fts (rowid, title, content) VALUES (?1, ?2, ?3)",
        params![rowid, document.title, document.content],
    )
    .map_err(|e| Error::operation("insert_fts", e))?;
    Ok(())
}

/// Removes the body text of an entry, if any.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if a write fails.
pub fn remove_text(conn: &Connection, id: &ResourceId) -> Result<()> {
    let rowid: Option<i64> = conn
        .query_row(
            "DELETE FROM text_keys WHERE id = ?1 RETURNING rowid",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::operation("delete_text_key", e))?;

    if let Some(rowid) = rowid {
        conn.execute("DELETE FROM resources_fts WHERE rowid = ?1", params![rowid])
            .map_err(|e| Error::operation("delete_fts", e))?;
    }
    Ok(())
}

/// Runs every full-text clause of `query` against the text index.
///
/// Hits are restricted to the space `root_id` when one is given.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if a statement fails.
pub fn match_text(
    conn: &Connection,
    query: &Query,
    root_id: Option<&ResourceId>,
) -> Result<TextMatches> {
    let mut matches = TextMatches::new();

    for (index, clause) in query.clauses.iter().enumerate() {
        if !clause.is_full_text() {
            continue;
        }
        matches.searched(index);
        let Some(expression) = fts_expression(conn, clause)? else {
            continue;
        };
        for (id, hit) in run_match(conn, &expression, root_id)? {
            matches.insert(index, id, hit);
        }
    }

    Ok(matches)
}

fn run_match(
    conn: &Connection,
    expression: &str,
    root_id: Option<&ResourceId>,
) -> Result<Vec<(String, TextHit)>> {
    let mut sql = format!(
        "SELECT k.id, bm25(resources_fts, 2.0, 1.0),
                snippet(resources_fts, 1, '<mark>', '</mark>', '…', {SNIPPET_TOKENS})
         FROM resources_fts f
         JOIN text_keys k ON k.rowid = f.rowid
         WHERE resources_fts MATCH ?1"
    );
    let mut bound = vec![expression.to_string()];
    if let Some(root_id) = root_id {
        sql.push_str(" AND k.root_id = ?2");
        bound.push(root_id.to_string());
    }

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::operation("prepare_search", e))?;
    let rows = stmt
        .query_map(params_from_iter(bound.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })
        .map_err(|e| Error::operation("execute_search", e))?;

    let mut hits = Vec::new();
    for row in rows {
        let (id, score, snippet) = row.map_err(|e| Error::operation("read_search_row", e))?;
        hits.push((
            id,
            TextHit {
                score: normalize_bm25(score),
                // snippet() also returns text for rows that only matched the title
                excerpt: snippet.filter(|s| s.contains("<mark>")),
            },
        ));
    }
    Ok(hits)
}

/// Maps a `bm25()` value onto `(1.5, 2.0)`.
///
/// `bm25()` is negative and more negative is better. The sigmoid keeps every
/// body hit above an exact keyword hit.
#[allow(clippy::cast_possible_truncation)]
fn normalize_bm25(score: f64) -> f32 {
    let positive_score = -score;
    let sigmoid = 1.0 / (1.0 + (-0.5 * positive_score).exp());
    (1.0 + sigmoid.clamp(0.5, 1.0)) as f32
}

/// Builds the FTS5 `MATCH` expression for a clause, or `None` if it cannot
/// match any token.
fn fts_expression(conn: &Connection, clause: &Clause) -> Result<Option<String>> {
    let columns = match clause.field {
        Some(Field::Title) => "title",
        Some(Field::Content) => "content",
        _ => "{title content}",
    };

    let terms = match &clause.term {
        Term::Exact(literal) | Term::Phrase(literal) => {
            if !literal.chars().any(char::is_alphanumeric) {
                return Ok(None);
            }
            quote(literal)
        },
        Term::Wildcard(wildcard) => {
            let expanded = expand_wildcard(conn, &wildcard.glob)?;
            if expanded.is_empty() {
                return Ok(None);
            }
            let alternatives: Vec<String> = expanded.iter().map(|t| quote(t)).collect();
            format!("({})", alternatives.join(" OR "))
        },
        Term::Range { .. } => return Ok(None),
    };

    Ok(Some(format!("{columns} : {terms}")))
}

/// Looks up the dictionary terms matching a lowercase `GLOB` pattern.
fn expand_wildcard(conn: &Connection, glob: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT term FROM resources_vocab WHERE term GLOB ?1 ORDER BY doc DESC LIMIT ?2")
        .map_err(|e| Error::operation("prepare_expand_wildcard", e))?;
    let rows = stmt
        .query_map(
            params![glob, i64::try_from(MAX_WILDCARD_EXPANSION).unwrap_or(i64::MAX)],
            |row| row.get::<_, String>(0),
        )
        .map_err(|e| Error::operation("expand_wildcard", e))?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::operation("read_vocab_row", e))
}

/// Quotes a literal as an FTS5 string; the tokenizer splits it into a phrase.
fn quote(literal: &str) -> String {
    format!("\"{}\"", literal.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, ResourceType};

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize_text_schema(&conn).unwrap();
        conn
    }

    fn root() -> ResourceId {
        ResourceId::new("st", "sp", "sp")
    }

    fn doc(opaque: &str, title: Option<&str>, content: Option<&str>) -> Resource {
        Resource::new(
            ResourceId::new("st", "sp", opaque),
            root(),
            Some(root()),
            &format!("./{opaque}"),
            ResourceType::File,
            Document {
                name: opaque.to_string(),
                title: title.map(str::to_string),
                content: content.map(str::to_string),
                ..Document::default()
            },
        )
    }

    fn hits(conn: &Connection, query: &str) -> TextMatches {
        match_text(conn, &Query::parse(query).unwrap(), None).unwrap()
    }

    #[test]
    fn test_term_frequency_ranks_higher() {
        let conn = conn();
        index_text(&conn, &doc("once", None, Some("the budget grew"))).unwrap();
        index_text(
            &conn,
            &doc("twice", None, Some("budget talks about the budget")),
        )
        .unwrap();
        for i in 0..4 {
            index_text(&conn, &doc(&format!("none{i}"), None, Some("nothing here"))).unwrap();
        }

        let text = hits(&conn, "Content:budget");
        let once = text.get(0, "st$sp!once").unwrap();
        let twice = text.get(0, "st$sp!twice").unwrap();
        assert!(twice.score > once.score);
        assert!(once.score > 1.0);
        assert!(text.get(0, "st$sp!none0").is_none());
        assert!(
            once.excerpt
                .as_deref()
                .is_some_and(|e| e.contains("<mark>budget</mark>"))
        );
    }

    #[test]
    fn test_matching_is_case_and_diacritic_insensitive() {
        let conn = conn();
        index_text(&conn, &doc("a", None, Some("Résumé of the BUDGET"))).unwrap();

        assert!(hits(&conn, "Content:resume").get(0, "st$sp!a").is_some());
        assert!(hits(&conn, "Content:budget").get(0, "st$sp!a").is_some());
    }

    #[test]
    fn test_phrase_requires_adjacent_tokens() {
        let conn = conn();
        index_text(&conn, &doc("a", None, Some("the budget shrank"))).unwrap();
        index_text(&conn, &doc("b", None, Some("shrank the budget"))).unwrap();

        let text = hits(&conn, r#"Content:"budget shrank""#);
        assert!(text.get(0, "st$sp!a").is_some());
        assert!(text.get(0, "st$sp!b").is_none());
    }

    #[test]
    fn test_wildcards_expand_through_the_dictionary() {
        let conn = conn();
        index_text(&conn, &doc("a", None, Some("quarterly reporting"))).unwrap();
        index_text(&conn, &doc("b", None, Some("annual report"))).unwrap();
        index_text(&conn, &doc("c", None, Some("nothing"))).unwrap();

        let text = hits(&conn, "Content:*port*");
        assert!(text.get(0, "st$sp!a").is_some());
        assert!(text.get(0, "st$sp!b").is_some());
        assert!(text.get(0, "st$sp!c").is_none());

        assert!(hits(&conn, "Content:zz*").get(0, "st$sp!a").is_none());
    }

    #[test]
    fn test_title_and_content_columns() {
        let conn = conn();
        index_text(&conn, &doc("a", Some("Budget"), Some("numbers"))).unwrap();

        let text = hits(&conn, "Title:budget Content:budget budget");
        assert!(text.get(0, "st$sp!a").is_some());
        assert!(text.get(1, "st$sp!a").is_none());
        let unqualified = text.get(2, "st$sp!a").unwrap();
        assert!(unqualified.excerpt.is_none());
    }

    #[test]
    fn test_reindex_and_remove_replace_the_text() {
        let conn = conn();
        let mut entry = doc("a", None, Some("old words"));
        index_text(&conn, &entry).unwrap();
        entry.document.content = Some("new words".to_string());
        index_text(&conn, &entry).unwrap();

        assert!(hits(&conn, "Content:old").get(0, "st$sp!a").is_none());
        assert!(hits(&conn, "Content:new").get(0, "st$sp!a").is_some());

        remove_text(&conn, &entry.id).unwrap();
        assert!(hits(&conn, "Content:new").get(0, "st$sp!a").is_none());
        remove_text(&conn, &entry.id).unwrap();
    }

    #[test]
    fn test_hits_are_restricted_to_the_root() {
        let conn = conn();
        index_text(&conn, &doc("a", None, Some("budget"))).unwrap();

        let query = Query::parse("Content:budget").unwrap();
        let other = ResourceId::new("st", "other", "other");
        assert!(match_text(&conn, &query, Some(&other)).unwrap().get(0, "st$sp!a").is_none());
        assert!(match_text(&conn, &query, Some(&root())).unwrap().get(0, "st$sp!a").is_some());
    }

    #[test]
    fn test_quotes_and_punctuation_are_literal() {
        let conn = conn();
        index_text(&conn, &doc("a", None, Some("say \"hi\" now"))).unwrap();

        assert!(hits(&conn, r#"Content:hi\""#).get(0, "st$sp!a").is_some());
        assert!(hits(&conn, r"Content:\-\-").get(0, "st$sp!a").is_none());
    }
}
