//! Evaluates a parsed query against an index entry.
//!
//! Keyword, structural and range clauses are decided here. Clauses on the
//! tokenized body fields (`Title`, `Content`) are answered by the backend's
//! full-text index, which hands its per-clause hits in as [`TextMatches`].

use super::parser::{Clause, Field, Occur, Query, Term, Wildcard};
use crate::models::{FieldValue, Resource};
use chrono::{DateTime, NaiveDate, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

const SCORE_EXACT: f32 = 1.0;
const SCORE_WILDCARD: f32 = 0.5;

/// Keyword fields searched by a clause without a field qualifier.
const DEFAULT_KEYWORD_FIELDS: [Field; 2] = [Field::Name, Field::Tags];

/// The outcome of a successful match.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// Sum of the scores of all matching positive clauses.
    pub score: f32,
    /// Highlighted content excerpt, if a clause matched the content.
    pub highlights: Option<String>,
}

/// A full-text hit of one clause on one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TextHit {
    /// Relevance reported by the full-text engine.
    pub score: f32,
    /// Excerpt of the body text with the hits marked, if the body matched.
    pub excerpt: Option<String>,
}

/// Full-text hits of a query, per clause index and entry id.
#[derive(Debug, Clone, Default)]
pub struct TextMatches {
    by_clause: HashMap<usize, HashMap<String, TextHit>>,
}

impl TextMatches {
    /// Creates an empty set; every full-text clause misses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that clause `clause` has been run, even if nothing matched.
    pub fn searched(&mut self, clause: usize) {
        self.by_clause.entry(clause).or_default();
    }

    /// Records a hit of clause `clause` on entry `id`.
    pub fn insert(&mut self, clause: usize, id: impl Into<String>, hit: TextHit) {
        self.by_clause.entry(clause).or_default().insert(id.into(), hit);
    }

    /// Returns the hit of clause `clause` on entry `id`.
    #[must_use]
    pub fn get(&self, clause: usize, id: &str) -> Option<&TextHit> {
        self.by_clause.get(&clause)?.get(id)
    }

    /// Returns the ids that can possibly match `query`, or `None` if any entry
    /// can.
    ///
    /// A required text-only clause bounds the result to its hits. A query made
    /// only of optional text-only clauses is bounded by the union of theirs.
    #[must_use]
    pub fn candidate_ids(&self, query: &Query) -> Option<BTreeSet<&str>> {
        let ids = |index: usize| {
            self.by_clause
                .get(&index)
                .into_iter()
                .flat_map(HashMap::keys)
                .map(String::as_str)
        };

        let required = query
            .clauses
            .iter()
            .enumerate()
            .filter(|(_, clause)| clause.occur == Occur::Must && clause.is_text_only())
            .map(|(index, _)| index)
            .min_by_key(|index| self.by_clause.get(index).map_or(0, HashMap::len));
        if let Some(index) = required {
            return Some(ids(index).collect());
        }

        let positive: Vec<(usize, &Clause)> = query
            .clauses
            .iter()
            .enumerate()
            .filter(|(_, clause)| clause.occur != Occur::MustNot)
            .collect();
        if !positive.is_empty() && positive.iter().all(|(_, clause)| clause.is_text_only()) {
            return Some(positive.iter().flat_map(|(index, _)| ids(*index)).collect());
        }
        None
    }
}

struct ClauseHit {
    score: f32,
    highlights: Option<String>,
}

impl Query {
    /// Evaluates the query against a resource without full-text hits.
    ///
    /// `Title` and `Content` clauses never match.
    #[must_use]
    pub fn evaluate(&self, resource: &Resource) -> Option<Hit> {
        self.evaluate_with(resource, &TextMatches::new())
    }

    /// Evaluates the query against a resource.
    ///
    /// All must-clauses have to match and no must-not clause may match. If
    /// there are no must-clauses, at least one should-clause has to match.
    /// A query made only of must-not clauses matches everything else.
    #[must_use]
    pub fn evaluate_with(&self, resource: &Resource, text: &TextMatches) -> Option<Hit> {
        let id = resource.id.to_string();
        let mut score = 0.0;
        let mut highlights = None;
        let mut has_must = false;
        let mut has_should = false;
        let mut should_matched = false;

        for (index, clause) in self.clauses.iter().enumerate() {
            let hit = evaluate_clause(clause, resource, text.get(index, &id));
            match clause.occur {
                Occur::MustNot => {
                    if hit.is_some() {
                        return None;
                    }
                },
                Occur::Must => {
                    has_must = true;
                    let hit = hit?;
                    score += hit.score;
                    highlights = highlights.or(hit.highlights);
                },
                Occur::Should => {
                    has_should = true;
                    if let Some(hit) = hit {
                        should_matched = true;
                        score += hit.score;
                        highlights = highlights.or(hit.highlights);
                    }
                },
            }
        }

        if !has_must && has_should && !should_matched {
            return None;
        }
        if !has_must && !has_should {
            score = SCORE_EXACT;
        }

        Some(Hit { score, highlights })
    }
}

fn evaluate_clause(
    clause: &Clause,
    resource: &Resource,
    text: Option<&TextHit>,
) -> Option<ClauseHit> {
    let full_text = text.filter(|_| clause.is_full_text()).map(|hit| ClauseHit {
        score: hit.score,
        highlights: hit.excerpt.clone(),
    });

    let keyword = match &clause.field {
        Some(Field::Title | Field::Content | Field::Unknown(_)) => None,
        Some(field) => evaluate_field(field, &clause.term, resource),
        None => DEFAULT_KEYWORD_FIELDS
            .iter()
            .filter_map(|field| evaluate_field(field, &clause.term, resource))
            .max_by(|a, b| a.score.total_cmp(&b.score)),
    };

    match (full_text, keyword) {
        (Some(text), Some(keyword)) if keyword.score > text.score => Some(keyword),
        (Some(text), _) => Some(text),
        (None, keyword) => keyword,
    }
}

fn evaluate_field(field: &Field, term: &Term, resource: &Resource) -> Option<ClauseHit> {
    field_values(field, resource)
        .iter()
        .filter_map(|value| match_value(value, term, field.is_identifier()))
        .reduce(f32::max)
        .map(|score| ClauseHit {
            score,
            highlights: None,
        })
}

/// Returns the values a keyword or structural field holds for a resource.
fn field_values(field: &Field, resource: &Resource) -> Vec<FieldValue> {
    let document = &resource.document;
    match field {
        Field::Id => vec![FieldValue::Keyword(resource.id.to_string())],
        Field::RootId => vec![FieldValue::Keyword(resource.root_id.to_string())],
        Field::ParentId => resource
            .parent_id
            .iter()
            .map(|id| FieldValue::Keyword(id.to_string()))
            .collect(),
        Field::Path => vec![FieldValue::Keyword(resource.path.clone())],
        Field::Name => vec![FieldValue::Text(document.name.clone())],
        Field::Tags => document.tags.iter().cloned().map(FieldValue::Text).collect(),
        #[allow(clippy::cast_precision_loss)]
        Field::Size => vec![FieldValue::Number(document.size as f64)],
        Field::Mtime => document.mtime.iter().copied().map(FieldValue::Time).collect(),
        Field::MimeType => vec![FieldValue::Text(document.mime_type.clone())],
        Field::Type => vec![
            FieldValue::Number(f64::from(resource.resource_type.code())),
            FieldValue::Text(resource.resource_type.as_str().to_string()),
        ],
        Field::Deleted => vec![FieldValue::Bool(resource.deleted)],
        Field::Hidden => vec![FieldValue::Bool(resource.hidden)],
        Field::Media(kind, name) => document.media_field(*kind, name).into_iter().collect(),
        Field::Title | Field::Content | Field::Unknown(_) => Vec::new(),
    }
}

fn match_value(value: &FieldValue, term: &Term, case_sensitive: bool) -> Option<f32> {
    let matched = match term {
        Term::Exact(literal) | Term::Phrase(literal) => equals(value, literal, case_sensitive),
        Term::Wildcard(wildcard) => {
            return wildcard_matches(value, wildcard, case_sensitive).then_some(SCORE_WILDCARD);
        },
        Term::Range { op, operand } => compare(value, operand).is_some_and(|o| op.accepts(o)),
    };
    matched.then_some(SCORE_EXACT)
}

fn equals(value: &FieldValue, literal: &str, case_sensitive: bool) -> bool {
    match value {
        FieldValue::Keyword(v) if case_sensitive => v == literal,
        FieldValue::Keyword(v) | FieldValue::Text(v) => v.to_lowercase() == literal.to_lowercase(),
        FieldValue::Number(v) => literal.trim().parse::<f64>().is_ok_and(|n| n == *v),
        FieldValue::Bool(v) => parse_bool(literal) == Some(*v),
        FieldValue::Time(v) => parse_time(literal).is_some_and(|t| t == *v),
    }
}

fn wildcard_matches(value: &FieldValue, wildcard: &Wildcard, case_sensitive: bool) -> bool {
    let regex = if case_sensitive {
        &wildcard.sensitive
    } else {
        &wildcard.folded
    };
    match value {
        FieldValue::Keyword(v) | FieldValue::Text(v) => regex.is_match(v),
        FieldValue::Number(v) => regex.is_match(&v.to_string()),
        FieldValue::Bool(v) => regex.is_match(&v.to_string()),
        FieldValue::Time(v) => regex.is_match(&v.to_rfc3339()),
    }
}

/// Orders `value` relative to `operand`; `None` if they are not comparable.
fn compare(value: &FieldValue, operand: &str) -> Option<Ordering> {
    match value {
        FieldValue::Number(v) => v.partial_cmp(&operand.trim().parse::<f64>().ok()?),
        FieldValue::Time(v) => Some(v.cmp(&parse_time(operand)?)),
        FieldValue::Keyword(v) => Some(v.as_str().cmp(operand)),
        FieldValue::Text(v) => Some(v.to_lowercase().cmp(&operand.to_lowercase())),
        FieldValue::Bool(_) => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" => Some(true),
        "false" | "f" | "0" => Some(false),
        _ => None,
    }
}

/// Parses an RFC 3339 timestamp or a plain `YYYY-MM-DD` date (midnight UTC).
fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc())
}
