//! Query string parsing.
//!
//! Grammar, one clause per whitespace-separated token:
//!
//! ```text
//! clause := ["+" | "-"] [field ":"] value
//! value  := '"' phrase '"' | (">" | ">=" | "<" | "<=") operand | term
//! ```
//!
//! `\` escapes the next character anywhere in a clause, including whitespace.
//! Unescaped `*` and `?` in a term are wildcards.

use crate::models::MediaKind;
use crate::{Error, Result};
use regex::{Regex, RegexBuilder};
use std::fmt;

/// Characters with a meaning in the query syntax.
const RESERVED: &[char] = &[
    '+', '-', '=', '&', '|', '>', '<', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?',
    ':', '\\', '/',
];

/// Escapes a literal so it can be embedded in a query as a single exact term.
///
/// # Examples
///
/// ```
/// use spacesearch::query::escape_term;
///
/// assert_eq!(escape_term("st$sp!a-b"), r"st$sp\!a\-b");
/// assert_eq!(escape_term("my file"), r"my\ file");
/// ```
#[must_use]
pub fn escape_term(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for c in raw.chars() {
        if RESERVED.contains(&c) || c.is_whitespace() {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Like [`escape_term`], but leaves the `*` and `?` wildcards active.
#[must_use]
pub fn escape_pattern(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for c in raw.chars() {
        if (RESERVED.contains(&c) && c != '*' && c != '?') || c.is_whitespace() {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// How a clause contributes to a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    /// At least one should-clause must match when there are no must-clauses.
    Should,
    /// Prefixed with `+`: required.
    Must,
    /// Prefixed with `-`: excluded.
    MustNot,
}

/// A queryable document field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// Resource id.
    Id,
    /// Space root id.
    RootId,
    /// Parent id.
    ParentId,
    /// Relative path.
    Path,
    /// File or folder name.
    Name,
    /// Extracted title.
    Title,
    /// Extracted body text.
    Content,
    /// Tags.
    Tags,
    /// Size in bytes.
    Size,
    /// Modification time.
    Mtime,
    /// MIME type.
    MimeType,
    /// Resource type (`1`/`file`, `2`/`container`).
    Type,
    /// Soft-delete flag.
    Deleted,
    /// Hidden flag.
    Hidden,
    /// A typed media field, e.g. `audio.artist`.
    Media(MediaKind, &'static str),
    /// A field that does not exist; matches nothing.
    Unknown(String),
}

impl Field {
    const NAMED: [(&'static str, Self); 14] = [
        ("ID", Self::Id),
        ("RootID", Self::RootId),
        ("ParentID", Self::ParentId),
        ("Path", Self::Path),
        ("Name", Self::Name),
        ("Title", Self::Title),
        ("Content", Self::Content),
        ("Tags", Self::Tags),
        ("Size", Self::Size),
        ("Mtime", Self::Mtime),
        ("MimeType", Self::MimeType),
        ("Type", Self::Type),
        ("Deleted", Self::Deleted),
        ("Hidden", Self::Hidden),
    ];

    /// Resolves a field name, case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        if let Some((_, field)) = Self::NAMED
            .iter()
            .find(|(canonical, _)| canonical.eq_ignore_ascii_case(name))
        {
            return field.clone();
        }
        MediaKind::resolve_field(name).map_or_else(
            || Self::Unknown(name.to_string()),
            |(kind, field)| Self::Media(kind, field),
        )
    }

    /// Returns true for fields compared as case-sensitive identifiers.
    #[must_use]
    pub const fn is_identifier(&self) -> bool {
        matches!(self, Self::Id | Self::RootId | Self::ParentId | Self::Path)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Media(kind, field) => write!(f, "{}.{field}", kind.as_str()),
            Self::Unknown(name) => write!(f, "{name}"),
            named => {
                let name = Self::NAMED
                    .iter()
                    .find(|(_, field)| field == named)
                    .map_or("?", |(canonical, _)| canonical);
                write!(f, "{name}")
            },
        }
    }
}

/// Comparison operator of a range term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
}

impl RangeOp {
    /// Applies the operator to an ordering of `value` relative to the operand.
    #[must_use]
    pub const fn accepts(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        matches!(
            (self, ordering),
            (Self::Gt, Greater) | (Self::Ge, Greater | Equal) | (Self::Lt, Less) | (Self::Le, Less | Equal)
        )
    }
}

/// A compiled wildcard pattern.
#[derive(Debug, Clone)]
pub struct Wildcard {
    /// The pattern as written, with escapes resolved and wildcards kept.
    pub pattern: String,
    /// Lowercase `GLOB` pattern for looking the term up in a term dictionary.
    pub glob: String,
    /// Case-sensitive matcher for identifier fields.
    pub sensitive: Regex,
    /// Case-insensitive matcher for text fields.
    pub folded: Regex,
}

impl Wildcard {
    fn compile(chars: &[(char, bool)]) -> Result<Self> {
        let mut pattern = String::new();
        let mut glob = String::new();
        let mut source = String::from("^");
        for &(c, escaped) in chars {
            pattern.push(c);
            match c {
                '*' | '?' if !escaped => {
                    source.push_str(if c == '*' { ".*" } else { "." });
                    glob.push(c);
                },
                '*' | '?' | '[' => {
                    source.push_str(&regex::escape(&c.to_string()));
                    glob.push('[');
                    glob.push(c);
                    glob.push(']');
                },
                _ => {
                    source.push_str(&regex::escape(&c.to_string()));
                    glob.extend(c.to_lowercase());
                },
            }
        }
        source.push('$');

        let build = |case_insensitive: bool| {
            RegexBuilder::new(&source)
                .case_insensitive(case_insensitive)
                .dot_matches_new_line(true)
                .build()
                .map_err(|e| Error::BadRequest(format!("invalid wildcard '{pattern}': {e}")))
        };

        Ok(Self {
            sensitive: build(false)?,
            folded: build(true)?,
            pattern,
            glob,
        })
    }
}

/// The value side of a clause.
#[derive(Debug, Clone)]
pub enum Term {
    /// A literal value.
    Exact(String),
    /// A value containing `*` or `?` wildcards.
    Wildcard(Wildcard),
    /// A quoted phrase.
    Phrase(String),
    /// A comparison against an operand.
    Range {
        /// The operator.
        op: RangeOp,
        /// The operand, unquoted and unescaped.
        operand: String,
    },
}

/// One clause of a query.
#[derive(Debug, Clone)]
pub struct Clause {
    /// Must, must-not or should.
    pub occur: Occur,
    /// Target field; `None` searches the default text fields.
    pub field: Option<Field>,
    /// The value.
    pub term: Term,
}

impl Clause {
    /// Returns true if the clause is matched against tokenized body text.
    ///
    /// Unqualified clauses and `Title`/`Content` clauses are; comparisons
    /// never are.
    #[must_use]
    pub fn is_full_text(&self) -> bool {
        !matches!(self.term, Term::Range { .. })
            && matches!(self.field, None | Some(Field::Title | Field::Content))
    }

    /// Returns true if the clause can only match through body text.
    #[must_use]
    pub fn is_text_only(&self) -> bool {
        self.is_full_text() && self.field.is_some()
    }
}

/// A parsed query.
#[derive(Debug, Clone)]
pub struct Query {
    /// Clauses in the order written.
    pub clauses: Vec<Clause>,
}

impl Query {
    /// Parses a query string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] for an empty query, an unterminated
    /// quote, a dangling escape or a clause without a value.
    pub fn parse(input: &str) -> Result<Self> {
        let clauses = tokenize(input)?
            .iter()
            .map(|token| parse_clause(token))
            .collect::<Result<Vec<_>>>()?;

        if clauses.is_empty() {
            return Err(Error::BadRequest("empty query".to_string()));
        }

        Ok(Self { clauses })
    }

    /// Returns the resource id a must-clause pins this query to, if any.
    ///
    /// Lets backends look a single document up by key instead of scanning.
    #[must_use]
    pub fn required_id(&self) -> Option<&str> {
        self.clauses.iter().find_map(|clause| match clause {
            Clause {
                occur: Occur::Must,
                field: Some(Field::Id),
                term: Term::Exact(id) | Term::Phrase(id),
            } => Some(id.as_str()),
            _ => None,
        })
    }
}

/// Parses a query string. Shorthand for [`Query::parse`].
///
/// # Errors
///
/// See [`Query::parse`].
pub fn parse(input: &str) -> Result<Query> {
    Query::parse(input)
}

/// Splits the input on unescaped whitespace outside quotes, keeping escapes.
fn tokenize(input: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let next = chars
                    .next()
                    .ok_or_else(|| Error::BadRequest("dangling escape at end of query".to_string()))?;
                current.push('\\');
                current.push(next);
            },
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            },
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            },
            c => current.push(c),
        }
    }

    if in_quotes {
        return Err(Error::BadRequest("unterminated quote in query".to_string()));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Resolves escapes into `(char, was_escaped)` pairs.
fn unescape(raw: &str) -> Vec<(char, bool)> {
    let mut out = Vec::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push((next, true));
            }
        } else {
            out.push((c, false));
        }
    }
    out
}

fn plain(chars: &[(char, bool)]) -> String {
    chars.iter().map(|&(c, _)| c).collect()
}

fn parse_clause(token: &str) -> Result<Clause> {
    let (occur, rest) = match token.chars().next() {
        Some('+') => (Occur::Must, &token[1..]),
        Some('-') => (Occur::MustNot, &token[1..]),
        _ => (Occur::Should, token),
    };

    let (field, value) = split_field(rest);
    let term = parse_term(value)?;

    Ok(Clause {
        occur,
        field: field.map(Field::parse),
        term,
    })
}

/// Splits `Field:value`; the field name must be a plain, unquoted word.
fn split_field(raw: &str) -> (Option<&str>, &str) {
    for (i, c) in raw.char_indices() {
        match c {
            ':' if i > 0 => return (Some(&raw[..i]), &raw[i + 1..]),
            c if c.is_alphanumeric() || c == '.' || c == '_' => {},
            _ => break,
        }
    }
    (None, raw)
}

fn parse_term(raw: &str) -> Result<Term> {
    if raw.is_empty() {
        return Err(Error::BadRequest("clause without a value".to_string()));
    }

    let range = [
        (">=", RangeOp::Ge),
        ("<=", RangeOp::Le),
        (">", RangeOp::Gt),
        ("<", RangeOp::Lt),
    ]
    .into_iter()
    .find_map(|(prefix, op)| raw.strip_prefix(prefix).map(|operand| (op, operand)));

    if let Some((op, operand)) = range {
        let operand = plain(&unescape(strip_quotes(operand)));
        if operand.is_empty() {
            return Err(Error::BadRequest("comparison without an operand".to_string()));
        }
        return Ok(Term::Range { op, operand });
    }

    if raw.starts_with('"') {
        let phrase = plain(&unescape(strip_quotes(raw)));
        if phrase.trim().is_empty() {
            return Err(Error::BadRequest("empty phrase".to_string()));
        }
        return Ok(Term::Phrase(phrase));
    }

    let chars = unescape(raw);
    if chars.iter().any(|&(c, escaped)| !escaped && (c == '*' || c == '?')) {
        return Wildcard::compile(&chars).map(Term::Wildcard);
    }
    Ok(Term::Exact(plain(&chars)))
}

fn strip_quotes(raw: &str) -> &str {
    raw.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw)
}
