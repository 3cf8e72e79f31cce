//! The index query language.
//!
//! Queries are parsed once into a [`Query`] and then evaluated against each
//! candidate [`Resource`](crate::models::Resource) a backend loads for the
//! requested scope. Body text (`Title`, `Content`) is tokenized and ranked by
//! the backend's full-text index; its hits reach the evaluation as
//! [`TextMatches`]. Evaluation yields a relevance score and, for matches on
//! the body text, a highlighted excerpt.
//!
//! ```
//! use spacesearch::query::{Query, escape_term};
//!
//! let query = Query::parse(&format!("+ID:{} +Size:>0", escape_term("st$sp!abc"))).unwrap();
//! assert_eq!(query.required_id(), Some("st$sp!abc"));
//! ```

mod matcher;
mod parser;

pub use matcher::{Hit, TextHit, TextMatches};
pub use parser::{
    Clause, Field, Occur, Query, RangeOp, Term, Wildcard, escape_pattern, escape_term,
    parse,
};
