#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! SQL construction for the upstream tabular store.
//!
//! The store speaks a SQL-Server dialect (`SELECT TOP n`, `[bracket]`
//! identifiers, `OFFSET/FETCH` pagination) and only accepts `SELECT`
//! statements. Everything that reaches it is built here:
//!
//! - [`guard`] validates and quotes identifiers and rejects non-`SELECT`
//!   statements.
//! - [`filter`] is a small predicate AST. Caller-supplied filter text is
//!   parsed into it rather than spliced into the statement, so column names
//!   always pass the identifier guard and literals are always escaped.
//! - [`select`] assembles a complete statement.

pub mod filter;
pub mod guard;
pub mod select;

pub use filter::{CompareOp, Filter, Literal, MAX_FILTER_DEPTH};
pub use guard::{assert_select_only, quote_identifier, sanitize_clause};
pub use select::{OrderBy, SelectQuery, SortDirection};

use thiserror::Error;

/// Errors raised while validating or building SQL. None of these ever
/// reach the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqlError {
    /// A table or column name contains characters outside `[A-Za-z0-9_.]`.
    #[error("Invalid identifier: {identifier:?}")]
    InvalidIdentifier {
        /// The offending identifier.
        identifier: String,
    },

    /// The statement does not start with `SELECT`.
    #[error("Only SELECT queries are allowed")]
    RejectedStatement,

    /// A filter fragment could not be parsed or rendered.
    #[error("Invalid filter: {message}")]
    InvalidFilter {
        /// Description of the problem.
        message: String,
    },

    /// Filter groups nest deeper than the parser allows.
    #[error("Filter nests deeper than {limit} groups")]
    FilterTooDeep {
        /// The maximum nesting depth.
        limit: usize,
    },

    /// An order-by clause could not be parsed.
    #[error("Invalid orderBy clause: {clause:?}")]
    InvalidOrderBy {
        /// The offending clause.
        clause: String,
    },

    /// Clause text contains characters outside the clause allow-list.
    #[error("Invalid clause: {clause:?}")]
    InvalidClause {
        /// The offending clause.
        clause: String,
    },
}
