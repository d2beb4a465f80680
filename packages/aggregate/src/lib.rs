#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Request-level flows over the upstream tables.
//!
//! - [`Orchestrator`] builds the combined incident feed
//!   ([`Orchestrator::get_incidents`]), the proximity search around an
//!   address, and paged listings of a single source.
//! - [`Correlator`] searches every person-bearing source for a name and
//!   merges the matches into one date-ordered, paginated list. It also
//!   lists recent arrestees who already have a corrections case.
//!
//! Both fan their per-source queries out concurrently and share one
//! partial-failure contract: a source whose query fails contributes no rows
//! and is listed in `failed_sources`; the request only fails when every
//! source does.

pub mod correlate;
pub mod feed;
pub mod person;
pub mod proximity;
pub mod records;
pub mod reoffend;

#[cfg(test)]
pub(crate) mod test_support;

pub use correlate::{CorrelatedPage, Correlator, OffenderDetail};
pub use feed::{IncidentFeed, IncidentOptions, Orchestrator};
pub use person::{ExactMatch, NameMatchPolicy, PersonQuery, SubstringMatch};
pub use proximity::{ProximityMatch, ProximityOptions, ProximityResult};
pub use records::RecordPage;
pub use reoffend::{Reoffender, ReoffenderPage};

use blotter_sql::SqlError;
use blotter_upstream::UpstreamError;
use thiserror::Error;

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Page size when a caller does not give one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Errors from the aggregation flows.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// An upstream call failed. For fan-out flows this is only returned
    /// when every source failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// A query could not be built from the request.
    #[error(transparent)]
    Sql(#[from] SqlError),

    /// A request parameter is out of range.
    #[error("Invalid {name}: {reason}")]
    InvalidParameter {
        /// The parameter name as the caller sent it.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The proximity center address could not be geocoded.
    #[error("Address could not be geocoded: {address:?}")]
    AddressNotFound {
        /// The address as given.
        address: String,
    },

    /// No configured source has this id or role.
    #[error("Unknown source: {id:?}")]
    UnknownSource {
        /// The requested source id.
        id: String,
    },
}

impl AggregateError {
    /// Returns `true` for request errors detected before any network call.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Sql(_) | Self::InvalidParameter { .. })
            || matches!(self, Self::Upstream(e) if e.is_validation())
    }
}

/// Normalizes a requested page: pages below 1 become 1, sizes are clamped
/// to `1..=MAX_PAGE_SIZE`.
#[must_use]
pub fn clamp_page(page: u32, page_size: u32) -> (u32, u32) {
    (page.max(1), page_size.clamp(1, MAX_PAGE_SIZE))
}

/// Collects per-source outcomes, logging and listing failures. Returns the
/// first error only when every source failed.
pub(crate) fn partition_outcomes<T>(
    outcomes: Vec<(String, Result<Vec<T>, AggregateError>)>,
) -> Result<(Vec<T>, Vec<String>), AggregateError> {
    let total = outcomes.len();
    let mut rows = Vec::new();
    let mut failed = Vec::new();
    let mut first_error = None;

    for (source_id, outcome) in outcomes {
        match outcome {
            Ok(mut source_rows) => rows.append(&mut source_rows),
            Err(e) => {
                log::warn!("Source {source_id} failed: {e}");
                failed.push(source_id);
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) if failed.len() == total => Err(e),
        _ => Ok((rows, failed)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_clamping() {
        assert_eq!(clamp_page(0, 0), (1, 1));
        assert_eq!(clamp_page(3, 20), (3, 20));
        assert_eq!(clamp_page(1, 5000), (1, MAX_PAGE_SIZE));
    }

    #[test]
    fn partial_failure_keeps_successful_rows() {
        let outcomes = vec![
            ("a".to_string(), Ok(vec![1, 2])),
            (
                "b".to_string(),
                Err(AggregateError::UnknownSource { id: "b".into() }),
            ),
        ];
        let (rows, failed) = partition_outcomes(outcomes).unwrap();
        assert_eq!(rows, vec![1, 2]);
        assert_eq!(failed, vec!["b".to_string()]);
    }

    #[test]
    fn total_failure_returns_first_error() {
        let outcomes: Vec<(String, Result<Vec<u8>, _>)> = vec![
            (
                "a".to_string(),
                Err(AggregateError::UnknownSource { id: "a".into() }),
            ),
            (
                "b".to_string(),
                Err(AggregateError::UnknownSource { id: "b".into() }),
            ),
        ];
        match partition_outcomes(outcomes) {
            Err(AggregateError::UnknownSource { id }) => assert_eq!(id, "a"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn no_sources_is_not_a_failure() {
        let (rows, failed) = partition_outcomes::<u8>(Vec::new()).unwrap();
        assert!(rows.is_empty());
        assert!(failed.is_empty());
    }
}
