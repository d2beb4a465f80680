//! Source registry: loads all source definitions from embedded TOML configs.
//!
//! Each `.toml` file in `packages/source/sources/` is baked into the binary
//! at compile time via [`include_str!`]. Adding a new table is a matter of
//! creating a new TOML file and adding it to the list below.

use crate::source_def::{SourceDefinition, parse_source_toml};

/// TOML configs embedded at compile time.
const SOURCE_TOMLS: &[(&str, &str)] = &[
    // ── Dispatch ─────────────────────────────────────────────────────
    ("dispatch", include_str!("../sources/dispatch.toml")),
    // ── Daily bulletin ───────────────────────────────────────────────
    ("arrests", include_str!("../sources/arrests.toml")),
    ("crime", include_str!("../sources/crime.toml")),
    (
        "traffic_citations",
        include_str!("../sources/traffic_citations.toml"),
    ),
    (
        "traffic_accidents",
        include_str!("../sources/traffic_accidents.toml"),
    ),
    // ── Registries ───────────────────────────────────────────────────
    ("jail", include_str!("../sources/jail.toml")),
    ("probation", include_str!("../sources/probation.toml")),
    ("sex_offenders", include_str!("../sources/sex_offenders.toml")),
];

/// Total number of configured sources (used in tests).
#[cfg(test)]
const EXPECTED_SOURCE_COUNT: usize = 8;

/// Returns all configured source definitions, parsed from embedded TOML.
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_sources() -> Vec<SourceDefinition> {
    SOURCE_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_source_toml(toml).unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}

/// Sources that contribute to the combined incident feed.
#[must_use]
pub fn feed_sources() -> Vec<SourceDefinition> {
    all_sources().into_iter().filter(|s| s.feed).collect()
}

/// Sources the person search fans out to.
#[must_use]
pub fn person_sources() -> Vec<SourceDefinition> {
    all_sources()
        .into_iter()
        .filter(|s| s.person.is_some())
        .collect()
}

/// Looks up one source by id.
#[must_use]
pub fn source_by_id(id: &str) -> Option<SourceDefinition> {
    all_sources().into_iter().find(|s| s.id == id)
}
