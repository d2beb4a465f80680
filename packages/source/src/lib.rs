#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Upstream table definitions and row normalization.
//!
//! Every table the service reads (dispatch log, daily bulletin, jail
//! roster, corrections registry, sex-offender registry) is described by a
//! TOML [`SourceDefinition`] embedded at compile time. The definitions
//! drive query construction and the projection of raw rows into
//! [`blotter_incident_models::CanonicalIncident`] and
//! [`blotter_incident_models::CorrelatedResult`].

pub mod parsing;
pub mod registry;
pub mod source_def;

pub use registry::{all_sources, feed_sources, person_sources, source_by_id};
pub use source_def::{
    DetailTable, FieldMapping, PersonMapping, SourceDefinition, parse_source_toml,
    supervision_kind,
};
