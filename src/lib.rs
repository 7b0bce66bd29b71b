//! Helpers for populating and querying a curated astronomical source catalog
//!
//! The heart of the crate is the source-identity workflow in [`sources`]:
//! [`sources::find_source_in_db`] decides whether a candidate object is
//! already in the database (exact name, fuzzy name, resolver designations,
//! then positional cross-match, in that order), and
//! [`sources::ingest_source`] wraps it in an insert-or-reject workflow that
//! keeps the Sources and Names tables free of duplicates and dangling
//! discovery references.
//!
//! The store is a small SQLite file ([`db::Database`]); the external
//! name-resolution fallback is SIMBAD's TAP service
//! ([`simbad::SimbadClient`]), behind the [`simbad::NameResolver`] trait so
//! that offline callers and the tests can substitute their own.

pub mod coords;
pub mod db;
pub mod error;
pub mod loaders;
pub mod names;
pub mod publications;
pub mod simbad;
pub mod sources;

pub use db::{Database, Name, Source};
pub use error::AstroDbError;
pub use loaders::{ingest_sources_from_json, IngestSummary};
pub use publications::{find_publication, ingest_publication, Publication};
pub use simbad::{NameResolver, ResolvedCoords, SimbadClient};
pub use sources::{
    find_source_in_db, find_survey_names, ingest_name, ingest_source, IngestOutcome,
    SearchOptions, SourceIngest, SurveyDesignation,
};

/// Set up console logging for binaries and interactive sessions.
///
/// Honors `RUST_LOG`; defaults to `info`. Call once at process start.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false) // don't print the module name
        .init();
}
