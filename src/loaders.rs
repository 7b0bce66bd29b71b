//! Bulk catalog import from JSON record files.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::{info, warn};

use crate::db::Database;
use crate::error::AstroDbError;
use crate::simbad::NameResolver;
use crate::sources::{ingest_source, IngestOutcome, SourceIngest};

/// Tallies from a bulk import.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IngestSummary {
    pub n_added: usize,
    pub n_alias: usize,
    pub n_skipped: usize,
}

/// Ingest a JSON array of source records, continuing past individual
/// failures.
///
/// Per-record `raise_error` is forced off so that one bad record does not
/// abort the run; rejected records are logged and counted. Input-validation
/// and store-level errors still abort.
pub fn ingest_sources_from_json(
    db: &Database,
    resolver: Option<&dyn NameResolver>,
    path: impl AsRef<Path>,
) -> Result<IngestSummary, AstroDbError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| {
        AstroDbError::InvalidInput(format!("could not open {}: {err}", path.display()))
    })?;
    let requests: Vec<SourceIngest> =
        serde_json::from_reader(BufReader::new(file)).map_err(|err| {
            AstroDbError::InvalidInput(format!(
                "malformed source records in {}: {err}",
                path.display()
            ))
        })?;

    info!(n = requests.len(), path = %path.display(), "bulk ingest starting");
    let mut summary = IngestSummary::default();

    for mut request in requests {
        request.raise_error = false;

        match ingest_source(db, resolver, &request)? {
            IngestOutcome::Inserted { .. } => summary.n_added += 1,
            IngestOutcome::AliasAdded { .. } | IngestOutcome::AlreadyPresent { .. } => {
                summary.n_alias += 1
            }
            IngestOutcome::Rejected { message } => {
                warn!(source = %request.source, %message, "record skipped");
                summary.n_skipped += 1;
            }
        }
    }

    info!(
        added = summary.n_added,
        aliased = summary.n_alias,
        skipped = summary.n_skipped,
        "bulk ingest finished"
    );
    Ok(summary)
}
