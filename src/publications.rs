//! The Publications reference table.
//!
//! Consulted read-only by the ingest workflow: a source's discovery reference
//! must exist here before the source row can be written.

use rusqlite::params;
use serde::Deserialize;
use tracing::info;

use crate::db::{constraint_violation, Database};
use crate::error::AstroDbError;

/// One row of the Publications table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Publication {
    pub reference: String,
    #[serde(default)]
    pub bibcode: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Publication {
    pub fn new(reference: impl Into<String>) -> Self {
        Publication {
            reference: reference.into(),
            bibcode: None,
            doi: None,
            description: None,
        }
    }
}

/// Look up a publication by reference code, case-insensitively.
pub fn find_publication(
    db: &Database,
    reference: &str,
) -> Result<Option<Publication>, AstroDbError> {
    let mut stmt = db.conn().prepare(
        "SELECT reference, bibcode, doi, description
         FROM Publications WHERE reference = ?1 COLLATE NOCASE",
    )?;
    let mut rows = stmt.query_map(params![reference], |row| {
        Ok(Publication {
            reference: row.get(0)?,
            bibcode: row.get(1)?,
            doi: row.get(2)?,
            description: row.get(3)?,
        })
    })?;
    rows.next().transpose().map_err(Into::into)
}

/// Add a publication so that sources can reference it.
pub fn ingest_publication(db: &Database, publication: &Publication) -> Result<(), AstroDbError> {
    let reference = publication.reference.trim();
    if reference.is_empty() {
        return Err(AstroDbError::InvalidInput(
            "publication reference may not be blank".to_owned(),
        ));
    }

    db.conn()
        .execute(
            "INSERT INTO Publications (reference, bibcode, doi, description)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                reference,
                publication.bibcode,
                publication.doi,
                publication.description
            ],
        )
        .map_err(|err| {
            if constraint_violation(&err) {
                AstroDbError::ConstraintViolation(format!(
                    "could not add publication {reference}; it is already present"
                ))
            } else {
                err.into()
            }
        })?;

    info!(reference, "publication added to database");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_and_case_insensitive_lookup() {
        let db = Database::open_in_memory().unwrap();
        let publication = Publication {
            bibcode: Some("2020AJ....159..257B".to_owned()),
            ..Publication::new("Refr20")
        };
        ingest_publication(&db, &publication).unwrap();

        let found = find_publication(&db, "refr20").unwrap().unwrap();
        assert_eq!(found, publication);
        assert!(find_publication(&db, "Missn99").unwrap().is_none());
    }

    #[test]
    fn duplicates_and_blanks_are_rejected() {
        let db = Database::open_in_memory().unwrap();
        ingest_publication(&db, &Publication::new("Refr20")).unwrap();

        let dup = ingest_publication(&db, &Publication::new("Refr20")).unwrap_err();
        assert!(matches!(dup, AstroDbError::ConstraintViolation(_)));

        let blank = ingest_publication(&db, &Publication::new("  ")).unwrap_err();
        assert!(matches!(blank, AstroDbError::InvalidInput(_)));
    }
}
