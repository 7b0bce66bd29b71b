//! The SQLite-backed catalog store.
//!
//! The schema is deliberately small: a reference-checked Publications table, a
//! Sources table keyed by canonical name, and a Names table mapping alternate
//! designations back to their canonical source. Uniqueness and referential
//! integrity live in the schema so that a racing writer is detected by a
//! constraint violation rather than silently duplicated.

use rusqlite::Connection;
use tracing::debug;

use crate::coords::{angular_separation_arcsec, ConeBounds};
use crate::error::AstroDbError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS Publications (
    reference   TEXT PRIMARY KEY,
    bibcode     TEXT,
    doi         TEXT,
    description TEXT
);

CREATE TABLE IF NOT EXISTS Sources (
    source           TEXT PRIMARY KEY,
    ra_deg           REAL,
    dec_deg          REAL,
    epoch_year       TEXT,
    equinox          TEXT,
    reference        TEXT NOT NULL REFERENCES Publications (reference),
    other_references TEXT,
    comments         TEXT
);

CREATE TABLE IF NOT EXISTS Names (
    source     TEXT NOT NULL REFERENCES Sources (source),
    other_name TEXT NOT NULL UNIQUE,
    PRIMARY KEY (source, other_name)
);
";

/// One row of the Sources table.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub source: String,
    pub ra_deg: Option<f64>,
    pub dec_deg: Option<f64>,
    pub epoch_year: Option<String>,
    pub equinox: Option<String>,
    pub reference: String,
    pub other_references: Option<String>,
    pub comments: Option<String>,
}

/// One row of the Names table: a canonical source paired with one of its
/// designations.
#[derive(Debug, Clone, PartialEq)]
pub struct Name {
    pub source: String,
    pub other_name: String,
}

/// Handle on the catalog database. Single-threaded, blocking; all writes go
/// through the ingest workflow in [`crate::sources`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (creating if needed) a catalog database file.
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self, AstroDbError> {
        Self::setup(Connection::open(path)?)
    }

    /// An in-memory catalog, used by the tests.
    pub fn open_in_memory() -> Result<Self, AstroDbError> {
        Self::setup(Connection::open_in_memory()?)
    }

    fn setup(conn: Connection) -> Result<Self, AstroDbError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Database { conn })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Every (canonical, designation) pair known to the database. Sources
    /// normally carry a self-referential Names row, but the union keeps a
    /// source findable even if that row is somehow absent.
    pub fn name_corpus(&self) -> Result<Vec<Name>, AstroDbError> {
        let mut stmt = self.conn.prepare(
            "SELECT source, other_name FROM Names
             UNION
             SELECT source, source FROM Sources",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Name {
                source: row.get(0)?,
                other_name: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Fetch one source row by its canonical name.
    pub fn get_source(&self, source: &str) -> Result<Option<Source>, AstroDbError> {
        let mut stmt = self.conn.prepare(
            "SELECT source, ra_deg, dec_deg, epoch_year, equinox,
                    reference, other_references, comments
             FROM Sources WHERE source = ?1",
        )?;
        let mut rows = stmt.query_map([source], |row| {
            Ok(Source {
                source: row.get(0)?,
                ra_deg: row.get(1)?,
                dec_deg: row.get(2)?,
                epoch_year: row.get(3)?,
                equinox: row.get(4)?,
                reference: row.get(5)?,
                other_references: row.get(6)?,
                comments: row.get(7)?,
            })
        })?;
        rows.next().transpose().map_err(Into::into)
    }

    /// Check that caller-supplied coordinate column names exist on the
    /// Sources table. Unknown names are an input-validation error, never a
    /// silent "no match".
    pub fn validate_coord_columns(&self, ra_col: &str, dec_col: &str) -> Result<(), AstroDbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info('Sources')")?;
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;

        for col in [ra_col, dec_col] {
            if !columns.iter().any(|c| c == col) {
                return Err(AstroDbError::InvalidInput(format!(
                    "`{col}` is not one of the column names used in the Sources table: {columns:?}"
                )));
            }
        }

        Ok(())
    }

    /// Canonical names of sources within `radius_arcsec` of (ra, dec). The
    /// declination band and RA range(s) narrow the scan in SQL; the exact
    /// great-circle cut runs on the survivors.
    pub fn query_region(
        &self,
        ra_deg: f64,
        dec_deg: f64,
        radius_arcsec: f64,
        ra_col: &str,
        dec_col: &str,
    ) -> Result<Vec<String>, AstroDbError> {
        // The column names are interpolated into the statement, so they must
        // have passed the table_info whitelist first.
        self.validate_coord_columns(ra_col, dec_col)?;

        let bounds = ConeBounds::new(ra_deg, dec_deg, radius_arcsec);
        // An inverted range matches nothing when there is no wrap chunk.
        let wrap = bounds.ra_wrap_range.unwrap_or((1.0, 0.0));

        let sql = format!(
            "SELECT source, \"{ra_col}\", \"{dec_col}\" FROM Sources
             WHERE \"{dec_col}\" BETWEEN ?1 AND ?2
               AND ((\"{ra_col}\" BETWEEN ?3 AND ?4)
                 OR (\"{ra_col}\" BETWEEN ?5 AND ?6))"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params![
                bounds.dec_min,
                bounds.dec_max,
                bounds.ra_range.0,
                bounds.ra_range.1,
                wrap.0,
                wrap.1
            ],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                ))
            },
        )?;

        let mut matches = Vec::new();

        for row in rows {
            let (source, src_ra, src_dec) = row?;

            if let (Some(src_ra), Some(src_dec)) = (src_ra, src_dec) {
                let sep = angular_separation_arcsec(ra_deg, dec_deg, src_ra, src_dec);
                if sep <= radius_arcsec {
                    debug!(source, sep_arcsec = sep, "positional match");
                    matches.push(source);
                }
            }
        }

        Ok(matches)
    }
}

/// True when the store rejected a write because of any constraint.
pub(crate) fn constraint_violation(err: &rusqlite::Error) -> bool {
    err.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation)
}

/// True specifically for uniqueness (including primary key) violations.
pub(crate) fn unique_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(f, _)
        if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AstroDbError;

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute_batch(
                "INSERT INTO Publications (reference) VALUES ('Refr20');
                 INSERT INTO Sources (source, ra_deg, dec_deg, reference)
                     VALUES ('2MASS J07222760-0540384', 110.615, -5.67733, 'Refr20');
                 INSERT INTO Names (source, other_name)
                     VALUES ('2MASS J07222760-0540384', '2MASS J07222760-0540384');",
            )
            .unwrap();
        db
    }

    #[test]
    fn bad_column_names_are_rejected_up_front() {
        let db = seeded();
        let err = db
            .validate_coord_columns("bad_column_name", "dec_deg")
            .unwrap_err();
        assert!(matches!(err, AstroDbError::InvalidInput(_)));
        assert!(err.to_string().contains("bad_column_name"));
        assert!(err.to_string().contains("column names used in the Sources table"));
    }

    #[test]
    fn region_query_respects_the_radius() {
        let db = seeded();

        let near = db
            .query_region(110.615, -5.6780, 60.0, "ra_deg", "dec_deg")
            .unwrap();
        assert_eq!(near, vec!["2MASS J07222760-0540384".to_owned()]);

        // A degree away: far outside 60 arcsec.
        let far = db
            .query_region(110.615, -6.67733, 60.0, "ra_deg", "dec_deg")
            .unwrap();
        assert!(far.is_empty());

        // Widening the radius past the true separation recovers the match.
        let wide = db
            .query_region(110.615, -6.67733, 3700.0, "ra_deg", "dec_deg")
            .unwrap();
        assert_eq!(wide.len(), 1);
    }

    #[test]
    fn corpus_includes_sources_without_name_rows() {
        let db = seeded();
        db.conn()
            .execute(
                "INSERT INTO Sources (source, reference) VALUES ('Bare', 'Refr20')",
                [],
            )
            .unwrap();

        let corpus = db.name_corpus().unwrap();
        assert!(corpus
            .iter()
            .any(|n| n.source == "Bare" && n.other_name == "Bare"));
    }

    #[test]
    fn foreign_keys_are_enforced() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .conn()
            .execute(
                "INSERT INTO Sources (source, reference) VALUES ('Orphan', 'NoSuchRef')",
                [],
            )
            .unwrap_err();
        assert!(constraint_violation(&err));
        assert!(!unique_violation(&err));
    }
}
