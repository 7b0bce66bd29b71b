//! Source-identity resolution and ingestion.
//!
//! [`find_source_in_db`] decides whether a candidate object already exists in
//! the catalog, trying five strategies in strict order and stopping at the
//! first that yields at least one match: exact name, fuzzy name, resolver
//! designations, positional cross-match on supplied coordinates, positional
//! cross-match on resolver coordinates.
//!
//! [`ingest_source`] wraps that in an insert-or-reject workflow: a single
//! existing match turns the supplied name into an alias of it, multiple
//! matches reject as ambiguous, and no match leads to reference and
//! coordinate validation followed by a transactional insert of the Source row
//! and its self-referential Names row.

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::db::{constraint_violation, unique_violation, Database, Name, Source};
use crate::error::AstroDbError;
use crate::names::{fuzzy_tolerance, levenshtein, normalize_name};
use crate::publications::find_publication;
use crate::simbad::NameResolver;

/// Knobs for [`find_source_in_db`]. `Default` gives the standard 60 arcsec
/// radius, fuzzy matching on, and the stock coordinate column names.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub ra: Option<f64>,
    pub dec: Option<f64>,
    pub search_radius_arcsec: f64,
    pub fuzzy: bool,
    pub ra_col_name: String,
    pub dec_col_name: String,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            ra: None,
            dec: None,
            search_radius_arcsec: 60.0,
            fuzzy: true,
            ra_col_name: "ra_deg".to_owned(),
            dec_col_name: "dec_deg".to_owned(),
        }
    }
}

/// Find a source in the database given a name and optional coordinates.
///
/// Returns the canonical names of every match found by the first strategy
/// that produced any: an empty list means the source is unknown, a
/// single-element list is an unambiguous match, and a longer list must be
/// disambiguated by the caller.
///
/// Strategies requiring absent inputs are skipped: positional matching needs
/// `ra` and `dec`, and the resolver strategies need `resolver`.
pub fn find_source_in_db(
    db: &Database,
    resolver: Option<&dyn NameResolver>,
    source: &str,
    options: &SearchOptions,
) -> Result<Vec<String>, AstroDbError> {
    let source = source.trim();

    // Malformed column names surface immediately, never as "no match".
    db.validate_coord_columns(&options.ra_col_name, &options.dec_col_name)?;

    let corpus = db.name_corpus()?;

    debug!(source, "searching for match in database");
    let mut matches = exact_matches(&corpus, source);

    if matches.is_empty() && options.fuzzy {
        debug!(source, "no exact name match; trying fuzzy search");
        matches = fuzzy_matches(&corpus, source);
    }

    if matches.is_empty() {
        if let Some(resolver) = resolver {
            debug!(source, "no name match; trying resolver designations");
            for alias in resolver.resolve_aliases(source)? {
                for hit in exact_matches(&corpus, &alias) {
                    if !matches.contains(&hit) {
                        matches.push(hit);
                    }
                }
            }
        }
    }

    if matches.is_empty() {
        if let (Some(ra), Some(dec)) = (options.ra, options.dec) {
            debug!(
                source,
                ra,
                dec,
                radius_arcsec = options.search_radius_arcsec,
                "trying positional search"
            );
            matches = db.query_region(
                ra,
                dec,
                options.search_radius_arcsec,
                &options.ra_col_name,
                &options.dec_col_name,
            )?;
        }
    }

    if matches.is_empty() {
        if let Some(resolver) = resolver {
            if let Some(coords) = resolver.resolve_coords(source)? {
                debug!(
                    source,
                    ra = coords.ra_deg,
                    dec = coords.dec_deg,
                    "trying positional search around resolver coordinate"
                );
                matches = db.query_region(
                    coords.ra_deg,
                    coords.dec_deg,
                    options.search_radius_arcsec,
                    &options.ra_col_name,
                    &options.dec_col_name,
                )?;
            }
        }
    }

    match matches.len() {
        0 => debug!(source, "no match found"),
        1 => debug!(source, matched = %matches[0], "one match found"),
        n => debug!(source, n, ?matches, "more than one match found"),
    }

    Ok(matches)
}

/// Canonical names whose stored designations equal `name` after
/// normalization, in corpus order, deduplicated.
fn exact_matches(corpus: &[Name], name: &str) -> Vec<String> {
    let wanted = normalize_name(name);
    let mut out = Vec::new();

    for entry in corpus {
        if normalize_name(&entry.other_name) == wanted && !out.contains(&entry.source) {
            out.push(entry.source.clone());
        }
    }

    out
}

/// Canonical names within the edit-distance tolerance of `name`; only the
/// minimum-distance candidates survive.
fn fuzzy_matches(corpus: &[Name], name: &str) -> Vec<String> {
    let wanted = normalize_name(name);
    let mut best: Vec<String> = Vec::new();
    let mut best_distance = usize::MAX;

    for entry in corpus {
        let designation = normalize_name(&entry.other_name);
        let distance = levenshtein(&wanted, &designation);

        if distance > fuzzy_tolerance(&wanted, &designation) {
            continue;
        }

        if distance < best_distance {
            best_distance = distance;
            best.clear();
        }

        if distance == best_distance && !best.contains(&entry.source) {
            best.push(entry.source.clone());
        }
    }

    best
}

/// One source-ingestion request. The serde defaults let bulk catalog files
/// spell only the fields they have.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceIngest {
    pub source: String,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub ra: Option<f64>,
    #[serde(default)]
    pub dec: Option<f64>,
    #[serde(default)]
    pub epoch: Option<String>,
    #[serde(default)]
    pub equinox: Option<String>,
    #[serde(default)]
    pub other_reference: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    /// Raise rejects as errors (true, the curated-ingestion default) or
    /// convert them into [`IngestOutcome::Rejected`] (false, for bulk runs).
    #[serde(default = "default_true")]
    pub raise_error: bool,
    /// Search the database before inserting. Off only for trusted bulk loads
    /// of known-new sources.
    #[serde(default = "default_true")]
    pub search_db: bool,
    #[serde(default = "default_ra_col")]
    pub ra_col_name: String,
    #[serde(default = "default_dec_col")]
    pub dec_col_name: String,
}

fn default_true() -> bool {
    true
}

fn default_ra_col() -> String {
    "ra_deg".to_owned()
}

fn default_dec_col() -> String {
    "dec_deg".to_owned()
}

impl SourceIngest {
    pub fn new(source: impl Into<String>, reference: impl Into<String>) -> Self {
        SourceIngest {
            source: source.into(),
            reference: reference.into(),
            ra: None,
            dec: None,
            epoch: None,
            equinox: None,
            other_reference: None,
            comment: None,
            raise_error: true,
            search_db: true,
            ra_col_name: default_ra_col(),
            dec_col_name: default_dec_col(),
        }
    }

    pub fn at(mut self, ra: f64, dec: f64) -> Self {
        self.ra = Some(ra);
        self.dec = Some(dec);
        self
    }
}

/// What [`ingest_source`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// A new Source row and its self-referential Names row were committed.
    Inserted { source: String },
    /// The name matched one existing source and was recorded as its alias.
    AliasAdded { source: String, other_name: String },
    /// The name (or its alias) was already on file; nothing was written.
    AlreadyPresent { source: String },
    /// The request was rejected; only produced when `raise_error` is false.
    Rejected { message: String },
}

impl IngestOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, IngestOutcome::Rejected { .. })
    }
}

/// Ingest one source, resolving it against the database first.
///
/// With `raise_error` set, every reject path returns the corresponding
/// [`AstroDbError`]; with it clear, rejects are logged and folded into
/// [`IngestOutcome::Rejected`] so that a bulk import can continue past
/// individual bad records. Input-validation and infrastructure errors
/// propagate regardless.
pub fn ingest_source(
    db: &Database,
    resolver: Option<&dyn NameResolver>,
    request: &SourceIngest,
) -> Result<IngestOutcome, AstroDbError> {
    match try_ingest_source(db, resolver, request) {
        Ok(outcome) => Ok(outcome),
        Err(err) if !request.raise_error && err.is_rejection() => {
            warn!(source = %request.source, "{err}");
            Ok(IngestOutcome::Rejected {
                message: err.to_string(),
            })
        }
        Err(err) => Err(err),
    }
}

fn try_ingest_source(
    db: &Database,
    resolver: Option<&dyn NameResolver>,
    request: &SourceIngest,
) -> Result<IngestOutcome, AstroDbError> {
    let source = request.source.trim();

    if request.search_db {
        debug!(source, ra = ?request.ra, dec = ?request.dec, "checking database before ingest");
        let options = SearchOptions {
            ra: request.ra,
            dec: request.dec,
            ra_col_name: request.ra_col_name.clone(),
            dec_col_name: request.dec_col_name.clone(),
            ..SearchOptions::default()
        };
        let matches = find_source_in_db(db, resolver, source, &options)?;

        match matches.len() {
            0 => {}
            1 => return alias_existing(db, source, &matches[0]),
            _ => {
                warn!(source, ?matches, "not ingesting; more than one match");
                return Err(AstroDbError::AmbiguousMatch {
                    name: source.to_owned(),
                    matches,
                });
            }
        }
    } else {
        // Still fail fast on bad column names even when the search is skipped.
        db.validate_coord_columns(&request.ra_col_name, &request.dec_col_name)?;
    }

    // VALIDATE: discovery reference, then coordinates.
    let reference = request.reference.trim();
    if reference.is_empty() {
        return Err(AstroDbError::ReferenceMissing(format!(
            "not ingesting {source}; discovery reference is blank"
        )));
    }

    if find_publication(db, reference)?.is_none() {
        return Err(AstroDbError::ReferenceMissing(format!(
            "not ingesting {source}; discovery reference {reference} is not in the \
             Publications table (add it with ingest_publication)"
        )));
    }

    let mut ra = request.ra;
    let mut dec = request.dec;
    let mut epoch = request.epoch.clone();
    let mut equinox = request.equinox.clone();

    if ra.is_none() || dec.is_none() {
        if let Some(resolver) = resolver {
            if let Some(coords) = resolver.resolve_coords(source)? {
                ra = Some(coords.ra_deg);
                dec = Some(coords.dec_deg);
                // Resolver positions are ICRS, epoch 2000.
                epoch = Some("2000".to_owned());
                equinox = Some("J2000".to_owned());
                debug!(
                    source,
                    ra = coords.ra_deg,
                    dec = coords.dec_deg,
                    "coordinates retrieved from resolver"
                );
            }
        }
    }

    let (Some(ra), Some(dec)) = (ra, dec) else {
        return Err(AstroDbError::CoordinatesUnavailable(source.to_owned()));
    };

    let record = Source {
        source: source.to_owned(),
        ra_deg: Some(ra),
        dec_deg: Some(dec),
        epoch_year: epoch,
        equinox,
        reference: reference.to_owned(),
        other_references: request.other_reference.clone(),
        comments: request.comment.clone(),
    };

    insert_source_with_name(db, &record, &request.ra_col_name, &request.dec_col_name)?;
    info!(source, "source added to database");

    Ok(IngestOutcome::Inserted {
        source: source.to_owned(),
    })
}

/// The supplied name matched exactly one existing source. Record it as an
/// alternate name unless it is already on file; neither case inserts a new
/// Source row, and a known alias is reported as success, not an error.
fn alias_existing(
    db: &Database,
    supplied: &str,
    canonical: &str,
) -> Result<IngestOutcome, AstroDbError> {
    let corpus = db.name_corpus()?;

    if !exact_matches(&corpus, supplied).is_empty() {
        info!(
            source = supplied,
            canonical, "already in database; nothing new to ingest"
        );
        return Ok(IngestOutcome::AlreadyPresent {
            source: canonical.to_owned(),
        });
    }

    match insert_name_row(db, canonical, supplied) {
        Ok(()) => {
            info!(
                source = canonical,
                other_name = supplied,
                "recorded as alternate name of existing source"
            );
            Ok(IngestOutcome::AliasAdded {
                source: canonical.to_owned(),
                other_name: supplied.to_owned(),
            })
        }
        Err(err) if constraint_violation(&err) => {
            info!(
                source = canonical,
                other_name = supplied,
                "alias already present; nothing new to ingest"
            );
            Ok(IngestOutcome::AlreadyPresent {
                source: canonical.to_owned(),
            })
        }
        Err(err) => Err(err.into()),
    }
}

/// Add an alternate designation for an existing source.
///
/// On success the inserted alias is returned. A duplicate alias is an error
/// under `raise_error`, otherwise a logged warning returning `None`.
pub fn ingest_name(
    db: &Database,
    source: &str,
    other_name: &str,
    raise_error: bool,
) -> Result<Option<String>, AstroDbError> {
    match insert_name_row(db, source, other_name) {
        Ok(()) => {
            info!(source, other_name, "name added to database");
            Ok(Some(other_name.to_owned()))
        }
        Err(err) if constraint_violation(&err) => {
            let mut message = format!("could not add {{{source}: {other_name}}} to Names.");
            if unique_violation(&err) {
                message.push_str(" Other name is already present.");
            }
            if raise_error {
                Err(AstroDbError::ConstraintViolation(message))
            } else {
                warn!("{message}");
                Ok(None)
            }
        }
        Err(err) => Err(err.into()),
    }
}

/// A survey designation the resolver knows for a stored source, ready to be
/// backfilled into the Names table.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyDesignation {
    pub source: String,
    pub designation: String,
    /// Numeric survey identifier parsed out of the designation, when a token
    /// index was requested.
    pub source_id: Option<i64>,
}

/// Extract survey designations for stored sources from the external
/// resolver.
///
/// For each name, every designation the resolver knows is scanned for
/// `desig_prefix`; the first hit is reported, and more than one hit logs a
/// warning. With `source_id_index` set, the designation is split on
/// whitespace and the token at that index is parsed as the numeric survey
/// identifier — e.g. index 2 for "Gaia DR2" designations, index 1 for
/// "2MASS" ones. Sources the resolver cannot match are skipped.
pub fn find_survey_names(
    resolver: &dyn NameResolver,
    sources: &[String],
    desig_prefix: &str,
    source_id_index: Option<usize>,
) -> Result<Vec<SurveyDesignation>, AstroDbError> {
    info!(n = sources.len(), desig_prefix, "survey designation query started");
    let mut found = Vec::new();

    for source in sources {
        let aliases = resolver.resolve_aliases(source)?;
        let mut hits = aliases.iter().filter(|a| a.contains(desig_prefix));

        let Some(designation) = hits.next() else {
            continue;
        };

        if hits.next().is_some() {
            warn!(
                source = %source,
                designation = %designation,
                "more than one designation matched; keeping the first"
            );
        }

        let source_id = source_id_index.and_then(|index| {
            designation
                .split_whitespace()
                .nth(index)
                .and_then(|token| token.parse::<i64>().ok())
        });

        debug!(source = %source, designation = %designation, "survey designation found");
        found.push(SurveyDesignation {
            source: source.clone(),
            designation: designation.clone(),
            source_id,
        });
    }

    info!(
        matched = found.len(),
        total = sources.len(),
        desig_prefix,
        "survey designation query finished"
    );
    Ok(found)
}

fn insert_name_row(db: &Database, source: &str, other_name: &str) -> Result<(), rusqlite::Error> {
    db.conn().execute(
        "INSERT INTO Names (source, other_name) VALUES (?1, ?2)",
        rusqlite::params![source, other_name],
    )?;
    Ok(())
}

/// Insert the Source row and its self-referential Names row as one unit: if
/// either insert trips a constraint, the transaction rolls back and nothing
/// is committed.
fn insert_source_with_name(
    db: &Database,
    record: &Source,
    ra_col: &str,
    dec_col: &str,
) -> Result<(), AstroDbError> {
    // Interpolated column names have passed the table_info whitelist.
    db.validate_coord_columns(ra_col, dec_col)?;
    let sql = format!(
        "INSERT INTO Sources (source, \"{ra_col}\", \"{dec_col}\", epoch_year,
                              equinox, reference, other_references, comments)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
    );

    // The handle is not shared across threads, so the unchecked (non-&mut)
    // transaction form is fine here; dropping it without commit rolls back.
    let tx = db.conn().unchecked_transaction()?;

    let result = (|| -> Result<(), rusqlite::Error> {
        tx.execute(
            &sql,
            rusqlite::params![
                record.source,
                record.ra_deg,
                record.dec_deg,
                record.epoch_year,
                record.equinox,
                record.reference,
                record.other_references,
                record.comments
            ],
        )?;
        tx.execute(
            "INSERT INTO Names (source, other_name) VALUES (?1, ?1)",
            rusqlite::params![record.source],
        )?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            tx.commit()?;
            Ok(())
        }
        Err(err) if constraint_violation(&err) => Err(AstroDbError::ConstraintViolation(format!(
            "could not insert {}; check that reference {} exists in the Publications table",
            record.source, record.reference
        ))),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Name> {
        [
            ("Apple", "Apple"),
            ("LHS 2924", "LHS 2924"),
            ("Gl 229b", "Gl 229b"),
            ("Gl 229b", "HD 42581b"),
        ]
        .into_iter()
        .map(|(source, other_name)| Name {
            source: source.to_owned(),
            other_name: other_name.to_owned(),
        })
        .collect()
    }

    #[test]
    fn exact_matching_ignores_case_dashes_and_spacing() {
        let corpus = corpus();
        assert_eq!(exact_matches(&corpus, "apple"), vec!["Apple"]);
        assert_eq!(exact_matches(&corpus, "  LHS  2924 "), vec!["LHS 2924"]);
        // An alias resolves to its canonical source.
        assert_eq!(exact_matches(&corpus, "HD 42581b"), vec!["Gl 229b"]);
        assert!(exact_matches(&corpus, "Pear").is_empty());
    }

    #[test]
    fn fuzzy_matching_returns_the_closest_candidate() {
        let corpus = corpus();
        assert_eq!(fuzzy_matches(&corpus, "LHS 292"), vec!["LHS 2924"]);
        assert!(fuzzy_matches(&corpus, "Zucchini").is_empty());
    }

    #[test]
    fn fuzzy_matching_dedups_by_canonical_source() {
        let corpus = vec![
            Name {
                source: "Gl 229b".to_owned(),
                other_name: "Gl 229b".to_owned(),
            },
            Name {
                source: "Gl 229b".to_owned(),
                other_name: "Gl 229 b".to_owned(),
            },
        ];
        assert_eq!(fuzzy_matches(&corpus, "Gl 229"), vec!["Gl 229b"]);
    }
}
