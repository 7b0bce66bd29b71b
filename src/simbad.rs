//! SIMBAD name resolution over the TAP sync endpoint.
//!
//! SIMBAD is consulted only as a fallback, once local name and positional
//! matching have come up empty. Two queries are used: one for every
//! designation the service knows for a name, and one for the object's ICRS
//! coordinate. A multi-hit ("ambiguous") reply is logged and treated as no
//! single match, not as an error, so that resolution falls through to the
//! next strategy.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::AstroDbError;

/// A coordinate obtained from the external resolver, decimal degrees (ICRS).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedCoords {
    pub ra_deg: f64,
    pub dec_deg: f64,
}

/// An external name-resolution service. The blanket SIMBAD implementation is
/// [`SimbadClient`]; offline callers and the tests substitute their own.
pub trait NameResolver {
    /// All designations the service knows for `name`; empty when unknown.
    fn resolve_aliases(&self, name: &str) -> Result<Vec<String>, AstroDbError>;

    /// Zero-or-one coordinate for `name`. An ambiguous (multi-hit) reply is
    /// reported as `None`.
    fn resolve_coords(&self, name: &str) -> Result<Option<ResolvedCoords>, AstroDbError>;
}

const SIMBAD_TAP_SYNC_URL: &str = "https://simbad.cds.unistra.fr/simbad/sim-tap/sync";

/// Blocking client for the SIMBAD TAP service. One HTTP round trip per
/// strategy step, no retries; the only timeout is the one on the HTTP client.
pub struct SimbadClient {
    client: reqwest::blocking::Client,
    url: String,
}

/// The `format=json` TAP envelope. Only the data rows matter to us.
#[derive(Deserialize)]
struct TapResponse {
    data: Vec<Vec<Value>>,
}

impl SimbadClient {
    pub fn new() -> Result<Self, AstroDbError> {
        Self::with_url(SIMBAD_TAP_SYNC_URL)
    }

    /// Point the client at a different TAP endpoint, e.g. a SIMBAD mirror.
    pub fn with_url(url: impl Into<String>) -> Result<Self, AstroDbError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("astrodb-utils/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(SimbadClient {
            client,
            url: url.into(),
        })
    }

    fn query(&self, adql: &str) -> Result<TapResponse, AstroDbError> {
        debug!(adql, "TAP query");
        let response = self
            .client
            .post(&self.url)
            .form(&[
                ("request", "doQuery"),
                ("lang", "adql"),
                ("format", "json"),
                ("query", adql),
            ])
            .send()?
            .error_for_status()?;
        Ok(response.json()?)
    }
}

impl NameResolver for SimbadClient {
    fn resolve_aliases(&self, name: &str) -> Result<Vec<String>, AstroDbError> {
        let adql = format!(
            "SELECT i2.id FROM ident AS i1 \
             JOIN ident AS i2 ON i1.oidref = i2.oidref \
             WHERE i1.id = '{}'",
            escape(name)
        );
        let response = self.query(&adql)?;

        let aliases: Vec<String> = response
            .data
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect();

        debug!(name, n = aliases.len(), "designations known to resolver");
        Ok(aliases)
    }

    fn resolve_coords(&self, name: &str) -> Result<Option<ResolvedCoords>, AstroDbError> {
        let adql = format!(
            "SELECT b.ra, b.dec FROM basic AS b \
             JOIN ident AS i ON i.oidref = b.oid \
             WHERE i.id = '{}'",
            escape(name)
        );
        let response = self.query(&adql)?;
        Ok(single_coordinate(name, &response))
    }
}

/// Apply the ambiguity policy to a TAP reply: exactly one row yields its
/// coordinate; zero rows or many yield nothing, with many logged as a
/// warning so the caller falls through to its next strategy.
fn single_coordinate(name: &str, response: &TapResponse) -> Option<ResolvedCoords> {
    match response.data.len() {
        0 => {
            debug!(name, "resolver returned no results");
            None
        }
        1 => {
            let row = &response.data[0];
            match (
                row.first().and_then(Value::as_f64),
                row.get(1).and_then(Value::as_f64),
            ) {
                (Some(ra_deg), Some(dec_deg)) => {
                    debug!(name, ra_deg, dec_deg, "coordinates retrieved from resolver");
                    Some(ResolvedCoords { ra_deg, dec_deg })
                }
                _ => None,
            }
        }
        n => {
            warn!(name, hits = n, "more than one resolver match; treating as no single match");
            None
        }
    }
}

/// ADQL string literals quote single quotes by doubling them.
fn escape(name: &str) -> String {
    name.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adql_escaping_doubles_quotes() {
        assert_eq!(escape("Barnard's Star"), "Barnard''s Star");
        assert_eq!(escape("LHS 2924"), "LHS 2924");
    }

    #[test]
    fn tap_envelope_parses() {
        let body = r#"{"metadata":[{"name":"ra"},{"name":"dec"}],
                       "data":[[269.45207, 4.69339]]}"#;
        let parsed: TapResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data.len(), 1);
        assert_eq!(parsed.data[0][0].as_f64(), Some(269.45207));
    }

    #[test]
    fn multi_row_reply_counts_as_no_single_match() {
        let body = r#"{"metadata":[{"name":"ra"},{"name":"dec"}],
                       "data":[[144.39529, 29.52803], [144.40931, 29.53891]]}"#;
        let parsed: TapResponse = serde_json::from_str(body).unwrap();
        assert_eq!(single_coordinate("Ambiguous", &parsed), None);

        let body = r#"{"metadata":[{"name":"ra"},{"name":"dec"}],
                       "data":[[144.39529, 29.52803]]}"#;
        let parsed: TapResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            single_coordinate("Unique", &parsed),
            Some(ResolvedCoords {
                ra_deg: 144.39529,
                dec_deg: 29.52803
            })
        );
    }

    #[test]
    fn empty_reply_counts_as_no_match() {
        let body = r#"{"metadata":[{"name":"ra"},{"name":"dec"}],"data":[]}"#;
        let parsed: TapResponse = serde_json::from_str(body).unwrap();
        assert_eq!(single_coordinate("Unknown", &parsed), None);
    }
}
