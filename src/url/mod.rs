//! URL handling for the frontier
//!
//! The engine treats URLs as opaque strings once they are keyed; this module
//! is the only place that parses them. It provides the pre-ingest validation
//! gate and the queue-key derivation policy.

mod key;

pub use key::queue_key;

use crate::{UrlError, UrlResult};
use url::Url;

/// Maximum accepted URL length in bytes
pub const MAX_URL_BYTES: usize = 2048;

/// Validates a raw URL string before ingest
///
/// Rejects empty input, URLs longer than [`MAX_URL_BYTES`], strings that do
/// not parse as absolute URLs, and URLs without host or authority (which
/// could never be assigned a queue key).
///
/// # Returns
///
/// The parsed [`Url`] on success, so callers never parse twice.
pub fn validate_url(raw: &str) -> UrlResult<Url> {
    if raw.is_empty() {
        return Err(UrlError::Empty);
    }

    if raw.len() > MAX_URL_BYTES {
        return Err(UrlError::TooLong(raw.len()));
    }

    let url = Url::parse(raw).map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;

    if queue_key(&url).is_none() {
        return Err(UrlError::MissingAuthority(raw.to_string()));
    }

    Ok(url)
}
