use url::{Host, Url};

/// Derives the queue key for a URL
///
/// The key is the unit of politeness: all URLs sharing a key are rate-limited
/// together. Policy, in order:
///
/// 1. The registered domain under the public-suffix list, when the host is a
///    DNS name with a recognizable suffix (`news.bbc.co.uk` -> `bbc.co.uk`).
/// 2. Otherwise the lowercased host (IP literals, single-label hosts).
/// 3. Otherwise the raw authority, for the rare scheme that has one but no
///    host.
///
/// Returns `None` only for URLs with neither host nor authority; callers
/// reject those before ingest.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use kumo_frontier::url::queue_key;
///
/// let url = Url::parse("https://news.bbc.co.uk/page").unwrap();
/// assert_eq!(queue_key(&url), Some("bbc.co.uk".to_string()));
///
/// let url = Url::parse("http://192.168.0.1:8080/status").unwrap();
/// assert_eq!(queue_key(&url), Some("192.168.0.1".to_string()));
/// ```
pub fn queue_key(url: &Url) -> Option<String> {
    match url.host() {
        Some(Host::Domain(domain)) => {
            let host = domain.to_lowercase();
            if let Some(registered) = psl::domain_str(&host) {
                return Some(registered.to_string());
            }
            Some(host)
        }
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => {
            url.host_str().map(|h| h.to_lowercase())
        }
        None => {
            let authority = url.authority();
            if authority.is_empty() {
                None
            } else {
                Some(authority.to_lowercase())
            }
        }
    }
}
