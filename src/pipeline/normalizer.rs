use url::{Host, Url};

use crate::core::error::HawkError;
use crate::core::psl::SuffixList;
use crate::core::types::{NormalizedUrl, Scheme};

/// Canonicalize a raw URL string.
///
/// Schemeless input defaults to https. Hosts are lowercased and
/// IDNA-encoded (the `url` parser does both), default ports are stripped
/// and the path defaults to `/`. Anything that is not http/https is
/// rejected rather than probed.
pub fn normalize(raw: &str, psl: &SuffixList) -> Result<NormalizedUrl, HawkError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(HawkError::InvalidUrl("empty input".to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed =
        Url::parse(&candidate).map_err(|e| HawkError::InvalidUrl(format!("{}: {}", trimmed, e)))?;

    let scheme = match parsed.scheme() {
        "http" => Scheme::Http,
        "https" => Scheme::Https,
        other => return Err(HawkError::UnsupportedScheme(other.to_string())),
    };

    let (host, is_ip_literal) = match parsed.host() {
        Some(Host::Domain(d)) => (d.trim_end_matches('.').to_ascii_lowercase(), false),
        Some(Host::Ipv4(addr)) => (addr.to_string(), true),
        Some(Host::Ipv6(addr)) => (addr.to_string(), true),
        None => return Err(HawkError::InvalidUrl(format!("{}: missing host", trimmed))),
    };
    if host.is_empty() {
        return Err(HawkError::InvalidUrl(format!("{}: empty host", trimmed)));
    }

    let is_punycode = !is_ip_literal && host.split('.').any(|label| label.starts_with("xn--"));
    let unicode_host = if is_punycode {
        let (decoded, _result) = idna::domain_to_unicode(&host);
        decoded
    } else {
        host.clone()
    };

    // url::Url::port() is already None when the port equals the scheme
    // default, which is exactly the stripping the canonical form wants.
    let port = parsed.port();

    let path = if parsed.path().is_empty() {
        "/".to_string()
    } else {
        parsed.path().to_string()
    };

    let registered_domain = psl.registered_domain(&host);
    let has_credentials = !parsed.username().is_empty() || parsed.password().is_some();

    Ok(NormalizedUrl {
        scheme,
        host,
        unicode_host,
        port,
        path,
        query: parsed.query().map(str::to_string),
        fragment: parsed.fragment().map(str::to_string),
        registered_domain,
        is_ip_literal,
        is_punycode,
        has_credentials,
    })
}
