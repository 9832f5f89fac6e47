//! Endpoint URI scheme/host allowlist checks (§3 invariants, §6
//! "Endpoint URI scheme").

use super::error::ValidationError;

/// Extracts the scheme of an endpoint URI (the substring before the
/// first `:`), lower-cased.
pub fn scheme_of(uri: &str) -> Option<String> {
    uri.split_once(':').map(|(scheme, _)| scheme.to_ascii_lowercase())
}

/// Extracts the host of an `http`/`https` URI, ignoring any `:port` or
/// path/query suffix. Written by hand rather than pulling in a URL
/// parsing crate, since this only needs the host segment.
pub fn http_host_of(uri: &str) -> Option<String> {
    let after_scheme = uri.split_once("://")?.1;
    let authority = after_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(after_scheme);
    let host = authority.split('@').last().unwrap_or(authority);
    let host = host.split(':').next().unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

/// Validates `uri` against the configured scheme/host allowlists. An
/// empty allowlist means permit-all for that dimension.
pub fn check_uri_allowed(
    uri: &str,
    allowed_schemes: &[String],
    allowed_http_hosts: &[String],
) -> Result<(), ValidationError> {
    let scheme = scheme_of(uri).ok_or_else(|| ValidationError::DisallowedScheme(uri.to_string()))?;

    if !allowed_schemes.is_empty() && !allowed_schemes.iter().any(|s| s.eq_ignore_ascii_case(&scheme)) {
        return Err(ValidationError::DisallowedScheme(scheme));
    }

    if scheme == "http" || scheme == "https" {
        if !allowed_http_hosts.is_empty() {
            let host = http_host_of(uri).ok_or_else(|| ValidationError::DisallowedHost(uri.to_string()))?;
            if !allowed_http_hosts.iter().any(|h| h.eq_ignore_ascii_case(&host)) {
                return Err(ValidationError::DisallowedHost(host));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_scheme_and_host() {
        assert_eq!(scheme_of("direct:orders"), Some("direct".to_string()));
        assert_eq!(http_host_of("https://api.example.com:8443/v1/x?y=1"), Some("api.example.com".to_string()));
    }

    #[test]
    fn empty_allowlist_permits_all() {
        assert!(check_uri_allowed("bean:foo?method=bar", &[], &[]).is_ok());
    }

    #[test]
    fn disallowed_scheme_is_rejected() {
        let allowed = vec!["direct".to_string()];
        assert!(check_uri_allowed("http://evil.example.com", &allowed, &[]).is_err());
    }

    #[test]
    fn disallowed_host_is_rejected() {
        let schemes = vec!["http".to_string(), "https".to_string()];
        let hosts = vec!["api.example.com".to_string()];
        assert!(check_uri_allowed("https://evil.example.com", &schemes, &hosts).is_err());
        assert!(check_uri_allowed("https://api.example.com/v1", &schemes, &hosts).is_ok());
    }
}
