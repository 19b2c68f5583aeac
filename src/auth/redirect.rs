//! Validation of caller-supplied post-login redirect targets
//!
//! Which targets are allowed depends on how the application is deployed:
//!
//! - `proxy` and `forward_single` accept a target whose scheme-stripped form
//!   contains the scheme-stripped external host. This is a containment match,
//!   so `https://evil.com/app.example.com` passes for
//!   `https://app.example.com`.
//! - `forward_domain` accepts a target whose host is the cookie domain or a
//!   subdomain of it.
//!
//! Anything that does not parse as an absolute `http`/`https` URL is
//! rejected.

use url::Url;

use crate::config::{ApplicationConfig, ProxyMode};

/// Validates a redirect candidate for an application.
///
/// Returns the normalized URL when the candidate is allowed. Rejections are
/// logged with the compared values.
pub fn check_redirect(candidate: &str, app: &ApplicationConfig) -> Option<Url> {
    let url = match Url::parse(candidate) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(url = %candidate, error = %e, "Failed to parse redirect URL");
            return None;
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        tracing::warn!(url = %url, scheme = url.scheme(), "Redirect URL has unsupported scheme");
        return None;
    }

    let allowed = match app.mode {
        ProxyMode::Proxy | ProxyMode::ForwardSingle => {
            contains_external_host(&url, &app.external_host)
        }
        ProxyMode::ForwardDomain => app
            .cookie_domain
            .as_deref()
            .is_some_and(|domain| within_cookie_domain(&url, domain)),
    };

    if !allowed {
        tracing::warn!(
            url = %url,
            mode = %app.mode,
            external_host = %app.external_host,
            cookie_domain = app.cookie_domain.as_deref().unwrap_or(""),
            "Redirect URL outside of the application's allowed hosts"
        );
        return None;
    }

    Some(url)
}

/// Containment rule used by `proxy` and `forward_single` applications.
///
/// # Examples
///
/// ```
/// use outpost_auth::auth::redirect::contains_external_host;
/// use url::Url;
///
/// let target = Url::parse("https://app.example.com/welcome").unwrap();
/// assert!(contains_external_host(&target, "https://app.example.com"));
/// ```
pub fn contains_external_host(candidate: &Url, external_host: &str) -> bool {
    let expected = strip_external_host(external_host);
    if expected.is_empty() {
        return false;
    }
    strip_scheme(candidate.as_str()).contains(expected.as_str())
}

/// Label-boundary suffix rule used by `forward_domain` applications.
///
/// The port is ignored. An empty domain matches nothing.
pub fn within_cookie_domain(candidate: &Url, cookie_domain: &str) -> bool {
    let domain = cookie_domain.trim_start_matches('.').to_ascii_lowercase();
    if domain.is_empty() {
        return false;
    }
    let Some(host) = candidate.host_str() else {
        return false;
    };
    host == domain
        || host
            .strip_suffix(domain.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn strip_scheme(url: &str) -> &str {
    url.split_once("://").map_or(url, |(_, rest)| rest)
}

/// `https://App.example.com/` becomes `app.example.com`.
fn strip_external_host(external_host: &str) -> String {
    let normalized = Url::parse(external_host)
        .map(String::from)
        .unwrap_or_else(|_| external_host.to_ascii_lowercase());
    strip_scheme(&normalized).trim_end_matches('/').to_string()
}
