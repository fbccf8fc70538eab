//! Environment-derived proxy resolution.
//!
//! The default resolver mirrors the conventional variables: `HTTP_PROXY` for
//! `http` targets, `HTTPS_PROXY` for `https` targets, and `NO_PROXY` as an
//! exclusion list (comma-separated host entries, a leading dot matching
//! subdomains, `*` matching everything). A [`crate::ProxyResolver`] callback
//! in the config replaces all of this.

use url::Url;

/// Resolves the proxy for `target` from the process environment.
pub(crate) fn from_env(target: &Url) -> Option<Url> {
    let host = target.host_str()?;
    if excluded(host, var("NO_PROXY").as_deref()) {
        return None;
    }

    let raw = if target.scheme() == "https" {
        var("HTTPS_PROXY")?
    } else {
        var("HTTP_PROXY")?
    };

    // Bare host:port entries are tolerated by convention.
    match Url::parse(&raw) {
        Ok(url) if url.host_str().is_some() => Some(url),
        _ => Url::parse(&format!("http://{raw}")).ok(),
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name)
        .or_else(|_| std::env::var(name.to_ascii_lowercase()))
        .ok()
        .filter(|value| !value.is_empty())
}

fn excluded(host: &str, no_proxy: Option<&str>) -> bool {
    let Some(list) = no_proxy else { return false };
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .any(|entry| entry == "*" || host_matches(host, entry))
}

/// `example.com` and `.example.com` both match the domain and its
/// subdomains.
fn host_matches(host: &str, entry: &str) -> bool {
    let entry = entry.trim_start_matches('.');
    host == entry || host.ends_with(&format!(".{entry}"))
}
