use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Reasons a configured backend URL is refused.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// Plain HTTP would leak the session cookie to anyone on the path.
    #[error("Insecure backend URL: HTTPS required except for loopback hosts")]
    InsecureScheme,
    #[error("URL has no host")]
    MissingHost,
}

/// Validate the base URL of the subscription backend.
///
/// HTTPS is required unless the host is loopback (`localhost`, `127.0.0.1`,
/// `::1`), which is how the backend is usually run during development.
/// A trailing slash is normalized so endpoint paths can be joined onto it.
///
/// ```
/// use subsweep::util::validate_backend_url;
///
/// assert!(validate_backend_url("https://subs.example.com").is_ok());
/// assert!(validate_backend_url("http://localhost:10000").is_ok());
/// assert!(validate_backend_url("http://subs.example.com").is_err());
/// ```
pub fn validate_backend_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let mut url = Url::parse(url_str)?;

    let host = url.host_str().ok_or(UrlValidationError::MissingHost)?;
    let loopback = is_loopback_host(host);

    match url.scheme() {
        "https" => {}
        "http" if loopback => {}
        "http" => return Err(UrlValidationError::InsecureScheme),
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

fn is_loopback_host(host: &str) -> bool {
    if host == "localhost" {
        return true;
    }
    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    bare.parse::<IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_https_accepted() {
        let url = validate_backend_url("https://subs.example.com/app").unwrap();
        assert_eq!(url.as_str(), "https://subs.example.com/app/");
    }

    #[test]
    fn test_loopback_http_accepted() {
        assert!(validate_backend_url("http://localhost:10000").is_ok());
        assert!(validate_backend_url("http://127.0.0.1:8080").is_ok());
        assert!(validate_backend_url("http://[::1]:8080").is_ok());
    }

    #[test]
    fn test_remote_http_rejected() {
        assert!(matches!(
            validate_backend_url("http://subs.example.com"),
            Err(UrlValidationError::InsecureScheme)
        ));
    }

    #[test]
    fn test_other_scheme_rejected() {
        assert!(matches!(
            validate_backend_url("ftp://subs.example.com"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            validate_backend_url("not a url"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
    }
}
