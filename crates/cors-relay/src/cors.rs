//! Cross-origin headers stamped onto every relayed response.
//!
//! The policy is fixed: any origin may read the response, and `Location` plus
//! `Content-Disposition` are exposed so browser code can follow captured
//! redirects and recover download filenames.

use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_EXPOSE_HEADERS,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue};

const CORS_HEADERS: [(HeaderName, &str); 4] = [
    (ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (ACCESS_CONTROL_ALLOW_METHODS, "GET, OPTIONS"),
    (ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
    (ACCESS_CONTROL_EXPOSE_HEADERS, "Location, Content-Disposition"),
];

/// Insert the CORS headers, replacing any value the upstream sent.
pub fn apply_cors_headers(headers: &mut HeaderMap) {
    for (name, value) in CORS_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inserts_all_four_headers() {
        let mut headers = HeaderMap::new();
        apply_cors_headers(&mut headers);

        assert_eq!(headers.len(), 4);
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_METHODS], "GET, OPTIONS");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
        assert_eq!(
            headers[ACCESS_CONTROL_EXPOSE_HEADERS],
            "Location, Content-Disposition"
        );
    }

    #[test]
    fn test_overrides_upstream_values() {
        let mut headers = HeaderMap::new();
        headers.append(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("https://a.example"),
        );
        headers.append(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("https://b.example"),
        );

        apply_cors_headers(&mut headers);

        let origins: Vec<_> = headers.get_all(ACCESS_CONTROL_ALLOW_ORIGIN).iter().collect();
        assert_eq!(origins, vec![&HeaderValue::from_static("*")]);
    }
}
