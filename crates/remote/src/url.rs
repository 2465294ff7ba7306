//! Endpoint URL shaping and small request helpers.
//!
//! The store is addressed either virtual-hosted style
//! (`https://bucket.host/path`) or path-request style
//! (`https://host/bucket/path`); both renditions are built from the bare
//! endpoint so callers never splice strings themselves.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Splits `url` into its scheme and the remainder. Schemes compare
/// case-insensitively; anything but http/https is rejected.
fn split_scheme(url: &str) -> Option<(&str, &str)> {
    for scheme in ["https://", "http://"] {
        if url.len() >= scheme.len() && url[..scheme.len()].eq_ignore_ascii_case(scheme) {
            return Some((&url[..scheme.len()], &url[scheme.len()..]));
        }
    }
    None
}

/// Host portion of `url`, without scheme or path. `None` when the scheme
/// is missing.
pub fn url_to_host(url: &str) -> Option<&str> {
    let (_, rest) = split_scheme(url)?;
    Some(rest.split('/').next().unwrap_or(rest))
}

/// Host to address `bucket` on `endpoint`: `bucket.host` for
/// virtual-hosted addressing, the bare endpoint host for path style.
pub fn bucket_host(endpoint: &str, bucket: &str, path_style: bool) -> Option<String> {
    let host = url_to_host(endpoint)?;
    Some(if path_style {
        host.to_string()
    } else {
        format!("{bucket}.{host}")
    })
}

/// Full request URL for `path` inside `bucket` on `endpoint`, in either
/// addressing style.
pub fn object_url(endpoint: &str, bucket: &str, path: &str, path_style: bool) -> Option<String> {
    let (scheme, rest) = split_scheme(endpoint)?;
    let host = rest.split('/').next().unwrap_or(rest);
    let path = path.strip_prefix('/').unwrap_or(path);
    Some(if path_style {
        format!("{scheme}{host}/{bucket}/{path}")
    } else {
        format!("{scheme}{bucket}.{host}/{path}")
    })
}

/// ETag equality ignoring surrounding quotes and ASCII case.
pub fn etag_equals(a: &str, b: &str) -> bool {
    peel_quotes(a).eq_ignore_ascii_case(peel_quotes(b))
}

fn peel_quotes(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

/// Base64-encoded MD5 of `data`, as carried in Content-MD5 headers.
pub fn content_md5(data: &[u8]) -> String {
    BASE64.encode(md5::compute(data).0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_extraction_strips_scheme_and_path() {
        assert_eq!(url_to_host("https://s3.example.com/x/y"), Some("s3.example.com"));
        assert_eq!(url_to_host("HTTP://s3.example.com"), Some("s3.example.com"));
        assert_eq!(url_to_host("ftp://s3.example.com"), None);
    }

    #[test]
    fn bucket_host_follows_addressing_style() {
        assert_eq!(
            bucket_host("https://s3.example.com", "mybucket", false).unwrap(),
            "mybucket.s3.example.com"
        );
        assert_eq!(
            bucket_host("https://s3.example.com", "mybucket", true).unwrap(),
            "s3.example.com"
        );
    }

    #[test]
    fn object_url_in_both_styles() {
        assert_eq!(
            object_url("https://s3.example.com", "b", "/dir/file.txt", false).unwrap(),
            "https://b.s3.example.com/dir/file.txt"
        );
        assert_eq!(
            object_url("https://s3.example.com", "b", "dir/file.txt", true).unwrap(),
            "https://s3.example.com/b/dir/file.txt"
        );
    }

    #[test]
    fn etag_comparison_ignores_quotes_and_case() {
        assert!(etag_equals("\"ABCDEF\"", "abcdef"));
        assert!(etag_equals("abc", "ABC"));
        assert!(!etag_equals("\"abc\"", "\"abd\""));
    }

    #[test]
    fn content_md5_is_base64_of_the_digest() {
        // RFC 1321 test vector: md5("abc") = 900150983cd24fb0d6963f7d28e17f72
        assert_eq!(content_md5(b"abc"), "kAFQmDzST7DWlj99KOF/cg==");
    }
}
