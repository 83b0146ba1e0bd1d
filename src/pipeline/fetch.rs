//! Remote input: download a URL's bytes and derive a filename from its path.
//!
//! The filename matters because format detection is extension-based. It is
//! taken from the last path segment (percent-decoded); query strings and
//! fragments are ignored. A URL whose path ends in `/` has no filename and is
//! rejected before any request is sent.

use crate::error::ConvertError;
use std::time::Duration;
use tracing::{debug, info};

/// Bytes and filename obtained from a URL.
#[derive(Debug, Clone)]
pub struct FetchedInput {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like an HTTP(S) URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Last non-empty path segment of `url`, percent-decoded.
pub fn filename_from_url(url: &str) -> Result<String, ConvertError> {
    let no_name = || ConvertError::UrlWithoutFilename {
        url: url.to_string(),
    };
    let parsed = reqwest::Url::parse(url).map_err(|e| ConvertError::UpstreamFetch {
        url: url.to_string(),
        reason: format!("invalid URL: {e}"),
    })?;
    let last = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .ok_or_else(no_name)?;
    let decoded = urlencoding::decode(last)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| last.to_string());
    if decoded.trim().is_empty() {
        return Err(no_name());
    }
    Ok(decoded)
}

/// Download `url`, failing on transport errors, non-2xx statuses, and bodies
/// larger than `max_bytes`.
pub async fn fetch_url(
    url: &str,
    timeout: Duration,
    max_bytes: usize,
) -> Result<FetchedInput, ConvertError> {
    let fail = |reason: String| ConvertError::UpstreamFetch {
        url: url.to_string(),
        reason,
    };

    if !is_url(url) {
        return Err(fail("only http:// and https:// URLs are supported".into()));
    }
    let filename = filename_from_url(url)?;

    info!("Fetching input from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| fail(e.to_string()))?;

    let transport = |e: reqwest::Error| {
        if e.is_timeout() {
            fail(format!("timed out after {}s", timeout.as_secs()))
        } else {
            fail(e.to_string())
        }
    };

    let mut response = client.get(url).send().await.map_err(transport)?;

    if !response.status().is_success() {
        return Err(fail(format!("HTTP {}", response.status())));
    }

    if let Some(len) = response.content_length() {
        if len > max_bytes as u64 {
            return Err(fail(format!(
                "body of {len} bytes exceeds limit of {max_bytes}"
            )));
        }
    }

    // Chunked bodies carry no length up front; count as we read.
    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(transport)? {
        if bytes.len() + chunk.len() > max_bytes {
            return Err(fail(format!(
                "body exceeds limit of {max_bytes} bytes"
            )));
        }
        bytes.extend_from_slice(&chunk);
    }

    debug!("Fetched {} bytes as '{}'", bytes.len(), filename);
    Ok(FetchedInput { filename, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.docx"));
        assert!(is_url("http://example.com/doc.docx"));
        assert!(!is_url("ftp://example.com/doc.docx"));
        assert!(!is_url("/tmp/doc.docx"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_is_last_segment() {
        assert_eq!(
            filename_from_url("https://example.com/files/report.docx").unwrap(),
            "report.docx"
        );
        assert_eq!(
            filename_from_url("https://example.com/a/b/scan.PDF?sig=abc#page=2").unwrap(),
            "scan.PDF"
        );
    }

    #[test]
    fn filename_is_percent_decoded() {
        assert_eq!(
            filename_from_url("https://example.com/Quarterly%20Report.xlsx").unwrap(),
            "Quarterly Report.xlsx"
        );
    }

    #[test]
    fn filename_without_extension_is_still_a_filename() {
        // MissingExtension is decided later by the orchestrator.
        assert_eq!(filename_from_url("https://example.com/README").unwrap(), "README");
    }

    #[test]
    fn directory_urls_have_no_filename() {
        for url in ["https://example.com/", "https://example.com", "https://example.com/docs/"] {
            let err = filename_from_url(url).unwrap_err();
            assert!(
                matches!(err, ConvertError::UrlWithoutFilename { .. }),
                "{url}: {err}"
            );
            assert_eq!(err.kind(), FailureKind::UpstreamFetchError);
        }
    }

    #[tokio::test]
    async fn non_http_scheme_is_rejected_without_network() {
        let err = fetch_url("file:///etc/passwd", Duration::from_secs(1), 1024)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::UpstreamFetchError);
    }
}
