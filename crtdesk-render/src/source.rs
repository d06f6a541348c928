//! Resolves a document source string to bytes: local paths, `file://` URLs
//! and http(s) downloads.

use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, instrument};
use url::Url;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_DOCUMENT_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentLocation {
    File(PathBuf),
    Remote(Url),
}

pub fn resolve_location(source: &str) -> Result<DocumentLocation> {
    let url = match Url::parse(source) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            return Ok(DocumentLocation::File(PathBuf::from(source)))
        }
        Err(err) => return Err(err).with_context(|| format!("invalid document source {source}")),
    };

    match url.scheme() {
        // `C:\cv.pdf` parses as scheme "c"
        scheme if scheme.len() == 1 => Ok(DocumentLocation::File(PathBuf::from(source))),
        "file" => url
            .to_file_path()
            .map(DocumentLocation::File)
            .map_err(|_| anyhow!("{source} is not a local file URL")),
        "http" | "https" => Ok(DocumentLocation::Remote(url)),
        other => bail!("unsupported document scheme {other:?} in {source}"),
    }
}

#[instrument]
pub fn fetch_document_bytes(source: &str) -> Result<Vec<u8>> {
    match resolve_location(source)? {
        DocumentLocation::File(path) => {
            fs::read(&path).with_context(|| format!("failed to read {}", path.display()))
        }
        DocumentLocation::Remote(url) => {
            let agent = ureq::AgentBuilder::new().timeout(FETCH_TIMEOUT).build();
            let response = agent
                .get(url.as_str())
                .call()
                .with_context(|| format!("failed to download {url}"))?;

            let mut bytes = Vec::new();
            response
                .into_reader()
                .take(MAX_DOCUMENT_BYTES)
                .read_to_end(&mut bytes)
                .with_context(|| format!("failed to read response body from {url}"))?;
            debug!(%url, len = bytes.len(), "document downloaded");
            Ok(bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn bare_paths_are_files() {
        assert_eq!(
            resolve_location("resume.pdf").unwrap(),
            DocumentLocation::File(PathBuf::from("resume.pdf"))
        );
        assert_eq!(
            resolve_location("C:\\docs\\cv.pdf").unwrap(),
            DocumentLocation::File(PathBuf::from("C:\\docs\\cv.pdf"))
        );
    }

    #[test]
    fn http_sources_are_remote() {
        match resolve_location("https://example.com/resume.pdf").unwrap() {
            DocumentLocation::Remote(url) => assert_eq!(url.path(), "/resume.pdf"),
            other => panic!("unexpected location {other:?}"),
        }
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        assert!(resolve_location("ftp://example.com/resume.pdf").is_err());
    }

    #[test]
    fn reads_local_and_file_url_sources() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("resume.pdf");
        fs::write(&path, b"%PDF-1.4").unwrap();

        let by_path = fetch_document_bytes(path.to_str().unwrap()).unwrap();
        let url = Url::from_file_path(&path).unwrap();
        let by_url = fetch_document_bytes(url.as_str()).unwrap();

        assert_eq!(by_path, b"%PDF-1.4");
        assert_eq!(by_url, by_path);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = fetch_document_bytes("file:///nonexistent/crtdesk/resume.pdf").unwrap_err();
        assert!(format!("{err:#}").contains("resume.pdf"));
    }
}
