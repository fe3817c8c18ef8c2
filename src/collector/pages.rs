//! Page list loading and hygiene
//!
//! The page list is a plain text file, one URL per line. Lines are cleaned
//! up before dispatch: comments and blanks are dropped, addresses without an
//! http(s) scheme are rejected, URLs pointing at non-HTML documents are
//! filtered by extension, and duplicates within the file collapse to one.

use std::collections::HashSet;
use std::path::Path;
use url::Url;

/// File extensions that never yield an HTML document worth scanning.
const SKIPPED_EXTENSIONS: &[&str] = &[
    "pdf", "ppt", "pptx", "doc", "docx", "txt", "rtf", "xls", "xlsx",
];

/// Reads and cleans a page list file
///
/// Unusable lines are skipped with a log notice rather than failing the
/// run; only an unreadable file is an error.
///
/// # Arguments
///
/// * `path` - Path to the page list file
///
/// # Returns
///
/// * `Ok(Vec<Url>)` - The cleaned list, file order preserved
/// * `Err(std::io::Error)` - The file could not be read
pub fn read_page_list(path: &Path) -> Result<Vec<Url>, std::io::Error> {
    let contents = std::fs::read_to_string(path)?;
    let mut seen = HashSet::new();
    let mut pages = Vec::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if !line.starts_with("http://") && !line.starts_with("https://") {
            tracing::warn!("Skipping page list entry without http(s) scheme: {}", line);
            continue;
        }

        // Url::parse also takes care of punycoding internationalized hosts
        let url = match Url::parse(line) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Skipping unparseable page list entry {}: {}", line, e);
                continue;
            }
        };

        if has_skipped_extension(&url) {
            tracing::info!("Skipping non-HTML document: {}", url);
            continue;
        }

        if !seen.insert(url.as_str().to_string()) {
            tracing::debug!("Skipping duplicate page list entry: {}", url);
            continue;
        }

        pages.push(url);
    }

    Ok(pages)
}

/// Checks whether the URL path ends in an extension from the skip list
fn has_skipped_extension(url: &Url) -> bool {
    let path = url.path();
    match path.rsplit_once('.') {
        Some((_, ext)) => {
            let ext = ext.to_ascii_lowercase();
            SKIPPED_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_list(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_skips_comments_and_blanks() {
        let file = write_list(
            "# seed pages\n\nhttps://example.com/\n\n# trailing comment\nhttps://example.org/\n",
        );
        let pages = read_page_list(file.path()).unwrap();
        let urls: Vec<&str> = pages.iter().map(Url::as_str).collect();
        assert_eq!(urls, vec!["https://example.com/", "https://example.org/"]);
    }

    #[test]
    fn test_rejects_missing_scheme() {
        let file = write_list("example.com\nftp://example.com/file\nhttps://example.com/\n");
        let pages = read_page_list(file.path()).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].as_str(), "https://example.com/");
    }

    #[test]
    fn test_filters_document_extensions() {
        let file = write_list(
            "https://example.com/report.pdf\nhttps://example.com/deck.PPTX\nhttps://example.com/page\n",
        );
        let pages = read_page_list(file.path()).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].as_str(), "https://example.com/page");
    }

    #[test]
    fn test_deduplicates_within_file() {
        let file = write_list("https://example.com/\nhttps://example.com/\n");
        let pages = read_page_list(file.path()).unwrap();
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn test_punycodes_international_hosts() {
        let file = write_list("https://bücher.example/\n");
        let pages = read_page_list(file.path()).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].host_str(), Some("xn--bcher-kva.example"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = read_page_list(Path::new("/nonexistent/pages.txt"));
        assert!(result.is_err());
    }
}
