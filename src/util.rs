use std::path::{Path, PathBuf};

use reqwest::Url;

use crate::error::{NsrdbError, Result};

const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";
const EMPTY_ZIP_SIGNATURE: &[u8] = b"PK\x05\x06";

pub(crate) fn bool_str(b: bool) -> &'static str {
    if b { "true" } else { "false" }
}

/// Splits user input like `"2018, 2019"` or `["2018", "2019"]` into trimmed items.
pub(crate) fn split_list<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for item in items {
        for part in item.as_ref().split(',') {
            let part = part.trim();
            if !part.is_empty() && !out.iter().any(|p| p == part) {
                out.push(part.to_string());
            }
        }
    }
    out
}

pub(crate) fn looks_like_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_SIGNATURE) || bytes.starts_with(EMPTY_ZIP_SIGNATURE)
}

pub(crate) fn guess_filename_from_url(url: &str) -> Option<String> {
    let path = url.split('?').next().unwrap_or(url);
    path.rsplit('/').next().and_then(|s| {
        if s.is_empty() {
            None
        } else {
            Some(s.to_string())
        }
    })
}

/// `url` with the `api_key` value masked, for logs.
pub(crate) fn redact_api_key(url: &Url) -> String {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "api_key" { "***".into() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    let mut url = url.clone();
    url.query_pairs_mut().clear().extend_pairs(pairs);
    url.to_string()
}

/// Where to write an output file. An empty `target` means `default_name` in
/// the working directory, an existing directory means `default_name` inside
/// it, anything else is the file path itself. Missing parent directories are
/// created.
pub(crate) fn output_path(target: &Path, default_name: &str) -> Result<PathBuf> {
    let path = if target.as_os_str().is_empty() {
        PathBuf::from(default_name)
    } else if target.is_dir() {
        target.join(default_name)
    } else {
        target.to_path_buf()
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| NsrdbError::Output {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    Ok(path)
}

/// Writes `contents` to `path`, replacing any existing file.
pub(crate) fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    std::fs::write(path, contents).map_err(|source| NsrdbError::Output {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn urljoin(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}
