use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{NsrdbError, Result};
use crate::util::{guess_filename_from_url, output_path, write_file};

/// Reply to a `.json` download request: the API queued a zip file.
///
/// ```json
/// {"inputs": {...}, "outputs": {"message": "File generation in progress...",
///  "downloadUrl": "https://mapfiles.nrel.gov/data/solar/<id>.zip"}, "errors": []}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    #[serde(default)]
    pub inputs: Value,
    #[serde(default)]
    pub outputs: SubmissionOutputs,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmissionOutputs {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "downloadUrl", alias = "download_url")]
    pub download_url: Option<String>,
}

impl Submission {
    pub fn download_url(&self) -> Option<&str> {
        self.outputs.download_url.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.outputs.message.as_deref()
    }

    /// File name of the generated archive.
    pub fn file_name(&self) -> Option<String> {
        self.download_url().and_then(guess_filename_from_url)
    }

    /// Saves the reply as JSON and returns the path written. An existing
    /// directory gets `NSRDB_request_<archive name>.json`.
    pub fn write_json(&self, target: &Path) -> Result<PathBuf> {
        let default_name = match self.file_name() {
            Some(name) => {
                let stem = name.strip_suffix(".zip").unwrap_or(&name);
                format!("NSRDB_request_{stem}.json")
            }
            None => "NSRDB_request.json".to_string(),
        };
        let path = output_path(target, &default_name)?;
        let json = serde_json::to_vec_pretty(self).map_err(|e| NsrdbError::Output {
            path: path.clone(),
            source: e.into(),
        })?;
        write_file(&path, &json)?;
        Ok(path)
    }

    /// Errors reported inside a 200 reply are a rejection.
    pub(crate) fn into_checked(self) -> Result<Self> {
        if !self.errors.is_empty() {
            return Err(NsrdbError::Rejected {
                errors: self.errors,
            });
        }
        Ok(self)
    }
}
