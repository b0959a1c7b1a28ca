use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{NsrdbError, Result};

/// File name of the credential file looked up in the home directory.
pub const CREDENTIAL_FILE_NAME: &str = ".nsrdb";

/// Where credentials come from when they are not passed explicitly.
#[derive(Debug, Clone, Default)]
pub enum CredentialSource {
    /// `~/.nsrdb`.
    #[default]
    HomeFile,
    /// A `KEY=VALUE` file at an explicit path.
    File(PathBuf),
    /// `NSRDB_API_KEY`, `NSRDB_EMAIL`, ... environment variables.
    Env,
    /// Already parsed `KEY=VALUE` pairs. Keys are matched case-insensitively.
    Values(BTreeMap<String, String>),
    /// Explicit arguments only.
    None,
}

/// Fully resolved credentials sent with every data request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub email: String,
    pub full_name: Option<String>,
    pub affiliation: Option<String>,
    pub reason: Option<String>,
    pub mailing_list: Option<bool>,
}

/// Per-call credential values. Any field set here wins over the source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialOverrides {
    pub api_key: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub affiliation: Option<String>,
    pub reason: Option<String>,
    pub mailing_list: Option<bool>,
}

impl CredentialOverrides {
    pub fn new(api_key: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            email: Some(email.into()),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = Some(full_name.into());
        self
    }

    pub fn with_affiliation(mut self, affiliation: impl Into<String>) -> Self {
        self.affiliation = Some(affiliation.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_mailing_list(mut self, mailing_list: bool) -> Self {
        self.mailing_list = Some(mailing_list);
        self
    }
}

#[derive(Debug, Default)]
struct StoredCredentials {
    api_key: Option<String>,
    email: Option<String>,
    full_name: Option<String>,
    affiliation: Option<String>,
    reason: Option<String>,
    mailing_list: Option<bool>,
}

impl CredentialSource {
    /// Path of the file this source reads, if it is file backed.
    pub fn path(&self) -> Option<PathBuf> {
        match self {
            CredentialSource::HomeFile => {
                dirs::home_dir().map(|home| home.join(CREDENTIAL_FILE_NAME))
            }
            CredentialSource::File(p) => Some(p.clone()),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            CredentialSource::HomeFile | CredentialSource::File(_) => self
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| format!("~/{CREDENTIAL_FILE_NAME}")),
            CredentialSource::Env => "the NSRDB_* environment variables".to_string(),
            CredentialSource::Values(_) => "the supplied credential values".to_string(),
            CredentialSource::None => "a credential source".to_string(),
        }
    }

    fn load(&self) -> Result<StoredCredentials> {
        match self {
            CredentialSource::HomeFile | CredentialSource::File(_) => match self.path() {
                Some(path) => read_credential_file(&path),
                None => Ok(StoredCredentials::default()),
            },
            CredentialSource::Env => from_pairs(env_pairs(std::env::vars_os())),
            CredentialSource::Values(map) => {
                from_pairs(map.iter().map(|(k, v)| (k.clone(), v.clone())))
            }
            CredentialSource::None => Ok(StoredCredentials::default()),
        }
    }

    /// Resolves credentials, letting `overrides` win field by field.
    ///
    /// The source is not consulted at all when both `api_key` and `email`
    /// are given explicitly. Nothing is cached: every call re-reads it.
    pub fn resolve(&self, overrides: &CredentialOverrides) -> Result<Credentials> {
        let explicit_key = non_blank(overrides.api_key.as_deref());
        let explicit_email = non_blank(overrides.email.as_deref());
        let stored = if explicit_key.is_some() && explicit_email.is_some() {
            StoredCredentials::default()
        } else {
            self.load()?
        };

        let api_key = explicit_key
            .or(stored.api_key)
            .ok_or_else(|| self.missing("api_key", "API_KEY"))?;
        let email = explicit_email
            .or(stored.email)
            .ok_or_else(|| self.missing("email", "EMAIL"))?;

        Ok(Credentials {
            api_key,
            email,
            full_name: overrides.full_name.clone().or(stored.full_name),
            affiliation: overrides.affiliation.clone().or(stored.affiliation),
            reason: overrides.reason.clone().or(stored.reason),
            mailing_list: overrides.mailing_list.or(stored.mailing_list),
        })
    }

    /// Just the API key, for endpoints that take nothing else.
    pub fn resolve_api_key(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(key) = non_blank(explicit) {
            return Ok(key);
        }
        self.load()?
            .api_key
            .ok_or_else(|| self.missing("api_key", "API_KEY"))
    }

    fn missing(&self, field: &'static str, key: &'static str) -> NsrdbError {
        NsrdbError::MissingCredential {
            field,
            key,
            source_hint: self.describe(),
        }
    }
}

fn read_credential_file(path: &Path) -> Result<StoredCredentials> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("no credential file at {}", path.display());
            return Ok(StoredCredentials::default());
        }
        Err(source) => {
            return Err(NsrdbError::CredentialFile {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    debug!("reading credentials from {}", path.display());
    from_pairs(parse_key_values(&text))
}

/// An explicit value counts only when it is not blank, the same rule the
/// credential file follows.
fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Parses `KEY=VALUE` lines. Blank lines and `#` comments are skipped.
pub(crate) fn parse_key_values(text: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        if let Some((k, v)) = line.split_once('=') {
            let k = k.trim();
            if k.is_empty() {
                continue;
            }
            out.push((k.to_string(), strip_quotes(v).to_string()));
        }
    }
    out
}

/// `NSRDB_`-prefixed variables with the prefix stripped.
fn env_pairs<I>(vars: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(k, v)| {
            let key = k.to_str()?.strip_prefix("NSRDB_")?.to_string();
            Some((key, v.into_string().ok()?))
        })
        .collect()
}

fn from_pairs<I>(pairs: I) -> Result<StoredCredentials>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut cfg = StoredCredentials::default();
    for (k, v) in pairs {
        if v.is_empty() {
            continue;
        }
        match k.to_ascii_uppercase().as_str() {
            "API_KEY" => cfg.api_key = Some(v),
            "EMAIL" => cfg.email = Some(v),
            "FULL_NAME" => cfg.full_name = Some(v),
            "AFFILIATION" => cfg.affiliation = Some(v),
            "REASON" => cfg.reason = Some(v),
            "MAILING_LIST" => cfg.mailing_list = Some(parse_flag("MAILING_LIST", &v)?),
            _ => {}
        }
    }
    Ok(cfg)
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(NsrdbError::invalid_parameter(
            key,
            format!("expected true or false, got `{value}`"),
        )),
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}
