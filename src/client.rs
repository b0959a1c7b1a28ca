use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;

use crate::config::CredentialSource;
use crate::error::{NsrdbError, Result, request_error};
use crate::geometry::Geometry;
use crate::query::{DEFAULT_DATA_QUERY_URL, DataQueryOptions, DataQueryResponse, prepare_data_query};
use crate::request::{DEFAULT_BASE_URL, Dataset, PreparedRequest, RequestOptions, ResponseFormat, prepare};
use crate::response::{
    MaterializeOptions, PayloadKind, materialize, materialize_archive_entries,
};
use crate::submission::Submission;
use crate::table::Table;
use crate::util::{output_path, redact_api_key};

/// Upper bound on the buffer reserved up front from `Content-Length`.
const PREALLOC_LIMIT: u64 = 64 << 20;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base of the download endpoints, typically
    /// `https://developer.nrel.gov/api/nsrdb/v2/solar/`.
    pub base_url: String,
    /// Full URL of the dataset availability endpoint.
    pub data_query_url: String,
    /// HTTP timeout for a single request.
    pub timeout: Duration,
    /// Show a progress bar while downloading generated archives.
    pub progress: bool,
    pub materialize: MaterializeOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            data_query_url: DEFAULT_DATA_QUERY_URL.to_string(),
            timeout: Duration::from_secs(60),
            progress: true,
            materialize: MaterializeOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
    credentials: CredentialSource,
    http: HttpClient,
}

/// What a download request produced.
#[derive(Debug, Clone)]
pub enum Retrieval {
    /// The API streamed the data back directly.
    Table(Table),
    /// The API queued a zip file; fetch it with [`Client::download`].
    Submitted(Submission),
}

impl Retrieval {
    pub fn table(&self) -> Option<&Table> {
        match self {
            Retrieval::Table(t) => Some(t),
            Retrieval::Submitted(_) => None,
        }
    }

    pub fn into_table(self) -> Option<Table> {
        match self {
            Retrieval::Table(t) => Some(t),
            Retrieval::Submitted(_) => None,
        }
    }

    pub fn submission(&self) -> Option<&Submission> {
        match self {
            Retrieval::Submitted(s) => Some(s),
            Retrieval::Table(_) => None,
        }
    }
}

impl Client {
    /// Creates a client with default endpoints reading `~/.nsrdb`.
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default(), CredentialSource::HomeFile)
    }

    pub fn with_config(config: ClientConfig, credentials: CredentialSource) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("nsrdb-rs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("nsrdb-rs")),
        );

        let http = HttpClient::builder()
            .default_headers(default_headers)
            .timeout(config.timeout)
            .build()
            .map_err(|source| NsrdbError::Transport {
                url: config.base_url.clone(),
                source,
            })?;

        Ok(Self {
            config,
            credentials,
            http,
        })
    }

    pub fn with_credential_source(mut self, credentials: CredentialSource) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    pub fn with_data_query_url(mut self, url: impl Into<String>) -> Self {
        self.config.data_query_url = url.into();
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.config.progress = progress;
        self
    }

    pub fn with_materialize_options(mut self, options: MaterializeOptions) -> Self {
        self.config.materialize = options;
        self
    }

    /// Replaces the HTTP client, e.g. to configure proxies or TLS.
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn credential_source(&self) -> &CredentialSource {
        &self.credentials
    }

    /// Resolves credentials and assembles the request without sending it.
    pub fn prepare(
        &self,
        dataset: Dataset,
        geometry: impl Into<Geometry>,
        options: &RequestOptions,
    ) -> Result<PreparedRequest> {
        let credentials = self.credentials.resolve(&options.credentials)?;
        prepare(
            &self.config.base_url,
            dataset,
            &geometry.into(),
            options,
            &credentials,
        )
    }

    /// PSM v3 annual time series.
    pub fn point_time_series(
        &self,
        geometry: impl Into<Geometry>,
        options: RequestOptions,
    ) -> Result<Retrieval> {
        self.retrieve(Dataset::Psm, geometry, options)
    }

    /// Typical meteorological year (or TDY/TGY via `names`).
    pub fn typical_meteorological_year(
        &self,
        geometry: impl Into<Geometry>,
        options: RequestOptions,
    ) -> Result<Retrieval> {
        self.retrieve(Dataset::Tmy, geometry, options)
    }

    /// PSM v3 five-minute data.
    pub fn five_minute_time_series(
        &self,
        geometry: impl Into<Geometry>,
        options: RequestOptions,
    ) -> Result<Retrieval> {
        self.retrieve(Dataset::FiveMinute, geometry, options)
    }

    /// Queues an archive for an area or a set of sites. Always goes through
    /// the `.json` endpoint, even for a single point.
    pub fn area_aggregate(
        &self,
        dataset: Dataset,
        geometry: impl Into<Geometry>,
        options: RequestOptions,
    ) -> Result<Submission> {
        let options = with_defaults(dataset, options);
        let request = self.prepare(dataset, geometry, &options)?.into_submission();
        self.submit(&request)
    }

    /// Fills in the dataset's default name and interval, then sends.
    pub fn retrieve(
        &self,
        dataset: Dataset,
        geometry: impl Into<Geometry>,
        options: RequestOptions,
    ) -> Result<Retrieval> {
        let options = with_defaults(dataset, options);
        let request = self.prepare(dataset, geometry, &options)?;
        self.execute(&request)
    }

    /// Sends a prepared request and materializes the reply.
    pub fn execute(&self, request: &PreparedRequest) -> Result<Retrieval> {
        match request.format {
            ResponseFormat::Json => self.submit(request).map(Retrieval::Submitted),
            ResponseFormat::Csv => {
                let shown = request.redacted();
                info!("NSRDB {} request: {}", request.dataset, shown);
                let resp = self.send(request.url.as_str(), &shown)?;
                let (content_type, bytes) = read_bytes(resp, &shown)?;
                let kind = PayloadKind::detect(content_type.as_deref(), &bytes);
                let table = materialize(&bytes, kind, &self.config.materialize)?;
                info!("received {} rows x {} columns", table.len(), table.columns.len());
                Ok(Retrieval::Table(table))
            }
        }
    }

    fn submit(&self, request: &PreparedRequest) -> Result<Submission> {
        let shown = request.redacted();
        info!("NSRDB {} submission: {}", request.dataset, shown);

        let resp = self.send(request.url.as_str(), &shown)?;
        let submission: Submission = read_json(resp, &shown)?;
        let submission = submission.into_checked()?;
        if let Some(msg) = submission.message() {
            info!("{}", msg);
        }
        Ok(submission)
    }

    /// Downloads the archive generated for `submission` and parses its single
    /// data file. No polling: an archive that is not ready yet surfaces as
    /// [`NsrdbError::Request`].
    pub fn download(&self, submission: &Submission) -> Result<Table> {
        let bytes = self.fetch_archive(submission)?;
        let kind = PayloadKind::detect(None, &bytes);
        materialize(&bytes, kind, &self.config.materialize)
    }

    /// Like [`Client::download`], returning one table per data file.
    pub fn download_all(&self, submission: &Submission) -> Result<Vec<Table>> {
        let bytes = self.fetch_archive(submission)?;
        materialize_archive_entries(&bytes, &self.config.materialize)
    }

    /// Lists the datasets available at a location. Only the API key is sent.
    pub fn data_query(
        &self,
        geometry: impl Into<Geometry>,
        options: &DataQueryOptions,
    ) -> Result<DataQueryResponse> {
        let api_key = self.credentials.resolve_api_key(options.api_key.as_deref())?;
        let url = prepare_data_query(
            &self.config.data_query_url,
            &geometry.into(),
            options,
            &api_key,
        )?;
        let shown = redact_api_key(&url);
        info!("NSRDB data query: {}", shown);

        let resp = self.send(url.as_str(), &shown)?;
        let reply: DataQueryResponse = read_json(resp, &shown)?;
        reply.into_checked()
    }

    /// Saves the archive generated for `submission` without parsing it.
    ///
    /// `target` may be a file path, an existing directory (the archive keeps
    /// its server-side name) or empty (the working directory). Returns the
    /// path written.
    pub fn download_to(&self, submission: &Submission, target: &Path) -> Result<PathBuf> {
        let default_name = submission
            .file_name()
            .unwrap_or_else(|| "nsrdb_download.zip".to_string());
        let path = output_path(target, &default_name)?;
        let output_error = |source: std::io::Error| NsrdbError::Output {
            path: path.clone(),
            source,
        };

        let (url, resp) = self.open_archive(submission)?;
        let mut out = BufWriter::new(File::create(&path).map_err(output_error)?);
        let written = self.copy_body(resp, url, &mut out)?;
        out.flush().map_err(output_error)?;

        info!("saved {} bytes to {}", written, path.display());
        Ok(path)
    }

    fn fetch_archive(&self, submission: &Submission) -> Result<Vec<u8>> {
        let (url, resp) = self.open_archive(submission)?;
        let reserve = resp.content_length().unwrap_or(0).min(PREALLOC_LIMIT);
        let mut data = Vec::with_capacity(reserve as usize);
        self.copy_body(resp, url, &mut data)?;
        Ok(data)
    }

    fn open_archive<'a>(&self, submission: &'a Submission) -> Result<(&'a str, Response)> {
        let url = submission.download_url().ok_or_else(|| {
            NsrdbError::invalid_parameter("downloadUrl", "reply carries no download URL")
        })?;
        info!(
            "downloading {}",
            submission.file_name().as_deref().unwrap_or(url)
        );
        Ok((url, self.send(url, url)?))
    }

    fn copy_body<W: Write>(&self, mut resp: Response, url: &str, out: &mut W) -> Result<u64> {
        let total = resp.content_length().unwrap_or(0);
        let copied = if self.config.progress {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} {bytes}/{total_bytes} ({bytes_per_sec}) {wide_bar} {eta}",
                )
                .map(|s| s.progress_chars("=>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            let copied = resp.copy_to(&mut pb.wrap_write(&mut *out));
            pb.finish_and_clear();
            copied
        } else {
            resp.copy_to(out)
        };
        copied.map_err(|source| NsrdbError::Transport {
            url: url.to_string(),
            source,
        })
    }

    fn send(&self, url: &str, shown: &str) -> Result<Response> {
        let resp = self
            .http
            .get(url)
            .send()
            .map_err(|source| NsrdbError::Transport {
                url: shown.to_string(),
                source: source.without_url(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            warn!("NSRDB request returned HTTP {} for {}", status, shown);
            return Err(match resp.text() {
                Ok(body) => request_error(status, body),
                Err(e) => NsrdbError::Request {
                    status: status.as_u16(),
                    body: String::new(),
                    message: Some(format!("error body could not be read: {e}")),
                },
            });
        }
        Ok(resp)
    }
}

fn with_defaults(dataset: Dataset, mut options: RequestOptions) -> RequestOptions {
    if options.names.is_empty() {
        options.names = vec![dataset.default_name().to_string()];
    }
    options
}

fn read_bytes(resp: Response, shown: &str) -> Result<(Option<String>, Vec<u8>)> {
    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = resp.bytes().map_err(|source| NsrdbError::Transport {
        url: shown.to_string(),
        source: source.without_url(),
    })?;
    Ok((content_type, bytes.to_vec()))
}

fn read_json<T: DeserializeOwned>(resp: Response, shown: &str) -> Result<T> {
    let (_, bytes) = read_bytes(resp, shown)?;
    serde_json::from_slice(&bytes).map_err(|source| NsrdbError::Json {
        url: shown.to_string(),
        source,
    })
}
