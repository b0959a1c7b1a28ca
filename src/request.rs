use std::fmt;

use reqwest::Url;

use crate::config::{CredentialOverrides, Credentials};
use crate::error::{NsrdbError, Result};
use crate::geometry::Geometry;
use crate::util::{bool_str, redact_api_key, split_list, urljoin};

pub const DEFAULT_BASE_URL: &str = "https://developer.nrel.gov/api/nsrdb/v2/solar/";

const PSM_ATTRIBUTES: &[&str] = &[
    "air_temperature",
    "clearsky_dhi",
    "clearsky_dni",
    "clearsky_ghi",
    "cloud_type",
    "dew_point",
    "dhi",
    "dni",
    "fill_flag",
    "ghi",
    "ghuv-280-400",
    "ghuv-285-385",
    "relative_humidity",
    "solar_zenith_angle",
    "surface_albedo",
    "surface_pressure",
    "total_precipitable_water",
    "wind_direction",
    "wind_speed",
];

const FIVE_MINUTE_ATTRIBUTES: &[&str] = &[
    "air_temperature",
    "clearsky_dhi",
    "clearsky_dni",
    "clearsky_ghi",
    "cloud_type",
    "dew_point",
    "dhi",
    "dni",
    "fill_flag",
    "ghi",
    "relative_humidity",
    "solar_zenith_angle",
    "surface_albedo",
    "surface_pressure",
    "total_precipitable_water",
    "wind_direction",
    "wind_speed",
];

const TMY_ATTRIBUTES: &[&str] = &[
    "dhi",
    "dni",
    "ghi",
    "dew_point",
    "air_temperature",
    "surface_pressure",
    "wind_direction",
    "wind_speed",
    "surface_albedo",
];

const TMY_NAMES: &[&str] = &[
    "tmy-2017", "tdy-2017", "tgy-2017", "tmy-2018", "tdy-2018", "tgy-2018", "tmy-2019",
    "tdy-2019", "tgy-2019", "tmy-2020", "tdy-2020", "tgy-2020",
];

/// NSRDB download endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    /// PSM v3 annual time series (30/60 minute).
    Psm,
    /// PSM v3 typical meteorological year (TMY/TDY/TGY).
    Tmy,
    /// PSM v3 five-minute temporal resolution.
    FiveMinute,
}

impl Dataset {
    pub fn path(self) -> &'static str {
        match self {
            Dataset::Psm => "psm3-download",
            Dataset::Tmy => "psm3-tmy-download",
            Dataset::FiveMinute => "psm3-5min-download",
        }
    }

    pub fn allowed_attributes(self) -> &'static [&'static str] {
        match self {
            Dataset::Psm => PSM_ATTRIBUTES,
            Dataset::Tmy => TMY_ATTRIBUTES,
            Dataset::FiveMinute => FIVE_MINUTE_ATTRIBUTES,
        }
    }

    pub fn is_allowed_name(self, name: &str) -> bool {
        match self {
            Dataset::Psm => year_in(name, 1998, 2019),
            Dataset::Tmy => TMY_NAMES.contains(&name),
            Dataset::FiveMinute => year_in(name, 2018, 2020),
        }
    }

    /// Intervals in minutes; empty when the endpoint takes no `interval`.
    pub fn allowed_intervals(self) -> &'static [u32] {
        match self {
            Dataset::Psm => &[30, 60],
            Dataset::Tmy => &[],
            Dataset::FiveMinute => &[5, 15, 30, 60],
        }
    }

    /// Whether only one name may be requested at a time.
    pub fn single_name(self) -> bool {
        matches!(self, Dataset::Tmy)
    }

    pub fn supports_leap_day(self) -> bool {
        !matches!(self, Dataset::Tmy)
    }

    /// Most recent dataset name.
    pub fn default_name(self) -> &'static str {
        match self {
            Dataset::Psm => "2019",
            Dataset::Tmy => "tmy-2020",
            Dataset::FiveMinute => "2020",
        }
    }

    pub fn default_interval(self) -> Option<u32> {
        match self {
            Dataset::Psm => Some(60),
            Dataset::Tmy => None,
            Dataset::FiveMinute => Some(5),
        }
    }

    /// Options pre-filled with this dataset's defaults.
    pub fn default_options(self) -> RequestOptions {
        RequestOptions {
            names: vec![self.default_name().to_string()],
            interval: self.default_interval(),
            ..RequestOptions::default()
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

fn year_in(name: &str, first: u32, last: u32) -> bool {
    name.len() == 4
        && name
            .parse::<u32>()
            .map(|y| (first..=last).contains(&y))
            .unwrap_or(false)
}

/// Dataset parameters for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Years, or TMY dataset names such as `tmy-2020`.
    pub names: Vec<String>,
    /// Attributes to include; empty means "everything the endpoint offers".
    pub attributes: Vec<String>,
    /// Minutes between records.
    pub interval: Option<u32>,
    /// Timestamps in UTC instead of local standard time.
    pub utc: bool,
    /// Include February 29th in leap years.
    pub leap_day: bool,
    pub credentials: CredentialOverrides,
}

impl RequestOptions {
    /// Accepts `"2018,2019"`, `["2018", "2019"]` and similar.
    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.names = split_list(names);
        self
    }

    pub fn with_years<I: IntoIterator<Item = u32>>(mut self, years: I) -> Self {
        self.names = years.into_iter().map(|y| y.to_string()).collect();
        self
    }

    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.attributes = split_list(attributes);
        self
    }

    pub fn with_interval(mut self, minutes: u32) -> Self {
        self.interval = Some(minutes);
        self
    }

    pub fn with_utc(mut self, utc: bool) -> Self {
        self.utc = utc;
        self
    }

    pub fn with_leap_day(mut self, leap_day: bool) -> Self {
        self.leap_day = leap_day;
        self
    }

    pub fn with_credentials(mut self, credentials: CredentialOverrides) -> Self {
        self.credentials = credentials;
        self
    }
}

/// How the API answers a prepared request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Data streamed back directly.
    Csv,
    /// A job description pointing at a zip file generated later.
    Json,
}

impl ResponseFormat {
    fn extension(self) -> &'static str {
        match self {
            ResponseFormat::Csv => "csv",
            ResponseFormat::Json => "json",
        }
    }
}

/// A fully assembled GET request.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub dataset: Dataset,
    pub format: ResponseFormat,
    pub url: Url,
}

impl PreparedRequest {
    /// Query parameters in the order they are sent.
    pub fn query(&self) -> Vec<(String, String)> {
        self.url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    pub fn param(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Same request against the `.json` endpoint, so the API queues a zip
    /// file instead of streaming CSV.
    pub fn into_submission(mut self) -> Self {
        if self.format == ResponseFormat::Csv {
            let path = self.url.path().trim_end_matches(".csv").to_string();
            self.url.set_path(&format!("{path}.json"));
            self.format = ResponseFormat::Json;
        }
        self
    }

    /// URL with `api_key` masked, for logs.
    pub fn redacted(&self) -> String {
        redact_api_key(&self.url)
    }
}

/// Assembles the GET request for `dataset` at `geometry`.
///
/// Parameter validation runs before anything else, so a bad request never
/// reaches the network.
pub fn prepare(
    base_url: &str,
    dataset: Dataset,
    geometry: &Geometry,
    options: &RequestOptions,
    credentials: &Credentials,
) -> Result<PreparedRequest> {
    let wkt = geometry.wkt()?;
    let names = validate_names(dataset, &options.names)?;
    let attributes = validate_attributes(dataset, &options.attributes)?;
    let interval = validate_interval(dataset, options.interval)?;

    let format = if geometry.is_single_point() && names.len() == 1 {
        ResponseFormat::Csv
    } else {
        ResponseFormat::Json
    };

    let mut params: Vec<(&str, String)> = vec![
        ("api_key", credentials.api_key.clone()),
        ("email", credentials.email.clone()),
    ];
    if let Some(v) = &credentials.full_name {
        params.push(("full_name", v.clone()));
    }
    if let Some(v) = &credentials.affiliation {
        params.push(("affiliation", v.clone()));
    }
    if let Some(v) = &credentials.reason {
        params.push(("reason", v.clone()));
    }
    if let Some(v) = credentials.mailing_list {
        params.push(("mailing_list", bool_str(v).to_string()));
    }
    params.push(("wkt", wkt));
    params.push(("names", names.join(",")));
    if !attributes.is_empty() {
        params.push(("attributes", attributes.join(",")));
    }
    if let Some(minutes) = interval {
        params.push(("interval", minutes.to_string()));
    }
    params.push(("utc", bool_str(options.utc).to_string()));
    if dataset.supports_leap_day() {
        params.push(("leap_day", bool_str(options.leap_day).to_string()));
    }

    let endpoint = urljoin(
        base_url,
        &format!("{}.{}", dataset.path(), format.extension()),
    );
    let url = Url::parse_with_params(&endpoint, &params)
        .map_err(|e| NsrdbError::invalid_parameter("base_url", format!("{endpoint}: {e}")))?;

    Ok(PreparedRequest {
        dataset,
        format,
        url,
    })
}

fn validate_names(dataset: Dataset, names: &[String]) -> Result<Vec<String>> {
    let names = split_list(names);
    if names.is_empty() {
        return Err(NsrdbError::invalid_parameter(
            "names",
            format!("at least one name is required for {dataset}"),
        ));
    }
    if dataset.single_name() && names.len() > 1 {
        return Err(NsrdbError::invalid_parameter(
            "names",
            format!("{dataset} accepts a single name, got {}", names.join(",")),
        ));
    }
    if let Some(bad) = names.iter().find(|n| !dataset.is_allowed_name(n)) {
        return Err(NsrdbError::invalid_parameter(
            "names",
            format!("`{bad}` is not available from {dataset}"),
        ));
    }
    Ok(names)
}

fn validate_attributes(dataset: Dataset, attributes: &[String]) -> Result<Vec<String>> {
    let attributes = split_list(attributes);
    let allowed = dataset.allowed_attributes();
    if let Some(bad) = attributes.iter().find(|a| !allowed.contains(&a.as_str())) {
        return Err(NsrdbError::invalid_parameter(
            "attributes",
            format!("`{bad}` is not offered by {dataset}"),
        ));
    }
    Ok(attributes)
}

fn validate_interval(dataset: Dataset, interval: Option<u32>) -> Result<Option<u32>> {
    let allowed = dataset.allowed_intervals();
    match interval {
        None => Ok(dataset.default_interval()),
        Some(_) if allowed.is_empty() => Err(NsrdbError::invalid_parameter(
            "interval",
            format!("{dataset} does not take an interval"),
        )),
        Some(minutes) if allowed.contains(&minutes) => Ok(Some(minutes)),
        Some(minutes) => Err(NsrdbError::invalid_parameter(
            "interval",
            format!("{minutes} is not one of {allowed:?} for {dataset}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Polygon;

    fn creds() -> Credentials {
        Credentials {
            api_key: "KEY".to_string(),
            email: "me@example.org".to_string(),
            full_name: Some("Jane Q".to_string()),
            affiliation: None,
            reason: Some("beta testing".to_string()),
            mailing_list: Some(false),
        }
    }

    fn location() -> Geometry {
        Geometry::point(-93.1567288182409, 45.15793882400205)
    }

    #[test]
    fn single_point_single_year_goes_to_csv() {
        let opts = Dataset::Psm
            .default_options()
            .with_years([2018])
            .with_attributes(["ghi, dni", "air_temperature"]);
        let req = prepare(DEFAULT_BASE_URL, Dataset::Psm, &location(), &opts, &creds()).unwrap();

        assert_eq!(req.format, ResponseFormat::Csv);
        assert_eq!(
            req.url.path(),
            "/api/nsrdb/v2/solar/psm3-download.csv"
        );
        let keys: Vec<String> = req.query().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                "api_key", "email", "full_name", "reason", "mailing_list", "wkt", "names",
                "attributes", "interval", "utc", "leap_day"
            ]
        );
        assert_eq!(
            req.param("wkt").as_deref(),
            Some("POINT(-93.1567288182409 45.15793882400205)")
        );
        assert_eq!(req.param("attributes").as_deref(), Some("ghi,dni,air_temperature"));
        assert_eq!(req.param("interval").as_deref(), Some("60"));
        assert_eq!(req.param("mailing_list").as_deref(), Some("false"));
    }

    #[test]
    fn values_are_url_encoded() {
        let req = prepare(
            DEFAULT_BASE_URL,
            Dataset::Psm,
            &location(),
            &Dataset::Psm.default_options(),
            &creds(),
        )
        .unwrap();
        let raw = req.url.query().unwrap();
        assert!(raw.contains("email=me%40example.org"));
        assert!(raw.contains("wkt=POINT%28-93.1567288182409+45.15793882400205%29"));
        assert!(!raw.contains(' '));
    }

    #[test]
    fn areas_and_multiple_years_go_to_json() {
        let poly = Polygon::new(vec![(-93.19, 44.64), (-93.12, 44.60), (-93.12, 44.64)]).unwrap();
        let req = prepare(
            DEFAULT_BASE_URL,
            Dataset::Psm,
            &Geometry::from(&poly),
            &Dataset::Psm.default_options(),
            &creds(),
        )
        .unwrap();
        assert_eq!(req.format, ResponseFormat::Json);
        assert!(req.url.path().ends_with("psm3-download.json"));

        let opts = RequestOptions::default().with_names(["2017,2018"]);
        let req = prepare(DEFAULT_BASE_URL, Dataset::Psm, &location(), &opts, &creds()).unwrap();
        assert_eq!(req.format, ResponseFormat::Json);
        assert_eq!(req.param("names").as_deref(), Some("2017,2018"));
    }

    #[test]
    fn csv_request_can_become_a_submission() {
        let req = prepare(
            DEFAULT_BASE_URL,
            Dataset::Tmy,
            &location(),
            &Dataset::Tmy.default_options(),
            &creds(),
        )
        .unwrap()
        .into_submission();
        assert_eq!(req.format, ResponseFormat::Json);
        assert_eq!(req.url.path(), "/api/nsrdb/v2/solar/psm3-tmy-download.json");
        assert_eq!(req.param("names").as_deref(), Some("tmy-2020"));
    }

    #[test]
    fn missing_names_is_invalid_parameter() {
        let opts = RequestOptions::default();
        match prepare(DEFAULT_BASE_URL, Dataset::Psm, &location(), &opts, &creds()) {
            Err(NsrdbError::InvalidParameter { name, .. }) => assert_eq!(name, "names"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parameters_are_checked_against_the_dataset() {
        let bad_year = RequestOptions::default().with_years([1990]);
        assert!(prepare(DEFAULT_BASE_URL, Dataset::Psm, &location(), &bad_year, &creds()).is_err());

        let two_tmy = RequestOptions::default().with_names(["tmy-2019", "tmy-2020"]);
        assert!(prepare(DEFAULT_BASE_URL, Dataset::Tmy, &location(), &two_tmy, &creds()).is_err());

        let uv = Dataset::Tmy.default_options().with_attributes(["ghuv-280-400"]);
        assert!(prepare(DEFAULT_BASE_URL, Dataset::Tmy, &location(), &uv, &creds()).is_err());

        let interval = Dataset::Psm.default_options().with_interval(5);
        match prepare(DEFAULT_BASE_URL, Dataset::Psm, &location(), &interval, &creds()) {
            Err(NsrdbError::InvalidParameter { name, .. }) => assert_eq!(name, "interval"),
            other => panic!("unexpected {other:?}"),
        }

        let tmy_interval = Dataset::Tmy.default_options().with_interval(60);
        assert!(prepare(DEFAULT_BASE_URL, Dataset::Tmy, &location(), &tmy_interval, &creds()).is_err());
    }

    #[test]
    fn tmy_omits_interval_and_leap_day() {
        let req = prepare(
            DEFAULT_BASE_URL,
            Dataset::Tmy,
            &location(),
            &Dataset::Tmy.default_options().with_utc(true),
            &creds(),
        )
        .unwrap();
        assert!(req.url.path().ends_with("psm3-tmy-download.csv"));
        assert_eq!(req.param("names").as_deref(), Some("tmy-2020"));
        assert_eq!(req.param("utc").as_deref(), Some("true"));
        assert_eq!(req.param("interval"), None);
        assert_eq!(req.param("leap_day"), None);
    }

    #[test]
    fn invalid_geometry_fails_before_anything_else() {
        let result = prepare(
            DEFAULT_BASE_URL,
            Dataset::Psm,
            &Geometry::point(200.0, 0.0),
            &RequestOptions::default(),
            &creds(),
        );
        assert!(matches!(result, Err(NsrdbError::InvalidGeometry(_))));
    }

    #[test]
    fn redacted_url_hides_the_key() {
        let req = prepare(
            DEFAULT_BASE_URL,
            Dataset::FiveMinute,
            &location(),
            &Dataset::FiveMinute.default_options(),
            &creds(),
        )
        .unwrap();
        let shown = req.redacted();
        assert!(!shown.contains("KEY"));
        assert!(shown.contains("api_key=***") || shown.contains("api_key=%2A%2A%2A"));
        assert_eq!(req.param("interval").as_deref(), Some("5"));
    }
}
