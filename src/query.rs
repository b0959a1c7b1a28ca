use std::fmt;

use reqwest::Url;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{NsrdbError, Result};
use crate::geometry::Geometry;
use crate::util::bool_str;

pub const DEFAULT_DATA_QUERY_URL: &str =
    "https://developer.nrel.gov/api/solar/nsrdb_data_query.json";

/// Dataset family filter for the data query endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataQueryKind {
    Station,
    Satellite,
}

impl fmt::Display for DataQueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataQueryKind::Station => "station",
            DataQueryKind::Satellite => "satellite",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataQueryOptions {
    pub kind: Option<DataQueryKind>,
    /// Also list datasets without data at the location.
    pub show_empty: bool,
    /// Explicit key; otherwise resolved from the client's credential source.
    pub api_key: Option<String>,
}

/// Datasets available at a location.
#[derive(Debug, Clone, Deserialize)]
pub struct DataQueryResponse {
    #[serde(default)]
    pub outputs: Vec<DatasetAvailability>,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetAvailability {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub available_years: Vec<Value>,
    #[serde(default)]
    pub available_intervals: Vec<u32>,
    #[serde(default)]
    pub api_documentation_url: Option<String>,
    #[serde(default)]
    pub links: Vec<DatasetLink>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetLink {
    #[serde(default)]
    pub year: Value,
    #[serde(default)]
    pub interval: Option<u32>,
    pub link: String,
}

/// Builds the GET URL for the data query endpoint.
pub fn prepare_data_query(
    url: &str,
    geometry: &Geometry,
    options: &DataQueryOptions,
    api_key: &str,
) -> Result<Url> {
    let mut params: Vec<(&str, String)> = vec![("api_key", api_key.to_string())];
    if let Some(kind) = options.kind {
        params.push(("type", kind.to_string()));
    }
    params.push(("wkt", geometry.wkt()?));
    params.push(("show_empty", bool_str(options.show_empty).to_string()));
    params.push(("format", "json".to_string()));

    Url::parse_with_params(url, &params)
        .map_err(|e| NsrdbError::invalid_parameter("data_query_url", format!("{url}: {e}")))
}

impl DataQueryResponse {
    pub(crate) fn into_checked(self) -> Result<Self> {
        if !self.errors.is_empty() {
            return Err(NsrdbError::Rejected {
                errors: self.errors,
            });
        }
        Ok(self)
    }
}

impl DatasetAvailability {
    /// Years as strings; TMY datasets list names like `tmy-2020`.
    pub fn years(&self) -> Vec<String> {
        self.available_years
            .iter()
            .map(|y| match y {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dataset_listing() {
        let r: DataQueryResponse = serde_json::from_str(
            r#"{"inputs":{},"outputs":[
                {"name":"nsrdb-GOES-aggregated-v4-0-0","displayName":"PSM v3",
                 "type":"satellite","availableYears":[1998,2019],"availableIntervals":[30,60],
                 "apiDocumentationUrl":"https://developer.nrel.gov/docs/solar/nsrdb/psm3-download/",
                 "links":[{"year":2019,"interval":60,"link":"https://developer.nrel.gov/api/nsrdb/v2/solar/psm3-download"}],
                 "apiSlug":"psm3"},
                {"name":"tmy","availableYears":["tmy-2020"]}
            ]}"#,
        )
        .unwrap();

        assert_eq!(r.outputs.len(), 2);
        let psm = &r.outputs[0];
        assert_eq!(psm.kind.as_deref(), Some("satellite"));
        assert_eq!(psm.years(), vec!["1998", "2019"]);
        assert_eq!(psm.available_intervals, vec![30, 60]);
        assert_eq!(psm.links[0].interval, Some(60));
        assert_eq!(psm.extra.get("apiSlug"), Some(&Value::from("psm3")));
        assert_eq!(r.outputs[1].years(), vec!["tmy-2020"]);
    }

    #[test]
    fn data_query_url() {
        let url = prepare_data_query(
            DEFAULT_DATA_QUERY_URL,
            &Geometry::point(-93.1567288182409, 45.15793882400205),
            &DataQueryOptions {
                kind: Some(DataQueryKind::Satellite),
                ..DataQueryOptions::default()
            },
            "KEY",
        )
        .unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(pairs[0], ("api_key".to_string(), "KEY".to_string()));
        assert_eq!(pairs[1], ("type".to_string(), "satellite".to_string()));
        assert_eq!(
            pairs[2].1,
            "POINT(-93.1567288182409 45.15793882400205)"
        );
        assert_eq!(pairs[3], ("show_empty".to_string(), "false".to_string()));
        assert_eq!(pairs[4], ("format".to_string(), "json".to_string()));
        assert!(!pairs.iter().any(|(k, _)| k == "email"));
    }

    #[test]
    fn kind_strings() {
        assert_eq!(DataQueryKind::Station.to_string(), "station");
        assert_eq!(DataQueryKind::Satellite.to_string(), "satellite");
    }
}
