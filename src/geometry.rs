//! Query locations and their WKT form.
//!
//! A request location is either a single `(lon, lat)` pair or any shape that
//! can render itself as Well-Known Text. Coordinates are WGS84 degrees and are
//! sent as-is, without reprojection.

use std::fmt::Write as _;

use crate::error::{NsrdbError, Result};

const WKT_KEYWORDS: [&str; 6] = [
    "POINT",
    "MULTIPOINT",
    "LINESTRING",
    "MULTILINESTRING",
    "POLYGON",
    "MULTIPOLYGON",
];

/// Anything that can serialize itself as Well-Known Text.
pub trait ToWkt {
    fn to_wkt(&self) -> String;
}

/// A request location.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point { lon: f64, lat: f64 },
    /// WKT produced by a [`ToWkt`] shape.
    Shape(String),
}

impl Geometry {
    pub fn point(lon: f64, lat: f64) -> Self {
        Geometry::Point { lon, lat }
    }

    pub fn from_shape<S: ToWkt + ?Sized>(shape: &S) -> Self {
        Geometry::Shape(shape.to_wkt())
    }

    /// Validated WKT for the `wkt` query parameter.
    pub fn wkt(&self) -> Result<String> {
        match self {
            Geometry::Point { lon, lat } => {
                check_coordinate(*lon, *lat)?;
                Ok(format!("POINT({} {})", lon, lat))
            }
            Geometry::Shape(wkt) => {
                check_wkt(wkt)?;
                Ok(wkt.trim().to_string())
            }
        }
    }

    /// Whether this is a single point (directly downloadable as CSV).
    pub fn is_single_point(&self) -> bool {
        match self {
            Geometry::Point { .. } => true,
            Geometry::Shape(wkt) => {
                let upper = wkt.trim_start().to_ascii_uppercase();
                upper.starts_with("POINT")
            }
        }
    }
}

impl From<(f64, f64)> for Geometry {
    fn from((lon, lat): (f64, f64)) -> Self {
        Geometry::point(lon, lat)
    }
}

impl From<[f64; 2]> for Geometry {
    fn from([lon, lat]: [f64; 2]) -> Self {
        Geometry::point(lon, lat)
    }
}

impl From<&MultiPoint> for Geometry {
    fn from(shape: &MultiPoint) -> Self {
        Geometry::from_shape(shape)
    }
}

impl From<MultiPoint> for Geometry {
    fn from(shape: MultiPoint) -> Self {
        Geometry::from_shape(&shape)
    }
}

impl From<&Polygon> for Geometry {
    fn from(shape: &Polygon) -> Self {
        Geometry::from_shape(shape)
    }
}

impl From<Polygon> for Geometry {
    fn from(shape: Polygon) -> Self {
        Geometry::from_shape(&shape)
    }
}

/// A set of sites, e.g. several PV installations in one request.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiPoint {
    points: Vec<(f64, f64)>,
}

impl MultiPoint {
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self> {
        if points.is_empty() {
            return Err(NsrdbError::InvalidGeometry(
                "MULTIPOINT needs at least one point".to_string(),
            ));
        }
        for &(lon, lat) in &points {
            check_coordinate(lon, lat)?;
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }
}

impl ToWkt for MultiPoint {
    fn to_wkt(&self) -> String {
        format!("MULTIPOINT ({})", join_coords(&self.points))
    }
}

/// A single-ring polygon. The ring is closed on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    ring: Vec<(f64, f64)>,
}

impl Polygon {
    pub fn new(mut ring: Vec<(f64, f64)>) -> Result<Self> {
        for &(lon, lat) in &ring {
            check_coordinate(lon, lat)?;
        }
        if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
            if first != last {
                ring.push(first);
            }
        }
        // Closed ring: three distinct vertices plus the closing one.
        if ring.len() < 4 {
            return Err(NsrdbError::InvalidGeometry(format!(
                "POLYGON needs at least 3 vertices, got {}",
                ring.len().saturating_sub(1)
            )));
        }
        Ok(Self { ring })
    }

    pub fn exterior(&self) -> &[(f64, f64)] {
        &self.ring
    }
}

impl ToWkt for Polygon {
    fn to_wkt(&self) -> String {
        format!("POLYGON (({}))", join_coords(&self.ring))
    }
}

fn join_coords(coords: &[(f64, f64)]) -> String {
    let mut out = String::new();
    for (i, (lon, lat)) in coords.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{} {}", lon, lat);
    }
    out
}

fn check_coordinate(lon: f64, lat: f64) -> Result<()> {
    if !lon.is_finite() || !lat.is_finite() {
        return Err(NsrdbError::InvalidGeometry(format!(
            "coordinates must be finite, got ({lon}, {lat})"
        )));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(NsrdbError::InvalidGeometry(format!(
            "longitude {lon} outside [-180, 180]"
        )));
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(NsrdbError::InvalidGeometry(format!(
            "latitude {lat} outside [-90, 90]"
        )));
    }
    Ok(())
}

fn check_wkt(wkt: &str) -> Result<()> {
    let wkt = wkt.trim();
    if wkt.is_empty() {
        return Err(NsrdbError::InvalidGeometry("empty WKT".to_string()));
    }

    let keyword: String = wkt
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    if !WKT_KEYWORDS.contains(&keyword.as_str()) {
        return Err(NsrdbError::InvalidGeometry(format!(
            "unsupported WKT geometry `{}`",
            wkt.chars().take(32).collect::<String>()
        )));
    }

    let mut depth = 0i32;
    for c in wkt.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    break;
                }
            }
            _ => {}
        }
    }
    if depth != 0 || !wkt.contains('(') {
        return Err(NsrdbError::InvalidGeometry(format!(
            "unbalanced parentheses in WKT `{wkt}`"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_keeps_input_precision() {
        let cases = [
            (-93.1567288182409, 45.15793882400205),
            (0.5, -0.25),
            (180.0, 90.0),
            (-180.0, -90.0),
            (12.345678901234567, 1e-7),
        ];
        for (lon, lat) in cases {
            let wkt = Geometry::point(lon, lat).wkt().unwrap();
            assert_eq!(wkt, format!("POINT({} {})", lon, lat));

            let inner = &wkt["POINT(".len()..wkt.len() - 1];
            let (a, b) = inner.split_once(' ').unwrap();
            assert_eq!(a.parse::<f64>().unwrap(), lon);
            assert_eq!(b.parse::<f64>().unwrap(), lat);
        }
        assert_eq!(
            Geometry::from((-93.1567288182409, 45.15793882400205))
                .wkt()
                .unwrap(),
            "POINT(-93.1567288182409 45.15793882400205)"
        );
    }

    #[test]
    fn out_of_range_points_are_rejected() {
        for (lon, lat) in [(181.0, 0.0), (0.0, -90.5), (f64::NAN, 0.0), (0.0, f64::INFINITY)] {
            assert!(matches!(
                Geometry::point(lon, lat).wkt(),
                Err(NsrdbError::InvalidGeometry(_))
            ));
        }
    }

    #[test]
    fn polygon_is_closed_and_serialized() {
        let poly = Polygon::new(vec![(-93.19, 44.64), (-93.12, 44.60), (-93.12, 44.64)]).unwrap();
        assert_eq!(poly.exterior().len(), 4);
        assert_eq!(
            Geometry::from(&poly).wkt().unwrap(),
            "POLYGON ((-93.19 44.64, -93.12 44.6, -93.12 44.64, -93.19 44.64))"
        );
        assert!(!Geometry::from(poly).is_single_point());
    }

    #[test]
    fn degenerate_shapes_are_rejected() {
        assert!(Polygon::new(vec![(0.0, 0.0), (1.0, 1.0), (0.0, 0.0)]).is_err());
        assert!(MultiPoint::new(vec![]).is_err());
        assert!(MultiPoint::new(vec![(0.0, 95.0)]).is_err());
    }

    #[test]
    fn multipoint_wkt() {
        let mp = MultiPoint::new(vec![(-105.2, 39.7), (-104.9, 39.75)]).unwrap();
        assert_eq!(mp.to_wkt(), "MULTIPOINT (-105.2 39.7, -104.9 39.75)");
        assert!(Geometry::from(mp).wkt().is_ok());
    }

    #[test]
    fn custom_shapes_are_validated() {
        struct Raw(&'static str);
        impl ToWkt for Raw {
            fn to_wkt(&self) -> String {
                self.0.to_string()
            }
        }

        assert!(Geometry::from_shape(&Raw("POINT (1 2)")).is_single_point());
        assert!(Geometry::from_shape(&Raw("multipolygon (((0 0, 1 0, 1 1, 0 0)))")).wkt().is_ok());
        for bad in ["", "CIRCLE(0 0 1)", "POLYGON ((0 0, 1 1)", "POINT"] {
            assert!(
                matches!(Geometry::from_shape(&Raw(bad)).wkt(), Err(NsrdbError::InvalidGeometry(_))),
                "{bad:?} should be rejected"
            );
        }
    }
}
