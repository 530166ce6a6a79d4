//! Typed search parameters: date ranges, spatial filters and collection lookups.

use super::geometry::Geometry;
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

const TEMPORAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// DOI prefix of MODIS products
pub const MODIS_DOI_PREFIX: &str = "10.5067/MODIS";

/// Parse a date or date-time
///
/// Accepts RFC 3339 (`2020-01-01T00:00:00Z`), a bare date (`2020-01-01`, midnight UTC)
/// and naive date-times with `T` or a space as separator (taken as UTC).
pub fn parse_datetime(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| Error::InvalidQuery(format!("could not convert {text:?} to a date")))
}

fn magnitude(delta: Duration) -> Duration {
    if delta < Duration::zero() { -delta } else { delta }
}

fn shift(at: DateTime<Utc>, delta: Duration) -> Result<DateTime<Utc>> {
    at.checked_add_signed(delta)
        .ok_or_else(|| Error::InvalidQuery("date range out of bounds".to_string()))
}

/// Acquisition time window, open on at most one side
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Build a range from any two of start, end and length
    ///
    /// With all three given they must agree (`start + |delta| == end`). The sign of
    /// `delta` is ignored.
    pub fn new(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        time_delta: Option<Duration>,
    ) -> Result<Self> {
        let delta = time_delta.map(magnitude);
        match (start, end, delta) {
            (None, None, _) => Err(Error::InvalidQuery(
                "one end of the date range is needed".to_string(),
            )),
            (Some(s), Some(e), Some(d)) => {
                if shift(s, d)? != e {
                    return Err(Error::InvalidQuery(
                        "start, end and time delta must add up (start + delta = end)".to_string(),
                    ));
                }
                Ok(Self { start, end })
            }
            (Some(s), None, Some(d)) => Ok(Self {
                start,
                end: Some(shift(s, d)?),
            }),
            (None, Some(e), Some(d)) => Ok(Self {
                start: Some(shift(e, -d)?),
                end,
            }),
            (start, end, None) => Ok(Self { start, end }),
        }
    }

    /// Closed range between two instants
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Parse textual dates, see [`parse_datetime`]
    pub fn parse(start: Option<&str>, end: Option<&str>, time_delta: Option<Duration>) -> Result<Self> {
        let start = start.map(parse_datetime).transpose()?;
        let end = end.map(parse_datetime).transpose()?;
        Self::new(start, end, time_delta)
    }

    /// Start of the range
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    /// End of the range
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    /// Length of the range, None when open ended
    pub fn time_delta(&self) -> Option<Duration> {
        Some(self.end? - self.start?)
    }

    /// Value of the `temporal` parameter: `start,end`, `start/` or `/end`
    pub fn temporal(&self) -> String {
        let fmt = |d: Option<DateTime<Utc>>| d.map(|d| d.format(TEMPORAL_FORMAT).to_string());
        match (fmt(self.start), fmt(self.end)) {
            (Some(s), Some(e)) => format!("{s},{e}"),
            (Some(s), None) => format!("{s}/"),
            (None, Some(e)) => format!("/{e}"),
            (None, None) => String::new(),
        }
    }

    /// `("temporal", ...)` query pair
    pub fn to_param(&self) -> (String, String) {
        ("temporal".to_string(), self.temporal())
    }
}

/// Spatial input in one of the accepted representations
#[derive(Clone, Debug, PartialEq)]
pub enum SpatialInput {
    /// `[xmin, ymin, xmax, ymax]`
    BoundingBox([f64; 4]),
    /// Well-known text
    WellKnownText(String),
    /// GeoJSON geometry or feature
    GeoJson(Value),
}

impl From<[f64; 4]> for SpatialInput {
    fn from(b: [f64; 4]) -> Self {
        SpatialInput::BoundingBox(b)
    }
}

impl From<(f64, f64, f64, f64)> for SpatialInput {
    fn from(b: (f64, f64, f64, f64)) -> Self {
        SpatialInput::BoundingBox([b.0, b.1, b.2, b.3])
    }
}

impl From<&str> for SpatialInput {
    fn from(wkt: &str) -> Self {
        SpatialInput::WellKnownText(wkt.to_string())
    }
}

impl From<String> for SpatialInput {
    fn from(wkt: String) -> Self {
        SpatialInput::WellKnownText(wkt)
    }
}

impl From<Value> for SpatialInput {
    fn from(geojson: Value) -> Self {
        SpatialInput::GeoJson(geojson)
    }
}

impl SpatialInput {
    fn geometry(&self) -> Result<Option<Geometry>> {
        match self {
            SpatialInput::BoundingBox(_) => Ok(None),
            SpatialInput::WellKnownText(wkt) => Geometry::from_wkt(wkt).map(Some),
            SpatialInput::GeoJson(value) => Geometry::from_geojson(value).map(Some),
        }
    }
}

/// Render a coordinate the way the search API examples do (`55.0`, `2.1448863675`)
fn format_coordinate(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// A spatial restriction rendered as a single query pair
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpatialFilter {
    parameter: &'static str,
    coordinates: String,
}

impl SpatialFilter {
    /// Restrict results to a bounding box
    ///
    /// Geometries are reduced to their bounds. A raw box is rejected only when it is
    /// inverted on both axes, so boxes crossing the antimeridian remain possible.
    pub fn bounding_box(input: impl Into<SpatialInput>) -> Result<Self> {
        let input = input.into();
        let bounds = match &input {
            SpatialInput::BoundingBox(b) => {
                if b.iter().any(|c| !c.is_finite()) {
                    return Err(Error::InvalidQuery("bounding box coordinates must be finite".to_string()));
                }
                if b[0] > b[2] && b[1] > b[3] {
                    return Err(Error::InvalidQuery(
                        "bounding box should be (xmin, ymin, xmax, ymax)".to_string(),
                    ));
                }
                *b
            }
            other => other
                .geometry()?
                .and_then(|g| g.bounds())
                .ok_or_else(|| Error::InvalidQuery("geometry has no coordinates".to_string()))?,
        };
        Ok(Self {
            parameter: "bounding_box",
            coordinates: bounds
                .iter()
                .map(|c| format_coordinate(*c))
                .collect::<Vec<_>>()
                .join(","),
        })
    }

    /// Restrict results to granules intersecting a point, line or polygon
    ///
    /// Multipolygons and geometry collections are replaced by their convex hull.
    /// Polygons use their exterior ring, counter-clockwise, at four decimals.
    pub fn spatial(input: impl Into<SpatialInput>) -> Result<Self> {
        let input = input.into();
        let geometry = input.geometry()?.ok_or_else(|| {
            Error::InvalidQuery(
                "spatial queries need WKT or GeoJSON; use a bounding box filter for raw boxes"
                    .to_string(),
            )
        })?;
        let (parameter, coordinates) = geometry.spatial_parameter()?;
        Ok(Self {
            parameter,
            coordinates,
        })
    }

    /// Query parameter name (`bounding_box`, `polygon`, `point` or `line`)
    pub fn parameter_name(&self) -> &'static str {
        self.parameter
    }

    /// Comma separated coordinate string
    pub fn coordinates(&self) -> &str {
        &self.coordinates
    }

    /// Query pair
    pub fn to_param(&self) -> (String, String) {
        (self.parameter.to_string(), self.coordinates.clone())
    }
}

/// Parameters for a collection search
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectionQuery {
    params: Vec<(String, String)>,
}

impl CollectionQuery {
    /// Empty query
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an arbitrary parameter, replacing an earlier one with the same key
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        super::set_param(&mut self.params, key.into(), value.into());
        self
    }

    /// Filter by short name (e.g. "MOD13A1")
    pub fn short_name(self, short_name: impl Into<String>) -> Self {
        self.param("short_name", short_name)
    }

    /// Filter by version (e.g. "061")
    pub fn version(self, version: impl Into<String>) -> Self {
        self.param("version", version)
    }

    /// Look a MODIS product up by DOI: `10.5067/MODIS/<short_name>.<version>`
    pub fn modis_doi(self, short_name: &str, version: &str) -> Self {
        self.param("doi", format!("{MODIS_DOI_PREFIX}/{short_name}.{version}"))
    }

    /// Parameters in insertion order
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

/// Parameters for a granule search
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GranuleQuery {
    dates: Option<DateRange>,
    spatial: Option<SpatialFilter>,
    limit: Option<usize>,
    params: Vec<(String, String)>,
}

impl GranuleQuery {
    /// Empty query
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a time window
    pub fn dates(mut self, dates: DateRange) -> Self {
        self.dates = Some(dates);
        self
    }

    /// Restrict to a spatial filter
    pub fn spatial(mut self, filter: SpatialFilter) -> Self {
        self.spatial = Some(filter);
        self
    }

    /// Stop after this many granules (0 = no limit)
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = (limit > 0).then_some(limit);
        self
    }

    /// Add an arbitrary parameter (e.g. "day_night_flag"), replacing an earlier one
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        super::set_param(&mut self.params, key.into(), value.into());
        self
    }

    /// Maximum number of granules to yield
    pub fn max_results(&self) -> Option<usize> {
        self.limit
    }

    /// Extra parameters followed by the temporal and spatial pairs
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = self.params.clone();
        for (key, value) in self
            .dates
            .iter()
            .map(DateRange::to_param)
            .chain(self.spatial.iter().map(SpatialFilter::to_param))
        {
            super::set_param(&mut params, key, value);
        }
        params
    }
}
