//! Minimal geometry support for spatial search parameters.
//!
//! Geometries arrive as WKT text or GeoJSON values and are reduced to what the search
//! API understands: a bounding box, or the coordinate string of a point, line or
//! polygon. Only the x/y part of each coordinate is kept.

use crate::error::{Error, Result};
use serde_json::Value;

/// A longitude/latitude pair
pub type Coord = (f64, f64);

/// Geometry parsed from WKT or GeoJSON
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    /// A single position
    Point(Coord),
    /// An open path
    LineString(Vec<Coord>),
    /// Exterior ring followed by any interior rings
    Polygon(Vec<Vec<Coord>>),
    /// Several positions
    MultiPoint(Vec<Coord>),
    /// Several paths
    MultiLineString(Vec<Vec<Coord>>),
    /// Several polygons
    MultiPolygon(Vec<Vec<Vec<Coord>>>),
    /// Heterogeneous collection
    GeometryCollection(Vec<Geometry>),
}

impl Geometry {
    /// Parse well-known text, e.g. `POLYGON ((5 30, 5 33, 2 33, 2 30, 5 30))`
    pub fn from_wkt(text: &str) -> Result<Self> {
        let mut parser = WktParser::new(text);
        let geometry = parser.geometry()?;
        parser.skip_whitespace();
        if !parser.at_end() {
            return Err(parser.error("trailing characters"));
        }
        Ok(geometry)
    }

    /// Convert a GeoJSON geometry or feature
    pub fn from_geojson(value: &Value) -> Result<Self> {
        let geometry = value.get("geometry").unwrap_or(value);
        let kind = geometry
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| geojson_error("missing \"type\""))?;

        if kind == "GeometryCollection" {
            let members = geometry
                .get("geometries")
                .and_then(Value::as_array)
                .ok_or_else(|| geojson_error("missing \"geometries\""))?;
            return members
                .iter()
                .map(Self::from_geojson)
                .collect::<Result<Vec<_>>>()
                .map(Geometry::GeometryCollection);
        }

        let coordinates = geometry
            .get("coordinates")
            .ok_or_else(|| geojson_error("missing \"coordinates\""))?;
        match kind {
            "Point" => Ok(Geometry::Point(position(coordinates)?)),
            "LineString" => Ok(Geometry::LineString(positions(coordinates)?)),
            "Polygon" => Ok(Geometry::Polygon(rings(coordinates)?)),
            "MultiPoint" => Ok(Geometry::MultiPoint(positions(coordinates)?)),
            "MultiLineString" => Ok(Geometry::MultiLineString(rings(coordinates)?)),
            "MultiPolygon" => array(coordinates)?
                .iter()
                .map(rings)
                .collect::<Result<Vec<_>>>()
                .map(Geometry::MultiPolygon),
            other => Err(geojson_error(&format!("unsupported geometry type {other}"))),
        }
    }

    fn coords(&self) -> Vec<Coord> {
        match self {
            Geometry::Point(c) => vec![*c],
            Geometry::LineString(cs) | Geometry::MultiPoint(cs) => cs.clone(),
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
                rings.iter().flatten().copied().collect()
            }
            Geometry::MultiPolygon(polygons) => {
                polygons.iter().flatten().flatten().copied().collect()
            }
            Geometry::GeometryCollection(members) => {
                members.iter().flat_map(Geometry::coords).collect()
            }
        }
    }

    /// `[xmin, ymin, xmax, ymax]`, or None for an empty geometry
    pub fn bounds(&self) -> Option<[f64; 4]> {
        let coords = self.coords();
        let (first, rest) = coords.split_first()?;
        let init = [first.0, first.1, first.0, first.1];
        Some(rest.iter().fold(init, |b, &(x, y)| {
            [b[0].min(x), b[1].min(y), b[2].max(x), b[3].max(y)]
        }))
    }

    /// Smallest convex geometry containing every coordinate
    ///
    /// The hull polygon starts at the lowest-left point and runs counter-clockwise;
    /// degenerate inputs give a point or a line.
    pub fn convex_hull(&self) -> Geometry {
        let mut points = self.coords();
        points.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
        points.dedup();

        match points.len() {
            0 => return Geometry::GeometryCollection(Vec::new()),
            1 => return Geometry::Point(points[0]),
            _ => {}
        }

        let mut lower: Vec<Coord> = Vec::new();
        for &p in &points {
            while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
                lower.pop();
            }
            lower.push(p);
        }
        let mut upper: Vec<Coord> = Vec::new();
        for &p in points.iter().rev() {
            while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
                upper.pop();
            }
            upper.push(p);
        }
        lower.pop();
        upper.pop();
        let mut hull = lower;
        hull.extend(upper);

        if hull.len() < 3 {
            return Geometry::LineString(vec![points[0], points[points.len() - 1]]);
        }
        hull.push(hull[0]);
        Geometry::Polygon(vec![hull])
    }

    /// Search parameter name and coordinate string for a spatial intersection query
    pub(crate) fn spatial_parameter(&self) -> Result<(&'static str, String)> {
        match self {
            Geometry::MultiPolygon(_) | Geometry::GeometryCollection(_) => {
                let hull = self.convex_hull();
                if matches!(hull, Geometry::GeometryCollection(_)) {
                    return Err(Error::InvalidQuery("empty geometry".to_string()));
                }
                hull.spatial_parameter()
            }
            Geometry::Point(c) => Ok(("point", coordinate_string(std::slice::from_ref(c)))),
            Geometry::LineString(cs) => Ok(("line", coordinate_string(cs))),
            Geometry::Polygon(rings) => {
                let exterior = rings
                    .first()
                    .ok_or_else(|| Error::InvalidQuery("polygon without rings".to_string()))?;
                Ok(("polygon", coordinate_string(&counter_clockwise(exterior))))
            }
            Geometry::MultiPoint(_) | Geometry::MultiLineString(_) => Err(Error::InvalidQuery(
                "spatial queries support points, lines and polygons".to_string(),
            )),
        }
    }
}

fn cross(o: Coord, a: Coord, b: Coord) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// Twice the signed area (positive when counter-clockwise)
fn signed_area(ring: &[Coord]) -> f64 {
    ring.windows(2)
        .map(|w| w[0].0 * w[1].1 - w[1].0 * w[0].1)
        .sum()
}

fn counter_clockwise(ring: &[Coord]) -> Vec<Coord> {
    let mut ring = ring.to_vec();
    if signed_area(&ring) < 0.0 {
        ring.reverse();
    }
    ring
}

fn coordinate_string(coords: &[Coord]) -> String {
    coords
        .iter()
        .map(|(x, y)| format!("{x:.4},{y:.4}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn geojson_error(message: &str) -> Error {
    Error::InvalidQuery(format!("invalid GeoJSON: {message}"))
}

fn array(value: &Value) -> Result<&Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| geojson_error("coordinates must be arrays"))
}

fn position(value: &Value) -> Result<Coord> {
    let items = array(value)?;
    match (items.first().and_then(Value::as_f64), items.get(1).and_then(Value::as_f64)) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(geojson_error("positions need two numbers")),
    }
}

fn positions(value: &Value) -> Result<Vec<Coord>> {
    array(value)?.iter().map(position).collect()
}

fn rings(value: &Value) -> Result<Vec<Vec<Coord>>> {
    array(value)?.iter().map(positions).collect()
}

struct WktParser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> WktParser<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn error(&self, message: &str) -> Error {
        Error::InvalidQuery(format!("invalid WKT at offset {}: {}", self.pos, message))
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.rest().chars().next()
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(self.error(&format!("expected '{c}'")))
        }
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn word(&mut self) -> String {
        self.skip_whitespace();
        let len = self
            .rest()
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(self.rest().len());
        let word = self.rest()[..len].to_ascii_uppercase();
        self.pos += len;
        word
    }

    fn number(&mut self) -> Result<f64> {
        self.skip_whitespace();
        let len = self
            .rest()
            .find(|c: char| !(c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E')))
            .unwrap_or(self.rest().len());
        let value = self.rest()[..len]
            .parse::<f64>()
            .map_err(|_| self.error("expected a number"))?;
        self.pos += len;
        Ok(value)
    }

    /// One position; extra ordinates (Z, M) are read and dropped
    fn coord(&mut self) -> Result<Coord> {
        let x = self.number()?;
        let y = self.number()?;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.') {
            self.number()?;
        }
        Ok((x, y))
    }

    fn coord_list(&mut self) -> Result<Vec<Coord>> {
        self.expect('(')?;
        let mut coords = vec![self.coord()?];
        while self.eat(',') {
            coords.push(self.coord()?);
        }
        self.expect(')')?;
        Ok(coords)
    }

    fn ring_list(&mut self) -> Result<Vec<Vec<Coord>>> {
        self.expect('(')?;
        let mut rings = vec![self.coord_list()?];
        while self.eat(',') {
            rings.push(self.coord_list()?);
        }
        self.expect(')')?;
        Ok(rings)
    }

    /// MULTIPOINT accepts both `((1 2), (3 4))` and `(1 2, 3 4)`
    fn multi_point(&mut self) -> Result<Vec<Coord>> {
        self.expect('(')?;
        let mut coords = Vec::new();
        loop {
            if self.eat('(') {
                coords.push(self.coord()?);
                self.expect(')')?;
            } else {
                coords.push(self.coord()?);
            }
            if !self.eat(',') {
                break;
            }
        }
        self.expect(')')?;
        Ok(coords)
    }

    fn geometry(&mut self) -> Result<Geometry> {
        let kind = self.word();
        let mut modifier = self.word();
        if matches!(modifier.as_str(), "Z" | "M" | "ZM") {
            modifier = self.word();
        }
        if modifier == "EMPTY" {
            return Err(self.error("empty geometries cannot be queried"));
        }
        if !modifier.is_empty() {
            return Err(self.error(&format!("unexpected keyword {modifier}")));
        }

        match kind.as_str() {
            "POINT" => {
                self.expect('(')?;
                let c = self.coord()?;
                self.expect(')')?;
                Ok(Geometry::Point(c))
            }
            "LINESTRING" | "LINEARRING" => Ok(Geometry::LineString(self.coord_list()?)),
            "POLYGON" => Ok(Geometry::Polygon(self.ring_list()?)),
            "MULTIPOINT" => Ok(Geometry::MultiPoint(self.multi_point()?)),
            "MULTILINESTRING" => Ok(Geometry::MultiLineString(self.ring_list()?)),
            "MULTIPOLYGON" => {
                self.expect('(')?;
                let mut polygons = vec![self.ring_list()?];
                while self.eat(',') {
                    polygons.push(self.ring_list()?);
                }
                self.expect(')')?;
                Ok(Geometry::MultiPolygon(polygons))
            }
            "GEOMETRYCOLLECTION" => {
                self.expect('(')?;
                let mut members = vec![self.geometry()?];
                while self.eat(',') {
                    members.push(self.geometry()?);
                }
                self.expect(')')?;
                Ok(Geometry::GeometryCollection(members))
            }
            "" => Err(self.error("expected a geometry type")),
            other => Err(self.error(&format!("unsupported geometry type {other}"))),
        }
    }
}
