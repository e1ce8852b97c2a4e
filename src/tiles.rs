//! Tile geometry.
//!
//! v1 tiles are addressed by `(x, y, zoom)` on a Web Mercator grid whose
//! origin is the south-west corner of the world. v2 stores each task as a
//! WGS84 multipolygon, so tile squares are built in EPSG:3857 and
//! reprojected with the spherical inverse Mercator.

use crate::error::{Error, Result};

/// Half the width of the Web Mercator world, in metres.
pub const MERCATOR_EXTENT: f64 = 20037508.342789244;

const EARTH_RADIUS: f64 = 6378137.0;

/// Axis-aligned square in EPSG:3857.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MercatorSquare {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl MercatorSquare {
    /// Square covered by tile `(x, y)` at `zoom`.
    pub fn for_tile(x: i64, y: i64, zoom: i64) -> Result<Self> {
        if !(1..=30).contains(&zoom) {
            return Err(Error::InvalidTile { x, y, zoom });
        }
        let step = MERCATOR_EXTENT / 2f64.powi((zoom - 1) as i32);
        let (x, y) = (x as f64, y as f64);
        Ok(Self {
            xmin: x * step - MERCATOR_EXTENT,
            ymin: y * step - MERCATOR_EXTENT,
            xmax: (x + 1.0) * step - MERCATOR_EXTENT,
            ymax: (y + 1.0) * step - MERCATOR_EXTENT,
        })
    }

    /// Closed counter-clockwise ring starting at the south-west corner.
    fn ring(&self) -> [(f64, f64); 5] {
        [
            (self.xmin, self.ymin),
            (self.xmax, self.ymin),
            (self.xmax, self.ymax),
            (self.xmin, self.ymax),
            (self.xmin, self.ymin),
        ]
    }

    pub fn to_wgs84(&self) -> TilePolygon {
        TilePolygon {
            ring: self.ring().map(|(x, y)| mercator_to_wgs84(x, y)),
        }
    }
}

/// Inverse spherical Mercator: metres to `(lon, lat)` degrees.
pub fn mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (y / EARTH_RADIUS).sinh().atan().to_degrees();
    (lon, lat)
}

/// A tile outline in EPSG:4326.
#[derive(Debug, Clone, PartialEq)]
pub struct TilePolygon {
    ring: [(f64, f64); 5],
}

impl TilePolygon {
    pub fn for_tile(x: i64, y: i64, zoom: i64) -> Result<Self> {
        Ok(MercatorSquare::for_tile(x, y, zoom)?.to_wgs84())
    }

    pub fn ring(&self) -> &[(f64, f64)] {
        &self.ring
    }

    /// Planar area in square degrees, the unit PostGIS `ST_Area` reports
    /// for SRID 4326 geometries.
    pub fn area(&self) -> f64 {
        let twice: f64 = self
            .ring
            .windows(2)
            .map(|pair| pair[0].0 * pair[1].1 - pair[1].0 * pair[0].1)
            .sum();
        twice.abs() / 2.0
    }

    pub fn to_wkt(&self) -> String {
        let points: Vec<String> = self
            .ring
            .iter()
            .map(|(lon, lat)| format!("{lon} {lat}"))
            .collect();
        format!("MULTIPOLYGON((({})))", points.join(", "))
    }
}
