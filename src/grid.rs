//! Coordinate quantizer mapping geographic points onto a fixed raster.

use geo::Point;

use crate::config::GridConfig;
use crate::error::Result;

/// Marks a coordinate outside the bounding box or otherwise invalid.
///
/// Sentinel cells are never stored and never counted.
pub const SENTINEL_CELL: u32 = u32::MAX;

/// Maps a coordinate into a single integer grid cell id.
///
/// Cells are row-major (`y * width + x`) over a `width x height` raster
/// covering the configured bounding box, with the vertical axis inverted so
/// that higher latitudes map to smaller row indices. Cells are half-open in
/// raster space: valid longitudes are `[minx, maxx)` and, because of the row
/// inversion, valid latitudes are `(miny, maxy]`.
#[derive(Debug, Clone, Copy)]
pub struct Grid {
    minx: f64,
    miny: f64,
    maxx: f64,
    maxy: f64,
    width: u32,
    height: u32,
    dx: f64,
    dy: f64,
}

impl Grid {
    pub fn new(config: &GridConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            minx: config.minx,
            miny: config.miny,
            maxx: config.maxx,
            maxy: config.maxy,
            width: config.width,
            height: config.height,
            dx: config.maxx - config.minx,
            dy: config.maxy - config.miny,
        })
    }

    /// Quantize a coordinate. Out-of-range or non-finite coordinates yield
    /// [`SENTINEL_CELL`].
    pub fn cell(&self, p: &Point<f64>) -> u32 {
        let (lon, lat) = (p.x(), p.y());
        if !lon.is_finite() || !lat.is_finite() {
            return SENTINEL_CELL;
        }
        if lon < self.minx || lat <= self.miny || lon >= self.maxx || lat > self.maxy {
            return SENTINEL_CELL;
        }

        let x = ((lon - self.minx) / self.dx * f64::from(self.width)) as i64;
        let y = ((self.maxy - lat) / self.dy * f64::from(self.height)) as i64;

        // Clamp to absorb floating-point edge error at the boundary.
        let x = x.clamp(0, i64::from(self.width) - 1) as u32;
        let y = y.clamp(0, i64::from(self.height) - 1) as u32;

        y * self.width + x
    }

    /// Quantize an optional coordinate; `None` yields [`SENTINEL_CELL`].
    pub fn cell_opt(&self, p: Option<Point<f64>>) -> u32 {
        p.map_or(SENTINEL_CELL, |p| self.cell(&p))
    }

    /// Split a cell id back into (x, y) raster coordinates.
    pub fn cell_xy(&self, cell: u32) -> (u32, u32) {
        let y = cell / self.width;
        let x = cell - y * self.width;
        (x, y)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Total number of cells.
    pub fn size(&self) -> u32 {
        self.width * self.height
    }
}
