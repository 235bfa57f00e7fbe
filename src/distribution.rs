//! Compact per-key geographic occupancy maps.
//!
//! Most tag keys ever touch a single grid cell, so a distribution starts out
//! storing that one cell inline and only allocates a bitmap once a second
//! distinct cell shows up. A shared [`GridUnion`] collects every cell set by
//! any distribution, tracking the overall geographic coverage of the dataset.

use bytes::Bytes;
use roaring::RoaringBitmap;

use crate::grid::{Grid, SENTINEL_CELL};

/// Foreground color for rendered distribution pixels (RGBA).
const FOREGROUND: [u8; 4] = [180, 0, 0, 255];

/// Union of every cell set by any [`GeoDistribution`].
///
/// Replaces hidden process-wide state with an explicitly constructed object
/// passed by reference, so parallel test instances never interfere.
#[derive(Debug, Default)]
pub struct GridUnion {
    cells: RoaringBitmap,
}

impl GridUnion {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, cell: u32) {
        self.cells.insert(cell);
    }

    pub fn contains(&self, cell: u32) -> bool {
        self.cells.contains(cell)
    }

    /// Total number of distinct cells set by any distribution. Intended to
    /// run once at finalize time.
    pub fn count_all_set_cells(&self) -> u64 {
        self.cells.len()
    }
}

/// Set of grid cells a single aggregate key has ever appeared in.
///
/// The representation is lazily upgraded and never reverts: empty, one
/// inline cell, then a full bitmap with the inline cell folded in.
#[derive(Debug, Clone, Default)]
pub enum GeoDistribution {
    #[default]
    Empty,
    Cell(u32),
    Bitmap(RoaringBitmap),
}

impl GeoDistribution {
    pub fn new() -> Self {
        Self::Empty
    }

    /// Add a quantized cell. Sentinel cells are ignored; repeated cells are
    /// no-ops. Every newly set cell is also marked in the global union.
    pub fn add_cell(&mut self, cell: u32, union: &mut GridUnion) {
        if cell == SENTINEL_CELL {
            return;
        }
        match self {
            GeoDistribution::Empty => {
                union.insert(cell);
                *self = GeoDistribution::Cell(cell);
            }
            GeoDistribution::Cell(existing) if *existing == cell => {}
            GeoDistribution::Cell(existing) => {
                let mut bitmap = RoaringBitmap::new();
                bitmap.insert(*existing);
                bitmap.insert(cell);
                union.insert(cell);
                *self = GeoDistribution::Bitmap(bitmap);
            }
            GeoDistribution::Bitmap(bitmap) => {
                if bitmap.insert(cell) {
                    union.insert(cell);
                }
            }
        }
    }

    /// Number of distinct cells set.
    pub fn cells(&self) -> u64 {
        match self {
            GeoDistribution::Empty => 0,
            GeoDistribution::Cell(_) => 1,
            GeoDistribution::Bitmap(bitmap) => bitmap.len(),
        }
    }

    /// Reset to the empty state, releasing the bitmap.
    pub fn clear(&mut self) {
        *self = GeoDistribution::Empty;
    }

    /// Render one pixel per grid cell: transparent background, a single
    /// foreground color for every set cell. The inline and bitmap forms are
    /// observationally equivalent here.
    pub fn render(&self, grid: &Grid) -> Image {
        let mut image = Image::new(grid.width(), grid.height());
        match self {
            GeoDistribution::Empty => {}
            GeoDistribution::Cell(cell) => {
                let (x, y) = grid.cell_xy(*cell);
                image.set_pixel(x, y);
            }
            GeoDistribution::Bitmap(bitmap) => {
                // Cell ids ascend in row-major order.
                for cell in bitmap.iter() {
                    let (x, y) = grid.cell_xy(cell);
                    image.set_pixel(x, y);
                }
            }
        }
        image
    }
}

/// Fixed-size RGBA raster, one pixel per grid cell.
///
/// Encoding to PNG or another container format is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Image {
    /// Create an all-transparent image.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn set_pixel(&mut self, x: u32, y: u32) {
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        self.data[offset..offset + 4].copy_from_slice(&FOREGROUND);
    }

    /// Whether the pixel at (x, y) carries the foreground color.
    pub fn is_set(&self, x: u32, y: u32) -> bool {
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        self.data[offset..offset + 4] == FOREGROUND
    }

    /// Number of foreground pixels.
    pub fn count_set(&self) -> usize {
        self.data.chunks_exact(4).filter(|px| *px == FOREGROUND).count()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA bytes, row-major.
    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.data)
    }
}
