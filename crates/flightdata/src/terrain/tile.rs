//! One SRTM elevation tile.

use std::path::Path;

use crate::error::{Error, Result};

/// Samples per tile edge.
pub const TILE_SIZE: usize = 1201;

/// Degrees between neighbouring samples.
pub const GRID_SIZE: f64 = 1.0 / (TILE_SIZE as f64 - 1.0);

const METERS_TO_FEET: f64 = 3.280_839_9;

/// Elevation raster for a 1°×1° cell.
///
/// The file is named for its south-west corner but stores rows starting at
/// the north edge, 1201×1201 big-endian `u16` metres.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    latitude_s: i32,
    longitude_w: i32,
    altitudes_ft: Vec<f64>,
}

impl Tile {
    /// Decode a tile from raw `.hgt` bytes.
    ///
    /// # Errors
    ///
    /// Returns a terrain unavailable error if the byte count is wrong.
    pub fn from_bytes(latitude_s: i32, longitude_w: i32, bytes: &[u8]) -> Result<Self> {
        let expected = TILE_SIZE * TILE_SIZE * 2;
        if bytes.len() != expected {
            return Err(Error::terrain_unavailable(
                f64::from(latitude_s),
                f64::from(longitude_w),
                format!("tile has {} bytes, expected {expected}", bytes.len()),
            ));
        }

        let altitudes_ft = bytes
            .chunks_exact(2)
            .map(|pair| f64::from(u16::from_be_bytes([pair[0], pair[1]])) * METERS_TO_FEET)
            .collect();

        Ok(Self {
            latitude_s,
            longitude_w,
            altitudes_ft,
        })
    }

    /// Read a tile from disk.
    ///
    /// # Errors
    ///
    /// Returns a terrain unavailable error if the file is missing or corrupt.
    pub fn load(latitude_s: i32, longitude_w: i32, path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            Error::terrain_unavailable(
                f64::from(latitude_s),
                f64::from(longitude_w),
                format!("cannot read {}: {e}", path.display()),
            )
        })?;
        Self::from_bytes(latitude_s, longitude_w, &bytes)
    }

    /// South-west corner `(latitude, longitude)`.
    #[must_use]
    pub fn corner(&self) -> (i32, i32) {
        (self.latitude_s, self.longitude_w)
    }

    fn at(&self, row: usize, col: usize) -> f64 {
        let row = row.min(TILE_SIZE - 1);
        let col = col.min(TILE_SIZE - 1);
        self.altitudes_ft[row * TILE_SIZE + col]
    }

    /// Bilinearly interpolated ground elevation in feet.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn altitude_ft(&self, latitude: f64, longitude: f64) -> f64 {
        let lat_diff = (latitude.ceil() - latitude).clamp(0.0, 1.0);
        let lon_diff = (longitude - longitude.floor()).clamp(0.0, 1.0);

        let row0 = (lat_diff / GRID_SIZE) as usize;
        let col0 = (lon_diff / GRID_SIZE) as usize;

        let y = (lat_diff - row0 as f64 * GRID_SIZE) / GRID_SIZE;
        let x = (lon_diff - col0 as f64 * GRID_SIZE) / GRID_SIZE;

        self.at(row0, col0) * (1.0 - x) * (1.0 - y)
            + self.at(row0, col0 + 1) * x * (1.0 - y)
            + self.at(row0 + 1, col0) * (1.0 - x) * y
            + self.at(row0 + 1, col0 + 1) * x * y
    }
}

#[cfg(test)]
pub(crate) fn flat_tile_bytes(meters: u16) -> Vec<u8> {
    let [hi, lo] = meters.to_be_bytes();
    std::iter::repeat([hi, lo])
        .take(TILE_SIZE * TILE_SIZE)
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_tile_elevation() {
        let tile = Tile::from_bytes(44, -93, &flat_tile_bytes(100)).expect("valid tile");
        let ft = tile.altitude_ft(44.5, -92.5);
        assert!((ft - 328.083_99).abs() < 1e-6);
        assert_eq!(tile.corner(), (44, -93));
    }

    #[test]
    fn test_edges_do_not_overflow() {
        let tile = Tile::from_bytes(44, -93, &flat_tile_bytes(10)).expect("valid tile");
        // North-west corner and the south-east limit.
        assert!(tile.altitude_ft(45.0, -93.0) > 0.0);
        assert!(tile.altitude_ft(44.000_001, -92.000_001) > 0.0);
    }

    #[test]
    fn test_interpolates_between_rows() {
        let mut bytes = flat_tile_bytes(0);
        // Row 1 (one grid step south of the north edge) at 100 m.
        for col in 0..TILE_SIZE {
            let offset = (TILE_SIZE + col) * 2;
            bytes[offset..offset + 2].copy_from_slice(&100u16.to_be_bytes());
        }
        let tile = Tile::from_bytes(44, -93, &bytes).expect("valid tile");
        let halfway = 45.0 - GRID_SIZE / 2.0;
        let ft = tile.altitude_ft(halfway, -92.5);
        assert!((ft - 164.041_995).abs() < 1e-3);
    }

    #[test]
    fn test_wrong_size_is_unavailable() {
        let err = Tile::from_bytes(0, 0, &[0u8; 10]).expect_err("short");
        assert!(matches!(err, Error::TerrainUnavailable { .. }));
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let err = Tile::load(0, 0, Path::new("/nonexistent/N00E000.hgt")).expect_err("missing");
        assert!(err.is_recoverable());
    }
}
