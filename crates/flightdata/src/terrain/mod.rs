//! Terrain elevation lookup.
//!
//! Ground elevation comes from SRTM tiles on disk, one file per 1°×1° cell.
//! Tiles are sharded into directories of 4 latitude bands by 6 longitude
//! bands. Directories are lettered from the equator outward (`S` prefix in
//! the southern hemisphere) and numbered from the antimeridian eastward.
//!
//! [`TerrainCache`] loads tiles on first use and keeps at most a configured
//! number of them; it is shared by every worker.

pub mod tile;

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::error::{Error, Result};

pub use tile::Tile;

/// Default number of tiles kept in memory.
pub const DEFAULT_MAX_TILES: usize = 10;

/// Directory holding the tile whose south-west corner is `(latitude, longitude)`.
///
/// `(44, -93)` is `L15`; `(-12, 130)` is `SD52`.
#[must_use]
pub fn directory_from_lat_lon(latitude: i32, longitude: i32) -> String {
    let mut directory = String::new();
    if latitude < 0 {
        directory.push('S');
    }
    let band = u8::try_from(latitude.abs() / 4).unwrap_or(0);
    let column = (longitude + 180) / 6 + 1;
    directory.push(char::from(b'A' + band));
    directory.push_str(&column.to_string());
    directory
}

/// File name of the tile whose south-west corner is `(latitude, longitude)`.
///
/// `(44, -93)` is `N44W093.hgt`.
#[must_use]
pub fn filename_from_lat_lon(latitude: i32, longitude: i32) -> String {
    let ns = if latitude < 0 { 'S' } else { 'N' };
    let ew = if longitude < 0 { 'W' } else { 'E' };
    format!(
        "{ns}{}{ew}{:03}.hgt",
        latitude.unsigned_abs(),
        longitude.unsigned_abs()
    )
}

/// Grid index of the tile containing `(latitude, longitude)`.
///
/// Row 0 is the northernmost band.
///
/// # Errors
///
/// Returns a terrain unavailable error outside `[-90, 90]` × `[-180, 180]`.
#[allow(clippy::cast_possible_truncation)]
pub fn tile_index(latitude: f64, longitude: f64) -> Result<(usize, usize)> {
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(Error::terrain_unavailable(
            latitude,
            longitude,
            "latitude must be within [-90, 90] and longitude within [-180, 180]",
        ));
    }

    let lat_index = 90 - latitude.ceil() as i32;
    let lon_index = longitude.floor() as i32 + 180;

    match (usize::try_from(lat_index), usize::try_from(lon_index)) {
        (Ok(lat), Ok(lon)) if lat < 180 && lon < 360 => Ok((lat, lon)),
        _ => Err(Error::terrain_unavailable(
            latitude,
            longitude,
            format!("tile [{lat_index}][{lon_index}] does not exist"),
        )),
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Loaded(Arc<Tile>),
    Missing(String),
}

#[derive(Debug, Default)]
struct Tiles {
    slots: HashMap<(usize, usize), Slot>,
    order: VecDeque<(usize, usize)>,
}

/// Bounded, thread-safe cache of terrain tiles.
#[derive(Debug)]
pub struct TerrainCache {
    directory: PathBuf,
    max_tiles: usize,
    tiles: Mutex<Tiles>,
}

impl TerrainCache {
    /// Create a cache over the tile tree rooted at `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>, max_tiles: usize) -> Self {
        Self {
            directory: directory.into(),
            max_tiles: max_tiles.max(1),
            tiles: Mutex::new(Tiles::default()),
        }
    }

    /// Root of the tile tree.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Number of tiles (or known-missing tiles) currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .slots
            .len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path of the tile file with the given south-west corner.
    #[must_use]
    pub fn tile_path(&self, latitude_s: i32, longitude_w: i32) -> PathBuf {
        self.directory
            .join(directory_from_lat_lon(latitude_s, longitude_w))
            .join(filename_from_lat_lon(latitude_s, longitude_w))
    }

    fn tile(&self, latitude: f64, longitude: f64) -> Result<Arc<Tile>> {
        let key = tile_index(latitude, longitude)?;
        let mut tiles = self.tiles.lock().unwrap_or_else(PoisonError::into_inner);

        let slot = if let Some(slot) = tiles.slots.get(&key) {
            slot.clone()
        } else {
            #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
            let (latitude_s, longitude_w) = (89 - key.0 as i32, key.1 as i32 - 180);
            let path = self.tile_path(latitude_s, longitude_w);
            debug!(path = %path.display(), "loading terrain tile");
            let slot = match Tile::load(latitude_s, longitude_w, &path) {
                Ok(tile) => Slot::Loaded(Arc::new(tile)),
                Err(e) => {
                    warn!(path = %path.display(), "terrain tile unavailable");
                    Slot::Missing(e.to_string())
                }
            };

            if tiles.order.len() >= self.max_tiles {
                if let Some(evicted) = tiles.order.pop_front() {
                    tiles.slots.remove(&evicted);
                }
            }
            tiles.order.push_back(key);
            tiles.slots.insert(key, slot.clone());
            slot
        };

        match slot {
            Slot::Loaded(tile) => Ok(tile),
            Slot::Missing(reason) => Err(Error::terrain_unavailable(latitude, longitude, reason)),
        }
    }

    /// Ground elevation in feet at `(latitude, longitude)`.
    ///
    /// # Errors
    ///
    /// Returns a terrain unavailable error for out-of-range coordinates or a
    /// missing tile.
    pub fn ground_elevation_ft(&self, latitude: f64, longitude: f64) -> Result<f64> {
        Ok(self.tile(latitude, longitude)?.altitude_ft(latitude, longitude))
    }

    /// Height above ground in whole feet, never negative.
    ///
    /// # Errors
    ///
    /// Returns a terrain unavailable error for out-of-range coordinates or a
    /// missing tile.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn elevation_above_ground(&self, msl_ft: f64, latitude: f64, longitude: f64) -> Result<u32> {
        let ground = self.ground_elevation_ft(latitude, longitude)?;
        Ok((msl_ft - ground).max(0.0) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::tile::flat_tile_bytes;

    fn cache_with_tile(dir: &Path, lat_s: i32, lon_w: i32, meters: u16, max: usize) -> TerrainCache {
        let cache = TerrainCache::new(dir, max);
        let path = cache.tile_path(lat_s, lon_w);
        std::fs::create_dir_all(path.parent().expect("tile dir")).expect("mkdir");
        std::fs::write(&path, flat_tile_bytes(meters)).expect("write tile");
        cache
    }

    #[test]
    fn test_directory_from_lat_lon() {
        assert_eq!(directory_from_lat_lon(44, -93), "L15");
        assert_eq!(directory_from_lat_lon(44, -93), directory_from_lat_lon(44, -93));
        assert_eq!(directory_from_lat_lon(0, 0), "A31");
        assert_eq!(directory_from_lat_lon(-12, 130), "SD52");
    }

    #[test]
    fn test_filename_from_lat_lon() {
        assert_eq!(filename_from_lat_lon(44, -93), "N44W093.hgt");
        assert_eq!(filename_from_lat_lon(44, -93), filename_from_lat_lon(44, -93));
        assert_eq!(filename_from_lat_lon(-5, 7), "S5E007.hgt");
        assert_eq!(filename_from_lat_lon(0, 120), "N0E120.hgt");
    }

    #[test]
    fn test_tile_index() {
        assert_eq!(tile_index(44.5, -92.5).expect("valid"), (45, 87));
        assert_eq!(tile_index(90.0, 179.5).expect("valid"), (0, 359));
        assert!(tile_index(91.0, 0.0).is_err());
        assert!(tile_index(0.0, -181.0).is_err());
        assert!(tile_index(0.0, 180.0).is_err());
    }

    #[test]
    fn test_out_of_range_is_unavailable() {
        let cache = TerrainCache::new("/nonexistent", DEFAULT_MAX_TILES);
        let err = cache.elevation_above_ground(1000.0, 91.0, -93.0).expect_err("lat");
        assert!(matches!(err, Error::TerrainUnavailable { .. }));
        let err = cache.elevation_above_ground(1000.0, 45.0, -181.0).expect_err("lon");
        assert!(matches!(err, Error::TerrainUnavailable { .. }));
    }

    #[test]
    fn test_lookup_with_coverage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = cache_with_tile(dir.path(), 44, -93, 100, DEFAULT_MAX_TILES);
        // 100 m of terrain is ~328 ft.
        let agl = cache.elevation_above_ground(1000.0, 45.0, -93.0).expect("covered");
        assert_eq!(agl, 671);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_below_ground_clamps_to_zero() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = cache_with_tile(dir.path(), 44, -93, 500, DEFAULT_MAX_TILES);
        let agl = cache.elevation_above_ground(10.0, 44.5, -92.5).expect("covered");
        assert_eq!(agl, 0);
    }

    #[test]
    fn test_missing_tile_is_unavailable_and_cached() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = TerrainCache::new(dir.path(), DEFAULT_MAX_TILES);
        assert!(cache.elevation_above_ground(1000.0, 10.5, 10.5).is_err());
        assert!(cache.elevation_above_ground(1000.0, 10.5, 10.5).is_err());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_is_bounded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = TerrainCache::new(dir.path(), 2);
        for lon in 0..5 {
            let _ = cache.ground_elevation_ft(10.5, f64::from(lon) + 0.5);
        }
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_shared_across_threads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = Arc::new(cache_with_tile(dir.path(), 44, -93, 100, DEFAULT_MAX_TILES));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.elevation_above_ground(2000.0, 44.2, -92.8))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().expect("thread").is_ok());
        }
        assert_eq!(cache.len(), 1);
    }
}
