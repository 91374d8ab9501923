//! Log configuration.

use crate::{Result, error::Error, tile::MAX_TILE_HEIGHT};

/// Tile height used when none is configured.
pub const DEFAULT_TILE_HEIGHT: u8 = 8;

/// Deployment-time parameters of a [`TileLog`](crate::TileLog).
///
/// The tile height is baked into every stored tile path; changing it for an
/// existing store makes its tiles unreadable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TileLogConfig {
    /// Tile height `H`: each tile spans `2^H` hashes.
    pub tile_height: u8,
}

impl Default for TileLogConfig {
    fn default() -> Self {
        TileLogConfig {
            tile_height: DEFAULT_TILE_HEIGHT,
        }
    }
}

impl TileLogConfig {
    /// Config with the given tile height.
    pub fn with_tile_height(tile_height: u8) -> Self {
        TileLogConfig { tile_height }
    }

    /// Check the height is within `1..=30`.
    pub fn validate(&self) -> Result<()> {
        if self.tile_height == 0 || self.tile_height > MAX_TILE_HEIGHT {
            return Err(Error::InvalidConfig(format!(
                "tile height {} must be between 1 and {}",
                self.tile_height, MAX_TILE_HEIGHT
            )));
        }
        Ok(())
    }
}
