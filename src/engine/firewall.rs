// src/engine/firewall.rs
//
// Engine-side limit enforcement for the maxPixels / maxMemoryMB parameters.
// The session only range-checks these values; engines call in here before
// allocating or decoding.

use crate::engine::native::{EngineError, EngineResult};

/// Limits in effect for one engine call. A zero limit is unlimited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineLimits {
    pub max_pixels: u64,
    pub max_memory_bytes: u64,
}

impl EngineLimits {
    pub const UNLIMITED: EngineLimits = EngineLimits {
        max_pixels: 0,
        max_memory_bytes: 0,
    };

    pub fn new(max_pixels: u64, max_memory_bytes: u64) -> Self {
        Self {
            max_pixels,
            max_memory_bytes,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_pixels == 0 && self.max_memory_bytes == 0
    }

    pub fn enforce_pixels(&self, width: u32, height: u32) -> EngineResult<()> {
        if self.max_pixels == 0 {
            return Ok(());
        }
        let pixels = width as u64 * height as u64;
        if pixels > self.max_pixels {
            tracing::debug!(width, height, limit = self.max_pixels, "pixel limit exceeded");
            return Err(EngineError::LimitExceeded {
                what: "pixel count",
                actual: pixels,
                max: self.max_pixels,
            });
        }
        Ok(())
    }

    /// Check a working-memory estimate in bytes.
    pub fn enforce_memory(&self, bytes: u64) -> EngineResult<()> {
        if self.max_memory_bytes == 0 {
            return Ok(());
        }
        if bytes > self.max_memory_bytes {
            tracing::debug!(bytes, limit = self.max_memory_bytes, "memory limit exceeded");
            return Err(EngineError::LimitExceeded {
                what: "working memory (bytes)",
                actual: bytes,
                max: self.max_memory_bytes,
            });
        }
        Ok(())
    }

    /// Both checks for a decode or encode of `width` x `height` at
    /// `bytes_per_pixel` bytes of working storage.
    pub fn enforce_image(&self, width: u32, height: u32, bytes_per_pixel: u64) -> EngineResult<()> {
        self.enforce_pixels(width, height)?;
        self.enforce_memory((width as u64 * height as u64).saturating_mul(bytes_per_pixel))
    }
}
