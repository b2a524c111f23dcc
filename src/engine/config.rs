// src/engine/config.rs
//
// Constructor-time session configuration. Replaces process-wide flags: every
// session carries its own copy.

use crate::engine::catalog::Subsampling;
use crate::engine::params::{CodecParameters, Param};
use crate::error::TjResult;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionConfig {
    /// Log engine warnings and state transitions at `info` instead of `warn`/`debug`.
    pub verbose: bool,
    pub stop_on_warning: bool,
    /// 0 = unlimited.
    pub max_pixels: u32,
    /// 0 = unlimited.
    pub max_memory_mb: u32,
    pub default_quality: Option<u8>,
    pub default_subsampling: Option<Subsampling>,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_stop_on_warning(mut self, stop: bool) -> Self {
        self.stop_on_warning = stop;
        self
    }

    pub fn with_max_pixels(mut self, max_pixels: u32) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    pub fn with_max_memory_mb(mut self, max_memory_mb: u32) -> Self {
        self.max_memory_mb = max_memory_mb;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.default_quality = Some(quality);
        self
    }

    pub fn with_subsampling(mut self, subsampling: Subsampling) -> Self {
        self.default_subsampling = Some(subsampling);
        self
    }

    /// Parameter store seeded from this configuration. Values go through the
    /// normal range checks.
    pub fn to_parameters(&self) -> TjResult<CodecParameters> {
        let mut params = CodecParameters::new();
        params.set(Param::StopOnWarning, self.stop_on_warning as i32)?;
        params.set(Param::MaxPixels, clamp_i32(self.max_pixels))?;
        params.set(Param::MaxMemory, clamp_i32(self.max_memory_mb))?;
        if let Some(quality) = self.default_quality {
            params.set(Param::Quality, quality as i32)?;
        }
        if let Some(subsampling) = self.default_subsampling {
            params.set(Param::Subsampling, subsampling.id())?;
        }
        Ok(params)
    }
}

fn clamp_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TjError;

    #[test]
    fn builder_seeds_parameters() {
        let params = SessionConfig::new()
            .with_stop_on_warning(true)
            .with_max_pixels(1_000_000)
            .with_max_memory_mb(64)
            .with_quality(85)
            .with_subsampling(Subsampling::S420)
            .to_parameters()
            .unwrap();
        assert!(params.stop_on_warning());
        assert_eq!(params.quality(), Some(85));
        assert_eq!(params.subsampling(), Subsampling::S420);
        assert_eq!(params.limits(), (1_000_000, 64 * 1024 * 1024));
    }

    #[test]
    fn invalid_defaults_rejected() {
        assert!(matches!(
            SessionConfig::new().with_quality(0).to_parameters(),
            Err(TjError::InvalidParameterValue { param: "quality", .. })
        ));
    }
}
