// src/engine/params.rs
//
// Named codec parameters with TurboJPEG defaults, range checks and the
// cross-parameter rules enforced at `set` time.

use crate::engine::catalog::{Colorspace, Subsampling};
use crate::engine::native::HeaderInfo;
use crate::error::{TjError, TjResult};
use std::fmt;
use std::str::FromStr;

/// Parameter keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Param {
    StopOnWarning,
    BottomUp,
    Quality,
    Subsampling,
    JpegWidth,
    JpegHeight,
    Precision,
    Colorspace,
    FastUpsample,
    FastDct,
    Optimize,
    Progressive,
    ScanLimit,
    Arithmetic,
    Lossless,
    LosslessPsv,
    LosslessPt,
    RestartBlocks,
    RestartRows,
    XDensity,
    YDensity,
    DensityUnits,
    MaxMemory,
    MaxPixels,
}

impl Param {
    pub const COUNT: usize = 24;

    pub const ALL: [Param; Param::COUNT] = [
        Param::StopOnWarning,
        Param::BottomUp,
        Param::Quality,
        Param::Subsampling,
        Param::JpegWidth,
        Param::JpegHeight,
        Param::Precision,
        Param::Colorspace,
        Param::FastUpsample,
        Param::FastDct,
        Param::Optimize,
        Param::Progressive,
        Param::ScanLimit,
        Param::Arithmetic,
        Param::Lossless,
        Param::LosslessPsv,
        Param::LosslessPt,
        Param::RestartBlocks,
        Param::RestartRows,
        Param::XDensity,
        Param::YDensity,
        Param::DensityUnits,
        Param::MaxMemory,
        Param::MaxPixels,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Param::StopOnWarning => "stopOnWarning",
            Param::BottomUp => "bottomUp",
            Param::Quality => "quality",
            Param::Subsampling => "subsampling",
            Param::JpegWidth => "jpegWidth",
            Param::JpegHeight => "jpegHeight",
            Param::Precision => "precision",
            Param::Colorspace => "colorspace",
            Param::FastUpsample => "fastUpsample",
            Param::FastDct => "fastDCT",
            Param::Optimize => "optimize",
            Param::Progressive => "progressive",
            Param::ScanLimit => "scanLimit",
            Param::Arithmetic => "arithmetic",
            Param::Lossless => "lossless",
            Param::LosslessPsv => "losslessPredictor",
            Param::LosslessPt => "losslessPointTransform",
            Param::RestartBlocks => "restartBlocks",
            Param::RestartRows => "restartRows",
            Param::XDensity => "xDensity",
            Param::YDensity => "yDensity",
            Param::DensityUnits => "densityUnits",
            Param::MaxMemory => "maxMemoryMB",
            Param::MaxPixels => "maxPixels",
        }
    }

    /// Keys only ever filled in from a decoded header.
    pub const fn is_read_only(self) -> bool {
        matches!(self, Param::JpegWidth | Param::JpegHeight)
    }

    const fn default_value(self) -> i32 {
        match self {
            Param::Quality
            | Param::Subsampling
            | Param::JpegWidth
            | Param::JpegHeight
            | Param::Colorspace => -1,
            Param::Precision => 8,
            Param::LosslessPsv | Param::XDensity | Param::YDensity => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Param {
    type Err = TjError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Param::ALL
            .iter()
            .copied()
            .find(|p| p.name() == s)
            .ok_or_else(|| TjError::unknown_parameter(s.to_string()))
    }
}

/// Restart marker interval; blocks and rows are mutually exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Restart {
    #[default]
    None,
    Blocks(u16),
    Rows(u16),
}

const MAX_RESTART: i32 = 65535;
const MAX_DENSITY: i32 = 65535;

/// Mutable parameter store owned by one session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodecParameters {
    values: [i32; Param::COUNT],
}

impl Default for CodecParameters {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecParameters {
    pub fn new() -> Self {
        let mut values = [0; Param::COUNT];
        for param in Param::ALL {
            values[param as usize] = param.default_value();
        }
        Self { values }
    }

    pub fn get(&self, param: Param) -> i32 {
        self.values[param as usize]
    }

    /// Set one parameter, checking its legal range and the rules tying it to
    /// other parameters.
    pub fn set(&mut self, param: Param, value: i32) -> TjResult<()> {
        if param.is_read_only() {
            return Err(invalid(param, value, "read-only; populated by reading a JPEG header"));
        }
        match param {
            Param::StopOnWarning
            | Param::BottomUp
            | Param::FastUpsample
            | Param::FastDct
            | Param::Optimize
            | Param::Progressive
            | Param::Arithmetic => check_range(param, value, 0, 1)?,
            Param::Quality => check_range(param, value, 1, 100)?,
            Param::Subsampling => {
                Subsampling::from_id(value)
                    .map_err(|_| invalid(param, value, "not a subsampling level"))?;
            }
            Param::Colorspace => {
                if value != -1 && Colorspace::from_id(value).is_none() {
                    return Err(invalid(param, value, "not a JPEG colorspace"));
                }
            }
            Param::Precision => {
                if !matches!(value, 8 | 12 | 16) {
                    return Err(invalid(param, value, "must be 8, 12 or 16"));
                }
                if value == 16 && !self.flag(Param::Lossless) {
                    return Err(invalid(param, value, "16-bit precision requires lossless mode"));
                }
            }
            Param::Lossless => {
                check_range(param, value, 0, 1)?;
                if value == 0 && self.get(Param::Precision) == 16 {
                    return Err(invalid(
                        param,
                        value,
                        "lossless mode cannot be disabled at 16-bit precision",
                    ));
                }
            }
            Param::LosslessPsv => check_range(param, value, 1, 7)?,
            Param::LosslessPt => check_range(param, value, 0, self.get(Param::Precision) - 1)?,
            Param::RestartBlocks | Param::RestartRows => check_range(param, value, 0, MAX_RESTART)?,
            Param::XDensity | Param::YDensity => check_range(param, value, 1, MAX_DENSITY)?,
            Param::DensityUnits => check_range(param, value, 0, 2)?,
            Param::ScanLimit | Param::MaxMemory | Param::MaxPixels => {
                check_range(param, value, 0, i32::MAX)?
            }
            // Rejected by the read-only check above.
            Param::JpegWidth | Param::JpegHeight => {}
        }

        self.values[param as usize] = value;
        match param {
            Param::RestartBlocks if value != 0 => self.values[Param::RestartRows as usize] = 0,
            Param::RestartRows if value != 0 => self.values[Param::RestartBlocks as usize] = 0,
            Param::Precision => self.clamp_point_transform(),
            _ => {}
        }
        Ok(())
    }

    /// Set a parameter by its lower-camel name.
    pub fn set_named(&mut self, name: &str, value: i32) -> TjResult<()> {
        self.set(name.parse()?, value)
    }

    pub fn get_named(&self, name: &str) -> TjResult<i32> {
        Ok(self.get(name.parse()?))
    }

    fn clamp_point_transform(&mut self) {
        let max = self.get(Param::Precision) - 1;
        let pt = &mut self.values[Param::LosslessPt as usize];
        if *pt > max {
            *pt = max;
        }
    }

    /// Store header-derived values, bypassing the read-only and dependency checks.
    pub(crate) fn record_header(&mut self, header: &HeaderInfo) {
        let v = &mut self.values;
        v[Param::JpegWidth as usize] = header.width as i32;
        v[Param::JpegHeight as usize] = header.height as i32;
        v[Param::Subsampling as usize] = header.subsampling.id();
        v[Param::Precision as usize] = header.precision as i32;
        v[Param::Colorspace as usize] = header.colorspace.id();
        v[Param::Progressive as usize] = header.progressive as i32;
        v[Param::Arithmetic as usize] = header.arithmetic as i32;
        v[Param::Lossless as usize] = header.lossless as i32;
        v[Param::LosslessPsv as usize] = header.lossless_psv as i32;
        v[Param::LosslessPt as usize] = header.lossless_pt as i32;
        let (blocks, rows) = match header.restart {
            Restart::None => (0, 0),
            Restart::Blocks(n) => (n as i32, 0),
            Restart::Rows(n) => (0, n as i32),
        };
        v[Param::RestartBlocks as usize] = blocks;
        v[Param::RestartRows as usize] = rows;
        if let Some(density) = header.density {
            v[Param::XDensity as usize] = density.x as i32;
            v[Param::YDensity as usize] = density.y as i32;
            v[Param::DensityUnits as usize] = density.units as i32;
        }
    }

    /// Used when binding a planar image: its subsampling is authoritative.
    pub(crate) fn force_subsampling(&mut self, subsampling: Subsampling) {
        self.values[Param::Subsampling as usize] = subsampling.id();
    }

    pub(crate) fn flag(&self, param: Param) -> bool {
        self.get(param) != 0
    }

    pub fn quality(&self) -> Option<u8> {
        u8::try_from(self.get(Param::Quality)).ok()
    }

    pub fn subsampling(&self) -> Subsampling {
        Subsampling::from_id(self.get(Param::Subsampling)).unwrap_or_default()
    }

    pub fn precision(&self) -> u8 {
        self.get(Param::Precision) as u8
    }

    /// Explicit colorspace, or `None` when it is left to be derived.
    pub fn colorspace(&self) -> Option<Colorspace> {
        Colorspace::from_id(self.get(Param::Colorspace))
    }

    pub fn is_lossless(&self) -> bool {
        self.flag(Param::Lossless)
    }

    pub fn stop_on_warning(&self) -> bool {
        self.flag(Param::StopOnWarning)
    }

    pub fn restart(&self) -> Restart {
        match (self.get(Param::RestartBlocks), self.get(Param::RestartRows)) {
            (0, 0) => Restart::None,
            (blocks, 0) => Restart::Blocks(blocks as u16),
            (_, rows) => Restart::Rows(rows as u16),
        }
    }

    /// Huffman optimization actually applied: progressive or 12-bit coding
    /// needs optimized tables unless arithmetic coding replaces Huffman.
    pub fn effective_optimize(&self) -> bool {
        self.effective_optimize_for(self.precision())
    }

    /// [`CodecParameters::effective_optimize`] for samples of `precision` bits,
    /// which may differ from the stored parameter when a packed buffer is bound.
    pub fn effective_optimize_for(&self, precision: u8) -> bool {
        if self.flag(Param::Arithmetic) {
            return false;
        }
        self.flag(Param::Optimize) || self.flag(Param::Progressive) || precision == 12
    }

    /// `(max_pixels, max_memory_bytes)`, 0 meaning unlimited.
    pub fn limits(&self) -> (u64, u64) {
        (
            self.get(Param::MaxPixels) as u64,
            self.get(Param::MaxMemory) as u64 * 1024 * 1024,
        )
    }
}

fn invalid(param: Param, value: i32, reason: &'static str) -> TjError {
    TjError::invalid_parameter_value(param.name(), value as i64, reason)
}

fn check_range(param: Param, value: i32, min: i32, max: i32) -> TjResult<()> {
    if value < min || value > max {
        return Err(TjError::invalid_parameter_value(
            param.name(),
            value as i64,
            format!("must be in [{min}, {max}]"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let p = CodecParameters::new();
        assert_eq!(p.get(Param::Quality), -1);
        assert_eq!(p.quality(), None);
        assert_eq!(p.subsampling(), Subsampling::Unknown);
        assert_eq!(p.get(Param::Precision), 8);
        assert_eq!(p.get(Param::LosslessPsv), 1);
        assert_eq!(p.get(Param::JpegWidth), -1);
        assert_eq!(p.colorspace(), None);
        assert_eq!(p.restart(), Restart::None);
        assert_eq!(p.limits(), (0, 0));
    }

    #[test]
    fn restart_intervals_are_exclusive() {
        let mut p = CodecParameters::new();
        p.set(Param::RestartRows, 4).unwrap();
        p.set(Param::RestartBlocks, 10).unwrap();
        assert_eq!(p.get(Param::RestartRows), 0);
        assert_eq!(p.restart(), Restart::Blocks(10));
        p.set(Param::RestartRows, 2).unwrap();
        assert_eq!(p.get(Param::RestartBlocks), 0);
        // Zeroing one side leaves the other alone.
        p.set(Param::RestartBlocks, 0).unwrap();
        assert_eq!(p.restart(), Restart::Rows(2));
        assert!(p.set(Param::RestartRows, 65536).is_err());
    }

    #[test]
    fn sixteen_bit_requires_lossless() {
        let mut p = CodecParameters::new();
        assert!(matches!(
            p.set(Param::Precision, 16),
            Err(TjError::InvalidParameterValue { param: "precision", value: 16, .. })
        ));
        p.set(Param::Lossless, 1).unwrap();
        p.set(Param::Precision, 16).unwrap();
        assert!(matches!(
            p.set(Param::Lossless, 0),
            Err(TjError::InvalidParameterValue { param: "lossless", .. })
        ));
    }

    #[test]
    fn point_transform_tracks_precision() {
        let mut p = CodecParameters::new();
        p.set(Param::Precision, 12).unwrap();
        p.set(Param::LosslessPt, 11).unwrap();
        assert!(p.set(Param::LosslessPt, 12).is_err());
        p.set(Param::Precision, 8).unwrap();
        assert_eq!(p.get(Param::LosslessPt), 7);
    }

    #[test]
    fn ranges_are_checked() {
        let mut p = CodecParameters::new();
        for (param, bad) in [
            (Param::Quality, 0),
            (Param::Quality, 101),
            (Param::Subsampling, 7),
            (Param::Colorspace, 5),
            (Param::Precision, 10),
            (Param::LosslessPsv, 0),
            (Param::LosslessPsv, 8),
            (Param::Optimize, 2),
            (Param::DensityUnits, 3),
            (Param::XDensity, 0),
            (Param::MaxPixels, -1),
        ] {
            assert!(
                matches!(p.set(param, bad), Err(TjError::InvalidParameterValue { .. })),
                "{param}={bad}"
            );
        }
        p.set(Param::Subsampling, -1).unwrap();
        p.set(Param::Colorspace, -1).unwrap();
    }

    #[test]
    fn read_only_keys_reject_set() {
        let mut p = CodecParameters::new();
        assert!(matches!(
            p.set(Param::JpegWidth, 100),
            Err(TjError::InvalidParameterValue { param: "jpegWidth", .. })
        ));
    }

    #[test]
    fn names_round_trip() {
        for param in Param::ALL {
            assert_eq!(param.to_string().parse::<Param>().unwrap(), param);
        }
        assert_eq!(
            "nope".parse::<Param>(),
            Err(TjError::unknown_parameter("nope"))
        );
        let mut p = CodecParameters::new();
        p.set_named("quality", 75).unwrap();
        assert_eq!(p.get_named("quality").unwrap(), 75);
    }

    #[test]
    fn optimize_implications() {
        let mut p = CodecParameters::new();
        assert!(!p.effective_optimize());
        p.set(Param::Progressive, 1).unwrap();
        assert!(p.effective_optimize());
        assert_eq!(p.get(Param::Optimize), 0);
        p.set(Param::Arithmetic, 1).unwrap();
        assert!(!p.effective_optimize());

        let mut p = CodecParameters::new();
        p.set(Param::Precision, 12).unwrap();
        assert!(p.effective_optimize());
    }
}
