// src/engine/header.rs
//
// JPEG marker walker: reads everything up to the first SOS without touching the
// entropy-coded data. Colorspace and subsampling are derived the way libjpeg and
// TurboJPEG derive them, so the reported values match what a decoder would use.

use crate::engine::catalog::{Colorspace, Subsampling};
use crate::engine::native::{Density, EngineError, EngineResult, HeaderInfo};
use crate::engine::params::Restart;
use img_parts::jpeg::Jpeg;
use img_parts::{Bytes, ImageICC};

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const DRI: u8 = 0xDD;
const APP0: u8 = 0xE0;
const APP2: u8 = 0xE2;
const APP14: u8 = 0xEE;

const ICC_SIGNATURE: &[u8] = b"ICC_PROFILE\0";

/// Parsed header plus any non-fatal problems found on the way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderScan {
    pub info: HeaderInfo,
    pub warnings: Vec<String>,
}

#[derive(Clone, Copy, Debug)]
struct Component {
    id: u8,
    h: u8,
    v: u8,
}

#[derive(Clone, Copy, Debug)]
enum Coding {
    Baseline,
    Progressive,
    Lossless,
}

#[derive(Debug)]
struct Frame {
    coding: Coding,
    arithmetic: bool,
    precision: u8,
    width: u32,
    height: u32,
    components: Vec<Component>,
}

#[derive(Default)]
struct Walker<'a> {
    data: &'a [u8],
    pos: usize,
    frame: Option<Frame>,
    jfif: Option<Density>,
    adobe_transform: Option<u8>,
    restart_interval: u16,
    lossless_params: Option<(u8, u8)>,
    has_icc: bool,
    warnings: Vec<String>,
}

fn corrupt(message: impl Into<String>) -> EngineError {
    EngineError::CorruptHeader(message.into())
}

fn be16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

/// True when an EOI marker follows the entropy-coded data.
pub fn has_eoi(data: &[u8]) -> bool {
    data.windows(2).any(|w| w == [0xFF, EOI])
}

/// Read the JPEG header in `data`.
pub fn read_header(data: &[u8]) -> EngineResult<HeaderScan> {
    if data.len() < 2 || data[0] != 0xFF || data[1] != SOI {
        return Err(corrupt(match data {
            [a, b, ..] => format!("not a JPEG file: starts with 0x{a:02x} 0x{b:02x}"),
            _ => "not a JPEG file: fewer than 2 bytes".to_string(),
        }));
    }
    let mut walker = Walker {
        data,
        pos: 2,
        ..Walker::default()
    };
    walker.walk()?;
    walker.finish()
}

impl<'a> Walker<'a> {
    fn next_marker(&mut self) -> EngineResult<u8> {
        let start = self.pos;
        while self.pos < self.data.len() && self.data[self.pos] != 0xFF {
            self.pos += 1;
        }
        let extraneous = self.pos - start;
        // Fill bytes: any number of 0xFF may precede a marker code.
        while self.pos < self.data.len() && self.data[self.pos] == 0xFF {
            self.pos += 1;
        }
        let Some(&marker) = self.data.get(self.pos) else {
            return Err(corrupt("unexpected end of data while looking for a marker"));
        };
        self.pos += 1;
        if extraneous > 0 {
            self.warnings.push(format!(
                "corrupt JPEG data: {extraneous} extraneous bytes before marker 0x{marker:02x}"
            ));
        }
        Ok(marker)
    }

    fn segment(&mut self, marker: u8) -> EngineResult<&'a [u8]> {
        let data = self.data;
        let header = data
            .get(self.pos..self.pos + 2)
            .ok_or_else(|| corrupt(format!("truncated length of marker 0x{marker:02x}")))?;
        let len = be16(header) as usize;
        if len < 2 {
            return Err(corrupt(format!("invalid length {len} for marker 0x{marker:02x}")));
        }
        let body = data
            .get(self.pos + 2..self.pos + len)
            .ok_or_else(|| corrupt(format!("marker 0x{marker:02x} runs past end of data")))?;
        self.pos += len;
        Ok(body)
    }

    fn walk(&mut self) -> EngineResult<()> {
        loop {
            let marker = self.next_marker()?;
            match marker {
                // Standalone markers carry no length.
                0x01 | 0xD0..=0xD7 => continue,
                SOI => return Err(corrupt("duplicate SOI marker")),
                EOI => return Err(corrupt("EOI reached before any image data")),
                0xC0 | 0xC1 | 0xC2 | 0xC3 | 0xC9 | 0xCA | 0xCB => {
                    let body = self.segment(marker)?;
                    self.read_frame(marker, body)?;
                }
                0xC5..=0xC7 | 0xCD..=0xCF => {
                    return Err(EngineError::Unsupported {
                        operation: "decompress header",
                        reason: format!("hierarchical JPEG (SOF marker 0x{marker:02x})"),
                    });
                }
                SOS => {
                    let body = self.segment(marker)?;
                    return self.read_scan(body);
                }
                DRI => {
                    let body = self.segment(marker)?;
                    if body.len() < 2 {
                        return Err(corrupt("DRI segment too short"));
                    }
                    self.restart_interval = be16(body);
                }
                APP0 => {
                    let body = self.segment(marker)?;
                    self.read_jfif(body);
                }
                APP2 => {
                    let body = self.segment(marker)?;
                    if body.len() >= 14 && body.starts_with(ICC_SIGNATURE) {
                        self.has_icc = true;
                    }
                }
                APP14 => {
                    let body = self.segment(marker)?;
                    if body.len() >= 12 && body.starts_with(b"Adobe") {
                        self.adobe_transform = Some(body[11]);
                    }
                }
                _ => {
                    self.segment(marker)?;
                }
            }
        }
    }

    fn read_frame(&mut self, marker: u8, body: &[u8]) -> EngineResult<()> {
        if self.frame.is_some() {
            return Err(corrupt("more than one SOF marker"));
        }
        if body.len() < 6 {
            return Err(corrupt("SOF segment too short"));
        }
        let precision = body[0];
        let height = be16(&body[1..3]) as u32;
        let width = be16(&body[3..5]) as u32;
        let count = body[5] as usize;
        let coding = match marker {
            0xC2 | 0xCA => Coding::Progressive,
            0xC3 | 0xCB => Coding::Lossless,
            _ => Coding::Baseline,
        };
        let arithmetic = marker >= 0xC9;

        let precision_ok = match coding {
            Coding::Lossless => (2..=16).contains(&precision),
            _ => precision == 8 || precision == 12,
        };
        if !precision_ok {
            return Err(corrupt(format!("unsupported data precision {precision}")));
        }
        if width == 0 || height == 0 {
            return Err(corrupt(format!("empty image ({width}x{height})")));
        }
        if !(1..=4).contains(&count) || count == 2 {
            return Err(EngineError::Unsupported {
                operation: "decompress header",
                reason: format!("{count} color components"),
            });
        }
        if body.len() < 6 + 3 * count {
            return Err(corrupt("SOF segment shorter than its component list"));
        }
        let mut components = Vec::with_capacity(count);
        for spec in body[6..6 + 3 * count].chunks_exact(3) {
            let (h, v) = (spec[1] >> 4, spec[1] & 0x0F);
            if !(1..=4).contains(&h) || !(1..=4).contains(&v) {
                return Err(corrupt(format!("bogus sampling factors {h}x{v}")));
            }
            components.push(Component { id: spec[0], h, v });
        }

        self.frame = Some(Frame {
            coding,
            arithmetic,
            precision,
            width,
            height,
            components,
        });
        Ok(())
    }

    fn read_jfif(&mut self, body: &[u8]) {
        if body.len() >= 12 && body.starts_with(b"JFIF\0") {
            self.jfif = Some(Density {
                units: body[7],
                x: be16(&body[8..10]),
                y: be16(&body[10..12]),
            });
        }
    }

    fn read_scan(&mut self, body: &[u8]) -> EngineResult<()> {
        let lossless = match &self.frame {
            Some(frame) => matches!(frame.coding, Coding::Lossless),
            None => return Err(corrupt("SOS marker before SOF")),
        };
        let count = body.first().copied().unwrap_or(0) as usize;
        if count == 0 || body.len() < 1 + 2 * count + 3 {
            return Err(corrupt("SOS segment too short"));
        }
        if lossless {
            let tail = &body[1 + 2 * count..];
            self.lossless_params = Some((tail[0], tail[2] & 0x0F));
        }
        Ok(())
    }

    fn finish(mut self) -> EngineResult<HeaderScan> {
        let frame = self
            .frame
            .take()
            .ok_or_else(|| corrupt("no SOF marker before SOS"))?;
        if !has_eoi(&self.data[self.pos..]) {
            self.warnings
                .push("premature end of JPEG data (missing EOI marker)".to_string());
        }

        let colorspace = self.derive_colorspace(&frame);
        let subsampling = derive_subsampling(&frame.components, colorspace);
        let icc_profile = if self.has_icc { self.read_icc() } else { None };
        let (lossless_psv, lossless_pt) = self.lossless_params.unwrap_or((1, 0));
        let lossless = matches!(frame.coding, Coding::Lossless);

        Ok(HeaderScan {
            info: HeaderInfo {
                width: frame.width,
                height: frame.height,
                subsampling,
                precision: frame.precision,
                colorspace,
                progressive: matches!(frame.coding, Coding::Progressive),
                arithmetic: frame.arithmetic,
                lossless,
                lossless_psv: if lossless { lossless_psv } else { 1 },
                lossless_pt: if lossless { lossless_pt } else { 0 },
                restart: match self.restart_interval {
                    0 => Restart::None,
                    n => Restart::Blocks(n),
                },
                density: self.jfif,
                icc_profile,
            },
            warnings: self.warnings,
        })
    }

    fn derive_colorspace(&mut self, frame: &Frame) -> Colorspace {
        match frame.components.len() {
            1 => Colorspace::Gray,
            3 => {
                if self.jfif.is_some() {
                    return Colorspace::YCbCr;
                }
                match self.adobe_transform {
                    Some(0) => Colorspace::Rgb,
                    Some(1) => Colorspace::YCbCr,
                    Some(other) => {
                        self.warnings
                            .push(format!("unknown Adobe color transform code {other}"));
                        Colorspace::YCbCr
                    }
                    None => {
                        let ids: Vec<u8> = frame.components.iter().map(|c| c.id).collect();
                        if ids == b"RGB" {
                            Colorspace::Rgb
                        } else {
                            Colorspace::YCbCr
                        }
                    }
                }
            }
            _ => match self.adobe_transform {
                None | Some(0) => Colorspace::Cmyk,
                Some(2) => Colorspace::Ycck,
                Some(other) => {
                    self.warnings
                        .push(format!("unknown Adobe color transform code {other}"));
                    Colorspace::Ycck
                }
            },
        }
    }

    /// The APP2 profile chunks, concatenated by `img_parts`.
    fn read_icc(&mut self) -> Option<Vec<u8>> {
        let profile = Jpeg::from_bytes(Bytes::copy_from_slice(self.data))
            .ok()
            .and_then(|jpeg| jpeg.icc_profile());
        if profile.is_none() {
            self.warnings
                .push("ignoring unreadable ICC profile chunks".to_string());
        }
        profile.map(|icc| icc.to_vec())
    }
}

/// Match component sampling factors against the known levels, accepting the
/// non-standard 4:2:2, 4:4:0 and 4:4:4 encodings other encoders produce.
fn derive_subsampling(components: &[Component], colorspace: Colorspace) -> Subsampling {
    if components.len() == 1 && colorspace == Colorspace::Gray {
        return Subsampling::Gray;
    }
    let four_channel = matches!(colorspace, Colorspace::Cmyk | Colorspace::Ycck);
    if components.len() != 3 && !(four_channel && components.len() == 4) {
        return Subsampling::Unknown;
    }
    let luma = components[0];
    let rest = &components[1..];

    for level in Subsampling::KNOWN {
        if level == Subsampling::Gray {
            continue;
        }
        let Some((mcu_w, mcu_h)) = level.mcu_block() else {
            continue;
        };
        let (hf, vf) = ((mcu_w / 8) as u8, (mcu_h / 8) as u8);

        if luma.h == hf && luma.v == vf {
            let all = rest.iter().enumerate().all(|(k, c)| {
                let (href, vref) = if four_channel && k == 2 { (hf, vf) } else { (1, 1) };
                c.h == href && c.v == vref
            });
            if all {
                return level;
            }
        }

        if luma.h == 2 && luma.v == 2 && matches!(level, Subsampling::S422 | Subsampling::S440) {
            let all = rest.iter().enumerate().all(|(k, c)| {
                let (href, vref) = if four_channel && k == 2 { (2, 2) } else { (vf, hf) };
                c.h == href && c.v == vref
            });
            if all {
                return level;
            }
        }

        if level == Subsampling::S444
            && luma.h * luma.v <= 3
            && rest.iter().all(|c| c.h == luma.h && c.v == luma.v)
        {
            return level;
        }
    }
    Subsampling::Unknown
}
