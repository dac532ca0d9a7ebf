//! A pure-Rust FITS container held in memory.
//!
//! `MemHost` parses the primary array and IMAGE extensions of a file into
//! editable segments and carries every other extension through untouched.
//! File-backed hosts write themselves back on [`MemHost::flush`] and on drop
//! when opened for writing.

use std::path::{Path, PathBuf};

use super::card::{padded_byte_len, parse_header, serialize_header, Card};
use super::pixel::{
    bytes_per_pixel, decode_stored, encode_stored, equivalent_code, is_undefined, load,
    storage_layout, store, store_undefined, transfer_width, Num, Scaling,
};
use super::{Host, HostResult, SegmentId, Status};
use crate::error::{Error, Result};
use crate::types::TypeCode;

/// Whether a file is opened for reading or writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOpenMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone)]
struct ImageSegment {
    bitpix: i64,
    naxes: Vec<usize>,
    scaling: Scaling,
    blank: Option<i64>,
    extra: Vec<Card>,
    /// Unpadded big-endian pixel bytes.
    data: Vec<u8>,
}

#[derive(Debug, Clone)]
enum Segment {
    Image(ImageSegment),
    /// Any other HDU, kept as its padded header and data bytes.
    Opaque(Vec<u8>),
}

/// Where undefined pixels go during a read.
enum NullFill<'a> {
    Undefined,
    Sentinel(&'a [u8]),
    Mask(&'a mut [u8]),
}

fn pixel_count(naxes: &[usize]) -> usize {
    if naxes.is_empty() {
        0
    } else {
        naxes.iter().product()
    }
}

fn is_naxis_n(keyword: &str) -> bool {
    keyword
        .strip_prefix("NAXIS")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

const STRUCTURAL_KEYWORDS: [&str; 10] = [
    "SIMPLE", "XTENSION", "BITPIX", "NAXIS", "PCOUNT", "GCOUNT", "EXTEND", "BZERO", "BSCALE",
    "BLANK",
];

impl ImageSegment {
    fn new(storage: TypeCode, shape: &[usize]) -> HostResult<Self> {
        let (bitpix, scaling) = storage_layout(storage)?;
        let len = pixel_count(shape) * bytes_per_pixel(bitpix)?;
        Ok(ImageSegment {
            bitpix,
            naxes: shape.to_vec(),
            scaling,
            blank: None,
            extra: Vec::new(),
            data: vec![0u8; len],
        })
    }

    fn from_cards(cards: Vec<Card>, data: &[u8]) -> HostResult<Self> {
        let integer = |name: &str| cards.iter().find(|c| c.keyword() == name);
        let bitpix = integer("BITPIX")
            .and_then(Card::as_integer)
            .ok_or(Status::BAD_BITPIX)?;
        bytes_per_pixel(bitpix)?;
        let naxis = integer("NAXIS")
            .and_then(Card::as_integer)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or(Status::BAD_NAXIS)?;
        let mut naxes = Vec::with_capacity(naxis);
        for axis in 1..=naxis {
            let n = integer(&format!("NAXIS{axis}"))
                .and_then(Card::as_integer)
                .and_then(|n| usize::try_from(n).ok())
                .ok_or(Status::BAD_NAXES)?;
            naxes.push(n);
        }
        let scaling = Scaling {
            scale: integer("BSCALE").and_then(Card::as_real).unwrap_or(1.0),
            zero: integer("BZERO").and_then(Card::as_real).unwrap_or(0.0),
        };
        let blank = integer("BLANK").and_then(Card::as_integer);
        let extra = cards
            .into_iter()
            .filter(|c| {
                let kw = c.keyword();
                !STRUCTURAL_KEYWORDS.contains(&kw) && !is_naxis_n(kw)
            })
            .collect();
        Ok(ImageSegment {
            bitpix,
            naxes,
            scaling,
            blank,
            extra,
            data: data.to_vec(),
        })
    }

    fn header(&self, primary: bool) -> Vec<Card> {
        let mut cards = Vec::with_capacity(8 + self.naxes.len() + self.extra.len());
        if primary {
            cards.push(Card::logical("SIMPLE", true));
        } else {
            cards.push(Card::string("XTENSION", "IMAGE"));
        }
        cards.push(Card::integer("BITPIX", self.bitpix));
        cards.push(Card::integer("NAXIS", self.naxes.len() as i64));
        for (i, &n) in self.naxes.iter().enumerate() {
            cards.push(Card::integer(&format!("NAXIS{}", i + 1), n as i64));
        }
        if primary {
            cards.push(Card::logical("EXTEND", true));
        } else {
            cards.push(Card::integer("PCOUNT", 0));
            cards.push(Card::integer("GCOUNT", 1));
        }
        if self.scaling.scale != 1.0 {
            cards.push(Card::real("BSCALE", self.scaling.scale));
        }
        if self.scaling.zero != 0.0 {
            cards.push(Card::real("BZERO", self.scaling.zero));
        }
        if let Some(blank) = self.blank {
            cards.push(Card::integer("BLANK", blank));
        }
        cards.extend(self.extra.iter().cloned());
        cards
    }

    fn total_pixels(&self) -> usize {
        pixel_count(&self.naxes)
    }

    fn check_linear(&self, first_pixel: usize, count: usize) -> HostResult<()> {
        let total = self.total_pixels();
        if first_pixel == 0 || first_pixel > total || count > total - (first_pixel - 1) {
            return Err(Status::BAD_PIX_NUM);
        }
        Ok(())
    }

    fn subset_offsets(&self, first: &[usize], last: &[usize], step: &[usize]) -> HostResult<Vec<usize>> {
        let ndim = self.naxes.len();
        if first.len() != ndim || last.len() != ndim || step.len() != ndim {
            return Err(Status::BAD_DIMEN);
        }
        for d in 0..ndim {
            if first[d] == 0 || step[d] == 0 || first[d] > last[d] {
                return Err(Status::BAD_PIX_NUM);
            }
            let reached = first[d] + (last[d] - first[d]) / step[d] * step[d];
            if reached > self.naxes[d] {
                return Err(Status::BAD_PIX_NUM);
            }
        }

        // Axis strides: stride[0]=1, stride[1]=naxes[0], ...
        let mut strides = Vec::with_capacity(ndim);
        let mut s = 1;
        for &n in &self.naxes {
            strides.push(s);
            s *= n;
        }

        let counts: Vec<usize> = (0..ndim)
            .map(|d| (last[d] - first[d]) / step[d] + 1)
            .collect();
        let total: usize = counts.iter().product();
        let mut offsets = Vec::with_capacity(total);
        let mut idx = vec![0usize; ndim];
        for _ in 0..total {
            let flat = (0..ndim)
                .map(|d| (first[d] - 1 + idx[d] * step[d]) * strides[d])
                .sum();
            offsets.push(flat);

            // First axis varies fastest.
            for d in 0..ndim {
                idx[d] += 1;
                if idx[d] < counts[d] {
                    break;
                }
                idx[d] = 0;
            }
        }
        Ok(offsets)
    }

    fn read_at(
        &self,
        transfer: TypeCode,
        pixels: impl Iterator<Item = usize>,
        out: &mut [u8],
        mut nulls: NullFill<'_>,
    ) -> HostResult<bool> {
        let width = transfer_width(transfer)?;
        let mut any_null = false;
        for (k, p) in pixels.enumerate() {
            let stored = decode_stored(self.bitpix, &self.data, p)?;
            let undefined = is_undefined(stored, self.blank);
            if let NullFill::Mask(mask) = &mut nulls {
                mask[k] = u8::from(undefined);
            }
            if !undefined {
                store(transfer, out, k, self.scaling.to_physical(stored))?;
                continue;
            }
            any_null = true;
            match &nulls {
                NullFill::Sentinel(bytes) => out[k * width..(k + 1) * width].copy_from_slice(bytes),
                NullFill::Mask(_) => store(transfer, out, k, Num::Int(0))?,
                NullFill::Undefined => store_undefined(transfer, out, k)?,
            }
        }
        Ok(any_null)
    }

    fn write_at(
        &mut self,
        transfer: TypeCode,
        pixels: impl Iterator<Item = usize>,
        input: &[u8],
        null: Option<&[u8]>,
    ) -> HostResult<()> {
        let width = transfer_width(transfer)?;
        let float_storage = self.bitpix < 0;
        if null.is_some() && !float_storage && self.blank.is_none() {
            return Err(Status::NO_NULL);
        }
        // Encode everything before touching the segment so a failure
        // part way through leaves it unchanged.
        let bpp = bytes_per_pixel(self.bitpix)?;
        let mut targets = Vec::new();
        let mut staged = Vec::new();
        for (k, p) in pixels.enumerate() {
            let value = &input[k * width..(k + 1) * width];
            let stored = if null == Some(value) {
                match self.blank {
                    Some(blank) if !float_storage => Num::Int(i128::from(blank)),
                    _ => Num::Float(f64::NAN),
                }
            } else {
                self.scaling.to_stored(load(transfer, input, k)?)
            };
            staged.resize((k + 1) * bpp, 0);
            encode_stored(self.bitpix, &mut staged, k, stored)?;
            targets.push(p);
        }
        for (k, p) in targets.into_iter().enumerate() {
            self.data[p * bpp..(p + 1) * bpp].copy_from_slice(&staged[k * bpp..(k + 1) * bpp]);
        }
        Ok(())
    }
}

/// An in-memory FITS file implementing [`Host`].
#[derive(Debug)]
pub struct MemHost {
    segments: Vec<Segment>,
    path: Option<PathBuf>,
    mode: FileOpenMode,
}

/// Builder for creating a new file-backed host.
pub struct NewMemHost {
    path: PathBuf,
    overwrite: bool,
}

fn host_error(status: Status) -> Error {
    Error::host(status, status.message())
}

impl MemHost {
    /// An empty, writable host with no backing file.
    pub fn in_memory() -> Self {
        MemHost {
            segments: Vec::new(),
            path: None,
            mode: FileOpenMode::ReadWrite,
        }
    }

    /// Parse a complete FITS byte stream.
    pub fn from_bytes(bytes: &[u8]) -> HostResult<Self> {
        let mut segments = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let (cards, header_len) = parse_header(bytes, offset)?;
            let first = cards.first().map(Card::keyword).unwrap_or("");
            let primary = segments.is_empty();
            if primary && first != "SIMPLE" {
                return Err(Status::NO_SIMPLE);
            }
            let data_len = data_len(&cards)?;
            let data_start = offset + header_len;
            let end = data_start + padded_byte_len(data_len);
            if data_start + data_len > bytes.len() {
                return Err(Status::END_OF_FILE);
            }
            let is_image = if primary {
                !cards
                    .iter()
                    .any(|c| c.keyword() == "GROUPS" && c.as_logical() == Some(true))
            } else {
                cards
                    .first()
                    .and_then(Card::as_string)
                    .is_some_and(|x| x == "IMAGE")
            };
            let segment = if is_image {
                Segment::Image(ImageSegment::from_cards(
                    cards,
                    &bytes[data_start..data_start + data_len],
                )?)
            } else {
                let mut raw = bytes[offset..end.min(bytes.len())].to_vec();
                raw.resize(end - offset, 0);
                Segment::Opaque(raw)
            };
            segments.push(segment);
            offset = end;
        }
        tracing::debug!(segments = segments.len(), "parsed FITS stream");
        Ok(MemHost {
            segments,
            path: None,
            mode: FileOpenMode::ReadWrite,
        })
    }

    /// Open an existing FITS file in read-only mode.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load(path.as_ref(), FileOpenMode::ReadOnly)
    }

    /// Open an existing FITS file for editing.
    pub fn edit<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load(path.as_ref(), FileOpenMode::ReadWrite)
    }

    fn load(path: &Path, mode: FileOpenMode) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let mut host = Self::from_bytes(&bytes).map_err(host_error)?;
        host.path = Some(path.to_path_buf());
        host.mode = mode;
        Ok(host)
    }

    /// Return a builder for creating a new FITS file.
    pub fn create<P: AsRef<Path>>(path: P) -> NewMemHost {
        NewMemHost {
            path: path.as_ref().to_path_buf(),
            overwrite: false,
        }
    }

    /// Serialize every segment into a FITS byte stream.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Image(img) => {
                    out.extend_from_slice(&serialize_header(&img.header(i == 0)));
                    out.extend_from_slice(&img.data);
                    out.resize(out.len() + padded_byte_len(img.data.len()) - img.data.len(), 0);
                }
                Segment::Opaque(raw) => out.extend_from_slice(raw),
            }
        }
        out
    }

    /// Write the in-memory data to disk if opened for writing.
    pub fn flush(&self) -> Result<()> {
        if let (Some(path), FileOpenMode::ReadWrite) = (&self.path, self.mode) {
            std::fs::write(path, self.to_bytes())?;
        }
        Ok(())
    }

    /// Set or clear the BLANK value that marks undefined integer pixels.
    pub fn set_blank(&mut self, segment: SegmentId, blank: Option<i64>) -> HostResult<()> {
        let img = self.image_mut(segment)?;
        if img.bitpix < 0 {
            return Err(Status::BAD_DATATYPE);
        }
        img.blank = blank;
        Ok(())
    }

    /// Return the file path, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Return the open mode.
    pub fn mode(&self) -> FileOpenMode {
        self.mode
    }

    fn image(&self, segment: SegmentId) -> HostResult<&ImageSegment> {
        match self.segments.get(segment.0) {
            Some(Segment::Image(img)) => Ok(img),
            Some(Segment::Opaque(_)) => Err(Status::NOT_IMAGE),
            None => Err(Status::BAD_HDU_NUM),
        }
    }

    fn image_mut(&mut self, segment: SegmentId) -> HostResult<&mut ImageSegment> {
        if self.mode == FileOpenMode::ReadOnly {
            return Err(Status::WRITE_ERROR);
        }
        match self.segments.get_mut(segment.0) {
            Some(Segment::Image(img)) => Ok(img),
            Some(Segment::Opaque(_)) => Err(Status::NOT_IMAGE),
            None => Err(Status::BAD_HDU_NUM),
        }
    }
}

fn data_len(cards: &[Card]) -> HostResult<usize> {
    let integer = |name: &str| {
        cards
            .iter()
            .find(|c| c.keyword() == name)
            .and_then(Card::as_integer)
    };
    let bitpix = integer("BITPIX").ok_or(Status::BAD_BITPIX)?;
    let bpp = bytes_per_pixel(bitpix)?;
    let naxis = integer("NAXIS")
        .and_then(|n| usize::try_from(n).ok())
        .ok_or(Status::BAD_NAXIS)?;
    let mut naxes = Vec::with_capacity(naxis);
    for axis in 1..=naxis {
        let n = integer(&format!("NAXIS{axis}"))
            .and_then(|n| usize::try_from(n).ok())
            .ok_or(Status::BAD_NAXES)?;
        naxes.push(n);
    }
    let groups = cards
        .iter()
        .any(|c| c.keyword() == "GROUPS" && c.as_logical() == Some(true));
    let elements = if groups {
        naxes.iter().skip(1).product()
    } else {
        pixel_count(&naxes)
    };
    let pcount = integer("PCOUNT").unwrap_or(0).max(0) as usize;
    let gcount = integer("GCOUNT").unwrap_or(1).max(0) as usize;
    if elements == 0 && pcount == 0 {
        return Ok(0);
    }
    Ok(bpp * gcount * (pcount + elements))
}

impl Drop for MemHost {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(error = %e, "failed to write FITS file on drop");
        }
    }
}

impl NewMemHost {
    /// Set whether to overwrite an existing file.
    pub fn overwrite(mut self) -> Self {
        self.overwrite = true;
        self
    }

    /// Finalize creation: write an empty file and return a writable host.
    pub fn open(self) -> Result<MemHost> {
        if !self.overwrite && self.path.exists() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("file already exists: {}", self.path.display()),
            )));
        }
        std::fs::write(&self.path, [])?;
        Ok(MemHost {
            segments: Vec::new(),
            path: Some(self.path),
            mode: FileOpenMode::ReadWrite,
        })
    }
}

impl Host for MemHost {
    fn segment_count(&mut self) -> usize {
        self.segments.len()
    }

    fn create_image_segment(
        &mut self,
        storage: TypeCode,
        shape: &[usize],
    ) -> HostResult<SegmentId> {
        if self.mode == FileOpenMode::ReadOnly {
            return Err(Status::WRITE_ERROR);
        }
        let img = ImageSegment::new(storage, shape)?;
        self.segments.push(Segment::Image(img));
        let id = SegmentId(self.segments.len() - 1);
        tracing::trace!(hdu = id.hdu_number(), storage, ?shape, "create image segment");
        Ok(id)
    }

    fn resize_image_segment(
        &mut self,
        segment: SegmentId,
        storage: TypeCode,
        shape: &[usize],
    ) -> HostResult<()> {
        let (bitpix, scaling) = storage_layout(storage)?;
        let img = self.image_mut(segment)?;
        let len = pixel_count(shape) * bytes_per_pixel(bitpix)?;
        if bitpix != img.bitpix {
            img.data.clear();
            img.blank = None;
        }
        img.data.resize(len, 0);
        img.bitpix = bitpix;
        img.scaling = scaling;
        img.naxes = shape.to_vec();
        tracing::trace!(hdu = segment.hdu_number(), storage, ?shape, "resize image segment");
        Ok(())
    }

    fn image_storage_code(&mut self, segment: SegmentId) -> HostResult<TypeCode> {
        let img = self.image(segment)?;
        equivalent_code(img.bitpix, img.scaling)
    }

    fn image_dimensionality(&mut self, segment: SegmentId) -> HostResult<usize> {
        Ok(self.image(segment)?.naxes.len())
    }

    fn image_shape(&mut self, segment: SegmentId, ndims: usize) -> HostResult<Vec<usize>> {
        let img = self.image(segment)?;
        Ok(img.naxes.iter().copied().take(ndims).collect())
    }

    fn read_pixels(
        &mut self,
        segment: SegmentId,
        transfer: TypeCode,
        first_pixel: usize,
        count: usize,
        null: Option<&[u8]>,
        out: &mut [u8],
    ) -> HostResult<bool> {
        tracing::trace!(hdu = segment.hdu_number(), transfer, first_pixel, count, "read pixels");
        let img = self.image(segment)?;
        let width = transfer_width(transfer)?;
        if out.len() != count * width || null.is_some_and(|n| n.len() != width) {
            return Err(Status::BAD_DIMEN);
        }
        img.check_linear(first_pixel, count)?;
        let fill = null.map_or(NullFill::Undefined, NullFill::Sentinel);
        img.read_at(transfer, first_pixel - 1..first_pixel - 1 + count, out, fill)
    }

    fn read_pixels_masked(
        &mut self,
        segment: SegmentId,
        transfer: TypeCode,
        first_pixel: usize,
        count: usize,
        mask: &mut [u8],
        out: &mut [u8],
    ) -> HostResult<bool> {
        tracing::trace!(hdu = segment.hdu_number(), transfer, first_pixel, count, "read pixels with mask");
        let img = self.image(segment)?;
        let width = transfer_width(transfer)?;
        if out.len() != count * width || mask.len() != count {
            return Err(Status::BAD_DIMEN);
        }
        img.check_linear(first_pixel, count)?;
        img.read_at(
            transfer,
            first_pixel - 1..first_pixel - 1 + count,
            out,
            NullFill::Mask(mask),
        )
    }

    fn read_subset(
        &mut self,
        segment: SegmentId,
        transfer: TypeCode,
        first: &[usize],
        last: &[usize],
        step: &[usize],
        null: Option<&[u8]>,
        out: &mut [u8],
    ) -> HostResult<bool> {
        tracing::trace!(hdu = segment.hdu_number(), transfer, ?first, ?last, ?step, "read subset");
        let img = self.image(segment)?;
        let width = transfer_width(transfer)?;
        let offsets = img.subset_offsets(first, last, step)?;
        if out.len() != offsets.len() * width || null.is_some_and(|n| n.len() != width) {
            return Err(Status::BAD_DIMEN);
        }
        let fill = null.map_or(NullFill::Undefined, NullFill::Sentinel);
        img.read_at(transfer, offsets.into_iter(), out, fill)
    }

    fn write_pixels(
        &mut self,
        segment: SegmentId,
        transfer: TypeCode,
        first_pixel: usize,
        count: usize,
        input: &[u8],
        null: Option<&[u8]>,
    ) -> HostResult<()> {
        tracing::trace!(hdu = segment.hdu_number(), transfer, first_pixel, count, "write pixels");
        let img = self.image_mut(segment)?;
        let width = transfer_width(transfer)?;
        if input.len() != count * width || null.is_some_and(|n| n.len() != width) {
            return Err(Status::BAD_DIMEN);
        }
        img.check_linear(first_pixel, count)?;
        img.write_at(transfer, first_pixel - 1..first_pixel - 1 + count, input, null)
    }

    fn write_subset(
        &mut self,
        segment: SegmentId,
        transfer: TypeCode,
        first: &[usize],
        last: &[usize],
        input: &[u8],
    ) -> HostResult<()> {
        tracing::trace!(hdu = segment.hdu_number(), transfer, ?first, ?last, "write subset");
        let img = self.image_mut(segment)?;
        let width = transfer_width(transfer)?;
        let step = vec![1; first.len()];
        let offsets = img.subset_offsets(first, last, &step)?;
        if input.len() != offsets.len() * width {
            return Err(Status::BAD_DIMEN);
        }
        img.write_at(transfer, offsets.into_iter(), input, None)
    }
}
