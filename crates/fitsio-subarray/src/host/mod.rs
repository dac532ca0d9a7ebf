//! The narrow interface to the FITS container library.
//!
//! Everything the addressing layer needs from the underlying format fits in
//! the [`Host`] trait: declaring image segments, querying their dimensions,
//! and moving pixels in three shapes (linear runs, linear runs with a null
//! mask, rectangular subsets). Hosts report failure with a nonzero
//! [`Status`], mirroring the status-code convention of the FITS libraries.
//!
//! All pixel buffers cross the boundary as native-endian bytes tagged with a
//! transfer code; pixel numbers and subset corners are 1-based.

pub mod card;
pub mod memory;
pub mod pixel;

pub use memory::{FileOpenMode, MemHost, NewMemHost};

use crate::types::TypeCode;

/// Nonzero status code reported by a host call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(i32);

impl Status {
    pub const FILE_NOT_OPENED: Status = Status(104);
    pub const WRITE_ERROR: Status = Status(106);
    pub const END_OF_FILE: Status = Status(107);
    pub const READ_ERROR: Status = Status(108);
    pub const NO_END: Status = Status(210);
    pub const BAD_BITPIX: Status = Status(211);
    pub const BAD_NAXIS: Status = Status(212);
    pub const BAD_NAXES: Status = Status(213);
    pub const NO_SIMPLE: Status = Status(221);
    pub const NOT_IMAGE: Status = Status(233);
    pub const UNKNOWN_REC: Status = Status(252);
    pub const BAD_HDU_NUM: Status = Status(301);
    pub const NO_NULL: Status = Status(314);
    pub const BAD_DIMEN: Status = Status(320);
    pub const BAD_PIX_NUM: Status = Status(321);
    pub const BAD_DATATYPE: Status = Status(410);
    pub const NUM_OVERFLOW: Status = Status(412);

    /// Wrap a raw code; `0` means success and yields `None`.
    pub fn from_code(code: i32) -> Option<Status> {
        (code != 0).then_some(Status(code))
    }

    /// The numeric status code.
    pub fn code(self) -> i32 {
        self.0
    }

    /// Standard message text for this status.
    pub fn message(self) -> &'static str {
        match self.0 {
            104 => "could not open the named file",
            106 => "error writing to FITS file",
            107 => "tried to move past end of file",
            108 => "error reading from FITS file",
            210 => "couldn't find END keyword",
            211 => "illegal BITPIX keyword value",
            212 => "illegal NAXIS keyword value",
            213 => "illegal NAXISn keyword value",
            221 => "first keyword not SIMPLE",
            233 => "HDU is not an image",
            252 => "unrecognizable FITS record",
            301 => "HDU number < 1 or > number of HDUs",
            314 => "null value not defined",
            320 => "illegal number of dimensions in array",
            321 => "first pixel number greater than last pixel",
            410 => "bad keyword datatype code",
            412 => "overflow during datatype conversion",
            _ => "unknown error status",
        }
    }
}

/// Result of a host call.
pub type HostResult<T> = core::result::Result<T, Status>;

/// Position of a segment (HDU) within its file, starting at 0 for the primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId(pub usize);

impl SegmentId {
    /// The 1-based HDU number.
    pub fn hdu_number(self) -> usize {
        self.0 + 1
    }
}

/// Capabilities the addressing layer consumes from a FITS container.
///
/// A host is a single open file. Calls are synchronous and the host is not
/// expected to be shared between threads.
pub trait Host {
    /// Number of segments currently in the file.
    fn segment_count(&mut self) -> usize;

    /// Declare a new image segment. The first segment of an empty file
    /// becomes the primary; later ones are appended as extensions.
    fn create_image_segment(
        &mut self,
        storage: TypeCode,
        shape: &[usize],
    ) -> HostResult<SegmentId>;

    /// Change the storage type and shape of an existing image segment.
    fn resize_image_segment(
        &mut self,
        segment: SegmentId,
        storage: TypeCode,
        shape: &[usize],
    ) -> HostResult<()>;

    /// The equivalent storage code of an image segment.
    fn image_storage_code(&mut self, segment: SegmentId) -> HostResult<TypeCode>;

    /// Live number of axes of an image segment.
    fn image_dimensionality(&mut self, segment: SegmentId) -> HostResult<usize>;

    /// Live axis lengths; `ndims` is the caller's expected rank.
    fn image_shape(&mut self, segment: SegmentId, ndims: usize) -> HostResult<Vec<usize>>;

    /// Read `count` pixels starting at `first_pixel`. Undefined pixels are
    /// replaced by `null` when given. Returns whether any pixel was undefined.
    fn read_pixels(
        &mut self,
        segment: SegmentId,
        transfer: TypeCode,
        first_pixel: usize,
        count: usize,
        null: Option<&[u8]>,
        out: &mut [u8],
    ) -> HostResult<bool>;

    /// Read `count` pixels, flagging undefined ones with a nonzero mask byte.
    fn read_pixels_masked(
        &mut self,
        segment: SegmentId,
        transfer: TypeCode,
        first_pixel: usize,
        count: usize,
        mask: &mut [u8],
        out: &mut [u8],
    ) -> HostResult<bool>;

    /// Read the strided hyper-rectangle `first..=last` (per axis).
    #[allow(clippy::too_many_arguments)]
    fn read_subset(
        &mut self,
        segment: SegmentId,
        transfer: TypeCode,
        first: &[usize],
        last: &[usize],
        step: &[usize],
        null: Option<&[u8]>,
        out: &mut [u8],
    ) -> HostResult<bool>;

    /// Write `count` pixels starting at `first_pixel`; values equal to
    /// `null` are stored as undefined.
    fn write_pixels(
        &mut self,
        segment: SegmentId,
        transfer: TypeCode,
        first_pixel: usize,
        count: usize,
        input: &[u8],
        null: Option<&[u8]>,
    ) -> HostResult<()>;

    /// Write the contiguous hyper-rectangle `first..=last` (per axis).
    fn write_subset(
        &mut self,
        segment: SegmentId,
        transfer: TypeCode,
        first: &[usize],
        last: &[usize],
        input: &[u8],
    ) -> HostResult<()>;

    /// Human-readable text for a status.
    fn status_message(&self, status: Status) -> String {
        status.message().to_string()
    }
}
