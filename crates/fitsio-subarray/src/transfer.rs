//! Moving pixels between ndarray buffers and an image segment.
//!
//! A [`Selection`] names which pixels take part in a transfer. It is
//! classified once into a [`TransferMode`]: the whole image, a linear run
//! of pixels, or a rectangular subset. Every check runs before the host is
//! called, so a rejected transfer leaves the file untouched.
//!
//! Buffers are addressed in FITS order: the first axis varies fastest, so
//! they must be contiguous in column-major (Fortran) layout. See
//! [`crate::image::fits_array`] for allocating one.

use ndarray::{ArrayViewD, ArrayViewMutD};

use crate::error::{Error, Result};
use crate::fitsfile::FitsFile;
use crate::host::Host;
use crate::image::ImageHdu;
use crate::subarray::{last_reached, range_len, Geometry};
use crate::types::{routine_name, Element};

/// One endpoint of a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pixel {
    /// A 1-based linear pixel number.
    Offset(usize),
    /// 1-based coordinates, one per axis.
    Coords(Vec<usize>),
}

impl From<usize> for Pixel {
    fn from(p: usize) -> Self {
        Pixel::Offset(p)
    }
}

impl From<Vec<usize>> for Pixel {
    fn from(c: Vec<usize>) -> Self {
        Pixel::Coords(c)
    }
}

impl From<&[usize]> for Pixel {
    fn from(c: &[usize]) -> Self {
        Pixel::Coords(c.to_vec())
    }
}

/// The optional first/step/last parameters of a transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub first: Option<Pixel>,
    pub step: Option<Vec<usize>>,
    pub last: Option<Pixel>,
}

/// How a [`Selection`] will be carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferMode {
    /// Every pixel; the buffer must have the image's shape.
    FullImage,
    /// A run of consecutive pixels. A missing endpoint is derived from the
    /// buffer length.
    LinearRange {
        first: Option<usize>,
        last: Option<usize>,
    },
    /// A strided hyper-rectangle given by per-axis corners.
    Rectangular {
        first: Vec<usize>,
        step: Vec<usize>,
        last: Vec<usize>,
    },
    /// A contradictory combination of parameters.
    Invalid(&'static str),
}

impl Selection {
    /// The whole image.
    pub fn full() -> Self {
        Selection::default()
    }

    pub fn starting_at(first: impl Into<Pixel>) -> Self {
        Selection {
            first: Some(first.into()),
            ..Selection::default()
        }
    }

    pub fn ending_at(last: impl Into<Pixel>) -> Self {
        Selection {
            last: Some(last.into()),
            ..Selection::default()
        }
    }

    /// Both endpoints, inclusive.
    pub fn span(first: impl Into<Pixel>, last: impl Into<Pixel>) -> Self {
        Selection {
            first: Some(first.into()),
            step: None,
            last: Some(last.into()),
        }
    }

    /// A unit-step rectangle between two corners.
    pub fn subset(first: Vec<usize>, last: Vec<usize>) -> Self {
        Selection::span(first, last)
    }

    pub fn strided_subset(first: Vec<usize>, step: Vec<usize>, last: Vec<usize>) -> Self {
        Selection {
            first: Some(Pixel::Coords(first)),
            step: Some(step),
            last: Some(Pixel::Coords(last)),
        }
    }

    /// The rectangle described by a resolved [`Geometry`].
    pub fn from_geometry(geometry: &Geometry) -> Self {
        Selection::strided_subset(
            geometry.first.clone(),
            geometry.step.clone(),
            geometry.last.clone(),
        )
    }

    /// Replace the step vector.
    pub fn with_step(mut self, step: Vec<usize>) -> Self {
        self.step = Some(step);
        self
    }

    /// Classify the parameters into a transfer mode.
    pub fn mode(&self) -> TransferMode {
        use Pixel::{Coords, Offset};

        match (&self.first, &self.step, &self.last) {
            (Some(Coords(first)), step, Some(Coords(last))) => TransferMode::Rectangular {
                first: first.clone(),
                step: step.clone().unwrap_or_else(|| vec![1; first.len()]),
                last: last.clone(),
            },
            (_, Some(_), _) => {
                TransferMode::Invalid("a step requires both first and last coordinates")
            }
            (None, None, None) => TransferMode::FullImage,
            (Some(Coords(_)), None, None) | (None, None, Some(Coords(_))) => {
                TransferMode::Invalid("a rectangular subset requires both first and last")
            }
            (Some(Offset(_)), None, Some(Coords(_))) | (Some(Coords(_)), None, Some(Offset(_))) => {
                TransferMode::Invalid("cannot mix a pixel offset with coordinates")
            }
            (first, None, last) => TransferMode::LinearRange {
                first: offset(first),
                last: offset(last),
            },
        }
    }
}

fn offset(p: &Option<Pixel>) -> Option<usize> {
    match p {
        Some(Pixel::Offset(o)) => Some(*o),
        _ => None,
    }
}

/// Where undefined pixels are reported during a read.
#[derive(Debug)]
pub enum Nulls<'a, T> {
    /// Store this value in place of each undefined pixel.
    Sentinel(T),
    /// Set the matching mask element for each undefined pixel. Not supported
    /// for rectangular subsets.
    Mask(ArrayViewMutD<'a, bool>),
}

/// Result of a successful read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadOutcome {
    /// Whether any transferred pixel was undefined.
    pub any_null: bool,
}

enum Plan {
    Linear {
        first: usize,
        count: usize,
    },
    Subset {
        first: Vec<usize>,
        step: Vec<usize>,
        last: Vec<usize>,
    },
}

const NOT_FORTRAN: &str = "buffer must be contiguous in column-major order";

fn fortran_slice<'b, T>(a: &'b ArrayViewD<'_, T>) -> Option<&'b [T]> {
    if !a.t().is_standard_layout() {
        return None;
    }
    a.as_slice_memory_order()
}

fn fortran_slice_mut<'b, T>(a: &'b mut ArrayViewMutD<'_, T>) -> Option<&'b mut [T]> {
    if !a.t().is_standard_layout() {
        return None;
    }
    a.as_slice_memory_order_mut()
}

/// Check the mode against the live image shape and the buffer.
fn plan(mode: TransferMode, shape: &[usize], buffer_shape: &[usize], len: usize) -> Result<Plan> {
    let total: usize = if shape.is_empty() {
        0
    } else {
        shape.iter().product()
    };

    match mode {
        TransferMode::FullImage => {
            if buffer_shape != shape || len != total {
                return Err(Error::DimensionMismatch(format!(
                    "buffer shape {buffer_shape:?} does not match image shape {shape:?}"
                )));
            }
            Ok(Plan::Linear {
                first: 1,
                count: len,
            })
        }
        TransferMode::LinearRange { first, last } => {
            let first = match (first, last) {
                (Some(f), None) => f,
                (None, Some(l)) => {
                    if l < len {
                        return Err(Error::OutOfRange(format!(
                            "{len} pixels cannot end at pixel {l}"
                        )));
                    }
                    l + 1 - len
                }
                (Some(f), Some(l)) => {
                    if l < f || l - f != len - 1 {
                        return Err(Error::DimensionMismatch(format!(
                            "pixels {f}..={l} do not match a buffer of {len}"
                        )));
                    }
                    f
                }
                (None, None) => 1,
            };
            if first == 0 || first > total || len > total - (first - 1) {
                return Err(Error::OutOfRange(format!(
                    "{len} pixels from pixel {first} outside an image of {total}"
                )));
            }
            Ok(Plan::Linear { first, count: len })
        }
        TransferMode::Rectangular { first, step, last } => {
            let ndim = shape.len();
            if first.len() != ndim || step.len() != ndim || last.len() != ndim {
                return Err(Error::DimensionMismatch(format!(
                    "subset corners have {}/{}/{} entries for a {ndim}-axis image",
                    first.len(),
                    step.len(),
                    last.len()
                )));
            }
            let mut last = last;
            for axis in 0..ndim {
                let (f, s, l) = (first[axis], step[axis], last[axis]);
                if f == 0 || s == 0 || f > l || last_reached(f, s, l) > shape[axis] {
                    return Err(Error::OutOfRange(format!(
                        "subset {f}:{s}:{l} outside axis {} of length {}",
                        axis + 1,
                        shape[axis]
                    )));
                }
                last[axis] = last_reached(f, s, l);
            }
            let count: usize = (0..ndim)
                .map(|d| range_len(first[d], step[d], last[d]))
                .product();
            if count != len {
                return Err(Error::DimensionMismatch(format!(
                    "subset selects {count} pixels but the buffer holds {len}"
                )));
            }
            Ok(Plan::Subset { first, step, last })
        }
        TransferMode::Invalid(reason) => Err(Error::InvalidArgument(reason)),
    }
}

/// Read pixels of `hdu` into `buffer`.
///
/// With no `nulls`, undefined pixels read as NaN in float buffers and zero
/// in integer buffers; [`ReadOutcome::any_null`] reports them either way.
pub fn read_into<T: Element, H: Host>(
    file: &mut FitsFile<H>,
    hdu: &ImageHdu<T>,
    mut buffer: ArrayViewMutD<'_, T>,
    selection: &Selection,
    nulls: Option<Nulls<'_, T>>,
) -> Result<ReadOutcome> {
    let mode = selection.mode();
    if let TransferMode::Invalid(reason) = mode {
        return Err(Error::InvalidArgument(reason));
    }
    let (sentinel, mut mask) = match nulls {
        None => (None, None),
        Some(Nulls::Sentinel(v)) => (Some(v), None),
        Some(Nulls::Mask(m)) => (None, Some(m)),
    };
    if mask.is_some() && matches!(mode, TransferMode::Rectangular { .. }) {
        return Err(Error::InvalidArgument(
            "a null mask cannot be used with a rectangular subset",
        ));
    }
    if let Some(m) = &mask {
        if m.shape() != buffer.shape() {
            return Err(Error::DimensionMismatch(format!(
                "mask shape {:?} does not match buffer shape {:?}",
                m.shape(),
                buffer.shape()
            )));
        }
    }

    let transfer = T::transfer_code()?;
    let buffer_shape = buffer.shape().to_vec();
    let out = fortran_slice_mut(&mut buffer).ok_or(Error::InvalidArgument(NOT_FORTRAN))?;
    let mask = match mask.as_mut() {
        Some(m) => Some(fortran_slice_mut(m).ok_or(Error::InvalidArgument(NOT_FORTRAN))?),
        None => None,
    };
    if out.is_empty() {
        return Ok(ReadOutcome { any_null: false });
    }

    let shape = hdu.shape(file)?;
    let segment = hdu.segment();
    tracing::debug!(hdu = segment.hdu_number(), ?mode, "read pixels");
    let len = out.len();
    let plan = plan(mode, &shape, &buffer_shape, len)?;

    let bytes: &mut [u8] = bytemuck::cast_slice_mut(out);
    let null = sentinel.as_ref().map(bytemuck::bytes_of);
    let any_null = match plan {
        Plan::Linear { first, count } => match mask {
            Some(mask) => {
                let routine = routine_name("ffgpf", T::ELEMENT)?;
                tracing::trace!(%routine, first, count, "host read with mask");
                let mut flags = vec![0u8; count];
                let any = file.call(|h| {
                    h.read_pixels_masked(segment, transfer, first, count, &mut flags, bytes)
                })?;
                for (m, &f) in mask.iter_mut().zip(&flags) {
                    *m = f != 0;
                }
                any
            }
            None => {
                let routine = routine_name("ffgpv", T::ELEMENT)?;
                tracing::trace!(%routine, first, count, "host read");
                file.call(|h| h.read_pixels(segment, transfer, first, count, null, bytes))?
            }
        },
        Plan::Subset { first, step, last } => {
            let routine = routine_name("ffgsv", T::ELEMENT)?;
            tracing::trace!(%routine, ?first, ?step, ?last, "host subset read");
            file.call(|h| h.read_subset(segment, transfer, &first, &last, &step, null, bytes))?
        }
    };
    Ok(ReadOutcome { any_null })
}

/// Write `buffer` into the pixels of `hdu`.
///
/// Values equal to `sentinel` are stored as undefined. Rectangular writes
/// accept neither a sentinel nor a non-unit step.
pub fn write_from<T: Element, H: Host>(
    file: &mut FitsFile<H>,
    hdu: &ImageHdu<T>,
    buffer: ArrayViewD<'_, T>,
    selection: &Selection,
    sentinel: Option<T>,
) -> Result<()> {
    let mode = selection.mode();
    match &mode {
        TransferMode::Invalid(reason) => return Err(Error::InvalidArgument(*reason)),
        TransferMode::Rectangular { step, .. } => {
            if sentinel.is_some() {
                return Err(Error::InvalidArgument(
                    "a null sentinel cannot be used with a rectangular subset",
                ));
            }
            if step.iter().any(|&s| s != 1) {
                return Err(Error::InvalidArgument(
                    "rectangular writes do not support a step",
                ));
            }
        }
        _ => {}
    }

    let transfer = T::transfer_code()?;
    let input = fortran_slice(&buffer).ok_or(Error::InvalidArgument(NOT_FORTRAN))?;
    if input.is_empty() {
        return Ok(());
    }

    let shape = hdu.shape(file)?;
    let segment = hdu.segment();
    tracing::debug!(hdu = segment.hdu_number(), ?mode, "write pixels");
    let plan = plan(mode, &shape, buffer.shape(), input.len())?;

    let bytes: &[u8] = bytemuck::cast_slice(input);
    let null = sentinel.as_ref().map(bytemuck::bytes_of);
    match plan {
        Plan::Linear { first, count } => {
            let prefix = if null.is_some() { "ffppn" } else { "ffppr" };
            let routine = routine_name(prefix, T::ELEMENT)?;
            tracing::trace!(%routine, first, count, "host write");
            file.call(|h| h.write_pixels(segment, transfer, first, count, bytes, null))
        }
        Plan::Subset { first, last, .. } => {
            let routine = routine_name("ffpss", T::ELEMENT)?;
            tracing::trace!(%routine, ?first, ?last, "host subset write");
            file.call(|h| h.write_subset(segment, transfer, &first, &last, bytes))
        }
    }
}
