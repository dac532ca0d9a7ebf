//! Typed handles to image segments.
//!
//! An [`ImageHdu`] stores only the segment position and the element type and
//! rank it was opened with; pixel data is always reached through the owning
//! [`FitsFile`]. Before any shape-dependent operation the live rank is
//! checked against the declared one, and a handle whose image was reshaped
//! to a different rank must be reopened.

use std::marker::PhantomData;

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, IxDyn, ShapeBuilder};

use crate::error::{Error, Result};
use crate::fitsfile::FitsFile;
use crate::host::{Host, SegmentId};
use crate::subarray::{resolve, IndexSpec};
use crate::transfer::{self, Nulls, ReadOutcome, Selection};
use crate::types::{Element, ElementType};

/// Describes the shape and element type of an image segment.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDescription {
    pub data_type: ElementType,
    pub dimensions: Vec<usize>,
}

/// Allocate a zeroed array in FITS (column-major) order.
pub fn fits_array<T: Clone + Default>(shape: &[usize]) -> ArrayD<T> {
    ArrayD::from_elem(IxDyn(shape).f(), T::default())
}

/// A segment handle with a declared element type and rank.
#[derive(Debug)]
pub struct ImageHdu<T> {
    segment: SegmentId,
    ndims: usize,
    _element: PhantomData<T>,
}

impl<T> Clone for ImageHdu<T> {
    fn clone(&self) -> Self {
        ImageHdu::new(self.segment, self.ndims)
    }
}

impl<T> ImageHdu<T> {
    pub(crate) fn new(segment: SegmentId, ndims: usize) -> Self {
        ImageHdu {
            segment,
            ndims,
            _element: PhantomData,
        }
    }

    /// Position of the segment within its file.
    pub fn segment(&self) -> SegmentId {
        self.segment
    }

    /// The rank the handle was opened with.
    pub fn ndims(&self) -> usize {
        self.ndims
    }
}

impl<T: Element> ImageHdu<T> {
    pub fn element_type(&self) -> ElementType {
        T::ELEMENT
    }

    /// Query the live shape, failing if the image no longer has the
    /// declared number of axes.
    pub fn shape<H: Host>(&self, file: &mut FitsFile<H>) -> Result<Vec<usize>> {
        let live = file.call(|h| h.image_dimensionality(self.segment))?;
        if live != self.ndims {
            return Err(Error::StaleDimensionality {
                declared: self.ndims,
                live,
            });
        }
        file.call(|h| h.image_shape(self.segment, live))
    }

    /// Read the whole image.
    ///
    /// An image with no axes holds no pixels and reads as an empty 1-d array.
    pub fn read<H: Host>(&self, file: &mut FitsFile<H>) -> Result<ArrayD<T>> {
        let shape = self.shape(file)?;
        if shape.is_empty() {
            return Ok(fits_array(&[0]));
        }
        let mut out = fits_array(&shape);
        self.read_into(file, out.view_mut(), &Selection::full(), None)?;
        Ok(out)
    }

    /// Read the sub-array addressed by one spec per leading axis. Axes given
    /// a single index are dropped from the result.
    pub fn read_region<H: Host>(
        &self,
        file: &mut FitsFile<H>,
        specs: &[IndexSpec],
    ) -> Result<ArrayD<T>> {
        let shape = self.shape(file)?;
        let geometry = resolve(&shape, specs)?;
        let mut out = fits_array(&geometry.output_shape);
        self.read_into(
            file,
            out.view_mut(),
            &Selection::from_geometry(&geometry),
            None,
        )?;
        Ok(out)
    }

    /// Read `count` consecutive pixels starting at 1-based pixel `first`.
    pub fn read_section<H: Host>(
        &self,
        file: &mut FitsFile<H>,
        first: usize,
        count: usize,
    ) -> Result<ArrayD<T>> {
        let mut out = fits_array(&[count]);
        self.read_into(file, out.view_mut(), &Selection::starting_at(first), None)?;
        Ok(out)
    }

    /// Read `num_rows` rows starting at 1-based row `start_row`.
    ///
    /// A row is one run of NAXIS1 pixels. The result has shape
    /// `[naxis1, num_rows]`.
    pub fn read_rows<H: Host>(
        &self,
        file: &mut FitsFile<H>,
        start_row: usize,
        num_rows: usize,
    ) -> Result<ArrayD<T>> {
        let shape = self.shape(file)?;
        let row_len = shape.first().copied().unwrap_or(0);
        if start_row == 0 {
            return Err(Error::OutOfRange("rows are numbered from 1".into()));
        }
        let first = (start_row - 1)
            .checked_mul(row_len)
            .and_then(|p| p.checked_add(1))
            .ok_or_else(|| Error::OutOfRange(format!("row {start_row} is past the image")))?;
        let mut out = fits_array(&[row_len, num_rows]);
        self.read_into(file, out.view_mut(), &Selection::starting_at(first), None)?;
        Ok(out)
    }

    /// Write the whole image. `data` must have the image's shape.
    pub fn write<H: Host>(&self, file: &mut FitsFile<H>, data: &ArrayD<T>) -> Result<()> {
        let data = fortran_order(data.view());
        self.write_from(file, data.view(), &Selection::full(), None)
    }

    /// Write `data` into the region addressed by `specs`. The region must use
    /// unit steps and `data` must have the region's shape.
    pub fn write_region<H: Host>(
        &self,
        file: &mut FitsFile<H>,
        specs: &[IndexSpec],
        data: &ArrayD<T>,
    ) -> Result<()> {
        let shape = self.shape(file)?;
        let geometry = resolve(&shape, specs)?;
        if data.shape() != geometry.output_shape.as_slice() {
            return Err(Error::DimensionMismatch(format!(
                "data shape {:?} does not match region shape {:?}",
                data.shape(),
                geometry.output_shape
            )));
        }
        let data = fortran_order(data.view());
        self.write_from(
            file,
            data.view(),
            &Selection::from_geometry(&geometry),
            None,
        )
    }

    /// Read into a caller-provided column-major buffer.
    pub fn read_into<H: Host>(
        &self,
        file: &mut FitsFile<H>,
        buffer: ArrayViewMutD<'_, T>,
        selection: &Selection,
        nulls: Option<Nulls<'_, T>>,
    ) -> Result<ReadOutcome> {
        transfer::read_into(file, self, buffer, selection, nulls)
    }

    /// Write from a caller-provided column-major buffer.
    pub fn write_from<H: Host>(
        &self,
        file: &mut FitsFile<H>,
        buffer: ArrayViewD<'_, T>,
        selection: &Selection,
        sentinel: Option<T>,
    ) -> Result<()> {
        transfer::write_from(file, self, buffer, selection, sentinel)
    }
}

/// Copy into column-major order unless already laid out that way.
fn fortran_order<T: Clone + Default>(data: ArrayViewD<'_, T>) -> ArrayD<T> {
    if data.t().is_standard_layout() {
        return data.to_owned();
    }
    let mut out = fits_array(data.shape());
    out.assign(&data);
    out
}
