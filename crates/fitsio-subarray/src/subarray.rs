//! Turning per-axis index specifications into transfer geometry.
//!
//! Indices are 1-based and ranges are inclusive at both ends, matching the
//! pixel numbering of the FITS libraries. Axis 1 varies fastest.

use std::ops::{RangeFull, RangeInclusive};

use crate::error::{Error, Result};

/// How one axis of an image is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSpec {
    /// A single index. The axis is collapsed out of the output shape.
    Index(usize),
    /// Every index along the axis.
    All,
    /// `first, first + step, ...` up to and including `last` when reached.
    Range { first: usize, step: usize, last: usize },
}

impl IndexSpec {
    /// The unit-step range `first..=last`.
    pub fn range(first: usize, last: usize) -> Self {
        IndexSpec::Range {
            first,
            step: 1,
            last,
        }
    }

    pub fn stepped(first: usize, step: usize, last: usize) -> Self {
        IndexSpec::Range { first, step, last }
    }
}

impl From<usize> for IndexSpec {
    fn from(i: usize) -> Self {
        IndexSpec::Index(i)
    }
}

impl From<RangeInclusive<usize>> for IndexSpec {
    fn from(r: RangeInclusive<usize>) -> Self {
        IndexSpec::range(*r.start(), *r.end())
    }
}

impl From<RangeFull> for IndexSpec {
    fn from(_: RangeFull) -> Self {
        IndexSpec::All
    }
}

/// Resolved per-axis first/step/last triples and the shape they produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    /// One entry per non-scalar spec, in axis order.
    pub output_shape: Vec<usize>,
    pub first: Vec<usize>,
    pub step: Vec<usize>,
    pub last: Vec<usize>,
}

impl Geometry {
    /// Number of pixels the geometry selects.
    pub fn pixel_count(&self) -> usize {
        self.first
            .iter()
            .zip(&self.step)
            .zip(&self.last)
            .map(|((&f, &s), &l)| range_len(f, s, l))
            .product()
    }
}

/// Number of indices in the inclusive range `first..=last` taken every
/// `step`. Callers guarantee `first <= last` and `step > 0`.
pub fn range_len(first: usize, step: usize, last: usize) -> usize {
    (last - first) / step + 1
}

/// The last index `first..=last` actually reaches when taken every `step`.
/// Same preconditions as [`range_len`].
pub fn last_reached(first: usize, step: usize, last: usize) -> usize {
    first + (range_len(first, step, last) - 1) * step
}

/// Validate `specs` against `shape` and compute the transfer geometry.
///
/// Missing trailing specs address the whole axis. More specs than axes is a
/// [`Error::DimensionMismatch`]; any reached index outside its axis, an empty
/// range, or a zero step is an [`Error::OutOfBounds`]. A range's `last` may
/// lie past the axis as long as the stride stops inside it, and the resolved
/// `last` is always the final index reached.
pub fn resolve(shape: &[usize], specs: &[IndexSpec]) -> Result<Geometry> {
    if specs.len() > shape.len() {
        return Err(Error::DimensionMismatch(format!(
            "too few dimensions: {} index specs for a {}-axis image",
            specs.len(),
            shape.len()
        )));
    }

    let ndim = shape.len();
    let mut geometry = Geometry {
        output_shape: Vec::with_capacity(ndim),
        first: Vec::with_capacity(ndim),
        step: Vec::with_capacity(ndim),
        last: Vec::with_capacity(ndim),
    };

    for (axis, &extent) in shape.iter().enumerate() {
        let spec = specs.get(axis).copied().unwrap_or(IndexSpec::All);
        let (first, step, last) = match spec {
            IndexSpec::Index(i) => {
                if i == 0 || i > extent {
                    return Err(Error::OutOfBounds(format!(
                        "index {i} outside axis {} of length {extent}",
                        axis + 1
                    )));
                }
                (i, 1, i)
            }
            IndexSpec::All => {
                geometry.output_shape.push(extent);
                (1, 1, extent)
            }
            IndexSpec::Range { first, step, last } => {
                if step == 0 {
                    return Err(Error::OutOfBounds(format!(
                        "zero step on axis {}",
                        axis + 1
                    )));
                }
                if first == 0 || first > last {
                    return Err(Error::OutOfBounds(format!(
                        "empty range {first}..={last} on axis {}",
                        axis + 1
                    )));
                }
                let count = range_len(first, step, last);
                let reached = last_reached(first, step, last);
                if reached > extent {
                    return Err(Error::OutOfBounds(format!(
                        "range {first}..={last} reaches {reached} outside axis {} of length {extent}",
                        axis + 1
                    )));
                }
                geometry.output_shape.push(count);
                (first, step, reached)
            }
        };
        geometry.first.push(first);
        geometry.step.push(step);
        geometry.last.push(last);
    }

    Ok(geometry)
}
