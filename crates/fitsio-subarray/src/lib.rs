//! Typed N-dimensional sub-array access to FITS image HDUs.
//!
//! The crate sits between ndarray buffers and a FITS container reached
//! through the narrow [`host::Host`] interface. It resolves slice
//! expressions into per-axis first/step/last triples, validates them against
//! the live image shape, and picks one of three transfer paths (whole image,
//! linear pixel run, rectangular subset) with undefined-pixel handling.
//!
//! ```no_run
//! use fitsio_subarray::{FitsFile, IndexSpec};
//!
//! # fn main() -> fitsio_subarray::Result<()> {
//! let mut file = FitsFile::create("cube.fits").overwrite().open()?;
//! let hdu = file.create_image::<f32>(&[64, 64, 8])?;
//! let plane = hdu.read_region(&mut file, &[IndexSpec::All, IndexSpec::All, 3.into()])?;
//! assert_eq!(plane.shape(), &[64, 64]);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod fitsfile;
pub mod host;
pub mod image;
pub mod subarray;
pub mod transfer;
pub mod types;

pub use error::{Error, Result};
pub use fitsfile::{FitsFile, NewFitsFile};
pub use host::{FileOpenMode, Host, MemHost, SegmentId, Status};
pub use image::{fits_array, ImageDescription, ImageHdu};
pub use subarray::{resolve, Geometry, IndexSpec};
pub use transfer::{Nulls, Pixel, ReadOutcome, Selection, TransferMode};
pub use types::{CodeScheme, Element, ElementType, TypeCode};
