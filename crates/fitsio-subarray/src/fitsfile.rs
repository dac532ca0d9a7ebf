use std::path::Path;

use crate::error::{Error, Result};
use crate::host::{Host, HostResult, MemHost, NewMemHost, SegmentId};
use crate::image::{ImageDescription, ImageHdu};
use crate::types::{type_for_code, CodeScheme, Element};

/// An open FITS file, reached through a [`Host`].
///
/// Segment positions are 0-based: the primary array is segment 0.
#[derive(Debug)]
pub struct FitsFile<H: Host = MemHost> {
    host: H,
}

/// Builder for creating a new FITS file.
pub struct NewFitsFile {
    inner: NewMemHost,
}

impl FitsFile<MemHost> {
    /// Open an existing FITS file in read-only mode.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(FitsFile::from_host(MemHost::open(path)?))
    }

    /// Open an existing FITS file for editing.
    pub fn edit<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(FitsFile::from_host(MemHost::edit(path)?))
    }

    /// Return a builder for creating a new FITS file.
    pub fn create<P: AsRef<Path>>(path: P) -> NewFitsFile {
        NewFitsFile {
            inner: MemHost::create(path),
        }
    }

    /// An empty file with no backing path.
    pub fn in_memory() -> Self {
        FitsFile::from_host(MemHost::in_memory())
    }

    /// Write the in-memory data to disk if opened for writing.
    pub fn flush(&self) -> Result<()> {
        self.host.flush()
    }
}

impl NewFitsFile {
    /// Set whether to overwrite an existing file.
    pub fn overwrite(self) -> Self {
        NewFitsFile {
            inner: self.inner.overwrite(),
        }
    }

    /// Create the file and return it open for writing.
    pub fn open(self) -> Result<FitsFile> {
        Ok(FitsFile::from_host(self.inner.open()?))
    }
}

impl<H: Host> FitsFile<H> {
    pub fn from_host(host: H) -> Self {
        FitsFile { host }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    /// Run one host call, turning a failure status into [`Error::Host`].
    pub(crate) fn call<R>(&mut self, f: impl FnOnce(&mut H) -> HostResult<R>) -> Result<R> {
        f(&mut self.host).map_err(|status| Error::host(status, self.host.status_message(status)))
    }

    pub fn num_hdus(&mut self) -> usize {
        self.host.segment_count()
    }

    /// Create an image segment of `T` with the given shape.
    ///
    /// The first image of an empty file becomes the primary array; later
    /// ones are appended as IMAGE extensions.
    pub fn create_image<T: Element>(&mut self, shape: &[usize]) -> Result<ImageHdu<T>> {
        let storage = T::storage_code()?;
        let segment = self.call(|h| h.create_image_segment(storage, shape))?;
        tracing::debug!(
            hdu = segment.hdu_number(),
            element = %T::ELEMENT,
            ?shape,
            "created image"
        );
        Ok(ImageHdu::new(segment, shape.len()))
    }

    /// Open the image at segment `index` as an array of `T`.
    pub fn image<T: Element>(&mut self, index: usize) -> Result<ImageHdu<T>> {
        let segment = SegmentId(index);
        let found = self.stored_type(segment)?;
        if found != T::ELEMENT {
            return Err(Error::TypeMismatch {
                expected: T::ELEMENT,
                found,
            });
        }
        let ndims = self.call(|h| h.image_dimensionality(segment))?;
        Ok(ImageHdu::new(segment, ndims))
    }

    /// Element type and shape of the image at segment `index`.
    pub fn image_description(&mut self, index: usize) -> Result<ImageDescription> {
        let segment = SegmentId(index);
        let data_type = self.stored_type(segment)?;
        let ndims = self.call(|h| h.image_dimensionality(segment))?;
        let dimensions = self.call(|h| h.image_shape(segment, ndims))?;
        Ok(ImageDescription {
            data_type,
            dimensions,
        })
    }

    /// Reshape an image, returning a handle for the new shape.
    ///
    /// If the number of axes changes, handles opened before the resize fail
    /// with [`Error::StaleDimensionality`].
    pub fn resize_image<T: Element>(
        &mut self,
        hdu: &ImageHdu<T>,
        shape: &[usize],
    ) -> Result<ImageHdu<T>> {
        let storage = T::storage_code()?;
        let segment = hdu.segment();
        self.call(|h| h.resize_image_segment(segment, storage, shape))?;
        tracing::debug!(hdu = segment.hdu_number(), ?shape, "resized image");
        Ok(ImageHdu::new(segment, shape.len()))
    }

    fn stored_type(&mut self, segment: SegmentId) -> Result<crate::types::ElementType> {
        let code = self.call(|h| h.image_storage_code(segment))?;
        type_for_code(CodeScheme::Storage, code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Status;
    use crate::types::ElementType;

    #[test]
    fn first_image_is_primary() {
        let mut f = FitsFile::in_memory();
        assert_eq!(f.num_hdus(), 0);
        let a = f.create_image::<u8>(&[4]).unwrap();
        let b = f.create_image::<f64>(&[2, 2]).unwrap();
        assert_eq!(a.segment(), SegmentId(0));
        assert_eq!(b.segment(), SegmentId(1));
        assert_eq!(f.num_hdus(), 2);
    }

    #[test]
    fn open_checks_element_type() {
        let mut f = FitsFile::in_memory();
        f.create_image::<i16>(&[4, 5]).unwrap();
        let hdu = f.image::<i16>(0).unwrap();
        assert_eq!(hdu.ndims(), 2);
        assert!(matches!(
            f.image::<f32>(0),
            Err(Error::TypeMismatch {
                expected: ElementType::F32,
                found: ElementType::I16
            })
        ));
    }

    #[test]
    fn unsigned_types_survive_reopen() {
        let mut f = FitsFile::in_memory();
        f.create_image::<u32>(&[3]).unwrap();
        f.create_image::<i8>(&[3]).unwrap();
        assert_eq!(f.image_description(0).unwrap().data_type, ElementType::U32);
        assert_eq!(f.image_description(1).unwrap().data_type, ElementType::I8);
    }

    #[test]
    fn description() {
        let mut f = FitsFile::in_memory();
        f.create_image::<f32>(&[7, 3, 2]).unwrap();
        assert_eq!(
            f.image_description(0).unwrap(),
            ImageDescription {
                data_type: ElementType::F32,
                dimensions: vec![7, 3, 2],
            }
        );
    }

    #[test]
    fn missing_segment_is_a_host_error() {
        let mut f = FitsFile::in_memory();
        let err = f.image::<u8>(3).unwrap_err();
        assert_eq!(err.host_status(), Some(Status::BAD_HDU_NUM.code()));
        assert!(err.to_string().contains("HDU number"));
    }

    #[test]
    fn scaled_short_image_opens_as_f64() {
        use crate::host::card::{serialize_header, Card};

        let mut bytes = serialize_header(&[
            Card::logical("SIMPLE", true),
            Card::integer("BITPIX", 16),
            Card::integer("NAXIS", 1),
            Card::integer("NAXIS1", 2),
            Card::real("BSCALE", 0.5),
        ]);
        let mut data = [0u8; 2880];
        data[..4].copy_from_slice(&[0, 4, 0, 7]);
        bytes.extend_from_slice(&data);

        let mut f = FitsFile::from_host(MemHost::from_bytes(&bytes).unwrap());
        assert_eq!(f.image_description(0).unwrap().data_type, ElementType::F64);
        let hdu = f.image::<f64>(0).unwrap();
        assert_eq!(hdu.read(&mut f).unwrap().as_slice().unwrap(), &[2.0, 3.5]);
        assert!(matches!(
            f.image::<f32>(0),
            Err(Error::TypeMismatch {
                expected: ElementType::F32,
                found: ElementType::F64
            })
        ));
    }

    #[test]
    fn create_and_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.fits");
        {
            let mut f = FitsFile::create(&path).open().unwrap();
            f.create_image::<i64>(&[2, 3]).unwrap();
        }
        let mut f = FitsFile::open(&path).unwrap();
        assert_eq!(f.num_hdus(), 1);
        let hdu = f.image::<i64>(0).unwrap();
        assert_eq!(hdu.shape(&mut f).unwrap(), vec![2, 3]);
    }

    #[test]
    fn create_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.fits");
        drop(FitsFile::create(&path).open().unwrap());
        assert!(matches!(
            FitsFile::create(&path).open(),
            Err(Error::Io(_))
        ));
        assert!(FitsFile::create(&path).overwrite().open().is_ok());
    }
}
