//! Round-trip integration tests for fitsio-subarray.
//!
//! Most tests run against an in-memory file; the file-backed ones use a
//! temporary directory.

use fitsio_subarray::host::card::BLOCK_SIZE;
use fitsio_subarray::types::{code_for_type, storage, transfer, type_for_code};
use fitsio_subarray::{
    fits_array, resolve, CodeScheme, Element, ElementType, Error, FitsFile, IndexSpec, MemHost,
    Nulls, Selection, Status,
};
use ndarray::{s, ArrayD, IxDyn, ShapeBuilder};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A column-major array whose values count up in FITS pixel order.
fn counting<T: Element + From<u8>>(shape: &[usize]) -> ArrayD<T> {
    let mut a = fits_array::<T>(shape);
    for (k, v) in a
        .as_slice_memory_order_mut()
        .unwrap()
        .iter_mut()
        .enumerate()
    {
        *v = T::from((k % 200) as u8);
    }
    a
}

fn roundtrip<T: Element + From<u8>>(shape: &[usize]) {
    let mut f = FitsFile::in_memory();
    let hdu = f.create_image::<T>(shape).unwrap();
    let data = counting::<T>(shape);
    hdu.write(&mut f, &data).unwrap();
    let back = hdu.read(&mut f).unwrap();
    assert_eq!(back.shape(), shape);
    assert_eq!(back, data);
}

// ===========================================================================
// Full-image round trips for every numeric element type
// ===========================================================================

#[test]
fn roundtrip_u8() {
    roundtrip::<u8>(&[16, 9]);
}

#[test]
fn roundtrip_i16() {
    roundtrip::<i16>(&[5, 4, 3]);
}

#[test]
fn roundtrip_u16() {
    roundtrip::<u16>(&[7, 7]);
}

#[test]
fn roundtrip_i32() {
    roundtrip::<i32>(&[100]);
}

#[test]
fn roundtrip_u32() {
    roundtrip::<u32>(&[3, 3, 3, 3]);
}

#[test]
fn roundtrip_i64() {
    roundtrip::<i64>(&[8, 2]);
}

#[test]
fn roundtrip_u64() {
    roundtrip::<u64>(&[8, 2]);
}

#[test]
fn roundtrip_f32() {
    roundtrip::<f32>(&[10, 10]);
}

#[test]
fn roundtrip_f64() {
    roundtrip::<f64>(&[4, 5, 6]);
}

#[test]
fn roundtrip_i8_extremes() {
    let mut f = FitsFile::in_memory();
    let hdu = f.create_image::<i8>(&[4]).unwrap();
    let data = ArrayD::from_shape_vec(IxDyn(&[4]), vec![i8::MIN, -1, 0, i8::MAX]).unwrap();
    hdu.write(&mut f, &data).unwrap();
    assert_eq!(hdu.read(&mut f).unwrap(), data);
}

#[test]
fn roundtrip_unsigned_extremes() {
    let mut f = FitsFile::in_memory();
    let a = f.create_image::<u16>(&[3]).unwrap();
    let b = f.create_image::<u64>(&[3]).unwrap();
    let u16s = ArrayD::from_shape_vec(IxDyn(&[3]), vec![0, 32_768, u16::MAX]).unwrap();
    let u64s = ArrayD::from_shape_vec(IxDyn(&[3]), vec![0, 1 << 63, u64::MAX]).unwrap();
    a.write(&mut f, &u16s).unwrap();
    b.write(&mut f, &u64s).unwrap();
    assert_eq!(a.read(&mut f).unwrap(), u16s);
    assert_eq!(b.read(&mut f).unwrap(), u64s);
}

// ===========================================================================
// Sub-region reads match ndarray slicing
// ===========================================================================

#[test]
fn unit_step_region_matches_slice() {
    let mut f = FitsFile::in_memory();
    let hdu = f.create_image::<i32>(&[6, 5]).unwrap();
    let data = counting::<i32>(&[6, 5]);
    hdu.write(&mut f, &data).unwrap();

    let region = hdu
        .read_region(&mut f, &[(2..=4).into(), (3..=5).into()])
        .unwrap();
    assert_eq!(region, data.slice(s![1..4, 2..5]).into_dyn());
}

#[test]
fn strided_region_matches_slice() {
    let mut f = FitsFile::in_memory();
    let hdu = f.create_image::<f64>(&[7, 6, 3]).unwrap();
    let data = counting::<f64>(&[7, 6, 3]);
    hdu.write(&mut f, &data).unwrap();

    let specs = [
        IndexSpec::stepped(1, 3, 7),
        IndexSpec::stepped(2, 2, 6),
        IndexSpec::All,
    ];
    let region = hdu.read_region(&mut f, &specs).unwrap();
    assert_eq!(region.shape(), &[3, 3, 3]);
    assert_eq!(region, data.slice(s![0..7;3, 1..6;2, ..]).into_dyn());
}

#[test]
fn scalar_specs_collapse_axes() {
    let mut f = FitsFile::in_memory();
    let hdu = f.create_image::<u16>(&[4, 3, 2]).unwrap();
    let data = counting::<u16>(&[4, 3, 2]);
    hdu.write(&mut f, &data).unwrap();

    let plane = hdu
        .read_region(&mut f, &[IndexSpec::All, IndexSpec::All, 2.into()])
        .unwrap();
    assert_eq!(plane, data.slice(s![.., .., 1]).into_dyn());

    let pixel = hdu
        .read_region(&mut f, &[3.into(), 1.into(), 2.into()])
        .unwrap();
    assert_eq!(pixel.shape(), &[] as &[usize]);
    assert_eq!(pixel[IxDyn(&[])], data[[2, 0, 1]]);
}

#[test]
fn explicit_geometry_selection() {
    let mut f = FitsFile::in_memory();
    let hdu = f.create_image::<i16>(&[5, 5]).unwrap();
    hdu.write(&mut f, &counting::<i16>(&[5, 5])).unwrap();

    let shape = hdu.shape(&mut f).unwrap();
    let geometry = resolve(&shape, &[IndexSpec::stepped(1, 2, 5), 5.into()]).unwrap();
    assert_eq!(geometry.output_shape, vec![3]);
    let mut out = fits_array::<i16>(&[geometry.pixel_count()]);
    hdu.read_into(
        &mut f,
        out.view_mut(),
        &Selection::from_geometry(&geometry),
        None,
    )
    .unwrap();
    assert_eq!(out.as_slice().unwrap(), &[20, 22, 24]);
}

#[test]
fn region_out_of_bounds() {
    let mut f = FitsFile::in_memory();
    let hdu = f.create_image::<u8>(&[3, 3]).unwrap();
    assert!(matches!(
        hdu.read_region(&mut f, &[4.into()]),
        Err(Error::OutOfBounds(_))
    ));
    assert!(matches!(
        hdu.read_region(&mut f, &[1.into(), 1.into(), 1.into()]),
        Err(Error::DimensionMismatch(_))
    ));
}

// ===========================================================================
// Undefined pixels
// ===========================================================================

#[test]
fn blank_pixels_flagged_in_mask() {
    let mut f = FitsFile::in_memory();
    let hdu = f.create_image::<i16>(&[5, 2]).unwrap();
    f.host_mut().set_blank(hdu.segment(), Some(-32768)).unwrap();

    let mut data = counting::<i16>(&[5, 2]);
    data[[1, 0]] = -32768;
    data[[3, 1]] = -32768;
    data[[4, 1]] = -32768;
    hdu.write(&mut f, &data).unwrap();

    let mut out = fits_array::<i16>(&[5, 2]);
    let mut mask = fits_array::<bool>(&[5, 2]);
    let outcome = hdu
        .read_into(
            &mut f,
            out.view_mut(),
            &Selection::full(),
            Some(Nulls::Mask(mask.view_mut())),
        )
        .unwrap();
    assert!(outcome.any_null);
    assert_eq!(mask.iter().filter(|&&m| m).count(), 3);
    assert!(mask[[1, 0]] && mask[[3, 1]] && mask[[4, 1]]);
    assert_eq!(out[[0, 0]], data[[0, 0]]);
}

#[test]
fn no_blank_pixels_reports_false() {
    let mut f = FitsFile::in_memory();
    let hdu = f.create_image::<i32>(&[4]).unwrap();
    f.host_mut().set_blank(hdu.segment(), Some(-1)).unwrap();
    hdu.write(&mut f, &counting::<i32>(&[4])).unwrap();

    let mut out = fits_array::<i32>(&[4]);
    let mut mask = fits_array::<bool>(&[4]);
    let outcome = hdu
        .read_into(
            &mut f,
            out.view_mut(),
            &Selection::full(),
            Some(Nulls::Mask(mask.view_mut())),
        )
        .unwrap();
    assert!(!outcome.any_null);
    assert!(mask.iter().all(|&m| !m));
}

#[test]
fn float_nulls_via_sentinel() {
    let mut f = FitsFile::in_memory();
    let hdu = f.create_image::<f32>(&[3, 2]).unwrap();
    let data = ArrayD::from_shape_vec(IxDyn(&[3, 2]).f(), vec![1.0, -999.0, 3.0, 4.0, 5.0, -999.0])
        .unwrap();
    hdu.write_from(&mut f, data.view(), &Selection::full(), Some(-999.0))
        .unwrap();

    // Plain read: undefined pixels come back as NaN.
    let back = hdu.read(&mut f).unwrap();
    assert!(back[[1, 0]].is_nan());
    assert!(back[[2, 1]].is_nan());
    assert_eq!(back[[0, 1]], 4.0);

    // Rectangular read with a sentinel.
    let mut out = fits_array::<f32>(&[2, 2]);
    let outcome = hdu
        .read_into(
            &mut f,
            out.view_mut(),
            &Selection::subset(vec![2, 1], vec![3, 2]),
            Some(Nulls::Sentinel(0.5)),
        )
        .unwrap();
    assert!(outcome.any_null);
    assert_eq!(out[[0, 0]], 0.5);
    assert_eq!(out[[1, 0]], 3.0);
    assert_eq!(out[[0, 1]], 5.0);
    assert_eq!(out[[1, 1]], 0.5);
}

#[test]
fn rectangular_read_rejects_mask() {
    let mut f = FitsFile::in_memory();
    let hdu = f.create_image::<f32>(&[3, 2]).unwrap();
    let mut out = fits_array::<f32>(&[3, 2]);
    let mut mask = fits_array::<bool>(&[3, 2]);
    let err = hdu
        .read_into(
            &mut f,
            out.view_mut(),
            &Selection::subset(vec![1, 1], vec![3, 2]),
            Some(Nulls::Mask(mask.view_mut())),
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

// ===========================================================================
// Files on disk
// ===========================================================================

#[test]
fn edit_persists_changes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("edit.fits");
    let data = counting::<f32>(&[4, 4]);
    {
        let mut f = FitsFile::create(&path).open().unwrap();
        f.create_image::<u8>(&[]).unwrap();
        let hdu = f.create_image::<f32>(&[4, 4]).unwrap();
        hdu.write(&mut f, &data).unwrap();
    }

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len() % BLOCK_SIZE, 0);

    {
        let mut f = FitsFile::edit(&path).unwrap();
        let hdu = f.image::<f32>(1).unwrap();
        let patch = ArrayD::from_elem(IxDyn(&[2]), -1.0f32);
        hdu.write_region(&mut f, &[(1..=2).into(), 4.into()], &patch)
            .unwrap();
    }

    let mut f = FitsFile::open(&path).unwrap();
    assert_eq!(f.num_hdus(), 2);
    let primary = f.image::<u8>(0).unwrap();
    assert_eq!(primary.read(&mut f).unwrap().len(), 0);
    let hdu = f.image::<f32>(1).unwrap();
    let back = hdu.read(&mut f).unwrap();
    assert_eq!(back[[0, 3]], -1.0);
    assert_eq!(back[[1, 3]], -1.0);
    assert_eq!(back[[2, 3]], data[[2, 3]]);
}

#[test]
fn read_only_file_rejects_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ro.fits");
    {
        let mut f = FitsFile::create(&path).open().unwrap();
        f.create_image::<i32>(&[3]).unwrap();
    }
    let mut f = FitsFile::open(&path).unwrap();
    let hdu = f.image::<i32>(0).unwrap();
    let err = hdu.write(&mut f, &counting::<i32>(&[3])).unwrap_err();
    assert_eq!(err.host_status(), Some(Status::WRITE_ERROR.code()));
}

#[test]
fn unsigned_storage_uses_offset() {
    let mut f = FitsFile::from_host(MemHost::in_memory());
    let hdu = f.create_image::<u16>(&[1]).unwrap();
    hdu.write(&mut f, &ArrayD::from_elem(IxDyn(&[1]), 0u16))
        .unwrap();
    let bytes = f.host().to_bytes();
    let header = String::from_utf8_lossy(&bytes[..BLOCK_SIZE]).to_string();
    assert!(header.contains("BZERO   =                32768"));
    // 0 is stored as -32768 big-endian.
    assert_eq!(&bytes[BLOCK_SIZE..BLOCK_SIZE + 2], &[0x80, 0x00]);
}

// ===========================================================================
// Handles and type codes
// ===========================================================================

#[test]
fn stale_handle_after_rank_change() {
    let mut f = FitsFile::in_memory();
    let hdu = f.create_image::<f64>(&[4, 4]).unwrap();
    let reshaped = f.resize_image(&hdu, &[2, 2, 4]).unwrap();

    let err = hdu.read(&mut f).unwrap_err();
    assert!(matches!(
        err,
        Error::StaleDimensionality {
            declared: 2,
            live: 3
        }
    ));
    assert_eq!(reshaped.read(&mut f).unwrap().shape(), &[2, 2, 4]);

    // Same rank keeps older handles valid.
    let again = f.resize_image(&reshaped, &[4, 1, 4]).unwrap();
    assert_eq!(reshaped.shape(&mut f).unwrap(), vec![4, 1, 4]);
    assert_eq!(again.ndims(), 3);
}

#[test]
fn reopened_handle_sees_new_rank() {
    let mut f = FitsFile::in_memory();
    let hdu = f.create_image::<i16>(&[6]).unwrap();
    f.resize_image(&hdu, &[2, 3]).unwrap();
    let reopened = f.image::<i16>(0).unwrap();
    assert_eq!(reopened.shape(&mut f).unwrap(), vec![2, 3]);
}

#[test]
fn type_code_dedup_rule() {
    // Logical shares BITPIX 8 with u8 and maps back to u8.
    let code = code_for_type(CodeScheme::Storage, ElementType::Logical).unwrap();
    assert_eq!(code, storage::BYTE_IMG);
    assert_eq!(
        type_for_code(CodeScheme::Storage, code).unwrap(),
        ElementType::U8
    );

    // 64-bit integers keep their first transfer code; the later codes still
    // resolve in reverse.
    assert_eq!(i64::transfer_code().unwrap(), transfer::TLONG);
    assert_eq!(
        type_for_code(CodeScheme::Transfer, transfer::TLONGLONG).unwrap(),
        ElementType::I64
    );
}

#[test]
fn complex_images_are_unsupported() {
    assert!(matches!(
        code_for_type(CodeScheme::Storage, ElementType::Complex32),
        Err(Error::UnsupportedType { .. })
    ));
}
