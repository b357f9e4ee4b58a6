use std::fs::File;

use ndarray::{array, s, Array2, Array3};
use tiff::decoder::Decoder;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

use crate::errors::RsgisError;
use crate::raster::native::read_tiff_bands;
use crate::raster::{
    open_raster, DataType, Driver, RasterDataset, RasterDatasetMut, RasterWindow, TiffRaster,
};
use crate::test_utils::{write_test_raster, TempFixture};

#[test]
fn test_driver_by_name() {
    assert_eq!(Driver::by_name("MEM").unwrap(), Driver::Mem);
    assert_eq!(Driver::by_name("GTiff").unwrap().short_name(), "GTiff");
    let err = Driver::by_name("NoSuchFormat").unwrap_err();
    assert!(matches!(err, RsgisError::UnsupportedFormat(ref f) if f == "NoSuchFormat"));
    assert!(err.is_configuration());
}

#[test]
fn test_file_output_refuses_mem() {
    assert_eq!(Driver::for_file_output("GTiff").unwrap(), Driver::NativeTiff);
    let err = Driver::for_file_output("mem").unwrap_err();
    assert!(matches!(err, RsgisError::UnsupportedFormat(ref f) if f.starts_with("mem")));
    assert!(matches!(
        Driver::for_file_output("NoSuchFormat"),
        Err(RsgisError::UnsupportedFormat(ref f)) if f == "NoSuchFormat"
    ));
}

#[cfg(not(feature = "gdal"))]
#[test]
fn test_kea_needs_gdal() {
    assert!(matches!(
        Driver::by_name("KEA"),
        Err(RsgisError::UnsupportedFormat(_))
    ));
}

#[test]
fn test_open_missing_file() {
    let fixture = TempFixture::empty("missing.tif");
    let err = open_raster(fixture.path()).err().unwrap();
    assert!(matches!(err, RsgisError::Io { ref path, .. } if path == fixture.path()));
}

#[test]
fn test_tiff_round_trip_multiband() {
    let fixture = TempFixture::empty("multiband.tif");
    let pixels = Array3::from_shape_fn((3, 5, 7), |(b, r, c)| (b * 100 + r * 10 + c) as f64);
    write_test_raster(fixture.path(), &pixels, DataType::UInt16, Some(0.0)).unwrap();

    let dataset = open_raster(fixture.path()).unwrap();
    assert_eq!(dataset.raster_size(), (7, 5));
    assert_eq!(dataset.band_count(), 3);
    assert_eq!(dataset.data_type(), DataType::UInt16);
    assert_eq!(dataset.no_data_value(2), Some(0.0));

    let window = RasterWindow::new(2, 1, 3, 2);
    let band2 = dataset.read_window(2, &window).unwrap();
    assert_eq!(band2, array![[112.0, 113.0, 114.0], [122.0, 123.0, 124.0]]);
}

#[test]
fn test_tiff_opens_interleaved_rgb() {
    let fixture = TempFixture::empty("rgb.tif");
    let (width, height) = (4u32, 3u32);
    let data: Vec<u8> = (0..width * height)
        .flat_map(|i| [i as u8, 100 + i as u8, 200 + i as u8])
        .collect();
    let mut encoder = TiffEncoder::new(File::create(fixture.path()).unwrap()).unwrap();
    encoder
        .write_image::<colortype::RGB8>(width, height, &data)
        .unwrap();
    drop(encoder);

    let dataset = open_raster(fixture.path()).unwrap();
    assert_eq!(dataset.raster_size(), (4, 3));
    assert_eq!(dataset.band_count(), 3);
    assert_eq!(dataset.data_type(), DataType::UInt8);
    let green = dataset
        .read_window(2, &RasterWindow::new(1, 1, 2, 2))
        .unwrap();
    assert_eq!(green, array![[105.0, 106.0], [109.0, 110.0]]);

    let bands = read_tiff_bands(fixture.path()).unwrap();
    assert_eq!(bands.dim(), (3, 3, 4));
    assert_eq!(bands[[2, 2, 3]], 211.0);
}

#[test]
fn test_tiff_opens_one_page_per_band() {
    let fixture = TempFixture::empty("pages.tif");
    let mut encoder = TiffEncoder::new(File::create(fixture.path()).unwrap()).unwrap();
    for band in 0..2u16 {
        let data: Vec<u16> = (0..6).map(|i| band * 1000 + i).collect();
        encoder
            .write_image::<colortype::Gray16>(3, 2, &data)
            .unwrap();
    }
    drop(encoder);

    let bands = read_tiff_bands(fixture.path()).unwrap();
    assert_eq!(
        bands.slice(s![1, .., ..]),
        array![[1000.0, 1001.0, 1002.0], [1003.0, 1004.0, 1005.0]]
    );
}

#[test]
fn test_tiff_writes_one_interleaved_directory() {
    let fixture = TempFixture::empty("interleaved.tif");
    let pixels = Array3::from_shape_fn((5, 3, 4), |(b, r, c)| (b * 10 + r * 4 + c) as f64);
    write_test_raster(fixture.path(), &pixels, DataType::Int16, None).unwrap();

    let mut decoder = Decoder::new(File::open(fixture.path()).unwrap()).unwrap();
    assert_eq!(decoder.get_tag_u32(Tag::SamplesPerPixel).unwrap(), 5);
    assert_eq!(decoder.get_tag_u32(Tag::PlanarConfiguration).unwrap(), 1);
    assert_eq!(decoder.get_tag_u32_vec(Tag::BitsPerSample).unwrap(), vec![16; 5]);
    assert!(!decoder.more_images());

    assert_eq!(read_tiff_bands(fixture.path()).unwrap(), pixels);
}

#[test]
fn test_tiff_window_across_strips() {
    let fixture = TempFixture::empty("strips.tif");
    let value = |b: usize, r: usize, c: usize| (b * 5000 + r * 7 + c * 3) as f64;
    let pixels = Array3::from_shape_fn((3, 300, 2000), |(b, r, c)| value(b, r, c));
    write_test_raster(fixture.path(), &pixels, DataType::UInt16, None).unwrap();

    let mut decoder = Decoder::new(File::open(fixture.path()).unwrap()).unwrap();
    assert!(decoder.get_tag_u32_vec(Tag::StripOffsets).unwrap().len() > 1);

    let dataset = open_raster(fixture.path()).unwrap();
    let window = RasterWindow::new(1985, 160, 15, 30);
    let block = dataset.read_window(3, &window).unwrap();
    assert_eq!(block.dim(), (30, 15));
    for ((row, col), &v) in block.indexed_iter() {
        assert_eq!(v, value(2, 160 + row, 1985 + col), "({row}, {col})");
    }
}

#[test]
fn test_tiff_update_opened_file() {
    let fixture = TempFixture::empty("update.tif");
    let gt = [10.0, 2.0, 0.0, 50.0, 0.0, -2.0];
    let pixels = Array3::from_shape_fn((2, 3, 3), |(b, r, c)| (b * 9 + r * 3 + c) as f64);
    {
        let mut dataset = Driver::NativeTiff
            .create(fixture.path(), (3, 3), 2, DataType::Float32)
            .unwrap();
        for band in 0..2 {
            dataset
                .write_window(band + 1, &RasterWindow::full((3, 3)), pixels.slice(s![band, .., ..]))
                .unwrap();
        }
        dataset.set_geo_transform(&gt).unwrap();
    }

    {
        let mut dataset = TiffRaster::open(fixture.path()).unwrap();
        dataset
            .write_window(2, &RasterWindow::new(0, 2, 2, 1), array![[-1.0, -2.0]].view())
            .unwrap();
    }

    let dataset = open_raster(fixture.path()).unwrap();
    assert_eq!(dataset.geo_transform(), Some(gt));
    let full = RasterWindow::full((3, 3));
    assert_eq!(dataset.read_window(1, &full).unwrap(), pixels.slice(s![0, .., ..]));
    assert_eq!(
        dataset.read_window(2, &full).unwrap(),
        array![[9.0, 10.0, 11.0], [12.0, 13.0, 14.0], [-1.0, -2.0, 17.0]]
    );
}

#[test]
fn test_tiff_data_types() {
    let values = array![[-3.0, 0.5], [250.0, 70000.0]];
    for (data_type, expected) in [
        (DataType::UInt8, array![[0.0, 1.0], [250.0, 255.0]]),
        (DataType::Int16, array![[-3.0, 1.0], [250.0, 32767.0]]),
        (DataType::Int32, array![[-3.0, 1.0], [250.0, 70000.0]]),
        (DataType::UInt32, array![[0.0, 1.0], [250.0, 70000.0]]),
        (DataType::Float32, array![[-3.0, 0.5], [250.0, 70000.0]]),
        (DataType::Float64, array![[-3.0, 0.5], [250.0, 70000.0]]),
    ] {
        let fixture = TempFixture::empty("types.tif");
        let mut dataset = Driver::NativeTiff
            .create(fixture.path(), (2, 2), 1, data_type)
            .unwrap();
        dataset
            .write_window(1, &RasterWindow::full((2, 2)), values.view())
            .unwrap();
        dataset.flush().unwrap();
        drop(dataset);

        let back = TiffRaster::open(fixture.path()).unwrap();
        assert_eq!(back.data_type(), data_type);
        assert_eq!(
            back.read_window(1, &RasterWindow::full((2, 2))).unwrap(),
            expected,
            "{data_type}"
        );
    }
}

#[test]
fn test_tiff_geo_transform() {
    let fixture = TempFixture::empty("geo.tif");
    let gt = [500000.0, 30.0, 0.0, 4200000.0, 0.0, -30.0];
    {
        let mut dataset = Driver::NativeTiff
            .create(fixture.path(), (4, 4), 1, DataType::Float32)
            .unwrap();
        dataset.set_geo_transform(&gt).unwrap();
        dataset.set_projection("EPSG:32630").unwrap();
    }
    let dataset = open_raster(fixture.path()).unwrap();
    assert_eq!(dataset.geo_transform(), Some(gt));
    assert_eq!(dataset.projection().as_deref(), Some("EPSG:32630"));
}

#[test]
fn test_tiff_written_on_drop() {
    let fixture = TempFixture::empty("drop.tif");
    {
        let mut dataset = Driver::NativeTiff
            .create(fixture.path(), (3, 2), 1, DataType::Int32)
            .unwrap();
        dataset
            .write_window(
                1,
                &RasterWindow::new(1, 0, 2, 1),
                array![[5.0, 6.0]].view(),
            )
            .unwrap();
    }
    let dataset = open_raster(fixture.path()).unwrap();
    assert_eq!(
        dataset.read_window(1, &RasterWindow::full((3, 2))).unwrap(),
        array![[0.0, 5.0, 6.0], [0.0, 0.0, 0.0]]
    );
}

#[test]
fn test_tiff_statistics() {
    let fixture = TempFixture::empty("stats.tif");
    let mut dataset = Driver::NativeTiff
        .create(fixture.path(), (2, 2), 1, DataType::Float32)
        .unwrap();
    dataset
        .write_window(1, &RasterWindow::full((2, 2)), array![[1.0, 2.0], [3.0, -1.0]].view())
        .unwrap();
    dataset.set_no_data_value(1, Some(-1.0)).unwrap();
    let stats = dataset.compute_statistics(1).unwrap().unwrap();
    assert_eq!(stats.valid_count, 3);
    assert_eq!(stats.min, 1.0);
    assert_eq!(stats.max, 3.0);
    assert!(!dataset.build_overviews(&[2, 4]).unwrap());
    dataset.flush().unwrap();
}

#[test]
fn test_mem_driver_does_not_touch_disk() {
    let fixture = TempFixture::empty("mem.tif");
    let mut dataset = Driver::Mem
        .create(fixture.path(), (2, 2), 1, DataType::UInt8)
        .unwrap();
    dataset
        .write_window(1, &RasterWindow::full((2, 2)), Array2::ones((2, 2)).view())
        .unwrap();
    dataset.flush().unwrap();
    assert!(!fixture.path().exists());
}
