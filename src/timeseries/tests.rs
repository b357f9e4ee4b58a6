use std::f64::consts::PI;
use std::path::PathBuf;

use chrono::NaiveDate;
use ndarray::{Array2, Array3};

use super::*;
use crate::config::ProcessingConfig;
use crate::errors::RsgisError;
use crate::raster::native::read_tiff_bands;
use crate::raster::DataType;
use crate::test_utils::{write_test_raster, TempFixture};

const CLEAR: u8 = 0;
const LOW: u8 = 1;
const HIGH: u8 = 2;

fn dates(count: usize, step: i64) -> Vec<i64> {
    (0..count as i64).map(|i| 735_000 + step * i).collect()
}

fn seasonal(date: i64, mean: f64, amplitude: f64) -> f64 {
    let t = date as f64 * 2.0 * PI / ANNUAL_PERIOD_DAYS;
    mean + amplitude * t.cos() + 0.5 * amplitude * t.sin()
}

/// Single band series following an exact seasonal curve.
fn seasonal_series(count: usize, no_data: Option<f64>) -> PixelTimeSeries {
    let dates = dates(count, 32);
    let values = Array2::from_shape_fn((count, 1), |(i, _)| seasonal(dates[i], 100.0, 20.0));
    PixelTimeSeries::new(dates, values, no_data).unwrap()
}

#[test]
fn flags_only_injected_deviations() {
    let dates = dates(24, 32);
    let mut values = Array2::from_shape_fn((24, 2), |(i, band)| {
        seasonal(dates[i], 100.0 * (band + 1) as f64, 20.0)
    });
    values[[7, 0]] += 80.0;
    values[[15, 1]] -= 90.0;
    let series = PixelTimeSeries::new(dates, values, None).unwrap();

    let (flags, stats) = OutlierScreen::default().screen(&series);
    assert_eq!(flags.dim(), (24, 2));
    for ((t, band), &flag) in flags.indexed_iter() {
        let expected = match (t, band) {
            (7, 0) => HIGH,
            (15, 1) => LOW,
            _ => CLEAR,
        };
        assert_eq!(flag, expected, "date {t}, band {band}");
    }
    assert_eq!(
        stats,
        ScreenStats {
            fits: 2,
            insufficient: 0,
            singular: 0
        }
    );
}

#[test]
fn exact_series_is_all_clear() {
    let series = seasonal_series(20, None);
    let mut stats = ScreenStats::default();
    let flags = OutlierScreen::default().screen_band(&series, 0, &mut stats);
    assert!(flags.iter().all(|&f| f == OutlierFlag::Clear));
    assert_eq!(stats.fits, 1);
}

#[test]
fn too_few_observations_are_all_clear() {
    let mut series = seasonal_series(15, Some(-9999.0));
    for t in [1, 4, 8, 11] {
        series.values[[t, 0]] = -9999.0;
    }
    series.values[[6, 0]] += 500.0;

    let mut stats = ScreenStats::default();
    let flags = OutlierScreen::default().screen_band(&series, 0, &mut stats);
    assert_eq!(flags, vec![OutlierFlag::Clear; 15]);
    assert_eq!(stats.insufficient, 1);
    assert_eq!(stats.fits, 0);

    // the same series passes with a lower minimum
    let mut stats = ScreenStats::default();
    let flags = OutlierScreen::default()
        .with_min_observations(11)
        .screen_band(&series, 0, &mut stats);
    assert_eq!(flags[6], OutlierFlag::High);
    assert_eq!(stats.fits, 1);
}

#[test]
fn no_data_is_never_flagged() {
    let mut series = seasonal_series(22, Some(-9999.0));
    series.values[[2, 0]] = -9999.0;
    series.values[[9, 0]] = f64::NAN;
    series.values[[17, 0]] = -9999.0;
    series.values[[12, 0]] += 75.0;

    let (flags, _) = OutlierScreen::default().screen(&series);
    assert_eq!(flags[[2, 0]], CLEAR);
    assert_eq!(flags[[9, 0]], CLEAR);
    assert_eq!(flags[[17, 0]], CLEAR);
    assert_eq!(flags[[12, 0]], HIGH);
    assert_eq!(flags.iter().filter(|&&f| f != CLEAR).count(), 1);
}

#[test]
fn singular_fit_is_counted_and_clear() {
    let values = Array2::from_shape_fn((14, 1), |(i, _)| i as f64);
    let series = PixelTimeSeries::new(vec![735_000; 14], values, None).unwrap();

    let (flags, stats) = OutlierScreen::default().screen(&series);
    assert!(flags.iter().all(|&f| f == CLEAR));
    assert_eq!(
        stats,
        ScreenStats {
            fits: 0,
            insufficient: 0,
            singular: 1
        }
    );
    assert_eq!(stats.total(), 1);
}

#[test]
fn stats_accumulate() {
    let mut total = ScreenStats::default();
    total += ScreenStats {
        fits: 2,
        insufficient: 1,
        singular: 0,
    };
    total += ScreenStats {
        fits: 1,
        insufficient: 0,
        singular: 3,
    };
    assert_eq!((total.fits, total.insufficient, total.singular), (3, 1, 3));
}

fn tmask_series() -> PixelTimeSeries {
    let dates = dates(20, 36);
    let mut values = Array2::from_shape_fn((20, 3), |(i, band)| {
        seasonal(dates[i], 1000.0 + 500.0 * band as f64, 200.0)
    });
    // cloud
    values[[4, 0]] += 500.0;
    // shadow
    values[[9, 1]] -= 300.0;
    values[[9, 2]] -= 300.0;
    // dark NIR alone is not shadow
    values[[12, 1]] -= 300.0;
    PixelTimeSeries::new(dates, values, None).unwrap()
}

#[test]
fn tmask_classifies_cloud_and_shadow() {
    let screen = TmaskScreen::new(TmaskBands {
        green: 1,
        nir: 2,
        swir: 3,
    });
    assert_eq!(screen.threshold, 40.0);
    assert_eq!(screen.limit, ResidualLimit::Absolute);

    let mut stats = ScreenStats::default();
    let classes = screen.tmask(&tmask_series(), &mut stats).unwrap();
    for (t, class) in classes.iter().enumerate() {
        let expected = match t {
            4 => TmaskClass::Cloud,
            9 => TmaskClass::Shadow,
            _ => TmaskClass::Clear,
        };
        assert_eq!(*class, expected, "date {t}");
    }
    assert_eq!(stats.fits, 3);
}

#[test]
fn tmask_limit_can_follow_fit_rmse() {
    let bands = TmaskBands {
        green: 1,
        nir: 2,
        swir: 3,
    };
    let mut stats = ScreenStats::default();

    // no residual reaches 40 times the RMSE
    let screen = TmaskScreen::new(bands).with_limit(ResidualLimit::RmseMultiple);
    let classes = screen.tmask(&tmask_series(), &mut stats).unwrap();
    assert!(classes.iter().all(|&c| c == TmaskClass::Clear));

    let screen = screen.with_threshold(3.0);
    let classes = screen.tmask(&tmask_series(), &mut stats).unwrap();
    assert_eq!(classes[4], TmaskClass::Cloud);
    assert_eq!(classes[9], TmaskClass::Shadow);
    assert_eq!(
        classes.iter().filter(|&&c| c != TmaskClass::Clear).count(),
        2
    );
}

#[test]
fn tmask_rejects_missing_band() {
    let screen = TmaskScreen::new(TmaskBands::landsat());
    let mut stats = ScreenStats::default();
    let result = screen.tmask(&tmask_series(), &mut stats);
    assert!(matches!(
        result,
        Err(RsgisError::InvalidParameter { name: "nir", .. })
    ));
}

/// Writes one Float64 raster per date of a 3x2 grid; pixel (row 1, col 2)
/// follows a seasonal curve with a deviation at date 6 and pixel (0, 0)
/// is missing at date 2.
fn write_series(fixture: &TempFixture, count: usize) -> (Vec<DatedImage>, Vec<PathBuf>) {
    let start = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
    let mut images = Vec::new();
    let mut outputs = Vec::new();
    for t in 0..count {
        let date = start + chrono::Duration::days(40 * t as i64);
        let mut pixels = Array3::from_elem((1, 2, 3), 7.0);
        pixels[[0, 1, 2]] = seasonal(ordinal_day(date), 100.0, 20.0);
        if t == 6 {
            pixels[[0, 1, 2]] += 50.0;
        }
        if t == 2 {
            pixels[[0, 0, 0]] = -9999.0;
        }
        let path = fixture.sibling(&format!("image_{t}.tif"));
        write_test_raster(&path, &pixels, DataType::Float64, Some(-9999.0)).unwrap();
        images.push(DatedImage::new(date, path));
        outputs.push(fixture.sibling(&format!("flags_{t}.tif")));
    }
    (images, outputs)
}

#[test]
fn image_series_writes_flag_rasters() {
    let fixture = TempFixture::empty("series");
    let (images, outputs) = write_series(&fixture, 16);
    let config = ProcessingConfig::default()
        .with_tile_size(2, 2)
        .with_workers(2);

    let stats = screen_image_series(
        &images,
        &[],
        &outputs,
        "GTiff",
        &OutlierScreen::default(),
        &config,
    )
    .unwrap();
    assert_eq!(stats.fits, 6);
    assert_eq!(stats.total(), 6);

    for (t, output) in outputs.iter().enumerate() {
        let flags = read_tiff_bands(output).unwrap();
        assert_eq!(flags.dim(), (1, 2, 3));
        for ((_, row, col), &flag) in flags.indexed_iter() {
            let expected = if (t, row, col) == (6, 1, 2) { 2.0 } else { 0.0 };
            assert_eq!(flag, expected, "date {t}, pixel ({row}, {col})");
        }
    }
}

#[test]
fn image_series_needs_one_output_per_image() {
    let fixture = TempFixture::empty("series");
    let (images, outputs) = write_series(&fixture, 3);
    let result = screen_image_series(
        &images,
        &[],
        &outputs[..2],
        "GTiff",
        &OutlierScreen::default(),
        &ProcessingConfig::default(),
    );
    assert!(matches!(
        result,
        Err(RsgisError::InvalidParameter {
            name: "outputs",
            ..
        })
    ));
    assert!(!outputs[0].exists());
}

#[test]
fn tmask_series_checks_bands_before_writing() {
    let fixture = TempFixture::empty("series");
    let (images, outputs) = write_series(&fixture, 3);
    let screen = TmaskScreen::new(TmaskBands::landsat());
    let result = tmask_image_series(
        &images,
        &outputs,
        "GTiff",
        &screen,
        &ProcessingConfig::default(),
    );
    assert!(matches!(
        result,
        Err(RsgisError::InvalidParameter { name: "green", .. })
    ));
    assert!(!outputs[0].exists());
}

#[test]
fn image_series_checks_output_format_first() {
    let fixture = TempFixture::empty("series");
    let (images, outputs) = write_series(&fixture, 3);
    let config = ProcessingConfig::default();

    for format in ["NotAFormat", "MEM"] {
        let result = screen_image_series(
            &images,
            &[],
            &outputs,
            format,
            &OutlierScreen::default(),
            &config,
        );
        assert!(
            matches!(result, Err(RsgisError::UnsupportedFormat(_))),
            "{format}"
        );
        let screen = TmaskScreen::new(TmaskBands::landsat());
        let result = tmask_image_series(&images, &outputs, format, &screen, &config);
        assert!(
            matches!(result, Err(RsgisError::UnsupportedFormat(_))),
            "{format}"
        );
    }
    assert!(outputs.iter().all(|output| !output.exists()));
}
