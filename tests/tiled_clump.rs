use ndarray::Array2;
use rsgis::clump::{ConnectedComponentLabeler, Connectivity, TiledClumper, TwoPassLabeler};
use rsgis::config::ProcessingConfig;
use rsgis::raster::native::read_tiff_bands;
use rsgis::raster::DataType;
use rsgis::test_utils::{write_test_band, TempFixture};

/// Rings, bars and a diagonal staircase on a 50x70 grid.
fn shapes() -> Array2<f64> {
    Array2::from_shape_fn((50, 70), |(row, col)| {
        let (y, x) = (row as i64, col as i64);
        let ring = (x - 20).pow(2) + (y - 25).pow(2);
        if (100..=196).contains(&ring) {
            1.0
        } else if col % 9 == 0 && row > 10 {
            2.0
        } else if col > 45 && (col - 45) == row / 2 {
            3.0
        } else {
            0.0
        }
    })
}

fn clump_to_file(fixture: &TempFixture, name: &str, tile: usize, workers: usize) -> Array2<f64> {
    let output = fixture.sibling(name);
    let config = ProcessingConfig::default()
        .with_tile_size(tile, tile)
        .with_workers(workers)
        .with_connectivity(Connectivity::Eight);
    let summary = TiledClumper::new(config)
        .unwrap()
        .clump_raster(fixture.path(), 1, &output, "GTiff")
        .unwrap();
    let labels = read_tiff_bands(&output)
        .unwrap()
        .index_axis_move(ndarray::Axis(0), 0);
    assert_eq!(labels.iter().cloned().fold(0.0, f64::max), summary.clump_count as f64);
    labels
}

#[test]
fn labels_do_not_depend_on_workers() {
    let fixture = TempFixture::empty("shapes.tif");
    write_test_band(fixture.path(), &shapes(), DataType::UInt8, Some(0.0)).unwrap();

    let single = clump_to_file(&fixture, "one.tif", 16, 1);
    let pooled = clump_to_file(&fixture, "four.tif", 16, 4);
    assert_eq!(single, pooled);
}

#[test]
fn clump_count_matches_single_pass() {
    let fixture = TempFixture::empty("shapes.tif");
    let data = shapes();
    write_test_band(fixture.path(), &data, DataType::UInt8, Some(0.0)).unwrap();

    let (_, expected) = TwoPassLabeler::default().label(data.view(), Connectivity::Eight);
    for (tile, name) in [(5, "t5.tif"), (13, "t13.tif"), (128, "t128.tif")] {
        let labels = clump_to_file(&fixture, name, tile, 3);
        assert_eq!(
            labels.iter().cloned().fold(0.0, f64::max) as u32,
            expected,
            "tile size {tile}"
        );
        for (&label, &value) in labels.iter().zip(data.iter()) {
            assert_eq!(label == 0.0, value == 0.0);
        }
    }
}

#[test]
fn union_joins_regions_of_either_input() {
    let fixture = TempFixture::empty("a.tif");
    let b_path = fixture.sibling("b.tif");
    let output = fixture.sibling("union.tif");

    // two horizontal bars in a, joined by a vertical bar in b
    let mut a = Array2::zeros((12, 12));
    let mut b = Array2::zeros((12, 12));
    for col in 1..11 {
        a[[2, col]] = 5.0;
        a[[9, col]] = 6.0;
    }
    for row in 2..10 {
        b[[row, 6]] = 1.0;
    }
    b[[0, 0]] = 1.0;
    write_test_band(fixture.path(), &a, DataType::UInt8, None).unwrap();
    write_test_band(&b_path, &b, DataType::UInt8, None).unwrap();

    let config = ProcessingConfig::default()
        .with_tile_size(5, 5)
        .with_connectivity(Connectivity::Four);
    let summary = TiledClumper::new(config)
        .unwrap()
        .clump_union(fixture.path(), &b_path, &output, "GTiff")
        .unwrap();
    assert_eq!(summary.clump_count, 2);

    let labels = read_tiff_bands(&output).unwrap();
    assert_eq!(labels[[0, 0, 0]], 1.0);
    assert_eq!(labels[[0, 2, 1]], 2.0);
    assert_eq!(labels[[0, 9, 10]], 2.0);
    assert_eq!(labels[[0, 5, 6]], 2.0);
    assert_eq!(labels[[0, 5, 5]], 0.0);
}
