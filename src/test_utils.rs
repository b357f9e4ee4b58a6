//! Helpers shared by unit and integration tests.

use std::path::{Path, PathBuf};

use ndarray::{Array2, Array3, Axis};

use crate::errors::Result;
use crate::raster::{DataType, Driver, RasterDatasetMut, RasterWindow};

/// A struct that contains a temporary directory and a path to a file in that directory.
pub struct TempFixture {
    _temp_dir: tempfile::TempDir,
    temp_path: PathBuf,
}

impl TempFixture {
    /// Creates a temporary directory and path to a non-existent file with given `name`.
    /// Useful for writing results to during testing
    ///
    /// Returns the struct `TempFixture` that contains the temp dir (for clean-up on `drop`)
    /// as well as the empty file path.
    pub fn empty(name: &str) -> Self {
        let _temp_dir = tempfile::tempdir().unwrap();
        let temp_path = _temp_dir.path().join(name);
        Self {
            _temp_dir,
            temp_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.temp_path
    }

    /// A sibling path in the same temporary directory.
    pub fn sibling(&self, name: &str) -> PathBuf {
        self._temp_dir.path().join(name)
    }

    pub fn dir(&self) -> &Path {
        self._temp_dir.path()
    }
}

impl AsRef<Path> for TempFixture {
    fn as_ref(&self) -> &Path {
        self.path()
    }
}

/// Write `(band, row, col)` pixels to a native TIFF at `path`.
pub fn write_test_raster(
    path: &Path,
    pixels: &Array3<f64>,
    data_type: DataType,
    no_data: Option<f64>,
) -> Result<()> {
    let (bands, rows, cols) = pixels.dim();
    let mut dataset = Driver::NativeTiff.create(path, (cols, rows), bands, data_type)?;
    let window = RasterWindow::full((cols, rows));
    for (index, band) in pixels.axis_iter(Axis(0)).enumerate() {
        dataset.write_window(index + 1, &window, band)?;
        dataset.set_no_data_value(index + 1, no_data)?;
    }
    dataset.flush()
}

/// Single band variant of [`write_test_raster`].
pub fn write_test_band(
    path: &Path,
    band: &Array2<f64>,
    data_type: DataType,
    no_data: Option<f64>,
) -> Result<()> {
    write_test_raster(
        path,
        &band.clone().insert_axis(Axis(0)),
        data_type,
        no_data,
    )
}

/// Assert numerical difference between two expressions is less than
/// 64-bit machine epsilon or a specified epsilon.
///
/// # Examples:
/// ```rust, no_run
/// use rsgis::assert_near;
/// use std::f64::consts::{PI, E};
/// assert_near!(PI / E, 1.1557273497909217);
/// // with specified epsilon
/// assert_near!(PI / E, 1.15572734, epsilon = 1e-8);
/// ```
#[macro_export]
macro_rules! assert_near {
    ($left:expr, $right:expr) => {
        $crate::assert_near!($left, $right, epsilon = f64::EPSILON)
    };
    ($left:expr, $right:expr, epsilon = $ep:expr) => {
        assert!(
            ($left - $right).abs() < $ep,
            "|{} - {}| = {} is greater than epsilon {:.4e}",
            $left,
            $right,
            ($left - $right).abs(),
            $ep
        )
    };
}
