use log::debug;

use crate::errors::{Result, RsgisError};

/// A rectangular region of a raster's pixel grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RasterWindow {
    pub x_offset: usize,
    pub y_offset: usize,
    pub width: usize,
    pub height: usize,
}

impl RasterWindow {
    pub fn new(x_offset: usize, y_offset: usize, width: usize, height: usize) -> Self {
        RasterWindow {
            x_offset,
            y_offset,
            width,
            height,
        }
    }

    /// The window covering a whole `(width, height)` raster.
    pub fn full(size: (usize, usize)) -> Self {
        RasterWindow::new(0, 0, size.0, size.1)
    }

    /// `(rows, cols)`, the shape of an array holding one band of the window.
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    pub fn x_end(&self) -> usize {
        self.x_offset + self.width
    }

    pub fn y_end(&self) -> usize {
        self.y_offset + self.height
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x_offset && x < self.x_end() && y >= self.y_offset && y < self.y_end()
    }

    /// Fail unless the window lies inside a `(width, height)` raster.
    pub fn check_within(&self, raster_size: (usize, usize)) -> Result<()> {
        if self.x_end() > raster_size.0 || self.y_end() > raster_size.1 {
            return Err(RsgisError::WindowOutOfBounds {
                x_offset: self.x_offset,
                y_offset: self.y_offset,
                width: self.width,
                height: self.height,
                raster_width: raster_size.0,
                raster_height: raster_size.1,
            });
        }
        Ok(())
    }
}

/// Plans the row-major sequence of windows covering a raster.
///
/// Windows in the last column and row are narrower or shorter when the
/// raster size is not a multiple of the tile size; they are never padded.
#[derive(Debug, Clone)]
pub struct WindowPlanner {
    raster_width: usize,
    raster_height: usize,
    tile_width: usize,
    tile_height: usize,
    pub tiles_x: usize,
    pub tiles_y: usize,
}

impl WindowPlanner {
    pub fn new(
        raster_width: usize,
        raster_height: usize,
        tile_width: usize,
        tile_height: usize,
    ) -> Result<Self> {
        if tile_width == 0 || tile_height == 0 {
            return Err(RsgisError::InvalidTileSize {
                width: tile_width,
                height: tile_height,
            });
        }
        let tiles_x = raster_width.div_ceil(tile_width);
        let tiles_y = raster_height.div_ceil(tile_height);

        debug!(
            "WindowPlanner: {}x{} raster, {}x{} tiles -> {}x{} windows",
            raster_width, raster_height, tile_width, tile_height, tiles_x, tiles_y
        );

        Ok(WindowPlanner {
            raster_width,
            raster_height,
            tile_width,
            tile_height,
            tiles_x,
            tiles_y,
        })
    }

    pub fn raster_size(&self) -> (usize, usize) {
        (self.raster_width, self.raster_height)
    }

    pub fn tile_size(&self) -> (usize, usize) {
        (self.tile_width, self.tile_height)
    }

    pub fn len(&self) -> usize {
        self.tiles_x * self.tiles_y
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(column, row)` of window `index` in the tile grid.
    pub fn grid_position(&self, index: usize) -> (usize, usize) {
        (index % self.tiles_x, index / self.tiles_x)
    }

    /// Index of the window at tile grid position `(column, row)`.
    pub fn index_of(&self, column: usize, row: usize) -> Option<usize> {
        (column < self.tiles_x && row < self.tiles_y).then(|| row * self.tiles_x + column)
    }

    /// The window at `index` in row-major order.
    ///
    /// # Panics
    /// Panics if `index >= self.len()`.
    pub fn window(&self, index: usize) -> RasterWindow {
        assert!(index < self.len(), "window index {index} out of range");
        let (column, row) = self.grid_position(index);
        let x_offset = column * self.tile_width;
        let y_offset = row * self.tile_height;
        let width = self.tile_width.min(self.raster_width - x_offset);
        let height = self.tile_height.min(self.raster_height - y_offset);
        RasterWindow::new(x_offset, y_offset, width, height)
    }

    pub fn windows(&self) -> Windows<'_> {
        Windows {
            planner: self,
            next: 0,
        }
    }
}

/// Iterator over the windows of a [`WindowPlanner`].
pub struct Windows<'a> {
    planner: &'a WindowPlanner,
    next: usize,
}

impl Iterator for Windows<'_> {
    type Item = RasterWindow;

    fn next(&mut self) -> Option<RasterWindow> {
        if self.next >= self.planner.len() {
            return None;
        }
        let window = self.planner.window(self.next);
        self.next += 1;
        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.planner.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Windows<'_> {}
