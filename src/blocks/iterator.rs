use std::collections::BTreeMap;
use std::ops::Index;

use log::debug;
use ndarray::{Array, Axis, Dimension, Ix3, Ix4};

use crate::blocks::BandSourceBinder;
use crate::errors::{Result, RsgisError};
use crate::raster::{RasterWindow, WindowPlanner};

/// Per-name pixel arrays of one step.
///
/// Single windows hold `(band, row, col)` arrays, batches (see
/// [`BatchData`]) hold `(band, batch, row, col)` arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockData<D: Dimension = Ix3> {
    arrays: BTreeMap<String, Array<f64, D>>,
}

/// Arrays of a batch of windows, `(band, batch, row, col)`.
pub type BatchData = BlockData<Ix4>;

impl<D: Dimension> BlockData<D> {
    pub fn new() -> Self {
        BlockData {
            arrays: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, array: Array<f64, D>) {
        self.arrays.insert(name.into(), array);
    }

    pub fn get(&self, name: &str) -> Option<&Array<f64, D>> {
        self.arrays.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Array<f64, D>> {
        self.arrays.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Array<f64, D>> {
        self.arrays.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.arrays.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Array<f64, D>)> {
        self.arrays.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

impl<D: Dimension> Default for BlockData<D> {
    fn default() -> Self {
        BlockData::new()
    }
}

impl<D: Dimension> Index<&str> for BlockData<D> {
    type Output = Array<f64, D>;

    /// # Panics
    /// Panics if nothing is stored under `name`.
    fn index(&self, name: &str) -> &Self::Output {
        match self.arrays.get(name) {
            Some(array) => array,
            None => panic!("no block data named '{name}'"),
        }
    }
}

impl<D: Dimension> FromIterator<(String, Array<f64, D>)> for BlockData<D> {
    fn from_iter<I: IntoIterator<Item = (String, Array<f64, D>)>>(iter: I) -> Self {
        BlockData {
            arrays: iter.into_iter().collect(),
        }
    }
}

/// One step of a [`BlockIterator`].
#[derive(Debug, Clone)]
pub struct BlockStep {
    pub window: RasterWindow,
    pub data: BlockData,
}

impl BlockStep {
    pub fn x_offset(&self) -> usize {
        self.window.x_offset
    }

    pub fn y_offset(&self) -> usize {
        self.window.y_offset
    }
}

/// One step of a [`BatchIterator`]: consecutive windows of equal shape.
#[derive(Debug, Clone)]
pub struct BatchStep {
    pub windows: Vec<RasterWindow>,
    pub data: BatchData,
}

/// Streams the bound sources window by window in row-major order.
///
/// The iterator is lazy and holds nothing but the next window index;
/// construct a new one to start over.
#[derive(Debug)]
pub struct BlockIterator<'a> {
    binder: &'a BandSourceBinder,
    planner: WindowPlanner,
    next: usize,
}

impl<'a> BlockIterator<'a> {
    /// Validate `binder` and plan windows of at most `tile_width` x
    /// `tile_height` pixels.
    pub fn new(binder: &'a BandSourceBinder, tile_width: usize, tile_height: usize) -> Result<Self> {
        let (width, height) = binder.validate()?;
        Ok(BlockIterator {
            binder,
            planner: WindowPlanner::new(width, height, tile_width, tile_height)?,
            next: 0,
        })
    }

    pub fn planner(&self) -> &WindowPlanner {
        &self.planner
    }
}

impl Iterator for BlockIterator<'_> {
    type Item = Result<BlockStep>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.planner.len() {
            return None;
        }
        let window = self.planner.window(self.next);
        self.next += 1;
        debug!("Reading block {:?}", window);
        Some(
            self.binder
                .read_block(&window)
                .map(|data| BlockStep { window, data }),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.planner.len() - self.next;
        (remaining, Some(remaining))
    }
}

/// Groups up to `batch_size` consecutive windows per step.
///
/// Only windows of identical shape share a batch, so a narrower edge window
/// closes the current batch early and starts the next one.
#[derive(Debug)]
pub struct BatchIterator<'a> {
    binder: &'a BandSourceBinder,
    planner: WindowPlanner,
    batch_size: usize,
    next: usize,
}

impl<'a> BatchIterator<'a> {
    pub fn new(
        binder: &'a BandSourceBinder,
        tile_width: usize,
        tile_height: usize,
        batch_size: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(RsgisError::InvalidParameter {
                name: "batch_size",
                value: batch_size.to_string(),
                reason: "a batch holds at least one window".to_string(),
            });
        }
        let (width, height) = binder.validate()?;
        Ok(BatchIterator {
            binder,
            planner: WindowPlanner::new(width, height, tile_width, tile_height)?,
            batch_size,
            next: 0,
        })
    }

    pub fn planner(&self) -> &WindowPlanner {
        &self.planner
    }

    fn read_batch(&self, windows: &[RasterWindow]) -> Result<BatchData> {
        let blocks = windows
            .iter()
            .map(|w| self.binder.read_block(w))
            .collect::<Result<Vec<_>>>()?;
        let mut batch = BatchData::new();
        for name in self.binder.names() {
            let views: Vec<_> = blocks.iter().map(|b| b[name].view()).collect();
            batch.insert(name, ndarray::stack(Axis(1), &views)?);
        }
        Ok(batch)
    }
}

impl Iterator for BatchIterator<'_> {
    type Item = Result<BatchStep>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.planner.len() {
            return None;
        }
        let first = self.planner.window(self.next);
        let mut windows = vec![first];
        let mut index = self.next + 1;
        while windows.len() < self.batch_size && index < self.planner.len() {
            let window = self.planner.window(index);
            if window.shape() != first.shape() {
                break;
            }
            windows.push(window);
            index += 1;
        }
        self.next = index;
        debug!("Reading batch of {} window(s) from {:?}", windows.len(), first);
        Some(
            self.read_batch(&windows)
                .map(|data| BatchStep { windows, data }),
        )
    }
}
