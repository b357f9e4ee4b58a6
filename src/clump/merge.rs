//! Merging per-tile clump labels across tile borders

use log::debug;
use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::clump::{ClumpCriterion, Connectivity, UnionFind};
use crate::errors::{Result, RsgisError};
use crate::raster::WindowPlanner;

/// Local labels and pixel values along one side of a tile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeStrip {
    pub labels: Vec<u32>,
    pub values: Vec<f64>,
}

impl EdgeStrip {
    fn new(labels: ArrayView1<u32>, values: ArrayView1<f64>) -> Self {
        EdgeStrip {
            labels: labels.to_vec(),
            values: values.to_vec(),
        }
    }

    fn first(&self) -> Option<(u32, f64)> {
        Some((*self.labels.first()?, *self.values.first()?))
    }

    fn last(&self) -> Option<(u32, f64)> {
        Some((*self.labels.last()?, *self.values.last()?))
    }
}

/// The four border strips of a labelled tile, all a worker hands back for
/// the merge besides its label count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileEdges {
    pub top: EdgeStrip,
    pub bottom: EdgeStrip,
    pub left: EdgeStrip,
    pub right: EdgeStrip,
}

impl TileEdges {
    /// Extract the borders of a tile from its local `labels` and the input
    /// `values` the labels were computed from.
    pub fn from_tile(labels: ArrayView2<u32>, values: ArrayView2<f64>) -> Self {
        let (rows, cols) = labels.dim();
        if rows == 0 || cols == 0 {
            return TileEdges::default();
        }
        TileEdges {
            top: EdgeStrip::new(labels.row(0), values.row(0)),
            bottom: EdgeStrip::new(labels.row(rows - 1), values.row(rows - 1)),
            left: EdgeStrip::new(labels.column(0), values.column(0)),
            right: EdgeStrip::new(labels.column(cols - 1), values.column(cols - 1)),
        }
    }
}

/// Maps tile-local labels to final global labels.
///
/// Local labels of tile `i` are first offset by the total label count of
/// tiles `0..i`. Provisional labels touching across a border are then
/// unioned and renumbered densely in provisional order, so the result only
/// depends on the tile geometry.
#[derive(Debug, Clone)]
pub struct ClumpRelabel {
    bases: Vec<u32>,
    lut: Vec<u32>,
    count: u32,
}

impl ClumpRelabel {
    /// `tiles[i]` holds the label count and edges of tile `i` of `planner`.
    pub fn build(
        planner: &WindowPlanner,
        tiles: &[(u32, TileEdges)],
        connectivity: Connectivity,
        criterion: ClumpCriterion,
    ) -> Result<Self> {
        let mut bases = Vec::with_capacity(tiles.len());
        let mut total = 0u32;
        for (count, _) in tiles {
            bases.push(total);
            total = total
                .checked_add(*count)
                .ok_or_else(|| RsgisError::InvalidParameter {
                    name: "tile_size",
                    value: format!("{:?}", planner.tile_size()),
                    reason: "provisional clump count exceeds 32-bit labels".to_string(),
                })?;
        }

        let mut sets = UnionFind::new(total as usize + 1);
        let mut joins = 0usize;
        let eight = connectivity == Connectivity::Eight;
        let mut join = |sets: &mut UnionFind,
                        a: (u32, f64),
                        base_a: u32,
                        b: (u32, f64),
                        base_b: u32| {
            if a.0 != 0 && b.0 != 0 && criterion.joins(a.1, b.1) {
                let (ga, gb) = (base_a + a.0, base_b + b.0);
                if sets.find(ga) != sets.find(gb) {
                    sets.union(ga, gb);
                    joins += 1;
                }
            }
        };

        for index in 0..tiles.len() {
            let (column, row) = planner.grid_position(index);
            let edges = &tiles[index].1;
            let base = bases[index];

            let right = planner
                .index_of(column + 1, row)
                .map(|n| (&edges.right, &tiles[n].1.left, bases[n]));
            let below = planner
                .index_of(column, row + 1)
                .map(|n| (&edges.bottom, &tiles[n].1.top, bases[n]));
            for (strip, other, other_base) in right.into_iter().chain(below) {
                for i in 0..strip.labels.len() {
                    let a = (strip.labels[i], strip.values[i]);
                    let span = if eight { i.saturating_sub(1)..=i + 1 } else { i..=i };
                    for j in span.filter(|&j| j < other.labels.len()) {
                        join(&mut sets, a, base, (other.labels[j], other.values[j]), other_base);
                    }
                }
            }

            if eight {
                // corner contacts with the tiles diagonally below
                if let Some(diagonal) = planner.index_of(column + 1, row + 1) {
                    if let (Some(a), Some(b)) = (edges.bottom.last(), tiles[diagonal].1.top.first()) {
                        join(&mut sets, a, base, b, bases[diagonal]);
                    }
                }
                if let Some(diagonal) = column
                    .checked_sub(1)
                    .and_then(|c| planner.index_of(c, row + 1))
                {
                    if let (Some(a), Some(b)) = (edges.bottom.first(), tiles[diagonal].1.top.last()) {
                        join(&mut sets, a, base, b, bases[diagonal]);
                    }
                }
            }
        }

        let (lut, count) = sets.dense_labels();
        debug!(
            "Merged {} provisional clump(s) from {} tile(s) into {} ({} border join(s))",
            total,
            tiles.len(),
            count,
            joins
        );
        Ok(ClumpRelabel { bases, lut, count })
    }

    /// Number of clumps after merging.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Final label of local label `local` in tile `tile`; 0 stays 0.
    pub fn global(&self, tile: usize, local: u32) -> u32 {
        if local == 0 {
            return 0;
        }
        self.lut[(self.bases[tile] + local) as usize]
    }

    /// Rewrite the local labels of tile `tile` in place.
    pub fn apply(&self, tile: usize, labels: &mut Array2<u32>) {
        labels.mapv_inplace(|l| self.global(tile, l));
    }
}
