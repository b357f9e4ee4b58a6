use ndarray::{Array2, ArrayView2};

use crate::clump::{ClumpCriterion, Connectivity, UnionFind};

/// Labels the connected components of a 2D array.
///
/// Background pixels get 0, components get dense labels `1..=N`; the second
/// return value is `N`.
pub trait ConnectedComponentLabeler: Send + Sync {
    fn label(&self, data: ArrayView2<f64>, connectivity: Connectivity) -> (Array2<u32>, u32);
}

/// Classic two-pass labelling with a union-find of provisional labels.
///
/// Labels are numbered in row-major order of each component's first pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwoPassLabeler {
    pub criterion: ClumpCriterion,
    pub background: f64,
}

impl TwoPassLabeler {
    pub fn new(criterion: ClumpCriterion, background: f64) -> Self {
        TwoPassLabeler {
            criterion,
            background,
        }
    }
}

impl Default for TwoPassLabeler {
    fn default() -> Self {
        TwoPassLabeler::new(ClumpCriterion::Foreground, 0.0)
    }
}

impl ConnectedComponentLabeler for TwoPassLabeler {
    fn label(&self, data: ArrayView2<f64>, connectivity: Connectivity) -> (Array2<u32>, u32) {
        let (rows, cols) = data.dim();
        let mut labels = Array2::<u32>::zeros((rows, cols));
        let mut sets = UnionFind::new(1);

        for r in 0..rows {
            for c in 0..cols {
                let value = data[[r, c]];
                if !self.criterion.is_foreground(value, self.background) {
                    continue;
                }
                let mut current = 0u32;
                for &(dr, dc) in connectivity.previous_neighbours() {
                    let (Some(nr), Some(nc)) =
                        (r.checked_add_signed(dr), c.checked_add_signed(dc))
                    else {
                        continue;
                    };
                    if nc >= cols {
                        continue;
                    }
                    let neighbour = labels[[nr, nc]];
                    if neighbour == 0 || !self.criterion.joins(value, data[[nr, nc]]) {
                        continue;
                    }
                    current = if current == 0 {
                        neighbour
                    } else {
                        sets.union(current, neighbour)
                    };
                }
                if current == 0 {
                    current = sets.push();
                }
                labels[[r, c]] = current;
            }
        }

        let (lut, count) = sets.dense_labels();
        labels.mapv_inplace(|l| lut[l as usize]);
        (labels, count)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn four_vs_eight() {
        let data = array![
            [1.0, 0.0, 1.0],
            [0.0, 1.0, 0.0],
            [1.0, 0.0, 1.0],
        ];
        let labeler = TwoPassLabeler::default();
        let (_, four) = labeler.label(data.view(), Connectivity::Four);
        let (labels, eight) = labeler.label(data.view(), Connectivity::Eight);
        assert_eq!(four, 5);
        assert_eq!(eight, 1);
        assert!(labels.iter().all(|&l| l == 0 || l == 1));
    }

    #[test]
    fn u_shape_merges() {
        let data = array![
            [1.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
        ];
        let (labels, count) = TwoPassLabeler::default().label(data.view(), Connectivity::Four);
        assert_eq!(count, 1);
        assert_eq!(labels[[0, 2]], 1);
    }

    #[test]
    fn labels_follow_scan_order() {
        let data = array![
            [0.0, 0.0, 5.0],
            [7.0, 0.0, 0.0],
        ];
        let (labels, count) = TwoPassLabeler::default().label(data.view(), Connectivity::Four);
        assert_eq!(count, 2);
        assert_eq!(labels, array![[0, 0, 1], [2, 0, 0]]);
    }

    #[test]
    fn equal_value_splits_categories() {
        let data = array![
            [1.0, 1.0, 2.0],
            [0.0, 2.0, 2.0],
        ];
        let labeler = TwoPassLabeler::new(ClumpCriterion::EqualValue, 0.0);
        let (labels, count) = labeler.label(data.view(), Connectivity::Eight);
        assert_eq!(count, 2);
        assert_eq!(labels, array![[1, 1, 2], [0, 2, 2]]);
    }

    #[test]
    fn nan_and_background_ignored() {
        let data = array![[f64::NAN, 9.0, 9.0]];
        let labeler = TwoPassLabeler::new(ClumpCriterion::Foreground, 9.0);
        let (labels, count) = labeler.label(data.view(), Connectivity::Eight);
        assert_eq!(count, 0);
        assert_eq!(labels, array![[0, 0, 0]]);
    }
}
