/// Disjoint sets over `0..len` with path halving.
///
/// The smaller element always becomes the root of a union, so the root of a
/// set is its smallest member and results do not depend on union order.
#[derive(Debug, Clone, Default)]
pub struct UnionFind {
    parent: Vec<u32>,
}

impl UnionFind {
    /// `len` singleton sets.
    pub fn new(len: usize) -> Self {
        UnionFind {
            parent: (0..len as u32).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Add a singleton set and return its element.
    pub fn push(&mut self) -> u32 {
        let id = self.parent.len() as u32;
        self.parent.push(id);
        id
    }

    pub fn find(&mut self, mut x: u32) -> u32 {
        while self.parent[x as usize] != x {
            let grandparent = self.parent[self.parent[x as usize] as usize];
            self.parent[x as usize] = grandparent;
            x = grandparent;
        }
        x
    }

    /// Merge the sets of `a` and `b`, returning the new root.
    pub fn union(&mut self, a: u32, b: u32) -> u32 {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return root_a;
        }
        let (root, child) = if root_a < root_b {
            (root_a, root_b)
        } else {
            (root_b, root_a)
        };
        self.parent[child as usize] = root;
        root
    }

    /// Map every element except 0 to a dense label `1..=N`, numbered in
    /// order of each set's smallest element. Element 0 maps to 0.
    ///
    /// Returns the lookup table and `N`.
    pub fn dense_labels(&mut self) -> (Vec<u32>, u32) {
        let mut lut = vec![0u32; self.parent.len()];
        let mut next = 0u32;
        for id in 1..self.parent.len() as u32 {
            let root = self.find(id);
            if root == id {
                next += 1;
                lut[id as usize] = next;
            } else {
                // roots are smaller than their members, so already numbered
                lut[id as usize] = lut[root as usize];
            }
        }
        (lut, next)
    }
}
