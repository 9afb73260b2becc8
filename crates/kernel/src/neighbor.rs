//! Uniform-grid spatial hash for neighbour discovery.
//!
//! Uses a sorted `(cell, particle)` array plus a cell table rather than a
//! `HashMap` so the data layout stays flat (no pointer chasing). The grid is
//! unbounded: cell keys are rounded world coordinates.

use std::cmp::Ordering;

/// Integer cell coordinate.
pub type CellKey = (i32, i32);

/// Uniform-grid spatial hash over predicted positions.
///
/// A particle at `(x, y)` lives in cell `(round(x / s), round(y / s))` with
/// half-up rounding, so each cell is centred on a multiple of the cell size
/// `s`. Neighbour queries scan the 3x3 block of cells around a particle.
#[derive(Debug, Clone, Default)]
pub struct SpatialHash {
    cell_size: f32,
    /// Cell key for each particle (parallel to particle arrays).
    cell_of: Vec<CellKey>,
    /// Particle indices sorted by cell key, ascending index within a cell.
    sorted_indices: Vec<u32>,
    /// Distinct occupied cells, sorted.
    cells: Vec<CellKey>,
    /// Start offset in `sorted_indices` for each entry of `cells`,
    /// with one trailing sentinel.
    cell_offsets: Vec<u32>,
}

impl SpatialHash {
    /// Create an empty hash with the given cell size.
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            ..Self::default()
        }
    }

    /// Cell size used by the last build.
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Number of distinct occupied cells.
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    /// Map a world coordinate pair to its cell.
    #[inline]
    pub fn cell_key(&self, px: f32, py: f32) -> CellKey {
        (round_half_up(px / self.cell_size), round_half_up(py / self.cell_size))
    }

    /// Rebuild the hash from predicted positions.
    ///
    /// The two slices must have the same length (one entry per particle).
    pub fn build(&mut self, x: &[f32], y: &[f32], cell_size: f32) {
        let n = x.len();
        debug_assert_eq!(n, y.len());
        self.cell_size = cell_size;

        // --- 1. Cell key for each particle ---
        self.cell_of.clear();
        self.cell_of.extend(
            (0..n).map(|i| (round_half_up(x[i] / cell_size), round_half_up(y[i] / cell_size))),
        );

        // --- 2. Sort particle indices by (cell, index) ---
        self.sorted_indices.clear();
        self.sorted_indices.extend(0..n as u32);
        let cell_of = &self.cell_of;
        self.sorted_indices
            .sort_unstable_by(|&a, &b| match cell_of[a as usize].cmp(&cell_of[b as usize]) {
                Ordering::Equal => a.cmp(&b),
                other => other,
            });

        // --- 3. Run-length encode into the cell table ---
        self.cells.clear();
        self.cell_offsets.clear();
        for (pos, &idx) in self.sorted_indices.iter().enumerate() {
            let key = self.cell_of[idx as usize];
            if self.cells.last() != Some(&key) {
                self.cells.push(key);
                self.cell_offsets.push(pos as u32);
            }
        }
        self.cell_offsets.push(n as u32);
    }

    /// Particle indices stored in `cell`, ascending. Empty if unoccupied.
    pub fn cell_entries(&self, cell: CellKey) -> &[u32] {
        match self.cells.binary_search(&cell) {
            Ok(c) => {
                let start = self.cell_offsets[c] as usize;
                let end = self.cell_offsets[c + 1] as usize;
                &self.sorted_indices[start..end]
            }
            Err(_) => &[],
        }
    }

    /// Iterate the 3x3 cell block around particle `i`, invoking `f` for every
    /// index `j > i`.
    ///
    /// Cells are visited with the x offset in the outer loop and the y offset
    /// in the inner loop; this discovery order is what overflow truncation
    /// keeps.
    pub fn for_each_higher_neighbor<F>(&self, i: usize, mut f: F)
    where
        F: FnMut(usize),
    {
        let (cx, cy) = self.cell_of[i];
        for dx in -1i32..=1 {
            for dy in -1i32..=1 {
                for &j in self.cell_entries((cx + dx, cy + dy)) {
                    if j as usize > i {
                        f(j as usize);
                    }
                }
            }
        }
    }

    /// Collect the forward neighbours (`j > i`) of particle `i`.
    pub fn query_higher_neighbors(&self, i: usize) -> Vec<u32> {
        let mut out = Vec::new();
        self.for_each_higher_neighbor(i, |j| out.push(j as u32));
        out
    }
}

/// `floor(v + 0.5)` as a cell coordinate.
#[inline]
fn round_half_up(v: f32) -> i32 {
    (v + 0.5).floor() as i32
}
