//! Particle storage using struct-of-arrays layout, plus initial position sources.

/// Struct-of-arrays particle storage.
///
/// All arrays are parallel: index `i` across every array refers to the same
/// particle. `x`/`y` and `vx`/`vy` persist across frames; `x_star`/`y_star`
/// hold the predicted position and are recomputed every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleArrays {
    // ---- Committed positions ----
    /// X positions
    pub x: Vec<f32>,
    /// Y positions
    pub y: Vec<f32>,

    // ---- Predicted positions ----
    /// Predicted X positions (x*)
    pub x_star: Vec<f32>,
    /// Predicted Y positions (y*)
    pub y_star: Vec<f32>,

    // ---- Velocities ----
    /// X velocities
    pub vx: Vec<f32>,
    /// Y velocities
    pub vy: Vec<f32>,
}

impl ParticleArrays {
    /// Create an empty particle collection.
    pub fn new() -> Self {
        Self {
            x: Vec::new(),
            y: Vec::new(),
            x_star: Vec::new(),
            y_star: Vec::new(),
            vx: Vec::new(),
            vy: Vec::new(),
        }
    }

    /// Build a collection at rest from a list of positions.
    pub fn from_positions(positions: &[[f32; 2]]) -> Self {
        let mut pa = Self::new();
        for p in positions {
            pa.push_particle(p[0], p[1]);
        }
        pa
    }

    /// Return the number of particles currently stored.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Return `true` if there are no particles.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Append a particle at rest. The predicted position starts at `(px, py)`.
    pub fn push_particle(&mut self, px: f32, py: f32) {
        self.x.push(px);
        self.y.push(py);
        self.x_star.push(px);
        self.y_star.push(py);
        self.vx.push(0.0);
        self.vy.push(0.0);
    }

    /// Committed positions as `[x, y]` pairs.
    pub fn positions(&self) -> Vec<[f32; 2]> {
        self.x.iter().zip(&self.y).map(|(&x, &y)| [x, y]).collect()
    }

    /// Velocities as `[vx, vy]` pairs.
    pub fn velocities(&self) -> Vec<[f32; 2]> {
        self.vx.iter().zip(&self.vy).map(|(&x, &y)| [x, y]).collect()
    }

    /// Zero every velocity.
    pub fn clear_velocities(&mut self) {
        self.vx.iter_mut().for_each(|v| *v = 0.0);
        self.vy.iter_mut().for_each(|v| *v = 0.0);
    }
}

impl Default for ParticleArrays {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Initial position sources
// ---------------------------------------------------------------------------

/// Supplies the initial particle positions at `initialize`.
pub trait PositionSource {
    /// Produce `count` positions. Returning a different number is an error
    /// reported by the caller.
    fn positions(&self, count: usize) -> Vec<[f32; 2]>;
}

/// Row-major block of particles: `columns` per row, rows stacked upward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSource {
    /// Particles per row.
    pub columns: usize,
    /// Distance between neighbouring particles.
    pub spacing: f32,
    /// Position of particle 0.
    pub origin: [f32; 2],
}

impl Default for GridSource {
    fn default() -> Self {
        Self {
            columns: 15,
            spacing: 1.0,
            origin: [-7.5, 0.0],
        }
    }
}

impl PositionSource for GridSource {
    fn positions(&self, count: usize) -> Vec<[f32; 2]> {
        let columns = self.columns.max(1);
        (0..count)
            .map(|k| {
                let col = (k % columns) as f32;
                let row = (k / columns) as f32;
                [
                    self.origin[0] + col * self.spacing,
                    self.origin[1] + row * self.spacing,
                ]
            })
            .collect()
    }
}

impl PositionSource for [[f32; 2]] {
    fn positions(&self, count: usize) -> Vec<[f32; 2]> {
        self.iter().take(count).copied().collect()
    }
}

impl PositionSource for Vec<[f32; 2]> {
    fn positions(&self, count: usize) -> Vec<[f32; 2]> {
        self.as_slice().positions(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_particle_arrays() {
        let pa = ParticleArrays::new();
        assert_eq!(pa.len(), 0);
        assert!(pa.is_empty());
    }

    #[test]
    fn push_and_len() {
        let mut pa = ParticleArrays::new();
        pa.push_particle(1.0, 2.0);
        assert_eq!(pa.len(), 1);
        assert!(!pa.is_empty());
        assert_eq!(pa.x[0], 1.0);
        assert_eq!(pa.y[0], 2.0);
        // Predicted position starts at the committed one
        assert_eq!(pa.x_star[0], 1.0);
        assert_eq!(pa.y_star[0], 2.0);
        assert_eq!(pa.vx[0], 0.0);
        assert_eq!(pa.vy[0], 0.0);
    }

    #[test]
    fn default_grid_matches_reference_block() {
        let p = GridSource::default().positions(32);
        assert_eq!(p[0], [-7.5, 0.0]);
        assert_eq!(p[14], [6.5, 0.0]);
        assert_eq!(p[15], [-7.5, 1.0]);
        assert_eq!(p[31], [-6.5, 2.0]);
    }

    #[test]
    fn explicit_source_truncates() {
        let src = vec![[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]];
        assert_eq!(src.positions(2), vec![[0.0, 0.0], [1.0, 1.0]]);
        assert_eq!(src.positions(5).len(), 3);
    }
}
