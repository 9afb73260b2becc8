//! Obstacle fields and polygon boundaries.
//!
//! The position corrector never lets a particle's trajectory for the frame
//! pass through a boundary. An [`ObstacleField`] answers one question: given
//! the committed position and the corrected prediction, where should the
//! particle end up?
//!
//! [`SegmentObstacles`] answers it directly against the polygon edges: the
//! nearest crossed segment stops the particle at `margin` from its line, on
//! the side it came from.

use crate::error::{Result, SimulationError};

/// Tolerance on the segment parameter of a crossing, so hits on a shared
/// vertex are not lost between two segments.
const SEGMENT_TOLERANCE: f32 = 1.0e-5;

/// An ordered list of boundary vertices.
///
/// Two vertices form one segment; three or more form a closed loop.
pub type BoundaryPolygon = Vec<[f32; 2]>;

/// Collision provider consulted by the position corrector.
pub trait ObstacleField: Send + Sync {
    /// Clamp the trajectory `from -> to` against the obstacles.
    ///
    /// Returns `to` when nothing is crossed. Otherwise returns a point on the
    /// trajectory, never behind `from`, that keeps `margin` from the first
    /// obstacle hit.
    fn clamp(&self, from: [f32; 2], to: [f32; 2], margin: f32) -> [f32; 2];

    /// Replace the obstacle geometry. The polygon count must not change.
    fn rebuild(&mut self, polygons: &[BoundaryPolygon]) -> Result<()>;

    /// Number of polygons the field was built from.
    fn polygon_count(&self) -> usize;
}

/// A directed boundary edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Start vertex.
    pub a: [f32; 2],
    /// End vertex.
    pub b: [f32; 2],
}

impl Segment {
    /// Signed perpendicular distance of `p` from the segment's line.
    ///
    /// Positive on the left of `a -> b`. Zero-length segments report 0.
    #[inline]
    pub fn signed_distance(&self, p: [f32; 2]) -> f32 {
        let dx = self.b[0] - self.a[0];
        let dy = self.b[1] - self.a[1];
        let len = (dx * dx + dy * dy).sqrt();
        if len == 0.0 {
            return 0.0;
        }
        (dx * (p[1] - self.a[1]) - dy * (p[0] - self.a[0])) / len
    }

    /// Trajectory parameter `t` in `[0, 1]` at which `from -> to` crosses
    /// this segment, with the signed distances at both ends.
    fn crossing(&self, from: [f32; 2], to: [f32; 2]) -> Option<Crossing> {
        let s0 = self.signed_distance(from);
        let s1 = self.signed_distance(to);
        if s0 * s1 > 0.0 || (s0 == 0.0 && s1 == 0.0) {
            return None;
        }
        let t = s0 / (s0 - s1);
        let hit = lerp(from, to, t);

        let dx = self.b[0] - self.a[0];
        let dy = self.b[1] - self.a[1];
        let len_sq = dx * dx + dy * dy;
        let u = ((hit[0] - self.a[0]) * dx + (hit[1] - self.a[1]) * dy) / len_sq;
        if !(-SEGMENT_TOLERANCE..=1.0 + SEGMENT_TOLERANCE).contains(&u) {
            return None;
        }
        Some(Crossing { t, s0, s1 })
    }
}

#[derive(Debug, Clone, Copy)]
struct Crossing {
    t: f32,
    s0: f32,
    s1: f32,
}

#[inline]
fn lerp(from: [f32; 2], to: [f32; 2], t: f32) -> [f32; 2] {
    [from[0] + t * (to[0] - from[0]), from[1] + t * (to[1] - from[1])]
}

/// Obstacle field made of the edges of boundary polygons.
#[derive(Debug, Clone, Default)]
pub struct SegmentObstacles {
    segments: Vec<Segment>,
    polygon_count: usize,
}

impl SegmentObstacles {
    /// Build the field from boundary polygons.
    pub fn new(polygons: &[BoundaryPolygon]) -> Self {
        let mut field = Self::default();
        field.load(polygons);
        field
    }

    /// Edges of every polygon, in polygon order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    fn load(&mut self, polygons: &[BoundaryPolygon]) {
        self.segments.clear();
        for polygon in polygons {
            match polygon.len() {
                0 | 1 => {}
                2 => self.segments.push(Segment {
                    a: polygon[0],
                    b: polygon[1],
                }),
                len => {
                    for k in 0..len {
                        self.segments.push(Segment {
                            a: polygon[k],
                            b: polygon[(k + 1) % len],
                        });
                    }
                }
            }
        }
        self.polygon_count = polygons.len();
    }
}

impl ObstacleField for SegmentObstacles {
    fn clamp(&self, from: [f32; 2], to: [f32; 2], margin: f32) -> [f32; 2] {
        let nearest = self
            .segments
            .iter()
            .filter_map(|segment| segment.crossing(from, to))
            .min_by(|a, b| a.t.total_cmp(&b.t));

        let Some(hit) = nearest else {
            return to;
        };
        if hit.s0 == 0.0 {
            return from;
        }
        // Point on the trajectory whose signed distance is `margin` on the
        // starting side.
        let target = hit.s0.signum() * margin;
        let t = ((target - hit.s0) / (hit.s1 - hit.s0)).max(0.0);
        lerp(from, to, t)
    }

    fn rebuild(&mut self, polygons: &[BoundaryPolygon]) -> Result<()> {
        if polygons.len() != self.polygon_count {
            return Err(SimulationError::InvalidBoundsChange {
                expected: self.polygon_count,
                actual: polygons.len(),
            });
        }
        self.load(polygons);
        Ok(())
    }

    fn polygon_count(&self) -> usize {
        self.polygon_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(coords: [f32; 4]) -> BoundaryPolygon {
        vec![[coords[0], coords[1]], [coords[2], coords[3]]]
    }

    fn assert_close(actual: [f32; 2], expected: [f32; 2]) {
        assert!(
            (actual[0] - expected[0]).abs() < 1.0e-4 && (actual[1] - expected[1]).abs() < 1.0e-4,
            "got {:?}, expected {:?}",
            actual,
            expected
        );
    }

    #[test]
    fn two_vertices_make_one_segment() {
        let field = SegmentObstacles::new(&[segment([0.0, -2.0, 0.0, 2.0])]);
        assert_eq!(field.segments().len(), 1);
        assert_eq!(field.polygon_count(), 1);
    }

    #[test]
    fn three_vertices_close_the_loop() {
        let field = SegmentObstacles::new(&[vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]], vec![[5.0, 5.0]]]);
        assert_eq!(field.segments().len(), 3);
        assert_eq!(field.segments()[2].b, [0.0, 0.0]);
        assert_eq!(field.polygon_count(), 2);
    }

    #[test]
    fn signed_distance_sign_follows_winding() {
        let s = Segment { a: [0.0, 0.0], b: [1.0, 0.0] };
        assert_eq!(s.signed_distance([0.5, 2.0]), 2.0);
        assert_eq!(s.signed_distance([0.5, -3.0]), -3.0);
    }

    #[test]
    fn vertical_segment() {
        let field = SegmentObstacles::new(&[segment([0.0, -2.0, 0.0, 2.0])]);
        assert_close(field.clamp([-1.0, 1.0], [1.0, 1.0], 0.0), [0.0, 1.0]);
    }

    #[test]
    fn horizontal_segment_from_below() {
        let field = SegmentObstacles::new(&[segment([-3.0, 2.0, 1.0, 2.0])]);
        assert_close(field.clamp([-2.0, 1.0], [-2.0, 4.0], 0.0), [-2.0, 2.0]);
    }

    #[test]
    fn diagonal_segment() {
        let field = SegmentObstacles::new(&[segment([-2.0, -2.0, 2.0, 2.0])]);
        assert_close(field.clamp([-1.0, 0.0], [2.0, 0.0], 0.0), [0.0, 0.0]);
    }

    #[test]
    fn nearest_of_three_segments_wins() {
        let field = SegmentObstacles::new(&[
            segment([-5.0, -1.0, -2.0, 4.0]),
            segment([2.0, -1.0, 0.0, 1.0]),
            segment([1.5, -2.0, 1.5, 2.0]),
        ]);
        assert_close(field.clamp([0.0, 0.0], [2.0, 0.0], 0.0), [1.0, 0.0]);
    }

    #[test]
    fn start_on_the_line_stays() {
        let field = SegmentObstacles::new(&[segment([-2.0, -2.0, -2.0, 2.0])]);
        assert_close(field.clamp([-2.0, -1.0], [-4.0, -1.0], 0.0), [-2.0, -1.0]);
    }

    #[test]
    fn start_behind_the_line_is_unchanged() {
        let field = SegmentObstacles::new(&[segment([-2.0, -2.0, -2.0, 2.0])]);
        assert_close(field.clamp([-2.005, -1.0], [-4.0, -1.0], 0.0), [-4.0, -1.0]);
    }

    #[test]
    fn margin_backs_off_towards_start() {
        let field = SegmentObstacles::new(&[segment([-10.0, -4.0, 10.0, -4.0])]);
        assert_close(field.clamp([0.0, -3.0], [0.0, -6.0], 0.5), [0.0, -3.5]);
    }

    #[test]
    fn margin_never_moves_behind_start() {
        // Start already inside the margin band
        let field = SegmentObstacles::new(&[segment([-10.0, -4.0, 10.0, -4.0])]);
        assert_close(field.clamp([0.0, -3.8], [0.0, -6.0], 0.5), [0.0, -3.8]);
    }

    #[test]
    fn miss_beyond_segment_end() {
        let field = SegmentObstacles::new(&[segment([0.0, -2.0, 0.0, 2.0])]);
        assert_eq!(field.clamp([-1.0, 3.0], [1.0, 3.0], 0.1), [1.0, 3.0]);
    }

    #[test]
    fn rebuild_keeps_polygon_count() {
        let mut field = SegmentObstacles::new(&[segment([0.0, -2.0, 0.0, 2.0])]);
        let err = field
            .rebuild(&[segment([0.0, 0.0, 1.0, 1.0]), segment([1.0, 1.0, 2.0, 2.0])])
            .unwrap_err();
        assert_eq!(err, SimulationError::InvalidBoundsChange { expected: 1, actual: 2 });
        assert!(field.rebuild(&[segment([1.0, -2.0, 1.0, 2.0])]).is_ok());
        assert_close(field.clamp([0.0, 0.0], [2.0, 0.0], 0.0), [1.0, 0.0]);
    }
}
