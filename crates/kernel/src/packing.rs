//! Neighbour pair packing.
//!
//! Converts the forward neighbour lists of the spatial hash into a
//! deduplicated, fixed-capacity layout:
//!
//! - a **pair table** holding each unordered pair `(i, j)`, `i < j`, once;
//! - an **entry table** in which every particle owns a contiguous slice of
//!   pair-slot references: first its forward pairs, then its *extras* (pairs
//!   stored by a lower-indexed particle that reference it);
//! - a **partner table** parallel to the entry table giving the other
//!   particle of each entry;
//! - three **record buffers** describing each particle's slice with
//!   different storage strides for the three downstream stages.
//!
//! Extras reuse the stored kernel value of the pair. Because the stored
//! gradient was computed for `x*_i - x*_j` with `i` the lower index, an
//! extra entry must negate it.

use crate::neighbor::SpatialHash;

/// An unordered neighbour pair stored once, `i < j`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighbourPair {
    /// Lower particle index (owner of the forward entry).
    pub i: u32,
    /// Higher particle index.
    pub j: u32,
}

/// A particle's slice of the entry table.
///
/// Entries `[0, length - num_extras)` are forward, the tail
/// `[length - num_extras, length)` are extras.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeighbourRecord {
    /// First entry of the slice.
    pub start_index: u32,
    /// Entries in the slice (forward + extras).
    pub length: u32,
    /// Trailing entries that are extras.
    pub num_extras: u32,
}

impl NeighbourRecord {
    /// Number of forward entries.
    #[inline]
    pub fn forward_len(&self) -> u32 {
        self.length - self.num_extras
    }

    /// Whether the `k`-th entry of the slice is an extra.
    #[inline]
    pub fn is_extra(&self, k: u32) -> bool {
        k >= self.forward_len()
    }

    /// Gradient sign for the `k`-th entry: `-1` for extras, `+1` otherwise.
    #[inline]
    pub fn gradient_sign(&self, k: u32) -> f32 {
        if self.is_extra(k) {
            -1.0
        } else {
            1.0
        }
    }

    /// Entry-table indices covered by this record.
    #[inline]
    pub fn entries(&self) -> std::ops::Range<usize> {
        self.start_index as usize..(self.start_index + self.length) as usize
    }
}

/// Storage stride of a record buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLayout {
    /// One record per particle, repeated for each of the three constraint
    /// channels: slot `channel * n + i`.
    Scalar,
    /// One record per particle axis: slot `2 * i + axis`.
    Interleaved,
    /// An empty velocity half of `2n` slots followed by an interleaved
    /// position half: slot `2n + 2 * i + axis`.
    Doubled,
}

impl RecordLayout {
    /// Total slots for `n` particles.
    pub fn slots(self, n: usize) -> usize {
        match self {
            RecordLayout::Scalar => 3 * n,
            RecordLayout::Interleaved => 2 * n,
            RecordLayout::Doubled => 4 * n,
        }
    }

    /// Slots holding particle `i`'s record.
    fn particle_slots(self, n: usize, i: usize) -> [usize; 3] {
        match self {
            RecordLayout::Scalar => [i, n + i, 2 * n + i],
            // The third slot repeats the second; writing it twice is harmless.
            RecordLayout::Interleaved => [2 * i, 2 * i + 1, 2 * i + 1],
            RecordLayout::Doubled => [2 * n + 2 * i, 2 * n + 2 * i + 1, 2 * n + 2 * i + 1],
        }
    }
}

/// Per-slot records in one of the three layouts.
#[derive(Debug, Clone)]
pub struct RecordBuffer {
    layout: RecordLayout,
    records: Vec<NeighbourRecord>,
}

impl RecordBuffer {
    fn new(layout: RecordLayout, n: usize) -> Self {
        Self {
            layout,
            records: vec![NeighbourRecord::default(); layout.slots(n)],
        }
    }

    /// Storage layout.
    pub fn layout(&self) -> RecordLayout {
        self.layout
    }

    /// Record at a flat slot; slots past the end read as empty.
    #[inline]
    pub fn record(&self, slot: usize) -> NeighbourRecord {
        self.records.get(slot).copied().unwrap_or_default()
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Return `true` if the buffer holds no slots.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn write(&mut self, n: usize, i: usize, record: NeighbourRecord) {
        for slot in self.layout.particle_slots(n, i) {
            self.records[slot] = record;
        }
    }
}

/// Non-fatal conditions reported by the packer.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PackWarning {
    /// The pair buffer filled up; the particle's forward list was cut.
    #[error("pair buffer full: particle {particle} kept {kept} of {found} forward neighbours")]
    NeighbourCapacityExceeded {
        /// Particle whose list was truncated.
        particle: usize,
        /// Forward neighbours discovered.
        found: usize,
        /// Forward neighbours kept.
        kept: usize,
    },
}

/// Fixed-capacity packed neighbour graph for one frame.
#[derive(Debug, Clone)]
pub struct PackedNeighbours {
    particle_count: usize,
    max_neighbours: usize,
    pair_capacity: usize,
    pairs: Vec<NeighbourPair>,
    entries: Vec<u32>,
    partners: Vec<u32>,
    scalar: RecordBuffer,
    interleaved: RecordBuffer,
    doubled: RecordBuffer,
    /// Extras waiting for each particle: `(pair slot, lower partner)`.
    incoming: Vec<Vec<(u32, u32)>>,
    forward: Vec<u32>,
}

impl PackedNeighbours {
    /// Allocate buffers for `particle_count` particles averaging at most
    /// `max_neighbours` neighbours each.
    ///
    /// Pair capacity is `particle_count * max_neighbours / 2`: every pair is
    /// shared by two particles. The entry table holds twice that.
    pub fn new(particle_count: usize, max_neighbours: usize) -> Self {
        let pair_capacity = particle_count * max_neighbours / 2;
        Self {
            particle_count,
            max_neighbours,
            pair_capacity,
            pairs: Vec::with_capacity(pair_capacity),
            entries: Vec::with_capacity(2 * pair_capacity),
            partners: Vec::with_capacity(2 * pair_capacity),
            scalar: RecordBuffer::new(RecordLayout::Scalar, particle_count),
            interleaved: RecordBuffer::new(RecordLayout::Interleaved, particle_count),
            doubled: RecordBuffer::new(RecordLayout::Doubled, particle_count),
            incoming: vec![Vec::new(); particle_count],
            forward: Vec::new(),
        }
    }

    /// Rebuild the packed graph from a freshly built spatial hash.
    ///
    /// Particles are processed in increasing index order. When the pair
    /// buffer cannot hold a particle's forward list, the list is truncated to
    /// the remaining capacity in discovery order and a warning is returned.
    pub fn pack(&mut self, hash: &SpatialHash) -> Vec<PackWarning> {
        let n = self.particle_count;
        let mut warnings = Vec::new();

        self.pairs.clear();
        self.entries.clear();
        self.partners.clear();
        for list in &mut self.incoming {
            list.clear();
        }

        for i in 0..n {
            // --- 1. Forward neighbours, truncated to remaining capacity ---
            self.forward.clear();
            hash.for_each_higher_neighbor(i, |j| self.forward.push(j as u32));
            let remaining = self.pair_capacity - self.pairs.len();
            if self.forward.len() > remaining {
                let found = self.forward.len();
                self.forward.truncate(remaining);
                tracing::warn!(
                    "Neighbour capacity exceeded at particle {}: kept {} of {} forward neighbours",
                    i,
                    remaining,
                    found
                );
                warnings.push(PackWarning::NeighbourCapacityExceeded {
                    particle: i,
                    found,
                    kept: remaining,
                });
            }

            // --- 2. Store forward pairs; queue the reversed view on each partner ---
            let start_index = self.entries.len() as u32;
            for &j in &self.forward {
                let slot = self.pairs.len() as u32;
                self.pairs.push(NeighbourPair { i: i as u32, j });
                self.entries.push(slot);
                self.partners.push(j);
                self.incoming[j as usize].push((slot, i as u32));
            }

            // --- 3. Extras from lower-indexed particles, ascending ---
            let num_extras = self.incoming[i].len() as u32;
            for &(slot, partner) in &self.incoming[i] {
                self.entries.push(slot);
                self.partners.push(partner);
            }

            // --- 4. Emit the record in every layout ---
            let record = NeighbourRecord {
                start_index,
                length: self.entries.len() as u32 - start_index,
                num_extras,
            };
            self.scalar.write(n, i, record);
            self.interleaved.write(n, i, record);
            self.doubled.write(n, i, record);
        }

        warnings
    }

    /// Number of particles the buffers were sized for.
    pub fn particle_count(&self) -> usize {
        self.particle_count
    }

    /// Configured average neighbour budget.
    pub fn max_neighbours(&self) -> usize {
        self.max_neighbours
    }

    /// Maximum number of stored pairs.
    pub fn pair_capacity(&self) -> usize {
        self.pair_capacity
    }

    /// Stored pairs of the last pack.
    pub fn pairs(&self) -> &[NeighbourPair] {
        &self.pairs
    }

    /// Pair slot referenced by each entry.
    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    /// Neighbour particle of each entry.
    pub fn partners(&self) -> &[u32] {
        &self.partners
    }

    /// Records, one per particle per constraint channel.
    pub fn scalar_records(&self) -> &RecordBuffer {
        &self.scalar
    }

    /// Records, one per particle axis.
    pub fn interleaved_records(&self) -> &RecordBuffer {
        &self.interleaved
    }

    /// Records with an empty velocity half and an interleaved position half.
    pub fn doubled_records(&self) -> &RecordBuffer {
        &self.doubled
    }

    /// Particle `i`'s record (identical in every layout).
    pub fn record(&self, i: usize) -> NeighbourRecord {
        self.scalar.record(i)
    }
}
