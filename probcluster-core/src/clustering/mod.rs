//! Clustering engines: the shared probing loop and greedy threshold-covering
//! algorithms that build a candidate clustering at each threshold guess.

pub mod avg_prob;
pub mod concurrent;
pub mod min_prob;

use crate::cache::CountsCache;
use crate::graph::VertexId;
use crate::rng::Xorshift1024Star;

/// Per-vertex clustering state. Replaces the original's "encode unreliable
/// as a negative probability in the same float slot" trick with a tagged
/// variant, per the spec's design notes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClusterVertex {
    /// This vertex is itself a cluster center.
    Center {
        /// The vertex's own id.
        id: VertexId,
    },
    /// This vertex is reliably assigned to `center` at the recorded
    /// `probability`.
    Covered {
        /// The center this vertex is assigned to.
        center: VertexId,
        /// A reliable estimate of `P(vertex -> center)`.
        probability: f64,
    },
    /// This vertex has not cleared the current threshold; `best_center`
    /// and `best_probability` record the best estimate seen so far, if
    /// any, purely as a tie-breaking aid for later iterations.
    Uncovered {
        /// The best candidate center found so far, if any.
        best_center: Option<VertexId>,
        /// The probability estimate associated with `best_center`.
        best_probability: f64,
    },
}

impl ClusterVertex {
    /// A fresh, uncovered vertex record with no history.
    #[must_use]
    pub const fn new_uncovered() -> Self {
        Self::Uncovered {
            best_center: None,
            best_probability: 0.0,
        }
    }

    /// Whether this vertex is a center.
    #[must_use]
    pub const fn is_center(&self) -> bool {
        matches!(self, Self::Center { .. })
    }

    /// Whether this vertex is covered (a center counts as covered by
    /// itself).
    #[must_use]
    pub const fn is_covered(&self) -> bool {
        !matches!(self, Self::Uncovered { .. })
    }

    /// The vertex's assigned center, if it has one.
    #[must_use]
    pub const fn center(&self) -> Option<VertexId> {
        match self {
            Self::Center { id } => Some(*id),
            Self::Covered { center, .. } => Some(*center),
            Self::Uncovered { best_center, .. } => *best_center,
        }
    }

    /// The vertex's reliable connection probability: `1.0` for a center,
    /// the recorded estimate for a covered vertex, `0.0` for an uncovered
    /// vertex (even if a best-effort estimate exists).
    #[must_use]
    pub const fn probability(&self) -> f64 {
        match self {
            Self::Center { .. } => 1.0,
            Self::Covered { probability, .. } => *probability,
            Self::Uncovered { .. } => 0.0,
        }
    }

    /// The best-effort probability estimate for an uncovered vertex, or the
    /// reliable probability if the vertex is already covered.
    #[must_use]
    pub const fn unreliable_probability(&self) -> f64 {
        match self {
            Self::Uncovered {
                best_probability, ..
            } => *best_probability,
            _ => self.probability(),
        }
    }

    /// Promotes this vertex to a center.
    pub fn make_center(&mut self, id: VertexId) {
        *self = Self::Center { id };
    }

    /// Marks this (previously uncovered) vertex as covered by `center`.
    pub fn cover(&mut self, center: VertexId, probability: f64) {
        *self = Self::Covered {
            center,
            probability,
        };
    }

    /// Re-assigns an already-covered vertex to a better center.
    pub fn recover(&mut self, center: VertexId, probability: f64) {
        *self = Self::Covered {
            center,
            probability,
        };
    }

    /// Records a best-effort (sub-threshold) estimate for an uncovered
    /// vertex without covering it.
    pub fn unreliable_cover(&mut self, center: VertexId, probability: f64) {
        *self = Self::Uncovered {
            best_center: Some(center),
            best_probability: probability,
        };
    }
}

/// A full clustering: one [`ClusterVertex`] record per vertex.
#[derive(Clone, Debug)]
pub struct Clustering {
    vertices: Vec<ClusterVertex>,
}

impl Clustering {
    /// Creates a clustering of `n` vertices, all initially uncovered.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            vertices: vec![ClusterVertex::new_uncovered(); n],
        }
    }

    /// Resets every vertex to uncovered, discarding prior assignments.
    pub fn reset(&mut self) {
        for vertex in &mut self.vertices {
            *vertex = ClusterVertex::new_uncovered();
        }
    }

    /// Number of vertices in the clustering.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Whether the clustering has no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// The record for `vertex`.
    #[must_use]
    pub fn get(&self, vertex: VertexId) -> &ClusterVertex {
        &self.vertices[vertex as usize]
    }

    /// A mutable reference to the record for `vertex`.
    pub fn get_mut(&mut self, vertex: VertexId) -> &mut ClusterVertex {
        &mut self.vertices[vertex as usize]
    }

    /// All vertex records, in vertex-id order.
    #[must_use]
    pub fn vertices(&self) -> &[ClusterVertex] {
        &self.vertices
    }

    /// Number of vertices not yet covered.
    #[must_use]
    pub fn uncovered_count(&self) -> usize {
        self.vertices.iter().filter(|v| !v.is_covered()).count()
    }

    /// Number of vertices currently marked as centers.
    #[must_use]
    pub fn center_count(&self) -> usize {
        self.vertices.iter().filter(|v| v.is_center()).count()
    }

    /// Ids of every vertex marked as a center, in vertex-id order.
    #[must_use]
    pub fn center_ids(&self) -> Vec<VertexId> {
        self.vertices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_center())
            .map(|(i, _)| u32::try_from(i).expect("vertex count fits in u32"))
            .collect()
    }

    /// The first vertex currently marked as a center, scanning forward from
    /// id 0. `None` if the clustering has no centers at all.
    #[must_use]
    pub fn first_center(&self) -> Option<VertexId> {
        self.vertices
            .iter()
            .position(ClusterVertex::is_center)
            .map(|i| u32::try_from(i).expect("vertex count fits in u32"))
    }
}

/// Selects the next vertex to promote to a center during a greedy cover
/// (§4.6, §4.7). The default strategy prefers uncovered vertices that
/// already have a cache entry (to amortise cache reuse), then any other
/// uncovered vertex, then any vertex eligible for re-covering; ties are
/// broken by ascending vertex id unless randomisation is requested.
pub trait CenterSelector {
    /// Picks the next center from the vertices not yet satisfying
    /// `p_curr`, or `None` if every vertex already does.
    fn select(
        &mut self,
        clustering: &Clustering,
        cache: &CountsCache,
        p_curr: f64,
        rng: &mut Xorshift1024Star,
    ) -> Option<VertexId>;
}

/// The default [`CenterSelector`]: prefers uncovered-and-cached vertices,
/// then any uncovered vertex, then any vertex below threshold; ascending-id
/// tie-break, optionally randomised uniformly over the eligible set.
#[derive(Clone, Copy, Debug, Default)]
pub struct PreferCachedUncoveredSelector {
    /// When set, the tie-break among equally-preferred candidates is
    /// uniform random rather than lowest-id-first.
    pub randomized: bool,
}

impl CenterSelector for PreferCachedUncoveredSelector {
    fn select(
        &mut self,
        clustering: &Clustering,
        cache: &CountsCache,
        p_curr: f64,
        rng: &mut Xorshift1024Star,
    ) -> Option<VertexId> {
        let eligible: Vec<VertexId> = (0..clustering.len())
            .filter_map(|i| {
                let id = u32::try_from(i).expect("vertex count fits in u32");
                let record = clustering.get(id);
                let below_threshold = !record.is_covered() || record.probability() < p_curr;
                (!record.is_center() && below_threshold).then_some(id)
            })
            .collect();

        if eligible.is_empty() {
            return None;
        }

        let uncovered_and_cached: Vec<VertexId> = eligible
            .iter()
            .copied()
            .filter(|&v| !clustering.get(v).is_covered() && cache.contains(v))
            .collect();
        let uncovered: Vec<VertexId> = eligible
            .iter()
            .copied()
            .filter(|&v| !clustering.get(v).is_covered())
            .collect();

        let pool = if !uncovered_and_cached.is_empty() {
            &uncovered_and_cached
        } else if !uncovered.is_empty() {
            &uncovered
        } else {
            &eligible
        };

        if self.randomized {
            let index = rng.next_below(pool.len());
            Some(pool[index])
        } else {
            Some(pool[0])
        }
    }
}
