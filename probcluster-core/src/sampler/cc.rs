//! Connected-components sampler: draws possible worlds by independent edge
//! retention, reduced to a component map via union-find.

use std::ops::Range;

use rayon::prelude::*;

use crate::cache::CountsCache;
use crate::graph::{UncertainGraph, VertexId};
use crate::rng::{Xorshift1024Star, stream_for_worker};

use super::{Sampler, SamplerConfig};

/// A growing, append-only pool of possible worlds. Each world is a
/// component-id array of length `n`; two vertices share a component id iff
/// they are connected in that world.
#[derive(Debug)]
struct SamplePool {
    n: usize,
    worlds: Vec<Vec<u32>>,
    used: usize,
    /// One persistent RNG stream per rayon worker, derived once via
    /// `jump()` at construction and then advanced a single draw per world
    /// it generates. Reused across `grow_to` calls so a pool grown in
    /// stages produces the same worlds as one grown in a single call.
    streams: Vec<Xorshift1024Star>,
}

impl SamplePool {
    fn new(n: usize, seed: u64) -> Self {
        let num_streams = rayon::current_num_threads().max(1);
        let streams = (0..num_streams)
            .map(|worker| stream_for_worker(seed, worker))
            .collect();
        Self {
            n,
            worlds: Vec::new(),
            used: 0,
            streams,
        }
    }

    fn total(&self) -> usize {
        self.worlds.len()
    }

    /// Grows the pool to at least `target` worlds, generating only the new
    /// slots in parallel; existing worlds are never regenerated or
    /// reordered. New slots are split into one contiguous chunk per
    /// worker stream, each stream drawing sequentially for its own chunk,
    /// so growing the pool costs one `jump()` per worker in total rather
    /// than one per sample.
    fn grow_to(&mut self, target: usize, graph: &UncertainGraph) {
        if target <= self.total() {
            return;
        }
        let num_new = target - self.total();
        let num_streams = self.streams.len().max(1);
        let chunk_size = num_new.div_ceil(num_streams).max(1);

        let mut new_worlds: Vec<Vec<u32>> = (0..num_new).map(|_| Vec::new()).collect();
        new_worlds
            .par_chunks_mut(chunk_size)
            .zip(self.streams.par_iter_mut())
            .for_each(|(chunk, stream)| {
                for world in chunk.iter_mut() {
                    *world = generate_world(graph, stream);
                }
            });
        self.worlds.append(&mut new_worlds);
    }

    fn set_used(&mut self, used: usize) {
        self.used = used.min(self.total());
    }
}

/// Draws a single possible world: each edge is independently retained with
/// probability `edge.probability`, then reduced to a component map via
/// union-by-rank with path-halving path compression.
fn generate_world(graph: &UncertainGraph, rng: &mut Xorshift1024Star) -> Vec<u32> {
    let n = graph.vertex_count();
    let mut parent: Vec<u32> = (0..n as u32).collect();
    let mut rank: Vec<u8> = vec![0; n];

    fn find(parent: &mut [u32], mut node: u32) -> u32 {
        while parent[node as usize] != node {
            let grandparent = parent[parent[node as usize] as usize];
            parent[node as usize] = grandparent;
            node = parent[node as usize];
        }
        node
    }

    fn union(parent: &mut [u32], rank: &mut [u8], left: u32, right: u32) {
        let mut left_root = find(parent, left);
        let mut right_root = find(parent, right);
        if left_root == right_root {
            return;
        }
        if rank[left_root as usize] < rank[right_root as usize] {
            std::mem::swap(&mut left_root, &mut right_root);
        }
        parent[right_root as usize] = left_root;
        if rank[left_root as usize] == rank[right_root as usize] {
            rank[left_root as usize] = rank[left_root as usize].saturating_add(1);
        }
    }

    for edge in graph.edges() {
        if edge.left == edge.right {
            continue;
        }
        if rng.next_f64() < edge.probability {
            union(&mut parent, &mut rank, edge.left, edge.right);
        }
    }

    (0..n as u32).map(|v| find(&mut parent, v)).collect()
}

/// Accumulates, for source vertex `v`, the number of worlds in `range` in
/// which each other vertex shares `v`'s component. Parallel across the
/// sample range; the per-worker partial sums are combined with ordinary
/// integer addition, which is associative and commutative, so the
/// reduction order has no effect on the result.
fn accumulate_counts(worlds: &[Vec<u32>], range: Range<usize>, v: VertexId, n: usize) -> Vec<u64> {
    worlds[range]
        .par_iter()
        .fold(
            || vec![0u64; n],
            |mut acc, world| {
                let source_component = world[v as usize];
                for (u, component) in world.iter().enumerate() {
                    if *component == source_component {
                        acc[u] += 1;
                    }
                }
                acc
            },
        )
        .reduce(|| vec![0u64; n], sum_vectors)
}

fn sum_vectors(mut a: Vec<u64>, b: Vec<u64>) -> Vec<u64> {
    for (x, y) in a.iter_mut().zip(b.iter()) {
        *x += y;
    }
    a
}

/// Samples possible worlds by full connected-components reduction over
/// independently-retained edges.
///
/// # Examples
/// ```
/// use probcluster_core::graph::UncertainGraphBuilder;
/// use probcluster_core::sampler::{ConnectedComponentsSampler, Sampler, SamplerConfig};
///
/// let mut builder = UncertainGraphBuilder::new();
/// let a = builder.vertex("A");
/// let b = builder.vertex("B");
/// builder.edge(a, b, 1.0).unwrap();
/// let graph = builder.build();
///
/// let config = SamplerConfig { epsilon: 0.1, delta: 0.01, theory_samples_fraction: 0.1 };
/// let mut sampler = ConnectedComponentsSampler::new(&graph, config, 42);
/// sampler.min_probability(0.5);
/// let mut out = vec![0.0; graph.vertex_count()];
/// sampler.connection_probabilities(a, &mut out);
/// assert_eq!(out[b as usize], 1.0);
/// ```
#[derive(Debug)]
pub struct ConnectedComponentsSampler<'g> {
    graph: &'g UncertainGraph,
    config: SamplerConfig,
    pool: SamplePool,
    min_reliable: f64,
}

impl<'g> ConnectedComponentsSampler<'g> {
    /// Creates a new sampler over `graph`, using `seed` to derive the
    /// sampler's per-worker RNG streams.
    #[must_use]
    pub fn new(graph: &'g UncertainGraph, config: SamplerConfig, seed: u64) -> Self {
        Self {
            graph,
            config,
            pool: SamplePool::new(graph.vertex_count(), seed),
            min_reliable: 1.0,
        }
    }

    /// Number of worlds currently in the pool.
    #[must_use]
    pub fn total_samples(&self) -> usize {
        self.pool.total()
    }

    /// Number of worlds currently participating in estimates.
    #[must_use]
    pub fn used_samples(&self) -> usize {
        self.pool.used
    }
}

impl Sampler for ConnectedComponentsSampler<'_> {
    fn vertex_count(&self) -> usize {
        self.pool.n
    }

    fn min_probability(&mut self, p: f64) {
        let target = self.config.required_samples(p);
        self.pool.grow_to(target, self.graph);
        self.pool.set_used(target);
        self.min_reliable = self.min_reliable.min(p);
    }

    fn min_reliable(&self) -> f64 {
        self.min_reliable
    }

    fn connection_probabilities(&self, v: VertexId, out: &mut [f64]) -> usize {
        let used = self.pool.used;
        if used == 0 {
            out.fill(0.0);
            return 0;
        }
        let counts = accumulate_counts(&self.pool.worlds, 0..used, v, self.pool.n);
        #[expect(
            clippy::cast_precision_loss,
            reason = "sample counts are far below f64's exact-integer range in practice"
        )]
        let used_f64 = used as f64;
        let mut reliable = 0;
        for (slot, count) in out.iter_mut().zip(counts.iter()) {
            #[expect(
                clippy::cast_precision_loss,
                reason = "per-world counts are bounded by used, far below f64's exact-integer range"
            )]
            let probability = *count as f64 / used_f64;
            *slot = probability;
            if probability >= self.min_reliable {
                reliable += 1;
            }
        }
        reliable
    }

    fn connection_probabilities_cache(
        &self,
        v: VertexId,
        cache: &mut CountsCache,
        out: &mut [f64],
    ) -> usize {
        let used = self.pool.used;
        let n = self.pool.n;
        let entry = cache.get_or_new(v, n);
        if used > entry.samples_seen {
            let delta = accumulate_counts(&self.pool.worlds, entry.samples_seen..used, v, n);
            for (total, partial) in entry.counts.iter_mut().zip(delta.iter()) {
                *total += partial;
            }
            entry.samples_seen = used;
        }
        if entry.samples_seen == 0 {
            out.fill(0.0);
            return 0;
        }
        #[expect(
            clippy::cast_precision_loss,
            reason = "sample counts are far below f64's exact-integer range"
        )]
        let samples_seen_f64 = entry.samples_seen as f64;
        let mut reliable = 0;
        for (slot, count) in out.iter_mut().zip(entry.counts.iter()) {
            #[expect(
                clippy::cast_precision_loss,
                reason = "per-world counts are bounded by samples_seen, far below f64's exact-integer range"
            )]
            let probability = *count as f64 / samples_seen_f64;
            *slot = probability;
            if probability >= self.min_reliable {
                reliable += 1;
            }
        }
        reliable
    }

    fn used_worlds(&self) -> &[Vec<VertexId>] {
        &self.pool.worlds[..self.pool.used]
    }

    fn connection_probability(&self, vertices: &[VertexId]) -> f64 {
        let used = self.pool.used;
        if used == 0 || vertices.is_empty() {
            return 0.0;
        }
        let source = vertices[0];
        let matches = self.pool.worlds[..used]
            .iter()
            .filter(|world| {
                let source_component = world[source as usize];
                vertices
                    .iter()
                    .all(|&v| world[v as usize] == source_component)
            })
            .count();
        #[expect(
            clippy::cast_precision_loss,
            reason = "used is far below f64's exact-integer range"
        )]
        let result = matches as f64 / used as f64;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::UncertainGraphBuilder;

    fn config() -> SamplerConfig {
        SamplerConfig {
            epsilon: 0.2,
            delta: 0.1,
            theory_samples_fraction: 0.2,
        }
    }

    #[test]
    fn self_probability_is_always_one() {
        let mut builder = UncertainGraphBuilder::new();
        let a = builder.vertex("A");
        let b = builder.vertex("B");
        builder.edge(a, b, 0.3).unwrap();
        let graph = builder.build();

        let mut sampler = ConnectedComponentsSampler::new(&graph, config(), 1);
        sampler.min_probability(0.5);
        let mut out = vec![0.0; graph.vertex_count()];
        sampler.connection_probabilities(a, &mut out);
        assert_eq!(out[a as usize], 1.0);
    }

    #[test]
    fn certain_edge_yields_exact_probability_one() {
        let mut builder = UncertainGraphBuilder::new();
        let a = builder.vertex("A");
        let b = builder.vertex("B");
        builder.edge(a, b, 1.0).unwrap();
        let graph = builder.build();

        let mut sampler = ConnectedComponentsSampler::new(&graph, config(), 2);
        sampler.min_probability(0.9);
        let mut out = vec![0.0; graph.vertex_count()];
        sampler.connection_probabilities(a, &mut out);
        assert_eq!(out[b as usize], 1.0);
    }

    #[test]
    fn disconnected_vertex_has_zero_probability() {
        let mut builder = UncertainGraphBuilder::new();
        let a = builder.vertex("A");
        let _b = builder.vertex("B");
        let c = builder.vertex("C");
        let d = builder.vertex("D");
        builder.edge(c, d, 1.0).unwrap();
        let graph = builder.build();

        let mut sampler = ConnectedComponentsSampler::new(&graph, config(), 3);
        sampler.min_probability(0.5);
        let mut out = vec![0.0; graph.vertex_count()];
        sampler.connection_probabilities(a, &mut out);
        assert_eq!(out[c as usize], 0.0);
        assert_eq!(out[d as usize], 0.0);
    }

    #[test]
    fn cached_path_matches_uncached_path() {
        let mut builder = UncertainGraphBuilder::new();
        let a = builder.vertex("A");
        let b = builder.vertex("B");
        let c = builder.vertex("C");
        builder.edge(a, b, 0.6).unwrap();
        builder.edge(b, c, 0.6).unwrap();
        let graph = builder.build();

        let mut sampler = ConnectedComponentsSampler::new(&graph, config(), 4);
        sampler.min_probability(0.3);

        let mut direct = vec![0.0; graph.vertex_count()];
        sampler.connection_probabilities(a, &mut direct);

        let mut cache = CountsCache::new(8);
        let mut cached = vec![0.0; graph.vertex_count()];
        sampler.connection_probabilities_cache(a, &mut cache, &mut cached);

        for (d, c) in direct.iter().zip(cached.iter()) {
            assert!((d - c).abs() < 1e-12);
        }
    }

    #[test]
    fn cache_accumulates_across_pool_growth() {
        let mut builder = UncertainGraphBuilder::new();
        let a = builder.vertex("A");
        let b = builder.vertex("B");
        builder.edge(a, b, 0.7).unwrap();
        let graph = builder.build();

        let mut sampler = ConnectedComponentsSampler::new(&graph, config(), 5);
        let mut cache = CountsCache::new(8);

        sampler.min_probability(0.9);
        let mut out = vec![0.0; graph.vertex_count()];
        sampler.connection_probabilities_cache(a, &mut cache, &mut out);
        let first_samples_seen = cache.get_or_new(a, graph.vertex_count()).samples_seen;

        sampler.min_probability(0.3);
        sampler.connection_probabilities_cache(a, &mut cache, &mut out);
        let second_samples_seen = cache.get_or_new(a, graph.vertex_count()).samples_seen;

        assert!(second_samples_seen >= first_samples_seen);
    }

    #[test]
    fn growing_pool_then_querying_matches_growing_directly() {
        let mut builder = UncertainGraphBuilder::new();
        let a = builder.vertex("A");
        let b = builder.vertex("B");
        builder.edge(a, b, 0.5).unwrap();
        let graph = builder.build();

        let mut staged = ConnectedComponentsSampler::new(&graph, config(), 9);
        staged.min_probability(0.9);
        staged.min_probability(0.2);
        let mut staged_out = vec![0.0; graph.vertex_count()];
        staged.connection_probabilities(a, &mut staged_out);

        let mut direct = ConnectedComponentsSampler::new(&graph, config(), 9);
        direct.min_probability(0.2);
        let mut direct_out = vec![0.0; graph.vertex_count()];
        direct.connection_probabilities(a, &mut direct_out);

        assert_eq!(staged_out, direct_out);
    }

    #[test]
    fn connection_probability_over_a_vertex_set() {
        let mut builder = UncertainGraphBuilder::new();
        let a = builder.vertex("A");
        let b = builder.vertex("B");
        let c = builder.vertex("C");
        builder.edge(a, b, 1.0).unwrap();
        builder.edge(b, c, 1.0).unwrap();
        let graph = builder.build();

        let mut sampler = ConnectedComponentsSampler::new(&graph, config(), 6);
        sampler.min_probability(0.5);
        assert_eq!(sampler.connection_probability(&[a, b, c]), 1.0);
    }
}
