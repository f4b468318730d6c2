//! Minimum connection probability (k-center-style) clustering engine (§4.6).

use tracing::{instrument, warn};

use crate::cache::CountsCache;
use crate::error::{ClusteringError, ClusteringResult};
use crate::guesser::{ExponentialBisectGuesser, Guesser};
use crate::rng::Xorshift1024Star;
use crate::sampler::Sampler;

use super::{CenterSelector, Clustering, PreferCachedUncoveredSelector};

/// Parameters controlling a min-prob clustering run.
#[derive(Clone, Copy, Debug)]
pub struct MinProbConfig {
    /// Target number of clusters.
    pub target_k: usize,
    /// Number of vertices allowed to become singleton clusters to escape
    /// an otherwise-infeasible threshold.
    pub slack: usize,
    /// Bisection tolerance for the threshold guesser.
    pub gamma: f64,
    /// Lowest threshold the guesser will ever probe.
    pub p_low: f64,
    /// Seed for the engine's tie-break RNG.
    pub seed: u64,
    /// Capacity of the counts cache.
    pub cache_capacity: usize,
    /// Whether center-selection ties are broken uniformly at random rather
    /// than by ascending vertex id.
    pub randomized_center_selection: bool,
}

/// The result of a completed min-prob clustering run.
#[derive(Clone, Debug)]
pub struct MinProbOutcome {
    /// The final clustering.
    pub clustering: Clustering,
    /// The threshold the final clustering was validated at (or the
    /// guesser's terminal value, if the run only produced a degenerate
    /// fallback).
    pub terminal_p_curr: f64,
    /// Number of vertices promoted to singleton clusters by the slack
    /// fast-exit.
    pub used_slack: usize,
    /// Number of vertices attached by the post-loop degenerate fallback.
    pub degenerate_fallback_count: usize,
}

struct CoverOutcome {
    uncovered: usize,
    used_slack: usize,
}

/// Runs the min-prob greedy cover once at a fixed threshold `p_curr`.
fn run_cover<S: Sampler>(
    sampler: &S,
    cache: &mut CountsCache,
    vinfo: &mut Clustering,
    selector: &mut dyn CenterSelector,
    rng: &mut Xorshift1024Star,
    target_k: usize,
    slack: usize,
    p_curr: f64,
) -> CoverOutcome {
    let n = vinfo.len();
    let mut estimates = vec![0.0; n];
    let mut centers_selected = 0usize;
    let mut used_slack = 0usize;

    while centers_selected < target_k {
        let uncovered = vinfo.uncovered_count();
        if centers_selected + uncovered <= target_k + slack {
            for i in 0..u32::try_from(n).expect("vertex count fits in u32") {
                if !vinfo.get(i).is_covered() {
                    vinfo.get_mut(i).make_center(i);
                    used_slack += 1;
                }
            }
            break;
        }

        let Some(center) = selector.select(vinfo, cache, p_curr, rng) else {
            break;
        };
        vinfo.get_mut(center).make_center(center);
        centers_selected += 1;

        sampler.connection_probabilities_cache(center, cache, &mut estimates);

        for i in 0..u32::try_from(n).expect("vertex count fits in u32") {
            let probability = estimates[i as usize];
            let record = *vinfo.get(i);
            if probability >= p_curr {
                if !record.is_covered() {
                    vinfo.get_mut(i).cover(center, probability);
                } else if probability > record.probability() {
                    vinfo.get_mut(i).recover(center, probability);
                }
            } else if !record.is_covered() && probability > record.unreliable_probability() {
                vinfo.get_mut(i).unreliable_cover(center, probability);
            }
        }

        for i in 0..u32::try_from(n).expect("vertex count fits in u32") {
            let record = vinfo.get(i);
            if record.is_covered() && !record.is_center() {
                cache.set_accessed(i, 0);
            }
        }
    }

    CoverOutcome {
        uncovered: vinfo.uncovered_count(),
        used_slack,
    }
}

/// Runs the shared probing loop (§4.5) driving the min-prob greedy cover.
///
/// # Errors
/// Returns [`ClusteringError::TargetBelowComponents`] if `config.target_k`
/// is smaller than `components`, the graph's connected-component count.
#[instrument(skip(sampler), fields(target_k = config.target_k, components))]
pub fn run<S: Sampler>(
    sampler: &mut S,
    components: usize,
    config: &MinProbConfig,
) -> ClusteringResult<MinProbOutcome> {
    if config.target_k < components {
        return Err(ClusteringError::TargetBelowComponents {
            target: config.target_k,
            components,
        });
    }

    let n = sampler.vertex_count();
    let mut cache = CountsCache::new(config.cache_capacity.max(1));
    let mut guesser = ExponentialBisectGuesser::new(config.gamma, config.p_low);
    let mut rng = Xorshift1024Star::new(config.seed);
    let mut selector = PreferCachedUncoveredSelector {
        randomized: config.randomized_center_selection,
    };
    let mut vinfo = Clustering::new(n);

    let mut best: Option<(Clustering, f64, usize)> = None;
    let mut last_attempt: Option<(Clustering, f64)> = None;

    while !guesser.stopped() {
        cache.cleanup();
        vinfo.reset();
        let p_curr = guesser.current();
        sampler.min_probability(p_curr);

        let outcome = run_cover(
            sampler,
            &mut cache,
            &mut vinfo,
            &mut selector,
            &mut rng,
            config.target_k,
            config.slack,
            p_curr,
        );

        if outcome.uncovered == 0 {
            guesser.below();
            best = Some((vinfo.clone(), p_curr, outcome.used_slack));
        } else {
            guesser.above();
        }
        last_attempt = Some((vinfo.clone(), p_curr));
    }

    let (mut clustering, terminal_p_curr, used_slack) = match best {
        Some((clustering, p_curr, used_slack)) => (clustering, p_curr, used_slack),
        None => {
            let (clustering, p_curr) =
                last_attempt.ok_or_else(|| ClusteringError::InvariantViolation {
                    message: "probing loop terminated without running a single iteration".into(),
                })?;
            (clustering, p_curr, 0)
        }
    };

    let mut degenerate_fallback_count = 0;
    if clustering.uncovered_count() > 0 {
        let Some(fallback_center) = clustering.first_center() else {
            return Err(ClusteringError::InvariantViolation {
                message: "no center exists to attach degenerate fallback vertices to".into(),
            });
        };
        let n_u32 = u32::try_from(n).expect("vertex count fits in u32");
        for vertex in 0..n_u32 {
            if !clustering.get(vertex).is_covered() {
                clustering.get_mut(vertex).cover(fallback_center, 0.0);
                degenerate_fallback_count += 1;
                warn!(
                    vertex,
                    fallback_center, "degenerate fallback: vertex attached with probability 0.0"
                );
            }
        }
    }

    Ok(MinProbOutcome {
        clustering,
        terminal_p_curr,
        used_slack,
        degenerate_fallback_count,
    })
}
