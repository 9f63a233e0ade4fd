//! Parameter islands — clusters of nearby gate-passing candidates.
//!
//! A robust region shows up as several good neighbours, a lucky point as a
//! lone one. The top-N passing candidates are min-max normalized per
//! parameter and grouped with k-means (deterministic farthest-point seeding
//! starting from the best candidate). Centroids and spreads are reported in
//! the original parameter units.

use alertlab_core::stats::{mean, median, std_dev};
use alertlab_core::Fingerprint;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::search::{ParamName, ParamPoint, ParameterCandidate};

const MAX_ITERATIONS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterIsland {
    pub id: usize,
    pub centroid: ParamPoint,
    /// Population standard deviation per parameter.
    pub spread: ParamPoint,
    pub member_count: usize,
    pub mean_score: f64,
    pub median_score: f64,
    pub best_score: f64,
    pub best_point: ParamPoint,
    pub best_fingerprint: Fingerprint,
    pub members: Vec<Fingerprint>,
}

/// Cluster the top `top_n` gate-passing candidates into at most `n_islands`.
///
/// Fewer candidates than islands gives fewer islands; no passing candidates
/// gives none. Islands are sorted by descending mean score.
pub fn cluster_islands(candidates: &[ParameterCandidate], top_n: usize, n_islands: usize) -> Vec<ParameterIsland> {
    let mut pool: Vec<&ParameterCandidate> = candidates.iter().filter(|c| c.result.passes_gates).collect();
    pool.sort_by(|a, b| b.score().total_cmp(&a.score()).then_with(|| a.fingerprint.cmp(&b.fingerprint)));
    pool.truncate(top_n);

    let k = n_islands.min(pool.len());
    if k == 0 {
        return Vec::new();
    }

    let names: Vec<ParamName> = pool[0].point.keys().copied().collect();
    let raw: Vec<Vec<f64>> = pool
        .iter()
        .map(|c| names.iter().map(|n| c.point.get(n).copied().unwrap_or(0.0)).collect())
        .collect();
    let normalized = normalize(&raw);
    let assignment = kmeans(&normalized, k);

    let mut islands: Vec<ParameterIsland> = (0..k)
        .filter_map(|cluster| {
            let members: Vec<usize> = (0..pool.len()).filter(|i| assignment[*i] == cluster).collect();
            if members.is_empty() {
                return None;
            }
            let scores: Vec<f64> = members.iter().map(|i| pool[*i].score()).collect();
            let mut centroid = ParamPoint::new();
            let mut spread = ParamPoint::new();
            for (d, name) in names.iter().enumerate() {
                let column: Vec<f64> = members.iter().map(|i| raw[*i][d]).collect();
                centroid.insert(*name, mean(&column));
                spread.insert(*name, std_dev(&column));
            }
            // Pool is score-sorted, so the first member is the best.
            let best = pool[members[0]];
            Some(ParameterIsland {
                id: 0,
                centroid,
                spread,
                member_count: members.len(),
                mean_score: mean(&scores),
                median_score: median(&scores),
                best_score: best.score(),
                best_point: best.point.clone(),
                best_fingerprint: best.fingerprint,
                members: members.iter().map(|i| pool[*i].fingerprint).collect(),
            })
        })
        .collect();

    islands.sort_by(|a, b| b.mean_score.total_cmp(&a.mean_score));
    for (id, island) in islands.iter_mut().enumerate() {
        island.id = id;
    }
    debug!(candidates = pool.len(), islands = islands.len(), "clustered parameter islands");
    islands
}

/// Scale each column to `[0, 1]`. Constant columns map to 0.
fn normalize(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let dims = rows.first().map_or(0, Vec::len);
    let bounds: Vec<(f64, f64)> = (0..dims)
        .map(|d| {
            rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
                (lo.min(r[d]), hi.max(r[d]))
            })
        })
        .collect();
    rows.iter()
        .map(|r| {
            r.iter()
                .zip(&bounds)
                .map(|(v, (lo, hi))| if hi > lo { (v - lo) / (hi - lo) } else { 0.0 })
                .collect()
        })
        .collect()
}

fn distance_sq(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Index of the closest centroid; ties go to the lower index.
fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = distance_sq(point, c);
        if d < best_d {
            best = i;
            best_d = d;
        }
    }
    best
}

/// Lloyd's algorithm. Row 0 (the best candidate) seeds the first cluster and
/// each further seed is the row farthest from the seeds chosen so far.
fn kmeans(rows: &[Vec<f64>], k: usize) -> Vec<usize> {
    let mut seeds = vec![0];
    while seeds.len() < k {
        let next = (0..rows.len())
            .filter(|i| !seeds.contains(i))
            .map(|i| {
                let d = seeds.iter().map(|s| distance_sq(&rows[i], &rows[*s])).fold(f64::INFINITY, f64::min);
                (i, d)
            })
            .fold(None::<(usize, f64)>, |acc, (i, d)| match acc {
                Some((_, best)) if best >= d => acc,
                _ => Some((i, d)),
            });
        match next {
            Some((i, _)) => seeds.push(i),
            None => break,
        }
    }

    let mut centroids: Vec<Vec<f64>> = seeds.iter().map(|s| rows[*s].clone()).collect();
    let mut assignment: Vec<usize> = rows.iter().map(|r| nearest(r, &centroids)).collect();

    for _ in 0..MAX_ITERATIONS {
        for (c, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<&Vec<f64>> = rows.iter().zip(&assignment).filter(|(_, a)| **a == c).map(|(r, _)| r).collect();
            if members.is_empty() {
                continue;
            }
            for (d, value) in centroid.iter_mut().enumerate() {
                *value = members.iter().map(|m| m[d]).sum::<f64>() / members.len() as f64;
            }
        }
        let next: Vec<usize> = rows.iter().map(|r| nearest(r, &centroids)).collect();
        if next == assignment {
            break;
        }
        assignment = next;
    }
    assignment
}

#[cfg(test)]
mod tests {
    use alertlab_core::StrategyParams;

    use super::*;
    use crate::objective::{evaluate_objective, ObjectiveConfig};

    fn candidate(tp: f64, sl: f64, score_shift: f64, passes: bool) -> ParameterCandidate {
        let mut result = evaluate_objective(&[], &ObjectiveConfig::default());
        result.score = score_shift;
        result.passes_gates = passes;
        let point = ParamPoint::from([(ParamName::TakeProfitMult, tp), (ParamName::StopLossMult, sl)]);
        let bytes = format!("{tp}-{sl}");
        ParameterCandidate {
            point,
            params: StrategyParams::default(),
            fingerprint: Fingerprint::from_bytes(bytes.as_bytes()),
            folds: Vec::new(),
            result,
        }
    }

    #[test]
    fn two_separated_groups_become_two_islands() {
        let candidates = vec![
            candidate(2.0, 0.30, 5.0, true),
            candidate(2.1, 0.31, 4.8, true),
            candidate(2.2, 0.32, 4.6, true),
            candidate(5.0, 0.70, 1.0, true),
            candidate(4.9, 0.69, 1.2, true),
        ];
        let islands = cluster_islands(&candidates, 10, 2);
        assert_eq!(islands.len(), 2);
        assert_eq!(islands[0].member_count, 3);
        assert_eq!(islands[1].member_count, 2);
        assert!(islands[0].mean_score > islands[1].mean_score);
        assert!((islands[0].centroid[&ParamName::TakeProfitMult] - 2.1).abs() < 1e-9);
        assert_eq!(islands[0].best_score, 5.0);
        assert!(islands[0].spread[&ParamName::TakeProfitMult] > 0.0);
    }

    #[test]
    fn failing_candidates_are_ignored() {
        let candidates = vec![candidate(2.0, 0.3, 9.0, false), candidate(3.0, 0.5, 1.0, true)];
        let islands = cluster_islands(&candidates, 10, 3);
        assert_eq!(islands.len(), 1);
        assert_eq!(islands[0].best_score, 1.0);
    }

    #[test]
    fn degenerate_inputs_shrink_the_list() {
        assert!(cluster_islands(&[], 10, 3).is_empty());

        let one = vec![candidate(2.0, 0.3, 1.0, true)];
        assert_eq!(cluster_islands(&one, 10, 4).len(), 1);

        let identical = vec![candidate(2.0, 0.3, 1.0, true), candidate(2.0, 0.3, 2.0, true)];
        let islands = cluster_islands(&identical, 10, 2);
        assert!(!islands.is_empty() && islands.len() <= 2);
        assert_eq!(islands.iter().map(|i| i.member_count).sum::<usize>(), 2);
    }

    #[test]
    fn top_n_limits_the_pool() {
        let candidates: Vec<_> = (0..10).map(|i| candidate(2.0 + i as f64 * 0.1, 0.5, i as f64, true)).collect();
        let islands = cluster_islands(&candidates, 4, 2);
        assert_eq!(islands.iter().map(|i| i.member_count).sum::<usize>(), 4);
    }
}
