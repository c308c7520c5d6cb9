//! Path order optimization.
//!
//! Re-sequences draw paths (and reverses them where that helps) to minimize
//! non-cutting travel between the end of one path and the start of the next.
//! This is an open-path TSP variant with an orientation choice per node, so
//! the optimizer is heuristic, tiered by effort level:
//!
//! 1. **Fast**: greedy nearest-endpoint chaining, O(n²).
//! 2. **Medium**: greedy, then one local-improvement pass over adjacent
//!    pairs (swap or flip, first improving move wins), O(n).
//! 3. **Max**: greedy, then improvement passes repeated to a configurable
//!    cap or a local optimum. Large inputs are first partitioned into a
//!    spatial grid whose cells are chained independently in parallel and
//!    stitched in fixed order before the sequential improvement passes.
//!
//! Output is deterministic for a fixed input and level: ties are broken by
//! original index, and the parallel phase only evaluates independent cells
//! that are merged in a fixed order.

use beamkit_core::{Path, PlannerError, Point};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Optimization effort level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OptimizeLevel {
    /// Greedy chaining only
    Fast,
    /// Greedy plus one improvement pass
    Medium,
    /// Greedy plus improvement passes to a local optimum
    #[default]
    Max,
}

/// Optimizer tuning knobs.
///
/// The improvement-pass cap and partition sizes trade quality for running
/// time on large inputs; they are configuration, not contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Effort level
    pub level: OptimizeLevel,
    /// Maximum improvement passes at level Max
    pub max_passes: usize,
    /// Path count above which level Max partitions spatially
    pub partition_threshold: usize,
    /// Grid is `grid_cells` x `grid_cells`
    pub grid_cells: usize,
    /// Charge the final return-to-start leg in the cost function
    pub include_return: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            level: OptimizeLevel::Max,
            max_passes: 20,
            partition_threshold: 3000,
            grid_cells: 8,
            include_return: false,
        }
    }
}

/// Total idle travel for an ordered sequence: the leg from `start` to the
/// first path, each gap between consecutive paths, and optionally the
/// return leg.
pub fn idle_travel(start: Point, paths: &[Path], include_return: bool) -> f64 {
    let mut cursor = start;
    let mut total = 0.0;
    for path in paths {
        total += cursor.distance_to(&path.start());
        cursor = path.end();
    }
    if include_return && !paths.is_empty() {
        total += cursor.distance_to(&start);
    }
    total
}

/// Re-sequence `paths` starting from `start`, minimizing idle travel.
///
/// Validates every path up front and rejects the whole job on the first
/// violation. The result is a permutation of the input in which individual
/// paths may be reversed; no segment is otherwise altered.
pub fn optimize(
    paths: Vec<Path>,
    start: Point,
    config: &OptimizerConfig,
) -> Result<Vec<Path>, PlannerError> {
    if !start.is_finite() {
        return Err(PlannerError::NonFinite { index: 0 });
    }
    for path in &paths {
        path.validate()?;
    }

    if paths.len() < 2 {
        return Ok(paths);
    }

    let entries: Vec<Entry> = paths.into_iter().map(Entry::new).collect();
    let n = entries.len();

    let mut ordered = match config.level {
        OptimizeLevel::Max if n > config.partition_threshold => {
            partitioned_chain(entries, start, config.grid_cells.max(1))
        }
        _ => greedy_chain(entries, start),
    };

    match config.level {
        OptimizeLevel::Fast => {}
        OptimizeLevel::Medium => {
            improvement_pass(&mut ordered, start, config.include_return);
        }
        OptimizeLevel::Max => {
            for pass in 0..config.max_passes {
                if !improvement_pass(&mut ordered, start, config.include_return) {
                    tracing::debug!(passes = pass + 1, "local optimum reached");
                    break;
                }
            }
        }
    }

    Ok(ordered.into_iter().map(Entry::into_path).collect())
}

/// A path plus its pending orientation. Reversal is tracked as a flag and
/// only materialized once at the end, so candidate evaluation touches
/// endpoints, not segment lists. Entries keep their input order in the
/// unplaced set, which is what makes ties fall to the lowest original
/// index.
struct Entry {
    path: Path,
    reversed: bool,
}

impl Entry {
    fn new(path: Path) -> Self {
        Self {
            path,
            reversed: false,
        }
    }

    fn start(&self) -> Point {
        if self.reversed {
            self.path.end()
        } else {
            self.path.start()
        }
    }

    fn end(&self) -> Point {
        if self.reversed {
            self.path.start()
        } else {
            self.path.end()
        }
    }

    fn flip(&mut self) {
        self.reversed = !self.reversed;
    }

    fn into_path(self) -> Path {
        if self.reversed {
            self.path.reversed()
        } else {
            self.path
        }
    }
}

/// Greedy nearest-endpoint chaining.
///
/// From the cursor, scan the unplaced set for the path/orientation whose
/// starting endpoint is nearest. Scanning in original-index order with a
/// strict comparison breaks ties toward the lowest index, and toward the
/// forward orientation of a given path.
fn greedy_chain(mut unplaced: Vec<Entry>, start: Point) -> Vec<Entry> {
    let mut ordered = Vec::with_capacity(unplaced.len());
    let mut cursor = start;

    while !unplaced.is_empty() {
        let mut best_idx = 0;
        let mut best_flip = false;
        let mut best_d = f64::INFINITY;

        for (i, entry) in unplaced.iter().enumerate() {
            let fwd = cursor.distance_sq(&entry.start());
            if fwd < best_d {
                best_d = fwd;
                best_idx = i;
                best_flip = false;
            }
            let rev = cursor.distance_sq(&entry.end());
            if rev < best_d {
                best_d = rev;
                best_idx = i;
                best_flip = true;
            }
        }

        let mut entry = unplaced.remove(best_idx);
        if best_flip {
            entry.flip();
        }
        cursor = entry.end();
        ordered.push(entry);
    }

    ordered
}

/// Local moves tried on each adjacent pair, in evaluation order.
#[derive(Clone, Copy)]
enum PairMove {
    FlipFirst,
    FlipSecond,
    Swap,
    SwapFlipBoth,
}

const PAIR_MOVES: [PairMove; 4] = [
    PairMove::FlipFirst,
    PairMove::FlipSecond,
    PairMove::Swap,
    PairMove::SwapFlipBoth,
];

/// One pass of pairwise local improvement.
///
/// For each adjacent pair, evaluate flipping either path and swapping the
/// two, against the three travel legs the pair touches. The first improving
/// move is applied and the pass continues from the next pair. Returns
/// whether anything improved.
fn improvement_pass(ordered: &mut [Entry], start: Point, include_return: bool) -> bool {
    let n = ordered.len();
    if n < 2 {
        return false;
    }

    let mut improved = false;

    for i in 0..n - 1 {
        let prev_end = if i == 0 { start } else { ordered[i - 1].end() };
        let next_start = if i + 2 < n {
            Some(ordered[i + 2].start())
        } else if include_return {
            Some(start)
        } else {
            None
        };

        let (a_start, a_end) = (ordered[i].start(), ordered[i].end());
        let (b_start, b_end) = (ordered[i + 1].start(), ordered[i + 1].end());
        let current = local_cost(prev_end, a_start, a_end, b_start, b_end, next_start);

        // Ties keep the incumbent ordering.
        for mv in PAIR_MOVES {
            let cost = match mv {
                PairMove::FlipFirst => {
                    local_cost(prev_end, a_end, a_start, b_start, b_end, next_start)
                }
                PairMove::FlipSecond => {
                    local_cost(prev_end, a_start, a_end, b_end, b_start, next_start)
                }
                PairMove::Swap => {
                    local_cost(prev_end, b_start, b_end, a_start, a_end, next_start)
                }
                PairMove::SwapFlipBoth => {
                    local_cost(prev_end, b_end, b_start, a_end, a_start, next_start)
                }
            };

            if cost + 1e-9 < current {
                match mv {
                    PairMove::FlipFirst => ordered[i].flip(),
                    PairMove::FlipSecond => ordered[i + 1].flip(),
                    PairMove::Swap => ordered.swap(i, i + 1),
                    PairMove::SwapFlipBoth => {
                        ordered.swap(i, i + 1);
                        ordered[i].flip();
                        ordered[i + 1].flip();
                    }
                }
                improved = true;
                break;
            }
        }
    }

    improved
}

/// The three legs of travel around an adjacent pair, given candidate
/// endpoint placements.
fn local_cost(
    prev_end: Point,
    a_start: Point,
    a_end: Point,
    b_start: Point,
    b_end: Point,
    next_start: Option<Point>,
) -> f64 {
    let mut cost = prev_end.distance_to(&a_start) + a_end.distance_to(&b_start);
    if let Some(next) = next_start {
        cost += b_end.distance_to(&next);
    }
    cost
}

/// Partitioned construction for large inputs.
///
/// Paths are bucketed into a `cells` x `cells` grid by start point, each
/// cell is chained greedily in parallel from its own corner, and the cells
/// are stitched in row-major order. Cell assignment, intra-cell ordering,
/// and merge order are all functions of the input alone, so the result does
/// not depend on scheduling.
fn partitioned_chain(entries: Vec<Entry>, start: Point, cells: usize) -> Vec<Entry> {
    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for entry in &entries {
        let p = entry.start();
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    let span_x = (max_x - min_x).max(f64::MIN_POSITIVE);
    let span_y = (max_y - min_y).max(f64::MIN_POSITIVE);

    let mut buckets: Vec<Vec<Entry>> = (0..cells * cells).map(|_| Vec::new()).collect();
    for entry in entries {
        let p = entry.start();
        let cx = (((p.x - min_x) / span_x * cells as f64) as usize).min(cells - 1);
        let cy = (((p.y - min_y) / span_y * cells as f64) as usize).min(cells - 1);
        buckets[cy * cells + cx].push(entry);
    }

    // Each cell is anchored at its own lower-left corner except the cell
    // containing the starting point, which is anchored there.
    let anchors: Vec<Point> = (0..cells * cells)
        .map(|i| {
            let cx = i % cells;
            let cy = i / cells;
            Point::new(
                min_x + span_x * cx as f64 / cells as f64,
                min_y + span_y * cy as f64 / cells as f64,
            )
        })
        .collect();

    let start_cell = {
        let cx = (((start.x - min_x) / span_x * cells as f64) as usize).min(cells - 1);
        let cy = (((start.y - min_y) / span_y * cells as f64) as usize).min(cells - 1);
        cy * cells + cx
    };

    let chained: Vec<Vec<Entry>> = buckets
        .into_par_iter()
        .enumerate()
        .map(|(i, bucket)| {
            let anchor = if i == start_cell { start } else { anchors[i] };
            greedy_chain(bucket, anchor)
        })
        .collect();

    chained.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use beamkit_core::Segment;

    fn single(x0: f64, y0: f64, x1: f64, y1: f64) -> Path {
        Path::new(vec![Segment::cut(
            Point::new(x0, y0),
            Point::new(x1, y1),
        )])
        .unwrap()
    }

    #[test]
    fn test_tie_break_prefers_lowest_index() {
        // Two identical paths equidistant from the origin; the first one
        // in input order must be placed first.
        let paths = vec![single(1.0, 0.0, 2.0, 0.0), single(1.0, 0.0, 2.0, 0.0)];
        let config = OptimizerConfig {
            level: OptimizeLevel::Fast,
            ..Default::default()
        };
        let out = optimize(paths.clone(), Point::new(0.0, 0.0), &config).unwrap();
        assert_eq!(out, paths);
    }

    #[test]
    fn test_reversal_is_chosen_when_closer() {
        // The path's far end is nearest to the cursor, so it is reversed.
        let paths = vec![single(10.0, 0.0, 1.0, 0.0)];
        let config = OptimizerConfig::default();
        let out = optimize(paths, Point::new(0.0, 0.0), &config).unwrap();
        // Single path is returned unchanged (degenerate input).
        assert_eq!(out[0].start(), Point::new(10.0, 0.0));

        let paths = vec![
            single(0.0, 0.0, 0.5, 0.0),
            single(10.0, 0.0, 1.0, 0.0),
        ];
        let out = optimize(paths, Point::new(0.0, 0.0), &config).unwrap();
        assert_eq!(out[1].start(), Point::new(1.0, 0.0));
        assert_eq!(out[1].end(), Point::new(10.0, 0.0));
    }

    #[test]
    fn test_empty_and_single_are_untouched() {
        let config = OptimizerConfig::default();
        assert!(optimize(vec![], Point::default(), &config)
            .unwrap()
            .is_empty());

        let one = vec![single(3.0, 3.0, 4.0, 4.0)];
        assert_eq!(
            optimize(one.clone(), Point::default(), &config).unwrap(),
            one
        );
    }

    #[test]
    fn test_rejects_non_finite_start() {
        let paths = vec![single(0.0, 0.0, 1.0, 0.0)];
        let config = OptimizerConfig::default();
        assert!(optimize(paths, Point::new(f64::NAN, 0.0), &config).is_err());
    }

    #[test]
    fn test_partitioned_chain_is_deterministic() {
        let paths: Vec<Path> = (0..64)
            .map(|i| {
                let x = (i % 8) as f64 * 10.0;
                let y = (i / 8) as f64 * 10.0;
                single(x, y, x + 1.0, y)
            })
            .collect();
        let config = OptimizerConfig {
            level: OptimizeLevel::Max,
            partition_threshold: 16,
            grid_cells: 4,
            ..Default::default()
        };
        let a = optimize(paths.clone(), Point::default(), &config).unwrap();
        let b = optimize(paths, Point::default(), &config).unwrap();
        assert_eq!(a, b);
    }
}
