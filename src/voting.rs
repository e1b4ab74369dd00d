//! Aggregation over collections of label assignments.

/// Per-position majority vote. Ties go to the lowest label value, so the
/// result is deterministic and independent of assignment order.
pub fn vote(assignments: &[&[usize]], n_classes: usize) -> Vec<usize> {
    let Some(first) = assignments.first() else {
        return Vec::new();
    };
    let nt = first.len();

    (0..nt)
        .map(|pos| {
            let mut counts = vec![0usize; n_classes + 1];
            for a in assignments {
                counts[a[pos]] += 1;
            }
            let mut winner = 1usize;
            for c in 2..=n_classes {
                if counts[c] > counts[winner] {
                    winner = c;
                }
            }
            winner
        })
        .collect()
}

/// Mean pairwise Hamming distance (elementwise mismatch count) across a
/// population; the diversity figure reported each generation.
pub fn mean_pairwise_distance(assignments: &[&[usize]]) -> f64 {
    let n = assignments.len();
    if n < 2 {
        return 0.0;
    }
    let mut total = 0usize;
    let mut pairs = 0usize;
    for i in 0..n {
        for j in (i + 1)..n {
            total += assignments[i]
                .iter()
                .zip(assignments[j])
                .filter(|(a, b)| a != b)
                .count();
            pairs += 1;
        }
    }
    total as f64 / pairs as f64
}

/// Reflect every label through the midpoint of `[lo, hi]`. Applying this
/// twice returns the original assignment.
pub fn opposite(labels: &[usize], lo: usize, hi: usize) -> Vec<usize> {
    labels.iter().map(|&v| lo + hi - v).collect()
}
