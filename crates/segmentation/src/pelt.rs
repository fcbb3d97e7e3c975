//! Kernel change-point detection (PELT)
//!
//! Detects topic boundaries over a pairwise cosine-distance matrix. Each
//! row of the matrix is treated as one sample; samples are compared with
//! an RBF kernel whose bandwidth follows the median heuristic. The cost
//! of a candidate segment is the usual kernel variance
//!
//!   c(a, b) = sum_{i in [a,b)} K(i, i) - (1/(b-a)) * sum_{i,j in [a,b)} K(i, j)
//!
//! and PELT minimizes total cost plus a per-change-point penalty, pruning
//! candidates that can no longer win.

use ndarray::Array2;

/// Precomputed kernel state reusable across penalty trials
pub struct KernelCpd {
    /// 2D prefix sums of the Gram matrix; `prefix[i][j]` covers `[0,i) x [0,j)`
    prefix: Vec<Vec<f64>>,
    n: usize,
    min_size: usize,
}

impl KernelCpd {
    /// Fit the detector on a distance matrix (rows are samples)
    #[must_use]
    pub fn fit(distances: &Array2<f64>, min_size: usize) -> Self {
        let n = distances.nrows();
        let gram = rbf_gram(distances);

        let mut prefix = vec![vec![0.0f64; n + 1]; n + 1];
        for i in 0..n {
            for j in 0..n {
                prefix[i + 1][j + 1] =
                    gram[i * n + j] + prefix[i][j + 1] + prefix[i + 1][j] - prefix[i][j];
            }
        }

        Self {
            prefix,
            n,
            min_size: min_size.max(1),
        }
    }

    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.n
    }

    /// Kernel cost of the half-open segment `[a, b)`
    fn cost(&self, a: usize, b: usize) -> f64 {
        let len = (b - a) as f64;
        // RBF kernel has K(i, i) == 1
        let block = self.prefix[b][b] - self.prefix[a][b] - self.prefix[b][a] + self.prefix[a][a];
        len - block / len
    }

    /// Run PELT with the given penalty.
    ///
    /// Returns interior boundary indices in ascending order (the final
    /// index `n` is not included). Deterministic for fixed input.
    #[must_use]
    pub fn predict(&self, penalty: f64) -> Vec<usize> {
        let n = self.n;
        if n < 2 * self.min_size {
            return Vec::new();
        }

        let mut best = vec![f64::INFINITY; n + 1];
        let mut prev = vec![0usize; n + 1];
        best[0] = -penalty;

        let mut candidates: Vec<usize> = vec![0];

        for t in self.min_size..=n {
            let new_candidate = t - self.min_size;
            if new_candidate >= self.min_size {
                candidates.push(new_candidate);
            }

            let mut t_best = f64::INFINITY;
            let mut t_prev = 0usize;
            for &s in &candidates {
                if t - s < self.min_size {
                    continue;
                }
                let value = best[s] + self.cost(s, t) + penalty;
                if value < t_best {
                    t_best = value;
                    t_prev = s;
                }
            }
            best[t] = t_best;
            prev[t] = t_prev;

            // PELT pruning: a candidate that already loses without the
            // penalty can never win later.
            candidates.retain(|&s| t - s < self.min_size || best[s] + self.cost(s, t) <= best[t]);
        }

        let mut boundaries = Vec::new();
        let mut t = n;
        while t > 0 {
            let s = prev[t];
            if s > 0 {
                boundaries.push(s);
            }
            t = s;
        }
        boundaries.reverse();
        boundaries
    }
}

/// Gram matrix of the RBF kernel over matrix rows, flattened row-major.
///
/// Bandwidth is 1 / median(squared distances between distinct rows); a
/// degenerate (all-equal) input gets gamma 1.0, which makes every kernel
/// entry 1 and yields no boundaries.
fn rbf_gram(distances: &Array2<f64>) -> Vec<f64> {
    let n = distances.nrows();
    let mut sq = vec![0.0f64; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let mut d = 0.0;
            for k in 0..distances.ncols() {
                let diff = distances[[i, k]] - distances[[j, k]];
                d += diff * diff;
            }
            sq[i * n + j] = d;
            sq[j * n + i] = d;
        }
    }

    let mut off_diagonal: Vec<f64> = (0..n)
        .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
        .map(|(i, j)| sq[i * n + j])
        .filter(|&d| d > 0.0)
        .collect();

    let gamma = if off_diagonal.is_empty() {
        1.0
    } else {
        off_diagonal.sort_by(f64::total_cmp);
        let median = off_diagonal[off_diagonal.len() / 2];
        1.0 / median
    };

    let mut gram = vec![0.0f64; n * n];
    for i in 0..n {
        for j in 0..n {
            gram[i * n + j] = if i == j {
                1.0
            } else {
                (-gamma * sq[i * n + j]).exp()
            };
        }
    }
    gram
}
