//! Diamond-square midpoint displacement.
//!
//! Works on a `(2^k + 1)²` square large enough to hold the requested grid and
//! crops the top-left corner. The displacement amplitude is multiplied by
//! `2^−(1 − roughness)` at every level: `roughness = 0` halves it (smooth,
//! H = 1), `roughness = 1` keeps it constant (very rugged).
use rand::Rng;

use crate::error::{check_range, Result};

pub fn generate<R: Rng + ?Sized>(nb_rows: usize, nb_cols: usize, roughness: f64, rng: &mut R) -> Result<Vec<f32>> {
    check_range("roughness", roughness, roughness, 0.0, 1.0)?;
    if nb_rows == 0 || nb_cols == 0 {
        return Ok(Vec::new());
    }

    let n = side_length(nb_rows.max(nb_cols));
    let mut h = vec![0.0f64; n * n];
    let at = |r: usize, c: usize| r * n + c;

    for &(r, c) in &[(0, 0), (0, n - 1), (n - 1, 0), (n - 1, n - 1)] {
        h[at(r, c)] = rng.gen_range(-1.0..=1.0);
    }

    let decay = 2f64.powf(-(1.0 - roughness));
    let mut scale = 1.0f64;
    let mut step = n - 1;
    while step > 1 {
        let half = step / 2;

        // Diamond step: centre of every square.
        for r in (half..n).step_by(step) {
            for c in (half..n).step_by(step) {
                let avg = (h[at(r - half, c - half)]
                    + h[at(r - half, c + half)]
                    + h[at(r + half, c - half)]
                    + h[at(r + half, c + half)])
                    / 4.0;
                h[at(r, c)] = avg + rng.gen_range(-scale..=scale);
            }
        }

        // Square step: midpoint of every edge, averaging the in-bounds corners.
        for r in (0..n).step_by(half) {
            let c0 = if (r / half) % 2 == 0 { half } else { 0 };
            for c in (c0..n).step_by(step) {
                let mut sum = 0.0;
                let mut k = 0.0;
                if r >= half { sum += h[at(r - half, c)]; k += 1.0; }
                if r + half < n { sum += h[at(r + half, c)]; k += 1.0; }
                if c >= half { sum += h[at(r, c - half)]; k += 1.0; }
                if c + half < n { sum += h[at(r, c + half)]; k += 1.0; }
                h[at(r, c)] = sum / k + rng.gen_range(-scale..=scale);
            }
        }

        scale *= decay;
        step = half;
    }

    let mut out = Vec::with_capacity(nb_rows * nb_cols);
    for r in 0..nb_rows {
        out.extend(h[r * n..r * n + nb_cols].iter().map(|&v| v as f32));
    }
    Ok(out)
}

/// Smallest `2^k + 1` that is at least `size` (and at least 3).
fn side_length(size: usize) -> usize {
    let mut n = 2;
    while n + 1 < size {
        n *= 2;
    }
    n + 1
}
