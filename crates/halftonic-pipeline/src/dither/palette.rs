//! K-means palette extraction for color-mode dithering.

use rand::Rng;

use crate::types::{Rgb, RgbaImage, clamp_channel};

/// Upper bound on refinement passes.
pub const MAX_ITERATIONS: usize = 10;

/// Samples beyond this count are strided over to bound clustering cost.
const MAX_SAMPLES: usize = 16_384;

type Centroid = [f64; 3];

fn distance_sq(a: &Centroid, b: &Centroid) -> f64 {
    let dr = a[0] - b[0];
    let dg = a[1] - b[1];
    let db = a[2] - b[2];
    dr.mul_add(dr, dg.mul_add(dg, db * db))
}

fn nearest(centroids: &[Centroid], sample: &Centroid) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (i, centroid) in centroids.iter().enumerate() {
        let d = distance_sq(centroid, sample);
        if d < best_distance {
            best = i;
            best_distance = d;
        }
    }
    best
}

/// Derive `k` representative colors of `image` by nearest-centroid
/// clustering.
///
/// Centroids are seeded from randomly chosen sample pixels, refined for at
/// most [`MAX_ITERATIONS`] passes, and the loop exits early once no
/// centroid moves. A cluster that loses all its members keeps its previous
/// centroid. Alpha is ignored.
///
/// An empty image yields a black-and-white palette; `k` is clamped to at
/// least 2.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn kmeans<R: Rng + ?Sized>(image: &RgbaImage, k: usize, rng: &mut R) -> Vec<Rgb> {
    let k = k.max(2);
    let pixel_count = image.pixels().len();
    if pixel_count == 0 {
        return vec![Rgb::BLACK, Rgb::WHITE];
    }

    let stride = pixel_count.div_ceil(MAX_SAMPLES).max(1);
    let samples: Vec<Centroid> = image
        .pixels()
        .step_by(stride)
        .map(|p| [f64::from(p.0[0]), f64::from(p.0[1]), f64::from(p.0[2])])
        .collect();

    let mut centroids: Vec<Centroid> = (0..k)
        .map(|_| samples[rng.gen_range(0..samples.len())])
        .collect();

    let mut assignment = vec![usize::MAX; samples.len()];
    for iteration in 0..MAX_ITERATIONS {
        let mut changed = false;
        for (slot, sample) in assignment.iter_mut().zip(&samples) {
            let cluster = nearest(&centroids, sample);
            if *slot != cluster {
                *slot = cluster;
                changed = true;
            }
        }

        let mut sums = vec![[0.0_f64; 3]; k];
        let mut counts = vec![0_usize; k];
        for (&cluster, sample) in assignment.iter().zip(&samples) {
            for (acc, v) in sums[cluster].iter_mut().zip(sample) {
                *acc += v;
            }
            counts[cluster] += 1;
        }

        let mut moved = false;
        for ((centroid, sum), count) in centroids.iter_mut().zip(&sums).zip(&counts) {
            if *count == 0 {
                continue;
            }
            let n = *count as f64;
            let next = [sum[0] / n, sum[1] / n, sum[2] / n];
            if distance_sq(centroid, &next) > 1e-9 {
                moved = true;
            }
            *centroid = next;
        }

        if !moved && !changed {
            tracing::trace!(iteration, "k-means converged");
            break;
        }
    }

    centroids
        .iter()
        .map(|c| Rgb::new(clamp_channel(c[0]), clamp_channel(c[1]), clamp_channel(c[2])))
        .collect()
}

/// Palette entries widened to `f64` for repeated nearest-color lookups.
#[must_use]
pub fn to_entries(palette: &[Rgb]) -> Vec<[f64; 3]> {
    palette
        .iter()
        .map(|c| [f64::from(c.0[0]), f64::from(c.0[1]), f64::from(c.0[2])])
        .collect()
}

/// Index of the entry closest to `color` in RGB space.
#[must_use]
pub fn nearest_entry(entries: &[[f64; 3]], color: [f64; 3]) -> usize {
    nearest(entries, &color)
}
