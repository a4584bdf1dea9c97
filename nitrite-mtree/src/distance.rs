//! Distance functions for the M-Tree.
//!
//! The tree needs nothing from an object but a distance to another object.
//! Any `Fn(&P, &P) -> f64 + Send + Sync` closure works as a distance function;
//! a few common metrics are provided as unit structs.
//!
//! Distances must be non-negative and symmetric. Storage stays correct for
//! any such function, but query pruning and split quality rely on the
//! triangle inequality.

/// A distance function over payloads of type `P`.
pub trait DistanceFunction<P>: Send + Sync {
    fn distance(&self, a: &P, b: &P) -> f64;
}

impl<P, F> DistanceFunction<P> for F
where
    F: Fn(&P, &P) -> f64 + Send + Sync,
{
    fn distance(&self, a: &P, b: &P) -> f64 {
        self(a, b)
    }
}

/// Absolute per-coordinate differences. Coordinates missing from the
/// shorter vector count as 0, so vectors of different length still get a
/// distance that obeys the triangle inequality.
fn differences<'a>(a: &'a [f64], b: &'a [f64]) -> impl Iterator<Item = f64> + 'a {
    let coordinate = |v: &[f64], i: usize| v.get(i).copied().unwrap_or(0.0);
    (0..a.len().max(b.len())).map(move |i| (coordinate(a, i) - coordinate(b, i)).abs())
}

/// Euclidean (L2) distance between coordinate vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanDistance;

impl DistanceFunction<Vec<f64>> for EuclideanDistance {
    fn distance(&self, a: &Vec<f64>, b: &Vec<f64>) -> f64 {
        differences(a, b).map(|d| d * d).sum::<f64>().sqrt()
    }
}

/// Manhattan (L1) distance between coordinate vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManhattanDistance;

impl DistanceFunction<Vec<f64>> for ManhattanDistance {
    fn distance(&self, a: &Vec<f64>, b: &Vec<f64>) -> f64 {
        differences(a, b).sum()
    }
}

/// Maximum (Chebyshev, L-infinity) distance between coordinate vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaximumDistance;

impl DistanceFunction<Vec<f64>> for MaximumDistance {
    fn distance(&self, a: &Vec<f64>, b: &Vec<f64>) -> f64 {
        differences(a, b).fold(0.0, f64::max)
    }
}

/// Levenshtein edit distance between strings, counted in chars.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenshteinDistance;

impl DistanceFunction<String> for LevenshteinDistance {
    fn distance(&self, a: &String, b: &String) -> f64 {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        if a.is_empty() || b.is_empty() {
            return a.len().max(b.len()) as f64;
        }

        // Two rolling rows of the edit matrix
        let mut previous: Vec<usize> = (0..=b.len()).collect();
        let mut current = vec![0usize; b.len() + 1];
        for (i, ca) in a.iter().enumerate() {
            current[0] = i + 1;
            for (j, cb) in b.iter().enumerate() {
                let substitution = previous[j] + usize::from(ca != cb);
                current[j + 1] = substitution
                    .min(previous[j + 1] + 1)
                    .min(current[j] + 1);
            }
            std::mem::swap(&mut previous, &mut current);
        }
        previous[b.len()] as f64
    }
}
