//! Utility functions shared by the trial loop and the reference engine.
//!
//! Seeded permutation helpers for presentation order, plus the tolerance
//! SSE and cosine measures used for error statistics.

use rand::Rng;

/// Shuffle a slice of indices in-place using Fisher-Yates.
///
/// # Examples
///
/// ```
/// use goalseek::utils::shuffle_indices;
/// use rand::SeedableRng;
///
/// let mut indices = vec![0, 1, 2, 3, 4];
/// let mut rng = rand::rngs::StdRng::seed_from_u64(0);
/// shuffle_indices(&mut indices, &mut rng);
/// // indices is now shuffled
/// ```
pub fn shuffle_indices<R: Rng>(arr: &mut [usize], rng: &mut R) {
    for i in (1..arr.len()).rev() {
        let j = rng.gen_range(0..=i);
        arr.swap(i, j);
    }
}

/// Random permutation of `0..n`.
///
/// # Examples
///
/// ```
/// use goalseek::utils::permutation;
/// use rand::SeedableRng;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(7);
/// let mut order = permutation(6, &mut rng);
/// order.sort();
/// assert_eq!(order, vec![0, 1, 2, 3, 4, 5]);
/// ```
pub fn permutation<R: Rng>(n: usize, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    shuffle_indices(&mut order, rng);
    order
}

/// Check that `order` holds each of `0..order.len()` exactly once.
pub fn is_permutation(order: &[usize]) -> bool {
    let mut seen = vec![false; order.len()];
    for &i in order {
        match seen.get_mut(i) {
            Some(s) if !*s => *s = true,
            _ => return false,
        }
    }
    true
}

/// Sum of squared differences, ignoring units whose difference magnitude is
/// below `tolerance`.
///
/// Only the overlapping prefix of the two slices is compared.
///
/// # Examples
///
/// ```
/// use goalseek::utils::tolerance_sse;
///
/// assert_eq!(tolerance_sse(&[1.0, 0.2], &[0.0, 0.0], 0.5), 1.0);
/// assert_eq!(tolerance_sse(&[0.4, 0.2], &[0.0, 0.0], 0.5), 0.0);
/// ```
pub fn tolerance_sse(a: &[f32], b: &[f32], tolerance: f32) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| x - y)
        .filter(|d| d.abs() >= tolerance)
        .map(|d| d * d)
        .sum()
}

/// Cosine similarity of two activity vectors.
///
/// Two all-zero vectors are identical and score 1.0; a zero vector against
/// a non-zero one scores 0.0.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut ab = 0.0f32;
    let mut aa = 0.0f32;
    let mut bb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        ab += x * y;
        aa += x * x;
        bb += y * y;
    }
    match (aa == 0.0, bb == 0.0) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        _ => ab / (aa.sqrt() * bb.sqrt()),
    }
}
