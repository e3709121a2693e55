//! Offset Fibonacci lattice: near-uniform point sets on a sphere.
//!
//! Used to spread launch directions for fragment bursts. The 250-point unit
//! lattice is requested often enough that it is computed once and scaled
//! on use.

use std::f64::consts::PI;
use std::sync::OnceLock;

use bevy::math::DVec3;

/// Point count served from the cached unit table.
pub const CACHED_LATTICE_SIZE: usize = 250;

/// Lower bound of `min_chord * sqrt(N)` for the canonical Fibonacci lattice.
/// The offset lattice always does at least this well for `N >= 24`.
pub const FIBONACCI_PACKING_BOUND: f64 = 3.09;

static UNIT_LATTICE_250: OnceLock<Vec<DVec3>> = OnceLock::new();

/// Offset parameter ε(N) for the lattice.
fn epsilon(n: usize) -> f64 {
    match n {
        n if n >= 600_000 => 214.0,
        n if n >= 400_000 => 75.0,
        n if n >= 11_000 => 27.0,
        n if n >= 890 => 10.0,
        n if n >= 177 => 3.33,
        n if n >= 24 => 1.33,
        _ => 0.33,
    }
}

fn generate(n: usize, radius: f64) -> Vec<DVec3> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![DVec3::Z * radius];
    }

    let golden_ratio = (1.0 + 5f64.sqrt()) / 2.0;
    let eps = epsilon(n);
    let denominator = n as f64 - 1.0 + 2.0 * eps;

    (0..n)
        .map(|i| {
            let i = i as f64;
            let theta = 2.0 * PI * i / golden_ratio;
            let phi = (1.0 - 2.0 * (i + eps) / denominator).clamp(-1.0, 1.0).acos();
            let (sin_phi, cos_phi) = phi.sin_cos();
            let (sin_theta, cos_theta) = theta.sin_cos();
            DVec3::new(cos_theta * sin_phi, sin_theta * sin_phi, cos_phi) * radius
        })
        .collect()
}

/// Distributes `n` points on a sphere of `radius` centred at the origin.
///
/// # Example
/// ```
/// use terminal_ballistics::math::lattice::offset_fibonacci_lattice;
///
/// let points = offset_fibonacci_lattice(2.0, 100);
/// assert_eq!(points.len(), 100);
/// assert!(points.iter().all(|p| (p.length() - 2.0).abs() < 1e-9));
/// ```
pub fn offset_fibonacci_lattice(radius: f64, n: usize) -> Vec<DVec3> {
    if n == CACHED_LATTICE_SIZE {
        let unit = UNIT_LATTICE_250.get_or_init(|| generate(CACHED_LATTICE_SIZE, 1.0));
        return unit.iter().map(|p| *p * radius).collect();
    }
    generate(n, radius)
}

/// Minimum pairwise chord distance of a point set.
pub fn min_chord_distance(points: &[DVec3]) -> f64 {
    let mut min = f64::INFINITY;
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            min = min.min(a.distance(*b));
        }
    }
    min
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_lie_on_sphere() {
        for n in [1, 2, 10, 24, 250, 1000] {
            let points = offset_fibonacci_lattice(3.0, n);
            assert_eq!(points.len(), n);
            for p in points {
                assert!((p.length() - 3.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_cached_table_is_scaled() {
        let unit = offset_fibonacci_lattice(1.0, CACHED_LATTICE_SIZE);
        let scaled = offset_fibonacci_lattice(5.0, CACHED_LATTICE_SIZE);
        for (u, s) in unit.iter().zip(&scaled) {
            assert!((*u * 5.0 - *s).length() < 1e-12);
        }
        // Same as an uncached generation
        let direct = generate(CACHED_LATTICE_SIZE, 5.0);
        assert_eq!(scaled, direct);
    }

    #[test]
    fn test_distribution_uniformity() {
        for n in [24, 50, 177, 250, 890, 1500] {
            let points = offset_fibonacci_lattice(1.0, n);
            let min = min_chord_distance(&points);
            let bound = FIBONACCI_PACKING_BOUND / (n as f64).sqrt();
            assert!(min >= bound * 0.95, "n={n}: min chord {min} below bound {bound}");
            // Tammes limit, nothing can beat hexagonal packing
            assert!(min <= 3.81 / (n as f64).sqrt(), "n={n}: impossible spacing {min}");
        }
    }
}
