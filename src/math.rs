//! Small geometric helpers on axis-aligned boxes given as `[f64; 3]` corners.
use crate::constants::CELL_COUNT_TOLERANCE;

/// Open-interval intersection test: boxes that only touch do not overlap.
pub fn boxes_overlap(a_min: &[f64; 3], a_max: &[f64; 3], b_min: &[f64; 3], b_max: &[f64; 3]) -> bool {
    (0..3).all(|d| a_max[d] > b_min[d] && a_min[d] < b_max[d])
}

/// Intersection of two boxes. Only meaningful if [`boxes_overlap`] holds.
pub fn intersect(
    a_min: &[f64; 3],
    a_max: &[f64; 3],
    b_min: &[f64; 3],
    b_max: &[f64; 3],
) -> ([f64; 3], [f64; 3]) {
    let mut rmin = [0.0; 3];
    let mut rmax = [0.0; 3];
    for d in 0..3 {
        rmin[d] = a_min[d].max(b_min[d]);
        rmax[d] = a_max[d].min(b_max[d]);
    }
    (rmin, rmax)
}

/// Squared minimal distance between two boxes, zero if they touch or overlap.
pub fn box_distance_squared(
    a_min: &[f64; 3],
    a_max: &[f64; 3],
    b_min: &[f64; 3],
    b_max: &[f64; 3],
) -> f64 {
    let mut dist2 = 0.0;
    for d in 0..3 {
        let gap = if b_min[d] > a_max[d] {
            b_min[d] - a_max[d]
        } else if a_min[d] > b_max[d] {
            a_min[d] - b_max[d]
        } else {
            0.0
        };
        dist2 += gap * gap;
    }
    dist2
}

/// Half-open containment `min <= p < max` in all three dimensions.
pub fn contains(min: &[f64; 3], max: &[f64; 3], p: &[f64; 3]) -> bool {
    (0..3).all(|d| p[d] >= min[d] && p[d] < max[d])
}

/// Number of cells of length `cell_length` needed to cover `length`.
pub fn cells_to_cover(length: f64, cell_length: f64) -> usize {
    ((length / cell_length) - CELL_COUNT_TOLERANCE).ceil().max(1.0) as usize
}

pub fn prime_factors(mut n: usize) -> Vec<usize> {
    let mut factors = Vec::new();
    let mut p = 2;
    while p * p <= n {
        while n % p == 0 {
            factors.push(p);
            n /= p;
        }
        p += 1;
    }
    if n > 1 {
        factors.push(n);
    }
    factors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touching_boxes_do_not_overlap() {
        let a = ([0.0; 3], [1.0; 3]);
        let b = ([1.0, 0.0, 0.0], [2.0, 1.0, 1.0]);
        assert!(!boxes_overlap(&a.0, &a.1, &b.0, &b.1));
        assert_eq!(box_distance_squared(&a.0, &a.1, &b.0, &b.1), 0.0);
    }

    #[test]
    fn distance_between_separated_boxes() {
        let d2 = box_distance_squared(&[0.0; 3], &[1.0; 3], &[3.0, 4.0, 0.5], &[4.0, 5.0, 2.0]);
        assert_eq!(d2, 4.0 + 9.0);
    }

    #[test]
    fn intersection_is_clipped_per_dimension() {
        let (rmin, rmax) = intersect(&[0.0; 3], &[5.0; 3], &[4.0, -1.0, 2.0], &[7.0, 3.0, 2.5]);
        assert_eq!(rmin, [4.0, 0.0, 2.0]);
        assert_eq!(rmax, [5.0, 3.0, 2.5]);
    }

    #[test]
    fn cover_count_ignores_rounding_noise() {
        assert_eq!(cells_to_cover(2.5, 2.5), 1);
        assert_eq!(cells_to_cover(2.5 + 1e-13, 2.5), 1);
        assert_eq!(cells_to_cover(2.6, 2.5), 2);
        assert_eq!(cells_to_cover(0.1, 2.5), 1);
    }

    #[test]
    fn factorization() {
        assert_eq!(prime_factors(12), vec![2, 2, 3]);
        assert_eq!(prime_factors(7), vec![7]);
        assert!(prime_factors(1).is_empty());
    }
}
