use na::Vector3;

use crate::errors::{CellMdError, Result};

/// The global, orthorhombic simulation domain `[0, L)` in every dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationBox {
    lengths: [f64; 3],
    pbc: [bool; 3],
}

impl SimulationBox {
    pub fn new(lengths: [f64; 3], pbc: [bool; 3]) -> Result<Self> {
        if lengths.iter().any(|l| !(*l > 0.0) || !l.is_finite()) {
            return Err(CellMdError::InvalidGeometry {
                reason: format!("domain lengths must be positive, got {lengths:?}"),
            });
        }
        Ok(Self { lengths, pbc })
    }

    pub fn periodic(lengths: [f64; 3]) -> Result<Self> {
        Self::new(lengths, [true; 3])
    }

    pub fn lengths(&self) -> [f64; 3] {
        self.lengths
    }

    pub fn length(&self, dim: usize) -> f64 {
        self.lengths[dim]
    }

    pub fn pbc(&self) -> [bool; 3] {
        self.pbc
    }

    pub fn is_periodic(&self, dim: usize) -> bool {
        self.pbc[dim]
    }

    pub fn contains(&self, r: &Vector3<f64>) -> bool {
        (0..3).all(|d| r[d] >= 0.0 && r[d] < self.lengths[d])
    }

    /// Folds a position back into the box along periodic dimensions.
    pub fn wrap_position(&self, r: &mut Vector3<f64>) {
        for d in 0..3 {
            if !self.pbc[d] {
                continue;
            }
            let l = self.lengths[d];
            if r[d] < 0.0 || r[d] >= l {
                r[d] -= l * (r[d] / l).floor();
                // rounding of tiny negative values can land exactly on L
                if r[d] >= l {
                    r[d] = 0.0;
                }
            }
        }
    }

    pub fn minimum_image(&self, rij: &Vector3<f64>) -> Vector3<f64> {
        let mut out = *rij;
        for d in 0..3 {
            if self.pbc[d] {
                out[d] -= self.lengths[d] * (out[d] / self.lengths[d]).round();
            }
        }
        out
    }
}

impl Default for SimulationBox {
    fn default() -> Self {
        Self {
            lengths: [1.0; 3],
            pbc: [true; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_lengths() {
        assert!(SimulationBox::periodic([10.0, 0.0, 10.0]).is_err());
        assert!(SimulationBox::periodic([10.0, -1.0, 10.0]).is_err());
    }

    #[test]
    fn wrap_folds_into_half_open_box() {
        let sim_box = SimulationBox::periodic([10.0, 10.0, 10.0]).unwrap();
        let mut r = Vector3::new(10.0, -0.5, 23.0);
        sim_box.wrap_position(&mut r);
        assert_eq!(r, Vector3::new(0.0, 9.5, 3.0));

        let mut tiny = Vector3::new(-1e-17, 5.0, 5.0);
        sim_box.wrap_position(&mut tiny);
        assert!(sim_box.contains(&tiny));
    }

    #[test]
    fn wrap_leaves_open_dimensions_alone() {
        let sim_box = SimulationBox::new([10.0; 3], [true, false, true]).unwrap();
        let mut r = Vector3::new(11.0, 11.0, 11.0);
        sim_box.wrap_position(&mut r);
        assert_eq!(r, Vector3::new(1.0, 11.0, 1.0));
    }

    #[test]
    fn minimum_image_picks_nearest_copy() {
        let sim_box = SimulationBox::periodic([10.0, 10.0, 10.0]).unwrap();
        let d = sim_box.minimum_image(&Vector3::new(6.0, 3.0, -7.0));
        assert_eq!(d, Vector3::new(-4.0, 3.0, 3.0));
    }
}
