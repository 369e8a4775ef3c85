use std::collections::BTreeMap;
use std::sync::Mutex;

use na::Vector3;

use crate::cells::{CellDataSoA, ParticleCell};
use crate::errors::Result;
use crate::processors::cell_processor::{counts_towards_macroscopic, CellProcessor};

/// 12-6 Lennard-Jones interaction between two sites.
pub struct LennardJones {
    epsilon: f64,
    sigma: f64,
    rcut: f64,
    shift: bool,
}

impl LennardJones {
    pub fn new(epsilon: f64, sigma: f64, rcut: f64, shift: bool) -> Self {
        Self {
            epsilon,
            sigma,
            rcut,
            shift,
        }
    }

    /// Lorentz-Berthelot combination of two site parameter sets.
    pub fn mixed(eps_i: f64, sigma_i: f64, eps_j: f64, sigma_j: f64, rcut: f64, shift: bool) -> Self {
        Self::new((eps_i * eps_j).sqrt(), 0.5 * (sigma_i + sigma_j), rcut, shift)
    }

    /// Potential energy and the force on the first site for `rij = ri - rj`.
    pub fn compute_potential(&self, rij: &Vector3<f64>) -> (f64, Vector3<f64>) {
        let rij2 = rij.norm_squared();
        let inv_rij2 = 1.0 / rij2;
        let vanderwaals_attraction = (self.sigma.powi(2) * inv_rij2).powi(3);
        let lj_repulsion = vanderwaals_attraction.powi(2);

        let mut potential_energy = 4.0 * self.epsilon * (lj_repulsion - vanderwaals_attraction);

        let force =
            24.0 * self.epsilon * (2.0 * lj_repulsion - vanderwaals_attraction) * inv_rij2 * rij;

        if self.shift {
            let cutoff_inv2 = (self.sigma / self.rcut).powi(2);
            let cutoff_attraction = cutoff_inv2.powi(3);
            let cutoff_repulsion = cutoff_attraction.powi(2);

            potential_energy -= 4.0 * self.epsilon * (cutoff_repulsion - cutoff_attraction);
        }

        (potential_energy, force)
    }
}

/// Site-site Lennard-Jones forces over the SoA caches, with a
/// centre-of-mass cutoff. Forces land in the SoA site forces and have to be
/// flushed onto the molecules afterwards.
#[derive(Debug)]
pub struct LennardJonesProcessor {
    cutoff: f64,
    shift: bool,
    /// (upot, virial) keyed by the lower cell index of each visit
    partial: Mutex<BTreeMap<usize, (f64, f64)>>,
    upot: f64,
    virial: f64,
}

impl LennardJonesProcessor {
    pub fn new(cutoff: f64, shift: bool) -> Self {
        Self {
            cutoff,
            shift,
            partial: Mutex::new(BTreeMap::new()),
            upot: 0.0,
            virial: 0.0,
        }
    }

    /// Potential energy of the last traversal, on this process.
    pub fn upot(&self) -> f64 {
        self.upot
    }

    pub fn virial(&self) -> f64 {
        self.virial
    }

    fn record(&self, key: usize, upot: f64, virial: f64) {
        if upot == 0.0 && virial == 0.0 {
            return;
        }
        let mut partial = self.partial.lock().unwrap_or_else(|e| e.into_inner());
        let entry = partial.entry(key).or_insert((0.0, 0.0));
        entry.0 += upot;
        entry.1 += virial;
    }

    /// All site pairs of molecules `i` in `soa_a` and `j` in `soa_b`.
    /// Returns (upot, virial) of the pair.
    fn molecule_pair(
        &self,
        soa_a: &mut CellDataSoA,
        i: usize,
        soa_b: &mut CellDataSoA,
        j: usize,
    ) -> (f64, f64) {
        let mut upot = 0.0;
        let mut virial = 0.0;
        for si in soa_a.sites_of(i) {
            for sj in soa_b.sites_of(j) {
                let lj = LennardJones::mixed(
                    soa_a.site_epsilon[si],
                    soa_a.site_sigma[si],
                    soa_b.site_epsilon[sj],
                    soa_b.site_sigma[sj],
                    self.cutoff,
                    self.shift,
                );
                let rij = soa_a.site_position(si) - soa_b.site_position(sj);
                let (u, f) = lj.compute_potential(&rij);
                soa_a.add_site_force(si, &f);
                soa_b.add_site_force(sj, &-f);
                upot += u;
                virial += rij.dot(&f);
            }
        }
        (upot, virial)
    }

    fn same_cell_pair(&self, soa: &mut CellDataSoA, i: usize, j: usize) -> (f64, f64) {
        let mut upot = 0.0;
        let mut virial = 0.0;
        for si in soa.sites_of(i) {
            for sj in soa.sites_of(j) {
                let lj = LennardJones::mixed(
                    soa.site_epsilon[si],
                    soa.site_sigma[si],
                    soa.site_epsilon[sj],
                    soa.site_sigma[sj],
                    self.cutoff,
                    self.shift,
                );
                let rij = soa.site_position(si) - soa.site_position(sj);
                let (u, f) = lj.compute_potential(&rij);
                soa.add_site_force(si, &f);
                soa.add_site_force(sj, &-f);
                upot += u;
                virial += rij.dot(&f);
            }
        }
        (upot, virial)
    }
}

impl CellProcessor for LennardJonesProcessor {
    fn init_traversal(&mut self) {
        self.partial
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.upot = 0.0;
        self.virial = 0.0;
    }

    fn process_cell(&self, cell: &mut ParticleCell) -> Result<()> {
        // halo copies only matter as partners of owned molecules
        if cell.is_halo_cell() {
            return Ok(());
        }
        let key = cell.index();
        let soa = cell.soa_mut()?;
        let cutoff2 = self.cutoff * self.cutoff;
        let (mut upot, mut virial) = (0.0, 0.0);
        for i in 0..soa.num_molecules() {
            for j in (i + 1)..soa.num_molecules() {
                let d = soa.molecule_position(i) - soa.molecule_position(j);
                if d.norm_squared() >= cutoff2 {
                    continue;
                }
                let (u, w) = self.same_cell_pair(soa, i, j);
                upot += u;
                virial += w;
            }
        }
        self.record(key, upot, virial);
        Ok(())
    }

    fn process_cell_pair(&self, a: &mut ParticleCell, b: &mut ParticleCell) -> Result<()> {
        let a_halo = a.is_halo_cell();
        let b_halo = b.is_halo_cell();
        if a_halo && b_halo {
            return Ok(());
        }
        let key = a.index().min(b.index());
        let soa_a = a.soa_mut()?;
        let soa_b = b.soa_mut()?;
        let cutoff2 = self.cutoff * self.cutoff;
        let (mut upot, mut virial) = (0.0, 0.0);
        for i in 0..soa_a.num_molecules() {
            let ri = soa_a.molecule_position(i);
            for j in 0..soa_b.num_molecules() {
                let rj = soa_b.molecule_position(j);
                if (ri - rj).norm_squared() >= cutoff2 {
                    continue;
                }
                let (u, w) = self.molecule_pair(soa_a, i, soa_b, j);
                if counts_towards_macroscopic(
                    a_halo,
                    b_halo,
                    (&ri, soa_a.mol_id[i]),
                    (&rj, soa_b.mol_id[j]),
                )? {
                    upot += u;
                    virial += w;
                }
            }
        }
        self.record(key, upot, virial);
        Ok(())
    }

    fn end_traversal(&mut self) {
        let partial = std::mem::take(&mut *self.partial.lock().unwrap_or_else(|e| e.into_inner()));
        // key order keeps the sum independent of thread scheduling
        for (upot, virial) in partial.values() {
            self.upot += upot;
            self.virial += virial;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::LinkedCells;
    use crate::molecules::{Component, ComponentTable, Molecule};
    use crate::traversals::{CellPairTraversal, Original};
    use approx::assert_relative_eq;

    #[test]
    fn potential_minimum_has_no_force() {
        let lj = LennardJones::new(1.0, 1.0, 2.5, false);
        let r_min = 2f64.powf(1.0 / 6.0);
        let (u, f) = lj.compute_potential(&Vector3::new(r_min, 0.0, 0.0));
        assert_relative_eq!(u, -1.0, epsilon = 1e-12);
        assert_relative_eq!(f.norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn shifted_potential_vanishes_at_cutoff() {
        let lj = LennardJones::new(1.0, 1.0, 2.5, true);
        let (u, _) = lj.compute_potential(&Vector3::new(0.0, 2.5, 0.0));
        assert_relative_eq!(u, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn dimer_across_cells_feels_opposite_forces() {
        let components = ComponentTable::new(vec![Component::single_site(0, 1.0, 1.0, 1.0)]);
        let mut grid = LinkedCells::new([0.0; 3], [10.0; 3], 2.5, 0.0, 1).unwrap();
        grid.add_particle(Molecule::at(1, [2.0, 5.0, 5.0]), false).unwrap();
        grid.add_particle(Molecule::at(2, [3.1, 5.0, 5.0]), false).unwrap();
        grid.update_molecule_caches(&components).unwrap();

        let mut traversal = Original::default();
        traversal.rebuild(grid.cells(), grid.geometry()).unwrap();
        let mut processor = LennardJonesProcessor::new(2.5, false);
        traversal
            .traverse_cell_pairs(&mut grid, &mut processor)
            .unwrap();
        grid.flush_forces().unwrap();

        let forces: Vec<(u64, Vector3<f64>)> = grid.owned_molecules().map(|m| (m.id, m.f)).collect();
        assert_eq!(forces.len(), 2);
        assert_relative_eq!(forces[0].1, -forces[1].1, epsilon = 1e-12);

        let expected = LennardJones::new(1.0, 1.0, 2.5, false).compute_potential(&Vector3::new(1.1, 0.0, 0.0));
        assert_relative_eq!(processor.upot(), expected.0, epsilon = 1e-12);
        // the molecule at lower x is pushed towards -x
        let left = forces.iter().find(|(id, _)| *id == 1).unwrap();
        assert_relative_eq!(left.1[0], -expected.1[0], epsilon = 1e-12);
    }
}
