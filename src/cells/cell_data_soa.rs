use std::ops::Range;

use na::Vector3;

use crate::errors::Result;
use crate::molecules::{ComponentTable, Molecule};

/// Structure-of-arrays view of one cell, rebuilt from its molecule list.
///
/// Molecule-level arrays are indexed by the molecule's position in the cell,
/// site-level arrays by a running site counter; `site_molecule` maps back.
#[derive(Debug, Default, Clone)]
pub struct CellDataSoA {
    valid: bool,
    pub mol_id: Vec<u64>,
    pub mol_r: [Vec<f64>; 3],
    pub site_molecule: Vec<usize>,
    /// first site of each molecule, with a trailing end marker
    pub site_start: Vec<usize>,
    pub site_r: [Vec<f64>; 3],
    pub site_f: [Vec<f64>; 3],
    pub site_epsilon: Vec<f64>,
    pub site_sigma: Vec<f64>,
}

impl CellDataSoA {
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    pub fn num_molecules(&self) -> usize {
        self.mol_id.len()
    }

    pub fn num_sites(&self) -> usize {
        self.site_molecule.len()
    }

    fn clear(&mut self) {
        self.mol_id.clear();
        self.site_molecule.clear();
        self.site_start.clear();
        self.site_epsilon.clear();
        self.site_sigma.clear();
        for d in 0..3 {
            self.mol_r[d].clear();
            self.site_r[d].clear();
            self.site_f[d].clear();
        }
    }

    pub fn rebuild(&mut self, molecules: &[Molecule], components: &ComponentTable) -> Result<()> {
        self.clear();
        for (i, molecule) in molecules.iter().enumerate() {
            self.mol_id.push(molecule.id);
            for d in 0..3 {
                self.mol_r[d].push(molecule.r[d]);
            }
            let component = components.get(molecule.component_id)?;
            self.site_start.push(self.site_molecule.len());
            for site in &component.sites {
                let r = molecule.site_position(&site.offset);
                self.site_molecule.push(i);
                self.site_epsilon.push(site.epsilon);
                self.site_sigma.push(site.sigma);
                for d in 0..3 {
                    self.site_r[d].push(r[d]);
                    self.site_f[d].push(0.0);
                }
            }
        }
        self.site_start.push(self.site_molecule.len());
        self.valid = true;
        Ok(())
    }

    pub fn sites_of(&self, mol: usize) -> Range<usize> {
        self.site_start[mol]..self.site_start[mol + 1]
    }

    pub fn site_position(&self, site: usize) -> Vector3<f64> {
        Vector3::new(self.site_r[0][site], self.site_r[1][site], self.site_r[2][site])
    }

    pub fn molecule_position(&self, mol: usize) -> Vector3<f64> {
        Vector3::new(self.mol_r[0][mol], self.mol_r[1][mol], self.mol_r[2][mol])
    }

    pub fn add_site_force(&mut self, site: usize, f: &Vector3<f64>) {
        for d in 0..3 {
            self.site_f[d][site] += f[d];
        }
    }

    /// Adds the accumulated site forces to the molecules' force and torque
    /// and zeroes the site forces.
    pub fn flush_forces(&mut self, molecules: &mut [Molecule]) {
        for site in 0..self.num_sites() {
            let f = Vector3::new(self.site_f[0][site], self.site_f[1][site], self.site_f[2][site]);
            let mol = self.site_molecule[site];
            let lever = self.site_position(site) - self.molecule_position(mol);
            molecules[mol].f += f;
            molecules[mol].m += lever.cross(&f);
            for d in 0..3 {
                self.site_f[d][site] = 0.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecules::{Component, LjSite};
    use approx::assert_relative_eq;

    fn dimer_table() -> ComponentTable {
        ComponentTable::new(vec![Component {
            id: 0,
            mass: 2.0,
            sites: vec![
                LjSite::new(Vector3::new(-0.5, 0.0, 0.0), 1.0, 1.0),
                LjSite::new(Vector3::new(0.5, 0.0, 0.0), 1.0, 1.0),
            ],
        }])
    }

    #[test]
    fn sites_follow_molecule_positions() {
        let molecules = vec![Molecule::at(1, [1.0, 1.0, 1.0]), Molecule::at(2, [3.0, 1.0, 1.0])];
        let mut soa = CellDataSoA::default();
        soa.rebuild(&molecules, &dimer_table()).unwrap();
        assert!(soa.is_valid());
        assert_eq!(soa.num_molecules(), 2);
        assert_eq!(soa.num_sites(), 4);
        assert_eq!(soa.site_molecule, vec![0, 0, 1, 1]);
        assert_eq!(soa.sites_of(1), 2..4);
        assert_relative_eq!(soa.site_r[0][3], 3.5);
    }

    #[test]
    fn flush_produces_force_and_torque() {
        let mut molecules = vec![Molecule::at(1, [0.0, 0.0, 0.0])];
        let mut soa = CellDataSoA::default();
        soa.rebuild(&molecules, &dimer_table()).unwrap();
        soa.add_site_force(1, &Vector3::new(0.0, 2.0, 0.0));
        soa.flush_forces(&mut molecules);
        assert_relative_eq!(molecules[0].f, Vector3::new(0.0, 2.0, 0.0));
        assert_relative_eq!(molecules[0].m, Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(soa.site_f[1][1], 0.0);
    }
}
