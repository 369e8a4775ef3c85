use crate::cells::LinkedCells;
use crate::errors::Result;
use crate::molecules::ComponentTable;

/// Translational leapfrog in kick-drift-kick form. Orientation and angular
/// momentum are carried along unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Leapfrog {
    timestep: f64,
}

impl Leapfrog {
    pub fn new(timestep: f64) -> Self {
        Self { timestep }
    }

    pub fn timestep(&self) -> f64 {
        self.timestep
    }

    /// First half kick and the full drift, before positions are sorted back
    /// into cells.
    pub fn event_new_timestep(&self, grid: &mut LinkedCells, components: &ComponentTable) -> Result<()> {
        let dt = self.timestep;
        for cell in grid.cells_mut().iter_mut().filter(|c| !c.is_halo_cell()) {
            for molecule in cell.molecules_mut() {
                let mass = components.get(molecule.component_id)?.mass;
                molecule.v += molecule.f * (0.5 * dt / mass);
                molecule.r += molecule.v * dt;
            }
        }
        Ok(())
    }

    /// Second half kick once the new forces are on the molecules.
    pub fn event_forces_calculated(&self, grid: &mut LinkedCells, components: &ComponentTable) -> Result<()> {
        let dt = self.timestep;
        for cell in grid.cells_mut().iter_mut().filter(|c| !c.is_halo_cell()) {
            for molecule in cell.molecules_mut() {
                let mass = components.get(molecule.component_id)?.mass;
                molecule.v += molecule.f * (0.5 * dt / mass);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecules::{Component, Molecule};
    use approx::assert_relative_eq;
    use na::Vector3;

    #[test]
    fn constant_force_gives_uniform_acceleration() {
        let components = ComponentTable::new(vec![Component::single_site(0, 2.0, 1.0, 1.0)]);
        let mut grid = LinkedCells::new([0.0; 3], [10.0; 3], 2.5, 0.0, 1).unwrap();
        let mut molecule = Molecule::at(1, [5.0, 5.0, 5.0]);
        molecule.f = Vector3::new(4.0, 0.0, 0.0);
        grid.add_particle(molecule, false).unwrap();

        let integrator = Leapfrog::new(0.1);
        integrator.event_new_timestep(&mut grid, &components).unwrap();
        integrator.event_forces_calculated(&mut grid, &components).unwrap();
        let moved = grid.owned_molecules().next().unwrap();
        // x = x0 + a t^2 / 2, v = a t
        assert_relative_eq!(moved.r[0], 5.0 + 0.5 * 2.0 * 0.01, epsilon = 1e-12);
        assert_relative_eq!(moved.v[0], 0.2, epsilon = 1e-12);
    }
}
