use log::{debug, trace};
use rayon::prelude::*;

use crate::cells::particle_cell::ParticleCell;
use crate::errors::{CellMdError, Result};
use crate::math;
use crate::molecules::{ComponentTable, Molecule};

/// Shape of a linked-cell grid: `owned` cells per dimension surrounded by
/// `halo` cells on every face.
#[derive(Debug, Clone, PartialEq)]
pub struct GridGeometry {
    pub dims: [usize; 3],
    pub owned: [usize; 3],
    pub halo: [usize; 3],
    pub cell_length: [f64; 3],
    pub owned_min: [f64; 3],
    pub owned_max: [f64; 3],
    pub halo_min: [f64; 3],
    pub halo_max: [f64; 3],
    /// cutoff plus skin
    pub interaction_length: f64,
}

impl GridGeometry {
    pub fn new(
        owned_min: [f64; 3],
        owned_max: [f64; 3],
        interaction_length: f64,
        cells_in_cutoff: usize,
    ) -> Result<Self> {
        if !(interaction_length > 0.0) || cells_in_cutoff == 0 {
            return Err(CellMdError::InvalidGeometry {
                reason: format!(
                    "interaction length {interaction_length} with {cells_in_cutoff} cells per cutoff"
                ),
            });
        }
        let mut geometry = Self {
            dims: [0; 3],
            owned: [0; 3],
            halo: [0; 3],
            cell_length: [0.0; 3],
            owned_min,
            owned_max,
            halo_min: [0.0; 3],
            halo_max: [0.0; 3],
            interaction_length,
        };
        for d in 0..3 {
            let width = owned_max[d] - owned_min[d];
            if !(width > 0.0) || !width.is_finite() {
                return Err(CellMdError::InvalidGeometry {
                    reason: format!("owned box {owned_min:?}..{owned_max:?} is empty"),
                });
            }
            let n = ((width * cells_in_cutoff as f64 / interaction_length).floor() as usize).max(1);
            geometry.owned[d] = n;
            geometry.cell_length[d] = width / n as f64;
            geometry.halo[d] = math::cells_to_cover(interaction_length, geometry.cell_length[d]);
            geometry.dims[d] = n + 2 * geometry.halo[d];
        }
        for d in 0..3 {
            geometry.halo_min[d] = geometry.lower_bound(d, 0);
            geometry.halo_max[d] = geometry.lower_bound(d, geometry.dims[d]);
        }
        Ok(geometry)
    }

    pub fn num_cells(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Lower face of cell layer `i` along `d`. The owned faces are exact.
    pub fn lower_bound(&self, d: usize, i: usize) -> f64 {
        let h = self.halo[d];
        if i == h {
            self.owned_min[d]
        } else if i == self.owned[d] + h {
            self.owned_max[d]
        } else {
            self.owned_min[d] + (i as f64 - h as f64) * self.cell_length[d]
        }
    }

    pub fn index(&self, c: [usize; 3]) -> usize {
        (c[2] * self.dims[1] + c[1]) * self.dims[0] + c[0]
    }

    pub fn coords(&self, index: usize) -> [usize; 3] {
        let x = index % self.dims[0];
        let y = (index / self.dims[0]) % self.dims[1];
        let z = index / (self.dims[0] * self.dims[1]);
        [x, y, z]
    }

    /// Layer along `d` holding coordinate `x`, unclamped; may lie outside `0..dims`.
    fn layer_of(&self, d: usize, x: f64) -> isize {
        let h = self.halo[d] as isize;
        let top = self.dims[d] as isize;
        let mut i = ((x - self.owned_min[d]) / self.cell_length[d]).floor() as isize + h;
        // floor can be off by one next to a face; settle against the actual faces
        while i > 0 && i <= top && x < self.lower_bound(d, i as usize) {
            i -= 1;
        }
        while i >= 0 && i < top && x >= self.lower_bound(d, i as usize + 1) {
            i += 1;
        }
        i
    }

    /// Cell holding `r` under the half-open convention, `None` outside the halo box.
    pub fn index_of(&self, r: &[f64; 3]) -> Option<usize> {
        let mut c = [0usize; 3];
        for d in 0..3 {
            if !(r[d] >= self.halo_min[d] && r[d] < self.halo_max[d]) {
                return None;
            }
            let i = self.layer_of(d, r[d]);
            if i < 0 || i >= self.dims[d] as isize {
                return None;
            }
            c[d] = i as usize;
        }
        Some(self.index(c))
    }

    pub fn cell_bounds(&self, c: [usize; 3]) -> ([f64; 3], [f64; 3]) {
        let mut lo = [0.0; 3];
        let mut hi = [0.0; 3];
        for d in 0..3 {
            lo[d] = self.lower_bound(d, c[d]);
            hi[d] = self.lower_bound(d, c[d] + 1);
        }
        (lo, hi)
    }

    pub fn is_halo(&self, c: [usize; 3]) -> bool {
        (0..3).any(|d| c[d] < self.halo[d] || c[d] >= self.owned[d] + self.halo[d])
    }

    /// Owned cell with a halo layer within `halo` cells.
    pub fn is_boundary(&self, c: [usize; 3]) -> bool {
        !self.is_halo(c) && (0..3).any(|d| c[d] < 2 * self.halo[d] || c[d] >= self.owned[d])
    }

    /// Owned cell with no boundary layer within `halo` cells.
    pub fn is_inner_most(&self, c: [usize; 3]) -> bool {
        (0..3).all(|d| c[d] >= 3 * self.halo[d] && c[d] + self.halo[d] < self.owned[d])
    }

    /// Inclusive range of cell layers along each dimension that intersect `[rmin, rmax)`.
    pub fn layers_overlapping(&self, rmin: &[f64; 3], rmax: &[f64; 3]) -> Option<([usize; 3], [usize; 3])> {
        let mut lo = [0usize; 3];
        let mut hi = [0usize; 3];
        for d in 0..3 {
            if rmax[d] <= self.halo_min[d] || rmin[d] >= self.halo_max[d] {
                return None;
            }
            let top = self.dims[d] as isize - 1;
            lo[d] = self.layer_of(d, rmin[d]).clamp(0, top) as usize;
            hi[d] = self.layer_of(d, rmax[d]).clamp(0, top) as usize;
        }
        Some((lo, hi))
    }
}

/// Linked-cell container of one process: owns every molecule it knows,
/// owned ones and halo copies alike.
#[derive(Debug, Clone)]
pub struct LinkedCells {
    geometry: GridGeometry,
    cutoff: f64,
    skin: f64,
    cells_in_cutoff: usize,
    cells: Vec<ParticleCell>,
}

impl LinkedCells {
    pub fn new(
        owned_min: [f64; 3],
        owned_max: [f64; 3],
        cutoff: f64,
        skin: f64,
        cells_in_cutoff: usize,
    ) -> Result<Self> {
        if !(cutoff > 0.0) || !(skin >= 0.0) {
            return Err(CellMdError::InvalidGeometry {
                reason: format!("cutoff {cutoff} and skin {skin} must be positive"),
            });
        }
        let geometry = GridGeometry::new(owned_min, owned_max, cutoff + skin, cells_in_cutoff)?;
        let cells = Self::build_cells(&geometry);
        debug!(
            "linked cells {:?} (halo {:?}) of length {:?} for box {:?}..{:?}",
            geometry.dims, geometry.halo, geometry.cell_length, owned_min, owned_max
        );
        Ok(Self {
            geometry,
            cutoff,
            skin,
            cells_in_cutoff,
            cells,
        })
    }

    fn build_cells(geometry: &GridGeometry) -> Vec<ParticleCell> {
        let mut cells = Vec::with_capacity(geometry.num_cells());
        for index in 0..geometry.num_cells() {
            let c = geometry.coords(index);
            let (lo, hi) = geometry.cell_bounds(c);
            let mut cell = ParticleCell::new(index, lo, hi);
            if geometry.is_halo(c) {
                cell.assign_to_halo();
            } else if geometry.is_boundary(c) {
                cell.assign_to_boundary();
            } else if geometry.is_inner_most(c) {
                cell.assign_to_inner_most();
            } else {
                cell.assign_to_inner();
            }
            cells.push(cell);
        }
        cells
    }

    /// Re-grids for a new owned box. Molecules that still fall inside the new
    /// halo box are kept; the others are returned to the caller.
    pub fn rebuild(&mut self, owned_min: [f64; 3], owned_max: [f64; 3]) -> Result<Vec<Molecule>> {
        let geometry =
            GridGeometry::new(owned_min, owned_max, self.cutoff + self.skin, self.cells_in_cutoff)?;
        let molecules = self.drain_all();
        self.cells = Self::build_cells(&geometry);
        self.geometry = geometry;
        let mut outside = Vec::new();
        for molecule in molecules {
            match self.geometry.index_of(&molecule.position()) {
                Some(index) => self.cells[index].add_particle(molecule, false)?,
                None => outside.push(molecule),
            }
        }
        debug!(
            "rebuilt linked cells {:?} for box {:?}..{:?}, {} molecules outside",
            self.geometry.dims,
            owned_min,
            owned_max,
            outside.len()
        );
        Ok(outside)
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn skin(&self) -> f64 {
        self.skin
    }

    pub fn interaction_length(&self) -> f64 {
        self.geometry.interaction_length
    }

    pub fn owned_min(&self) -> &[f64; 3] {
        &self.geometry.owned_min
    }

    pub fn owned_max(&self) -> &[f64; 3] {
        &self.geometry.owned_max
    }

    pub fn cells(&self) -> &[ParticleCell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [ParticleCell] {
        &mut self.cells
    }

    /// Mutable cells along with the geometry they are laid out on.
    pub fn cells_with_geometry_mut(&mut self) -> (&GridGeometry, &mut [ParticleCell]) {
        (&self.geometry, &mut self.cells)
    }

    pub fn index_of(&self, r: &[f64; 3]) -> Option<usize> {
        self.geometry.index_of(r)
    }

    pub fn is_owned_position(&self, r: &[f64; 3]) -> bool {
        math::contains(&self.geometry.owned_min, &self.geometry.owned_max, r)
    }

    pub fn add_particle(&mut self, molecule: Molecule, check_duplicate: bool) -> Result<()> {
        let position = molecule.position();
        match self.geometry.index_of(&position) {
            Some(index) => self.cells[index].add_particle(molecule, check_duplicate),
            None => Err(CellMdError::ParticleOutsideHalo {
                id: molecule.id,
                position,
            }),
        }
    }

    pub fn num_molecules(&self) -> usize {
        self.cells.iter().map(|c| c.len()).sum()
    }

    pub fn num_owned_molecules(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| !c.is_halo_cell())
            .map(|c| c.len())
            .sum()
    }

    pub fn num_halo_molecules(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| c.is_halo_cell())
            .map(|c| c.len())
            .sum()
    }

    pub fn owned_molecules(&self) -> impl Iterator<Item = &Molecule> {
        self.cells
            .iter()
            .filter(|c| !c.is_halo_cell())
            .flat_map(|c| c.molecules().iter())
    }

    pub fn halo_molecules(&self) -> impl Iterator<Item = &Molecule> {
        self.cells
            .iter()
            .filter(|c| c.is_halo_cell())
            .flat_map(|c| c.molecules().iter())
    }

    pub fn for_each_owned_mut<F: FnMut(&mut Molecule)>(&mut self, mut f: F) {
        for cell in self.cells.iter_mut().filter(|c| !c.is_halo_cell()) {
            for molecule in cell.molecules_mut() {
                f(molecule);
            }
        }
    }

    /// Reassigns every molecule to the cell matching its current position.
    /// Leavers are copied to their new cells before the originals are
    /// dropped; on failure the grid is left as it was.
    pub fn update(&mut self) -> Result<()> {
        let moved = match self.reinsert_leaving() {
            Ok(moved) => moved,
            Err(err) => {
                for cell in self.cells.iter_mut() {
                    cell.abort_update_leaving();
                }
                return Err(err);
            }
        };
        for cell in self.cells.iter_mut() {
            cell.post_update_leaving()?;
        }
        trace!("update moved {moved} molecules between cells");
        Ok(())
    }

    /// Phase one over all cells plus the copies into the new cells. Returns
    /// how many molecules move.
    fn reinsert_leaving(&mut self) -> Result<usize> {
        let mut identified = 0;
        for cell in self.cells.iter_mut() {
            identified += cell.pre_update_leaving()?;
        }
        let mut moves = Vec::with_capacity(identified);
        for (from, cell) in self.cells.iter().enumerate() {
            for (k, molecule) in cell.leaving_molecules().iter().enumerate() {
                let position = molecule.position();
                let to = self
                    .geometry
                    .index_of(&position)
                    .ok_or(CellMdError::ParticleOutsideHalo {
                        id: molecule.id,
                        position,
                    })?;
                moves.push((from, k, to));
            }
        }
        let mut reinserted = 0;
        for (from, k, to) in moves {
            let molecule = self.cells[from].leaving_molecules()[k].clone();
            self.cells[to].add_particle(molecule, false)?;
            reinserted += 1;
        }
        if reinserted != identified {
            return Err(CellMdError::LostMolecules {
                identified,
                reinserted,
            });
        }
        for cell in self.cells.iter_mut() {
            cell.mark_reinserted()?;
        }
        Ok(identified)
    }

    /// Drops every halo copy. Returns how many were dropped.
    pub fn delete_outer_particles(&mut self) -> usize {
        self.cells
            .iter_mut()
            .filter(|c| c.is_halo_cell())
            .map(|c| c.delete_all())
            .sum()
    }

    /// Copies, or with `remove` takes out, the molecules inside `[rmin, rmax)`.
    pub fn collect_in_region(&mut self, rmin: &[f64; 3], rmax: &[f64; 3], remove: bool) -> Vec<Molecule> {
        let mut out = Vec::new();
        let Some((lo, hi)) = self.geometry.layers_overlapping(rmin, rmax) else {
            return out;
        };
        for z in lo[2]..=hi[2] {
            for y in lo[1]..=hi[1] {
                for x in lo[0]..=hi[0] {
                    let index = self.geometry.index([x, y, z]);
                    self.cells[index].collect_in_region(rmin, rmax, &mut out, remove);
                }
            }
        }
        out
    }

    /// Takes every molecule out of the grid.
    pub fn drain_all(&mut self) -> Vec<Molecule> {
        let mut out = Vec::with_capacity(self.num_molecules());
        for cell in self.cells.iter_mut() {
            out.append(&mut cell.take_molecules());
        }
        out
    }

    /// Rebuilds the SoA view of every cell.
    pub fn update_molecule_caches(&mut self, components: &ComponentTable) -> Result<()> {
        self.cells
            .par_iter_mut()
            .try_for_each(|cell| cell.build_caches(components))
    }

    /// Rebuilds only the halo cells' SoA, leaving forces already written to
    /// owned cells in place.
    pub fn update_halo_caches(&mut self, components: &ComponentTable) -> Result<()> {
        self.cells
            .par_iter_mut()
            .filter(|cell| cell.is_halo_cell())
            .try_for_each(|cell| cell.build_caches(components))
    }

    pub fn flush_forces(&mut self) -> Result<()> {
        self.cells.iter_mut().try_for_each(|cell| cell.flush_soa_forces())
    }

    pub fn clear_forces(&mut self) {
        for cell in self.cells.iter_mut() {
            for molecule in cell.molecules_mut() {
                molecule.clear_forces();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::LeavingState;

    fn ten_box(cutoff: f64, skin: f64) -> LinkedCells {
        LinkedCells::new([0.0; 3], [10.0; 3], cutoff, skin, 1).unwrap()
    }

    #[test]
    fn geometry_of_the_reference_box() {
        let grid = ten_box(2.5, 0.0);
        let g = grid.geometry();
        assert_eq!(g.owned, [4; 3]);
        assert_eq!(g.halo, [1; 3]);
        assert_eq!(g.dims, [6; 3]);
        assert_eq!(g.halo_min, [-2.5; 3]);
        assert_eq!(g.halo_max, [12.5; 3]);
    }

    #[test]
    fn cells_in_cutoff_refines_the_grid() {
        let grid = LinkedCells::new([0.0; 3], [10.0; 3], 2.5, 0.0, 2).unwrap();
        let g = grid.geometry();
        assert_eq!(g.owned, [8; 3]);
        assert_eq!(g.halo, [2; 3]);
        assert_eq!(g.dims, [12; 3]);
    }

    #[test]
    fn face_positions_go_to_the_higher_cell() {
        let grid = ten_box(2.5, 0.0);
        let g = grid.geometry();
        assert_eq!(g.index_of(&[0.0, 0.0, 0.0]), Some(g.index([1, 1, 1])));
        assert_eq!(g.index_of(&[2.5, 5.0, 9.999]), Some(g.index([2, 3, 4])));
        assert_eq!(g.index_of(&[10.0, 5.0, 5.0]), Some(g.index([5, 3, 3])));
        assert_eq!(g.index_of(&[-2.5, 5.0, 5.0]), Some(g.index([0, 3, 3])));
        assert_eq!(g.index_of(&[12.5, 5.0, 5.0]), None);
        assert_eq!(g.index_of(&[-2.6, 5.0, 5.0]), None);
    }

    #[test]
    fn owned_box_faces_are_exact() {
        let grid = LinkedCells::new([0.1; 3], [0.7; 3], 0.1, 0.0, 1).unwrap();
        let g = grid.geometry();
        for d in 0..3 {
            assert_eq!(g.lower_bound(d, g.halo[d]), 0.1);
            assert_eq!(g.lower_bound(d, g.halo[d] + g.owned[d]), 0.7);
        }
        let last_owned = g.index_of(&[0.7 - 1e-12, 0.3, 0.3]).unwrap();
        assert!(!grid.cells()[last_owned].is_halo_cell());
        let first_halo = g.index_of(&[0.7, 0.3, 0.3]).unwrap();
        assert!(grid.cells()[first_halo].is_halo_cell());
    }

    #[test]
    fn region_layout_of_a_wide_box() {
        let grid = LinkedCells::new([0.0; 3], [20.0; 3], 2.5, 0.0, 1).unwrap();
        let g = grid.geometry();
        assert_eq!(g.owned, [8; 3]);
        let region = |c: [usize; 3]| grid.cells()[g.index(c)].region();
        use crate::cells::CellRegion::*;
        assert_eq!(region([0, 4, 4]), Halo);
        assert_eq!(region([1, 4, 4]), Boundary);
        assert_eq!(region([2, 4, 4]), Inner);
        assert_eq!(region([3, 4, 4]), InnerMost);
        assert_eq!(region([6, 4, 4]), InnerMost);
        assert_eq!(region([7, 4, 4]), Inner);
        assert_eq!(region([8, 4, 4]), Boundary);
        assert_eq!(region([9, 4, 4]), Halo);
    }

    #[test]
    fn update_moves_molecules_and_reports_escapes() {
        let mut grid = ten_box(2.5, 0.0);
        grid.add_particle(Molecule::at(1, [1.0, 1.0, 1.0]), true).unwrap();
        grid.cells_mut().iter_mut().for_each(|c| {
            for m in c.molecules_mut() {
                m.r[0] = -1.0;
            }
        });
        grid.update().unwrap();
        assert_eq!(grid.num_halo_molecules(), 1);
        assert_eq!(grid.delete_outer_particles(), 1);
        assert_eq!(grid.num_molecules(), 0);

        grid.add_particle(Molecule::at(2, [1.0, 1.0, 1.0]), true).unwrap();
        for c in grid.cells_mut() {
            for m in c.molecules_mut() {
                m.r[1] = 14.0;
            }
        }
        let err = grid.update().unwrap_err();
        assert!(matches!(err, CellMdError::ParticleOutsideHalo { id: 2, .. }));
    }

    #[test]
    fn failed_update_loses_no_molecule() {
        let mut grid = ten_box(2.5, 0.0);
        for (id, x) in [(1, 0.5), (2, 3.0), (3, 5.5), (4, 8.0)] {
            grid.add_particle(Molecule::at(id, [x, 5.0, 5.0]), false).unwrap();
        }
        // 1 and 3 change cells while 4 leaves the halo box
        for c in grid.cells_mut() {
            for m in c.molecules_mut() {
                match m.id {
                    1 => m.r[0] = 3.2,
                    3 => m.r[0] = 7.6,
                    4 => m.r[0] = 13.0,
                    _ => {}
                }
            }
        }
        let layout = |grid: &LinkedCells| -> Vec<Vec<u64>> {
            grid.cells()
                .iter()
                .map(|c| {
                    let mut ids: Vec<u64> = c.molecules().iter().map(|m| m.id).collect();
                    ids.sort();
                    ids
                })
                .collect()
        };
        let before = layout(&grid);
        let err = grid.update().unwrap_err();
        assert!(matches!(err, CellMdError::ParticleOutsideHalo { id: 4, .. }));
        assert_eq!(grid.num_molecules(), 4);
        assert!(grid.cells().iter().all(|c| c.leaving_state() == LeavingState::Stable));
        assert_eq!(layout(&grid), before);

        // bring 4 back inside and the same update goes through
        for c in grid.cells_mut() {
            for m in c.molecules_mut().iter_mut().filter(|m| m.id == 4) {
                m.r[0] = 9.0;
            }
        }
        grid.update().unwrap();
        assert_eq!(grid.num_molecules(), 4);
        for cell in grid.cells() {
            assert_eq!(cell.leaving_state(), LeavingState::Stable);
            for m in cell.molecules() {
                assert!(cell.contains(&m.position()));
            }
        }
    }

    #[test]
    fn region_query_only_returns_inside_molecules() {
        let mut grid = ten_box(2.5, 0.0);
        for (id, x) in [(1, 0.5), (2, 3.0), (3, 7.5), (4, 9.9)] {
            grid.add_particle(Molecule::at(id, [x, 5.0, 5.0]), false).unwrap();
        }
        let mut ids: Vec<u64> = grid
            .collect_in_region(&[7.5, 0.0, 0.0], &[10.0; 3], false)
            .iter()
            .map(|m| m.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec![3, 4]);
        assert_eq!(grid.num_molecules(), 4);
        let taken = grid.collect_in_region(&[-1.0, 0.0, 0.0], &[1.0, 10.0, 10.0], true);
        assert_eq!(taken.len(), 1);
        assert_eq!(grid.num_molecules(), 3);
    }

    #[test]
    fn rebuild_keeps_molecules_that_still_fit() {
        let mut grid = ten_box(2.5, 0.0);
        grid.add_particle(Molecule::at(1, [1.0, 5.0, 5.0]), false).unwrap();
        grid.add_particle(Molecule::at(2, [9.0, 5.0, 5.0]), false).unwrap();
        let outside = grid.rebuild([0.0; 3], [5.0, 10.0, 10.0]).unwrap();
        assert_eq!(outside.len(), 1);
        assert_eq!(outside[0].id, 2);
        assert_eq!(grid.num_owned_molecules(), 1);
        assert_eq!(grid.geometry().owned, [2, 4, 4]);
    }
}
