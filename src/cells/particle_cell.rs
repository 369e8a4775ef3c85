use std::ops::Range;

use crate::cells::cell_data_soa::CellDataSoA;
use crate::errors::{CellMdError, Result};
use crate::math;
use crate::molecules::{ComponentTable, Molecule};

/// Region a cell belongs to. `Unassigned` cells take part in no force loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellRegion {
    Unassigned,
    Halo,
    Boundary,
    Inner,
    /// inner, and no boundary cell within the interaction range
    InnerMost,
}

/// Progress of the leaving-molecule protocol during one grid update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeavingState {
    Stable,
    LeavingIdentified,
    Reinserted,
}

/// One axis-aligned bucket `[box_min, box_max)` of the linked-cell grid.
#[derive(Debug, Clone)]
pub struct ParticleCell {
    index: usize,
    box_min: [f64; 3],
    box_max: [f64; 3],
    region: CellRegion,
    molecules: Vec<Molecule>,
    /// slots of `molecules` identified as leaving; copies arriving during
    /// the update are appended after them
    leaving: Range<usize>,
    leaving_state: LeavingState,
    soa: CellDataSoA,
}

impl ParticleCell {
    pub fn new(index: usize, box_min: [f64; 3], box_max: [f64; 3]) -> Self {
        Self {
            index,
            box_min,
            box_max,
            region: CellRegion::Unassigned,
            molecules: Vec::new(),
            leaving: 0..0,
            leaving_state: LeavingState::Stable,
            soa: CellDataSoA::default(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn box_min(&self) -> &[f64; 3] {
        &self.box_min
    }

    pub fn box_max(&self) -> &[f64; 3] {
        &self.box_max
    }

    pub fn region(&self) -> CellRegion {
        self.region
    }

    pub fn assign_to_halo(&mut self) {
        self.region = CellRegion::Halo;
    }

    pub fn assign_to_boundary(&mut self) {
        self.region = CellRegion::Boundary;
    }

    pub fn assign_to_inner(&mut self) {
        self.region = CellRegion::Inner;
    }

    pub fn assign_to_inner_most(&mut self) {
        self.region = CellRegion::InnerMost;
    }

    pub fn is_halo_cell(&self) -> bool {
        self.region == CellRegion::Halo
    }

    pub fn is_boundary_cell(&self) -> bool {
        self.region == CellRegion::Boundary
    }

    pub fn is_inner_cell(&self) -> bool {
        matches!(self.region, CellRegion::Inner | CellRegion::InnerMost)
    }

    pub fn is_inner_most_cell(&self) -> bool {
        self.region == CellRegion::InnerMost
    }

    pub fn contains(&self, r: &[f64; 3]) -> bool {
        math::contains(&self.box_min, &self.box_max, r)
    }

    pub fn molecules(&self) -> &[Molecule] {
        &self.molecules
    }

    /// Mutable access to the molecules. Positions may change, so the SoA
    /// view is marked stale.
    pub fn molecules_mut(&mut self) -> &mut [Molecule] {
        self.soa.invalidate();
        &mut self.molecules
    }

    pub fn len(&self) -> usize {
        self.molecules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.molecules.is_empty()
    }

    pub fn leaving_state(&self) -> LeavingState {
        self.leaving_state
    }

    pub fn add_particle(&mut self, molecule: Molecule, check_duplicate: bool) -> Result<()> {
        if check_duplicate && self.molecules.iter().any(|m| m.id == molecule.id) {
            return Err(CellMdError::DuplicateMolecule { id: molecule.id });
        }
        self.molecules.push(molecule);
        self.soa.invalidate();
        Ok(())
    }

    /// Removes the molecule at `i` without preserving order.
    pub fn delete_by_index(&mut self, i: usize) -> Option<Molecule> {
        if i >= self.molecules.len() {
            return None;
        }
        self.soa.invalidate();
        Some(self.molecules.swap_remove(i))
    }

    pub fn delete_all(&mut self) -> usize {
        self.take_molecules().len()
    }

    pub fn take_molecules(&mut self) -> Vec<Molecule> {
        self.soa.invalidate();
        std::mem::take(&mut self.molecules)
    }

    /// Copies (or, with `remove`, moves) every molecule inside `[low, high)`
    /// into `out`.
    pub fn collect_in_region(
        &mut self,
        low: &[f64; 3],
        high: &[f64; 3],
        out: &mut Vec<Molecule>,
        remove: bool,
    ) {
        if !remove {
            out.extend(
                self.molecules
                    .iter()
                    .filter(|m| math::contains(low, high, &m.position()))
                    .cloned(),
            );
            return;
        }
        let mut i = 0;
        while i < self.molecules.len() {
            if math::contains(low, high, &self.molecules[i].position()) {
                out.push(self.molecules.swap_remove(i));
                self.soa.invalidate();
            } else {
                i += 1;
            }
        }
    }

    /// Phase one of the leaving protocol: swaps molecules whose position is
    /// no longer inside the cell box to the tail. They stay in the cell until
    /// phase two. Returns how many were identified.
    pub fn pre_update_leaving(&mut self) -> Result<usize> {
        self.expect_state(LeavingState::Stable, "identify leavers")?;
        let len = self.molecules.len();
        let mut end = len;
        let mut i = 0;
        while i < end {
            if self.contains(&self.molecules[i].position()) {
                i += 1;
            } else {
                end -= 1;
                self.molecules.swap(i, end);
            }
        }
        if end < len {
            self.soa.invalidate();
        }
        self.leaving = end..len;
        self.leaving_state = LeavingState::LeavingIdentified;
        Ok(self.leaving.len())
    }

    /// Molecules identified in phase one, still owned by this cell.
    pub fn leaving_molecules(&self) -> &[Molecule] {
        &self.molecules[self.leaving.clone()]
    }

    /// Records that every leaver has a copy in its new cell.
    pub fn mark_reinserted(&mut self) -> Result<()> {
        self.expect_state(LeavingState::LeavingIdentified, "mark leavers reinserted")?;
        self.leaving_state = LeavingState::Reinserted;
        Ok(())
    }

    /// Phase two: drops the leavers once their copies are in place. Returns
    /// how many were dropped.
    pub fn post_update_leaving(&mut self) -> Result<usize> {
        self.expect_state(LeavingState::Reinserted, "drop leavers")?;
        let removed = self.molecules.drain(self.leaving.clone()).count();
        if removed > 0 {
            self.soa.invalidate();
        }
        self.leaving = 0..0;
        self.leaving_state = LeavingState::Stable;
        Ok(removed)
    }

    /// Undoes an interrupted update: copies received since phase one are
    /// dropped and the leavers stay where they were.
    pub fn abort_update_leaving(&mut self) {
        if self.leaving_state == LeavingState::Stable {
            return;
        }
        if self.molecules.len() > self.leaving.end {
            self.molecules.truncate(self.leaving.end);
            self.soa.invalidate();
        }
        self.leaving = 0..0;
        self.leaving_state = LeavingState::Stable;
    }

    fn expect_state(&self, state: LeavingState, action: &'static str) -> Result<()> {
        if self.leaving_state != state {
            return Err(CellMdError::LeavingOutOfOrder {
                cell: self.index,
                state: self.leaving_state,
                action,
            });
        }
        Ok(())
    }

    pub fn build_caches(&mut self, components: &ComponentTable) -> Result<()> {
        self.soa.rebuild(&self.molecules, components)
    }

    pub fn soa(&self) -> Result<&CellDataSoA> {
        if !self.soa.is_valid() {
            return Err(CellMdError::StaleSoA { cell: self.index });
        }
        Ok(&self.soa)
    }

    pub fn soa_mut(&mut self) -> Result<&mut CellDataSoA> {
        if !self.soa.is_valid() {
            return Err(CellMdError::StaleSoA { cell: self.index });
        }
        Ok(&mut self.soa)
    }

    /// Moves the site forces accumulated in the SoA onto the molecules.
    pub fn flush_soa_forces(&mut self) -> Result<()> {
        if !self.soa.is_valid() {
            return Err(CellMdError::StaleSoA { cell: self.index });
        }
        self.soa.flush_forces(&mut self.molecules);
        Ok(())
    }
}
