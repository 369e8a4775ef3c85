//! Distributed-memory layer of one rank: which part of the box it owns, who
//! its partners are, and the two exchanges every step needs.
//!
//! Migration runs first. Molecules that drifted into the halo margins are
//! taken out and sent to their new owners, shifted through the periodic
//! boundary where needed. The halo exchange follows: copies of owned
//! molecules near the box faces are sent to every rank whose halo covers
//! them.
use log::{debug, info, warn};

use crate::cells::LinkedCells;
use crate::errors::{CellMdError, Result};
use crate::molecules::{decode_molecules, encode_molecules, ComponentTable, Molecule};
use crate::parallel::communicator::{Communicator, TAG_HALO, TAG_LEAVING, TAG_REBALANCE};
use crate::parallel::halo_region::{margin_regions, surrounding_regions, HaloRegion};
use crate::parallel::neighbor_acquirer::{acquire_neighbours, AcquiredPartners};
use crate::parallel::process_grid::ProcessGrid;
use crate::processors::CellProcessor;
use crate::simulation_box::SimulationBox;
use crate::traversals::CellPairTraversal;

pub struct DomainDecomposition<C: Communicator> {
    comm: C,
    sim_box: SimulationBox,
    process_grid: ProcessGrid,
    cutoff: f64,
    skin: f64,
    halo_partners: AcquiredPartners,
    leaving_partners: AcquiredPartners,
}

impl<C: Communicator> DomainDecomposition<C> {
    /// Splits the box over all ranks of `comm`.
    pub fn new(comm: C, sim_box: SimulationBox, cutoff: f64, skin: f64) -> Result<Self> {
        let process_grid = ProcessGrid::new(&sim_box, comm.size(), comm.rank())?;
        Self::with_process_grid(comm, sim_box, process_grid, cutoff, skin)
    }

    pub fn with_process_grid(
        comm: C,
        sim_box: SimulationBox,
        process_grid: ProcessGrid,
        cutoff: f64,
        skin: f64,
    ) -> Result<Self> {
        if process_grid.size() != comm.size() {
            return Err(CellMdError::NotTileable { ranks: comm.size() });
        }
        for d in 0..3 {
            if sim_box.is_periodic(d) && sim_box.length(d) < cutoff + skin {
                return Err(CellMdError::InvalidGeometry {
                    reason: format!(
                        "periodic length {} along axis {d} is shorter than the interaction length {}",
                        sim_box.length(d),
                        cutoff + skin
                    ),
                });
            }
        }
        Ok(Self {
            comm,
            sim_box,
            process_grid,
            cutoff,
            skin,
            halo_partners: AcquiredPartners::default(),
            leaving_partners: AcquiredPartners::default(),
        })
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    pub fn comm(&mut self) -> &mut C {
        &mut self.comm
    }

    pub fn sim_box(&self) -> &SimulationBox {
        &self.sim_box
    }

    pub fn process_grid(&self) -> &ProcessGrid {
        &self.process_grid
    }

    pub fn bounding_box(&self) -> ([f64; 3], [f64; 3]) {
        self.process_grid.bounding_box()
    }

    pub fn halo_partners(&self) -> &AcquiredPartners {
        &self.halo_partners
    }

    pub fn leaving_partners(&self) -> &AcquiredPartners {
        &self.leaving_partners
    }

    /// An empty grid over this rank's box, with partners acquired for it.
    pub fn create_container(&mut self, cells_in_cutoff: usize) -> Result<LinkedCells> {
        let (lo, hi) = self.bounding_box();
        let grid = LinkedCells::new(lo, hi, self.cutoff, self.skin, cells_in_cutoff)?;
        self.acquire_partners(&grid)?;
        Ok(grid)
    }

    /// Runs neighbour acquisition for the halo and for the leaving regions
    /// of `grid`. Collective.
    pub fn acquire_partners(&mut self, grid: &LinkedCells) -> Result<()> {
        let geometry = grid.geometry();
        let own = HaloRegion::new(geometry.owned_min, geometry.owned_max, [0; 3], 0.0);

        let interaction = self.cutoff + self.skin;
        let desired = surrounding_regions(&own.rmin, &own.rmax, interaction);
        self.halo_partners = acquire_neighbours(&mut self.comm, &self.sim_box, &own, &desired, self.skin)?;

        // the whole halo margin of the grid, so that nothing that drifted in
        // is left behind
        let margins = margin_regions(&own.rmin, &own.rmax, &geometry.halo_min, &geometry.halo_max);
        self.leaving_partners = acquire_neighbours(&mut self.comm, &self.sim_box, &own, &margins, 0.0)?;
        debug!(
            "rank {}: {} halo senders, {} halo receivers, {} leaving partners",
            self.rank(),
            self.halo_partners.receive.len(),
            self.halo_partners.send.len(),
            self.leaving_partners.receive.len()
        );
        Ok(())
    }

    /// Migration followed by the halo exchange, with an optional load
    /// rebalance first. Returns `true` when the grid was rebuilt, in which
    /// case traversals must be rebuilt too. Collective.
    pub fn balance_and_exchange(&mut self, grid: &mut LinkedCells, force_rebalance: bool) -> Result<bool> {
        if force_rebalance {
            self.rebalance(grid)?;
            self.exchange_halo(grid)?;
            return Ok(true);
        }
        self.migrate(grid)?;
        self.exchange_halo(grid)?;
        Ok(false)
    }

    /// Sends molecules sitting in halo cells to their owners and inserts the
    /// ones arriving here. Afterwards the grid holds owned molecules only.
    pub fn migrate(&mut self, grid: &mut LinkedCells) -> Result<()> {
        // the partners that own parts of my margins take my leavers
        for partner in &self.leaving_partners.receive {
            let leavers = partner.collect_molecules(grid, true);
            self.comm.send(partner.rank(), TAG_LEAVING, encode_molecules(&leavers))?;
        }
        let mut arrived = 0;
        for partner in &self.leaving_partners.send {
            let bytes = self.comm.recv_from(partner.rank(), TAG_LEAVING)?;
            for mut molecule in decode_molecules(&bytes)? {
                self.sim_box.wrap_position(&mut molecule.r);
                let position = molecule.position();
                if !grid.is_owned_position(&position) {
                    return Err(CellMdError::MisroutedMolecule {
                        id: molecule.id,
                        position,
                        rank: self.rank(),
                    });
                }
                grid.add_particle(molecule, false)?;
                arrived += 1;
            }
        }
        let lost = grid.delete_outer_particles();
        if lost > 0 {
            warn!("rank {}: {lost} molecules left through an open boundary", self.rank());
        }
        debug!("rank {}: {arrived} molecules migrated in", self.rank());
        Ok(())
    }

    /// Copies of owned molecules destined for every halo receiver, already
    /// in the receiver's coordinates.
    fn halo_messages(&self, grid: &mut LinkedCells) -> Vec<(usize, Vec<u8>)> {
        self.halo_partners
            .send
            .iter()
            .map(|partner| {
                let copies = partner.collect_molecules(grid, false);
                (partner.rank(), encode_molecules(&copies))
            })
            .collect()
    }

    fn insert_halo_copies(&self, grid: &mut LinkedCells, bytes: &[u8]) -> Result<usize> {
        let copies = decode_molecules(bytes)?;
        let n = copies.len();
        for molecule in copies {
            let position = molecule.position();
            if grid.is_owned_position(&position) {
                return Err(CellMdError::HaloCopyInOwnedCell {
                    id: molecule.id,
                    position,
                });
            }
            grid.add_particle(molecule, false)?;
        }
        Ok(n)
    }

    /// Fills the halo cells with copies of the partners' boundary molecules.
    pub fn exchange_halo(&mut self, grid: &mut LinkedCells) -> Result<()> {
        // everything outgoing is gathered before anything is inserted, so
        // copies never travel twice
        for (dest, bytes) in self.halo_messages(grid) {
            self.comm.send(dest, TAG_HALO, bytes)?;
        }
        let mut received = 0;
        for partner in &self.halo_partners.receive {
            let bytes = self.comm.recv_from(partner.rank(), TAG_HALO)?;
            received += self.insert_halo_copies(grid, &bytes)?;
        }
        debug!("rank {}: {received} halo copies received", self.rank());
        Ok(())
    }

    /// Moves the split planes to even out the number of owned molecules,
    /// hands every molecule to its new owner and re-acquires partners.
    /// Halo copies are dropped. Collective.
    pub fn rebalance(&mut self, grid: &mut LinkedCells) -> Result<()> {
        let owned = grid.num_owned_molecules() as u64;
        let mut counts = vec![0u64; self.size()];
        counts[self.rank()] = owned;
        let counts = self.comm.all_reduce_sum(&counts)?;
        let new_grid = self.process_grid.rebalanced(&counts, self.cutoff + self.skin);

        // halo copies are gone at this point; halo cells only hold leavers
        let mut outgoing: Vec<Vec<Molecule>> = vec![Vec::new(); self.size()];
        let mut lost = 0;
        for mut molecule in grid.drain_all() {
            self.sim_box.wrap_position(&mut molecule.r);
            let position = molecule.position();
            if !self.sim_box.contains(&molecule.r) {
                lost += 1;
                continue;
            }
            outgoing[new_grid.owner_of(&position)].push(molecule);
        }
        if lost > 0 {
            warn!("rank {}: {lost} molecules left through an open boundary", self.rank());
        }
        for (dest, molecules) in outgoing.iter().enumerate() {
            self.comm.send(dest, TAG_REBALANCE, encode_molecules(molecules))?;
        }

        self.process_grid = new_grid;
        let (lo, hi) = self.bounding_box();
        let leftovers = grid.rebuild(lo, hi)?;
        debug_assert!(leftovers.is_empty());
        for source in 0..self.size() {
            let bytes = self.comm.recv_from(source, TAG_REBALANCE)?;
            for molecule in decode_molecules(&bytes)? {
                let position = molecule.position();
                if !grid.is_owned_position(&position) {
                    return Err(CellMdError::MisroutedMolecule {
                        id: molecule.id,
                        position,
                        rank: self.rank(),
                    });
                }
                grid.add_particle(molecule, false)?;
            }
        }
        info!(
            "rank {}: rebalanced to box {:?}..{:?} with {} molecules",
            self.rank(),
            lo,
            hi,
            grid.num_owned_molecules()
        );
        self.acquire_partners(grid)
    }

    /// One force step with communication hidden behind the inner cells:
    /// migrate, post the halo messages, run the inner stages while polling
    /// for arrivals, then finish the halo and run the outer visits. The
    /// caller flushes forces afterwards. Collective.
    pub fn perform_overlapping_step<T, P>(
        &mut self,
        grid: &mut LinkedCells,
        traversal: &T,
        processor: &mut P,
        components: &ComponentTable,
        stage_count: usize,
    ) -> Result<()>
    where
        T: CellPairTraversal,
        P: CellProcessor,
    {
        self.migrate(grid)?;
        for (dest, bytes) in self.halo_messages(grid) {
            self.comm.send(dest, TAG_HALO, bytes)?;
        }
        grid.update_molecule_caches(components)?;

        let mut pending: Vec<usize> = self.halo_partners.receive.iter().map(|p| p.rank()).collect();
        processor.init_traversal();
        for stage in 0..stage_count {
            traversal.traverse_cell_pairs_inner(grid, processor, stage, stage_count)?;
            let mut still_pending = Vec::with_capacity(pending.len());
            for source in pending {
                match self.comm.try_recv_from(source, TAG_HALO)? {
                    Some(bytes) => {
                        self.insert_halo_copies(grid, &bytes)?;
                    }
                    None => still_pending.push(source),
                }
            }
            pending = still_pending;
        }
        for source in pending {
            let bytes = self.comm.recv_from(source, TAG_HALO)?;
            self.insert_halo_copies(grid, &bytes)?;
        }
        grid.update_halo_caches(components)?;
        traversal.traverse_cell_pairs_outer(grid, processor)?;
        processor.end_traversal();
        Ok(())
    }

    pub fn global_sum(&mut self, values: &[f64]) -> Result<Vec<f64>> {
        self.comm.all_reduce_sum_f64(values)
    }

    pub fn global_count(&mut self, values: &[u64]) -> Result<Vec<u64>> {
        self.comm.all_reduce_sum(values)
    }

    pub fn into_comm(self) -> C {
        self.comm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::communication_partner::CommunicationPartner;
    use crate::parallel::communicator::LocalCluster;

    fn ranks(partners: &[CommunicationPartner]) -> Vec<usize> {
        partners.iter().map(|p| p.rank()).collect()
    }

    #[test]
    fn two_ranks_see_each_other_on_both_sides() {
        let sim_box = SimulationBox::periodic([10.0; 3]).unwrap();
        let partners = LocalCluster::run(2, |comm| {
            let mut dd = DomainDecomposition::new(comm, sim_box.clone(), 2.5, 0.0)?;
            dd.create_container(1)?;
            Ok((ranks(&dd.halo_partners().send), ranks(&dd.halo_partners().receive)))
        })
        .unwrap();
        // each rank also wraps onto itself along y and z
        assert_eq!(partners[0], (vec![0, 1], vec![0, 1]));
        assert_eq!(partners[1], (vec![0, 1], vec![0, 1]));
    }

    #[test]
    fn short_periodic_axis_is_rejected() {
        let sim_box = SimulationBox::periodic([2.0, 10.0, 10.0]).unwrap();
        let result = LocalCluster::run(1, |comm| DomainDecomposition::new(comm, sim_box.clone(), 2.5, 0.0).map(|_| ()));
        assert!(matches!(result, Err(CellMdError::InvalidGeometry { .. })));
    }
}
