use std::sync::Mutex;

use crate::cells::ParticleCell;
use crate::errors::Result;
use crate::processors::cell_processor::{counts_towards_macroscopic, CellProcessor};

#[derive(Debug, Default)]
struct Tally {
    visited: Vec<(usize, usize)>,
    pairs_in_cutoff: usize,
    macroscopic_pairs: usize,
}

/// Diagnostic processor: records which cells were visited and counts the
/// molecule pairs closer than the cutoff.
#[derive(Debug)]
pub struct PairCountProcessor {
    cutoff: f64,
    tally: Mutex<Tally>,
}

impl PairCountProcessor {
    pub fn new(cutoff: f64) -> Self {
        Self {
            cutoff,
            tally: Mutex::new(Tally::default()),
        }
    }

    /// Visited cells as `(low, high)` index pairs; self visits are `(i, i)`.
    pub fn visited_cell_pairs(&self) -> Vec<(usize, usize)> {
        self.lock().visited.clone()
    }

    /// Molecule pairs within the cutoff over all visits, halo pairs included.
    pub fn pairs_in_cutoff(&self) -> usize {
        self.lock().pairs_in_cutoff
    }

    /// Pairs within the cutoff that this process accounts for.
    pub fn macroscopic_pairs(&self) -> usize {
        self.lock().macroscopic_pairs
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tally> {
        // a poisoned tally only means another visit panicked; the counts are still usable
        self.tally.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn within(&self, a: &na::Vector3<f64>, b: &na::Vector3<f64>) -> bool {
        (a - b).norm_squared() < self.cutoff * self.cutoff
    }
}

impl CellProcessor for PairCountProcessor {
    fn init_traversal(&mut self) {
        *self.lock() = Tally::default();
    }

    fn process_cell(&self, cell: &mut ParticleCell) -> Result<()> {
        let molecules = cell.molecules();
        let mut close = 0;
        for i in 0..molecules.len() {
            for j in (i + 1)..molecules.len() {
                if self.within(&molecules[i].r, &molecules[j].r) {
                    close += 1;
                }
            }
        }
        let mut tally = self.lock();
        tally.visited.push((cell.index(), cell.index()));
        tally.pairs_in_cutoff += close;
        if !cell.is_halo_cell() {
            tally.macroscopic_pairs += close;
        }
        Ok(())
    }

    fn process_cell_pair(&self, a: &mut ParticleCell, b: &mut ParticleCell) -> Result<()> {
        let mut close = 0;
        let mut counted = 0;
        for ma in a.molecules() {
            for mb in b.molecules() {
                if !self.within(&ma.r, &mb.r) {
                    continue;
                }
                close += 1;
                if counts_towards_macroscopic(
                    a.is_halo_cell(),
                    b.is_halo_cell(),
                    (&ma.r, ma.id),
                    (&mb.r, mb.id),
                )? {
                    counted += 1;
                }
            }
        }
        let mut tally = self.lock();
        tally
            .visited
            .push((a.index().min(b.index()), a.index().max(b.index())));
        tally.pairs_in_cutoff += close;
        tally.macroscopic_pairs += counted;
        Ok(())
    }
}
