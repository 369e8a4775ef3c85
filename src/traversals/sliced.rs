use log::debug;
use rayon::prelude::*;

use crate::cells::{GridGeometry, ParticleCell};
use crate::errors::{CellMdError, Result};
use crate::processors::CellProcessor;
use crate::traversals::{check_grid, enumerate_pairs, two_mut, CellPair, CellPairTraversal, Selection};

/// Splits the grid into z-slabs as thick as the halo, so that visits based
/// in one slab only touch that slab and the next one. Even slabs run in
/// parallel first, then odd slabs.
#[derive(Debug, Clone, Default)]
pub struct Sliced {
    dims: Option<[usize; 3]>,
    /// cells per slab
    slab_cells: usize,
    /// visits grouped by the slab of their base cell
    slabs: Vec<Vec<CellPair>>,
}

impl Sliced {
    pub fn num_slabs(&self) -> usize {
        self.slabs.len()
    }

    fn run_slab<P: CellProcessor>(
        &self,
        slab: usize,
        chunk: &mut [ParticleCell],
        chunk_start: usize,
        processor: &P,
        selection: Selection,
    ) -> Result<()> {
        for pair in self.slabs[slab].iter().filter(|p| selection.accepts(p)) {
            let a = pair.a - chunk_start;
            if pair.is_self() {
                processor.process_cell(&mut chunk[a])?;
            } else {
                let (first, second) = two_mut(chunk, a, pair.b - chunk_start);
                processor.process_cell_pair(first, second)?;
            }
        }
        Ok(())
    }
}

impl CellPairTraversal for Sliced {
    fn rebuild(&mut self, cells: &[ParticleCell], geometry: &GridGeometry) -> Result<()> {
        let thickness = geometry.halo[2];
        let layer = geometry.dims[0] * geometry.dims[1];
        self.slab_cells = thickness * layer;
        let num_slabs = geometry.dims[2].div_ceil(thickness);
        self.slabs = vec![Vec::new(); num_slabs];
        for pair in enumerate_pairs(cells, geometry)? {
            let z = pair.a / layer;
            self.slabs[z / thickness].push(pair);
        }
        self.dims = Some(geometry.dims);
        debug!("sliced traversal: {} slabs of {} cells", num_slabs, self.slab_cells);
        Ok(())
    }

    fn traverse_selection<P: CellProcessor>(
        &self,
        geometry: &GridGeometry,
        cells: &mut [ParticleCell],
        processor: &P,
        selection: Selection,
        stage: Option<(usize, usize)>,
    ) -> Result<()> {
        check_grid(self.dims.ok_or(CellMdError::TraversalNotBuilt)?, geometry, cells)?;
        let slab_cells = self.slab_cells;
        let in_stage = |slab: usize| match stage {
            Some((stage, stage_count)) => slab % stage_count == stage,
            None => true,
        };
        for phase in 0..2 {
            let start = (phase * slab_cells).min(cells.len());
            cells[start..]
                .par_chunks_mut(2 * slab_cells)
                .enumerate()
                .try_for_each(|(k, chunk)| {
                    let slab = 2 * k + phase;
                    if slab >= self.slabs.len() || !in_stage(slab) {
                        return Ok(());
                    }
                    self.run_slab(slab, chunk, start + k * 2 * slab_cells, processor, selection)
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::LinkedCells;
    use crate::processors::PairCountProcessor;
    use crate::traversals::Original;

    #[test]
    fn matches_the_sequential_pair_set() {
        let mut grid = LinkedCells::new([0.0; 3], [10.0, 10.0, 17.5], 2.5, 0.0, 2).unwrap();
        let mut sliced = Sliced::default();
        let mut original = Original::default();
        sliced.rebuild(grid.cells(), grid.geometry()).unwrap();
        original.rebuild(grid.cells(), grid.geometry()).unwrap();
        assert_eq!(sliced.num_slabs(), 9);

        let mut by_slices = PairCountProcessor::new(2.5);
        let mut by_list = PairCountProcessor::new(2.5);
        sliced.traverse_cell_pairs(&mut grid, &mut by_slices).unwrap();
        original.traverse_cell_pairs(&mut grid, &mut by_list).unwrap();

        let mut a = by_slices.visited_cell_pairs();
        let mut b = by_list.visited_cell_pairs();
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[test]
    fn stage_index_is_checked() {
        let mut grid = LinkedCells::new([0.0; 3], [10.0; 3], 2.5, 0.0, 1).unwrap();
        let mut sliced = Sliced::default();
        sliced.rebuild(grid.cells(), grid.geometry()).unwrap();
        let processor = PairCountProcessor::new(2.5);
        let err = sliced.traverse_cell_pairs_inner(&mut grid, &processor, 2, 2);
        assert!(matches!(err, Err(CellMdError::InvalidStage { stage: 2, stage_count: 2 })));
    }
}
