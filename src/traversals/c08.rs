use log::debug;
use rayon::prelude::*;

use crate::cells::{GridGeometry, ParticleCell};
use crate::errors::{CellMdError, Result};
use crate::processors::CellProcessor;
use crate::traversals::{check_grid, enumerate_pairs, two_mut, CellPair, CellPairTraversal, Selection};

/// Colored base-cell traversal. Each visit is owned by the base cell at the
/// componentwise minimum of its two cells, so it only touches the block
/// `base .. base + halo`. Bases whose coordinates agree modulo `halo + 1`
/// share a colour and have disjoint blocks; the blocks of one colour run in
/// parallel, colours run one after another.
#[derive(Debug, Clone, Default)]
pub struct C08 {
    dims: [usize; 3],
    stride: usize,
    built: bool,
    colours: Vec<Colour>,
}

#[derive(Debug, Clone, Default)]
struct Colour {
    /// base cells of this colour with any work, ascending
    bases: Vec<usize>,
    /// visits per base, parallel to `bases`
    work: Vec<Vec<CellPair>>,
}

impl C08 {
    pub fn num_colours(&self) -> usize {
        self.colours.len()
    }

    fn coords(&self, index: usize) -> [usize; 3] {
        let x = index % self.dims[0];
        let y = (index / self.dims[0]) % self.dims[1];
        let z = index / (self.dims[0] * self.dims[1]);
        [x, y, z]
    }

    fn colour_of(&self, c: [usize; 3]) -> usize {
        let s = self.stride;
        (c[2] % s * s + c[1] % s) * s + c[0] % s
    }

    /// Base cell of colour `colour` whose block contains cell `c`.
    fn base_for(&self, colour: usize, c: [usize; 3]) -> Option<usize> {
        let s = self.stride;
        let col = [colour % s, (colour / s) % s, colour / (s * s)];
        let mut b = [0usize; 3];
        for d in 0..3 {
            let back = (c[d] + s - col[d]) % s;
            if back > c[d] {
                return None;
            }
            b[d] = c[d] - back;
        }
        Some((b[2] * self.dims[1] + b[1]) * self.dims[0] + b[0])
    }

    fn run_colour<P: CellProcessor>(
        &self,
        colour_index: usize,
        cells: &mut [ParticleCell],
        processor: &P,
        selection: Selection,
    ) -> Result<()> {
        let colour = &self.colours[colour_index];
        if colour.bases.is_empty() {
            return Ok(());
        }
        // hand every cell to the single block of this colour holding it
        let mut blocks: Vec<Vec<(usize, &mut ParticleCell)>> =
            colour.bases.iter().map(|_| Vec::new()).collect();
        for (index, cell) in cells.iter_mut().enumerate() {
            let Some(base) = self.base_for(colour_index, self.coords(index)) else {
                continue;
            };
            if let Ok(slot) = colour.bases.binary_search(&base) {
                blocks[slot].push((index, cell));
            }
        }
        blocks
            .par_iter_mut()
            .zip(colour.work.par_iter())
            .try_for_each(|(block, work)| {
                for pair in work.iter().filter(|p| selection.accepts(p)) {
                    let a = find(block, pair.a)?;
                    if pair.is_self() {
                        processor.process_cell(&mut *block[a].1)?;
                    } else {
                        let b = find(block, pair.b)?;
                        let (first, second) = two_mut(block, a, b);
                        processor.process_cell_pair(&mut *first.1, &mut *second.1)?;
                    }
                }
                Ok(())
            })
    }
}

fn find(block: &[(usize, &mut ParticleCell)], index: usize) -> Result<usize> {
    block
        .binary_search_by_key(&index, |(i, _)| *i)
        .map_err(|_| CellMdError::TraversalNotBuilt)
}

impl CellPairTraversal for C08 {
    fn rebuild(&mut self, cells: &[ParticleCell], geometry: &GridGeometry) -> Result<()> {
        self.dims = geometry.dims;
        self.stride = geometry.halo.iter().copied().max().unwrap_or(1) + 1;
        let num_colours = self.stride.pow(3);
        self.colours = vec![Colour::default(); num_colours];

        let mut per_base: Vec<Vec<CellPair>> = vec![Vec::new(); cells.len()];
        for pair in enumerate_pairs(cells, geometry)? {
            let ca = geometry.coords(pair.a);
            let cb = geometry.coords(pair.b);
            let base = [0, 1, 2].map(|d| ca[d].min(cb[d]));
            per_base[geometry.index(base)].push(pair);
        }
        for (base, work) in per_base.into_iter().enumerate() {
            if work.is_empty() {
                continue;
            }
            let colour = self.colour_of(geometry.coords(base));
            self.colours[colour].bases.push(base);
            self.colours[colour].work.push(work);
        }
        self.built = true;
        debug!("c08 traversal: {} colours, stride {}", num_colours, self.stride);
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
        if !self.built {
            return Err(CellMdError::TraversalNotBuilt);
        }
        check_grid(self.dims, geometry, cells)?;
        for colour in 0..self.colours.len() {
            if let Some((stage, stage_count)) = stage {
                if colour % stage_count != stage {
                    continue;
                }
            }
            self.run_colour(colour, cells, processor, selection)?;
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
        let mut grid = LinkedCells::new([0.0; 3], [10.0, 7.5, 12.5], 2.5, 0.3, 2).unwrap();
        let mut c08 = C08::default();
        let mut original = Original::default();
        c08.rebuild(grid.cells(), grid.geometry()).unwrap();
        original.rebuild(grid.cells(), grid.geometry()).unwrap();

        let mut colored = PairCountProcessor::new(2.5);
        let mut listed = PairCountProcessor::new(2.5);
        c08.traverse_cell_pairs(&mut grid, &mut colored).unwrap();
        original.traverse_cell_pairs(&mut grid, &mut listed).unwrap();

        let mut a = colored.visited_cell_pairs();
        let mut b = listed.visited_cell_pairs();
        a.sort();
        b.sort();
        assert_eq!(a.len(), original.num_pairs());
        assert_eq!(a, b);
    }

    #[test]
    fn base_lookup_inverts_colouring() {
        let grid = LinkedCells::new([0.0; 3], [10.0; 3], 2.5, 0.0, 1).unwrap();
        let mut c08 = C08::default();
        c08.rebuild(grid.cells(), grid.geometry()).unwrap();
        assert_eq!(c08.num_colours(), 8);
        let g = grid.geometry();
        let base = [2, 4, 0];
        let colour = c08.colour_of(base);
        assert_eq!(c08.base_for(colour, [3, 5, 1]), Some(g.index(base)));
        assert_eq!(c08.base_for(colour, [2, 4, 0]), Some(g.index(base)));
        assert_eq!(c08.base_for(c08.colour_of([1, 0, 0]), [0, 0, 0]), None);
    }
}
