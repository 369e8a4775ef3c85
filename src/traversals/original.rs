use log::debug;

use crate::cells::{GridGeometry, ParticleCell};
use crate::errors::{CellMdError, Result};
use crate::processors::CellProcessor;
use crate::traversals::{check_grid, enumerate_pairs, visit, CellPair, CellPairTraversal, Selection};

/// Sequential traversal over a cached half-shell pair list.
#[derive(Debug, Clone, Default)]
pub struct Original {
    dims: Option<[usize; 3]>,
    pairs: Vec<CellPair>,
    /// positions in `pairs` of the inner visits, in order
    inner: Vec<usize>,
}

impl Original {
    pub fn num_pairs(&self) -> usize {
        self.pairs.len()
    }

    fn dims(&self) -> Result<[usize; 3]> {
        self.dims.ok_or(CellMdError::TraversalNotBuilt)
    }
}

impl CellPairTraversal for Original {
    fn rebuild(&mut self, cells: &[ParticleCell], geometry: &GridGeometry) -> Result<()> {
        self.pairs = enumerate_pairs(cells, geometry)?;
        self.inner = self
            .pairs
            .iter()
            .enumerate()
            .filter(|(_, p)| p.inner)
            .map(|(i, _)| i)
            .collect();
        self.dims = Some(geometry.dims);
        debug!(
            "original traversal: {} visits, {} inner",
            self.pairs.len(),
            self.inner.len()
        );
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
        check_grid(self.dims()?, geometry, cells)?;
        match (selection, stage) {
            (Selection::Inner, Some((stage, stage_count))) => {
                // contiguous chunks of the inner list
                let n = self.inner.len();
                let start = n * stage / stage_count;
                let end = n * (stage + 1) / stage_count;
                for &i in &self.inner[start..end] {
                    visit(cells, &self.pairs[i], processor)?;
                }
            }
            _ => {
                for pair in self.pairs.iter().filter(|p| selection.accepts(p)) {
                    visit(cells, pair, processor)?;
                }
            }
        }
        Ok(())
    }
}
