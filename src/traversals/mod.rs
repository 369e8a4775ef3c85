//! Cell-pair traversal strategies over a linked-cell grid.
//!
//! Every strategy visits each unordered pair of cells closer than the
//! interaction length exactly once, plus every cell on its own, and hands
//! them to a [`CellProcessor`]. They differ in how the visits are scheduled:
//! [`Original`] runs sequentially over a cached pair list, [`Sliced`] and
//! [`C08`] colour the grid so that rayon workers never write to the same
//! cell at once.
pub mod c08;
pub mod original;
pub mod sliced;

pub use c08::C08;
pub use original::Original;
pub use sliced::Sliced;

use crate::cells::{GridGeometry, LinkedCells, ParticleCell};
use crate::errors::{CellMdError, Result};
use crate::processors::CellProcessor;

/// A cell visit: a single cell when `a == b`, a pair otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellPair {
    pub a: usize,
    pub b: usize,
    /// both cells are innermost, so no halo data is involved
    pub inner: bool,
}

impl CellPair {
    pub fn is_self(&self) -> bool {
        self.a == self.b
    }
}

/// Which part of the visits a call should perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    All,
    Outer,
    Inner,
}

impl Selection {
    pub fn accepts(&self, pair: &CellPair) -> bool {
        match self {
            Selection::All => true,
            Selection::Outer => !pair.inner,
            Selection::Inner => pair.inner,
        }
    }
}

pub trait CellPairTraversal {
    /// Precomputes the visit schedule for a grid. Must be called again
    /// whenever the grid is rebuilt.
    fn rebuild(&mut self, cells: &[ParticleCell], geometry: &GridGeometry) -> Result<()>;

    /// Visits every cell and every close cell pair once.
    fn traverse_cell_pairs<P: CellProcessor>(&self, grid: &mut LinkedCells, processor: &mut P) -> Result<()> {
        processor.init_traversal();
        let (geometry, cells) = grid.cells_with_geometry_mut();
        self.traverse_selection(geometry, cells, processor, Selection::All, None)?;
        processor.end_traversal();
        Ok(())
    }

    /// Visits that touch a non-innermost cell and thus depend on halo data.
    fn traverse_cell_pairs_outer<P: CellProcessor>(&self, grid: &mut LinkedCells, processor: &P) -> Result<()> {
        let (geometry, cells) = grid.cells_with_geometry_mut();
        self.traverse_selection(geometry, cells, processor, Selection::Outer, None)
    }

    /// One stage of the visits among innermost cells. Stages of one
    /// `stage_count` are disjoint and together cover all inner visits.
    fn traverse_cell_pairs_inner<P: CellProcessor>(
        &self,
        grid: &mut LinkedCells,
        processor: &P,
        stage: usize,
        stage_count: usize,
    ) -> Result<()> {
        if stage_count == 0 || stage >= stage_count {
            return Err(CellMdError::InvalidStage { stage, stage_count });
        }
        let (geometry, cells) = grid.cells_with_geometry_mut();
        self.traverse_selection(geometry, cells, processor, Selection::Inner, Some((stage, stage_count)))
    }

    /// Runs the selected visits on `cells`, laid out as `geometry`. Fails
    /// unless `geometry` has exactly the dims the schedule was built for.
    fn traverse_selection<P: CellProcessor>(
        &self,
        geometry: &GridGeometry,
        cells: &mut [ParticleCell],
        processor: &P,
        selection: Selection,
        stage: Option<(usize, usize)>,
    ) -> Result<()>;
}

/// Traversal strategy chosen at configuration time.
#[derive(Debug, Clone)]
pub enum TraversalKind {
    Original(Original),
    Sliced(Sliced),
    C08(C08),
}

impl TraversalKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "original" => Some(Self::Original(Original::default())),
            "sliced" => Some(Self::Sliced(Sliced::default())),
            "c08" => Some(Self::C08(C08::default())),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Original(_) => "original",
            Self::Sliced(_) => "sliced",
            Self::C08(_) => "c08",
        }
    }
}

impl Default for TraversalKind {
    fn default() -> Self {
        Self::Original(Original::default())
    }
}

impl CellPairTraversal for TraversalKind {
    fn rebuild(&mut self, cells: &[ParticleCell], geometry: &GridGeometry) -> Result<()> {
        match self {
            Self::Original(t) => t.rebuild(cells, geometry),
            Self::Sliced(t) => t.rebuild(cells, geometry),
            Self::C08(t) => t.rebuild(cells, geometry),
        }
    }

    fn traverse_selection<P: CellProcessor>(
        &self,
        geometry: &GridGeometry,
        cells: &mut [ParticleCell],
        processor: &P,
        selection: Selection,
        stage: Option<(usize, usize)>,
    ) -> Result<()> {
        match self {
            Self::Original(t) => t.traverse_selection(geometry, cells, processor, selection, stage),
            Self::Sliced(t) => t.traverse_selection(geometry, cells, processor, selection, stage),
            Self::C08(t) => t.traverse_selection(geometry, cells, processor, selection, stage),
        }
    }
}

/// Half-shell cell offsets reaching every cell closer than the interaction
/// length, listed in increasing linear-index order. Together with the self
/// visit they cover each close pair once.
pub fn forward_offsets(geometry: &GridGeometry) -> Vec<[isize; 3]> {
    let h = geometry.halo.map(|h| h as isize);
    let cutoff2 = geometry.interaction_length * geometry.interaction_length;
    let mut offsets = Vec::new();
    for dz in 0..=h[2] {
        for dy in -h[1]..=h[1] {
            for dx in -h[0]..=h[0] {
                let forward = dz > 0 || (dz == 0 && (dy > 0 || (dy == 0 && dx > 0)));
                if !forward {
                    continue;
                }
                let offset = [dx, dy, dz];
                let mut gap2 = 0.0;
                for d in 0..3 {
                    let gap = (offset[d].abs() - 1).max(0) as f64 * geometry.cell_length[d];
                    gap2 += gap * gap;
                }
                if gap2 < cutoff2 {
                    offsets.push(offset);
                }
            }
        }
    }
    offsets
}

pub fn neighbour(geometry: &GridGeometry, c: [usize; 3], offset: &[isize; 3]) -> Option<usize> {
    let mut n = [0usize; 3];
    for d in 0..3 {
        let x = c[d] as isize + offset[d];
        if x < 0 || x >= geometry.dims[d] as isize {
            return None;
        }
        n[d] = x as usize;
    }
    Some(geometry.index(n))
}

/// All visits of a grid, ordered by base cell: the self visit first, then
/// the forward neighbours in offset order.
pub fn enumerate_pairs(cells: &[ParticleCell], geometry: &GridGeometry) -> Result<Vec<CellPair>> {
    check_grid(geometry.dims, geometry, cells)?;
    let offsets = forward_offsets(geometry);
    let mut pairs = Vec::with_capacity(cells.len() * (offsets.len() + 1));
    for (a, cell) in cells.iter().enumerate() {
        pairs.push(CellPair {
            a,
            b: a,
            inner: cell.is_inner_most_cell(),
        });
        let c = geometry.coords(a);
        for offset in &offsets {
            if let Some(b) = neighbour(geometry, c, offset) {
                pairs.push(CellPair {
                    a,
                    b,
                    inner: cell.is_inner_most_cell() && cells[b].is_inner_most_cell(),
                });
            }
        }
    }
    Ok(pairs)
}

/// The grid must have exactly the `built` dims, and one cell per slot.
pub fn check_grid(built: [usize; 3], geometry: &GridGeometry, cells: &[ParticleCell]) -> Result<()> {
    if geometry.dims != built || cells.len() != built[0] * built[1] * built[2] {
        return Err(CellMdError::TraversalDimsMismatch {
            expected: built,
            found: geometry.dims,
            cells: cells.len(),
        });
    }
    Ok(())
}

/// Two distinct mutable elements of a slice.
pub fn two_mut<T>(items: &mut [T], i: usize, j: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(i, j);
    if i < j {
        let (low, high) = items.split_at_mut(j);
        (&mut low[i], &mut high[0])
    } else {
        let (low, high) = items.split_at_mut(i);
        (&mut high[0], &mut low[j])
    }
}

/// Hands one visit to the processor.
pub fn visit<P: CellProcessor>(cells: &mut [ParticleCell], pair: &CellPair, processor: &P) -> Result<()> {
    if pair.is_self() {
        processor.process_cell(&mut cells[pair.a])
    } else {
        let (a, b) = two_mut(cells, pair.a, pair.b);
        processor.process_cell_pair(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::LinkedCells;

    #[test]
    fn unit_halo_gives_the_classic_thirteen_offsets() {
        let grid = LinkedCells::new([0.0; 3], [10.0; 3], 2.5, 0.0, 1).unwrap();
        let offsets = forward_offsets(grid.geometry());
        let expected: [[isize; 3]; 13] = [
            [1, 0, 0],
            [-1, 1, 0],
            [0, 1, 0],
            [1, 1, 0],
            [-1, -1, 1],
            [0, -1, 1],
            [1, -1, 1],
            [-1, 0, 1],
            [0, 0, 1],
            [1, 0, 1],
            [-1, 1, 1],
            [0, 1, 1],
            [1, 1, 1],
        ];
        assert_eq!(offsets, expected.to_vec());
    }

    #[test]
    fn finer_cells_drop_far_corners() {
        let grid = LinkedCells::new([0.0; 3], [10.0; 3], 2.5, 0.0, 2).unwrap();
        let offsets = forward_offsets(grid.geometry());
        // corner (2,2,2) is sqrt(3)*1.25 away, closer than 2.5, so it stays
        assert!(offsets.contains(&[2, 2, 2]));
        // (5*5*5 - 1) / 2 candidates
        assert_eq!(offsets.len(), 62);
    }

    #[test]
    fn traversal_names_round_trip() {
        for name in ["original", "sliced", "c08"] {
            assert_eq!(TraversalKind::from_name(name).unwrap().name(), name);
        }
        assert!(TraversalKind::from_name("hs").is_none());
    }

    #[test]
    fn two_mut_returns_requested_order() {
        let mut v = vec![1, 2, 3, 4];
        let (a, b) = two_mut(&mut v, 3, 1);
        assert_eq!((*a, *b), (4, 2));
    }
}
