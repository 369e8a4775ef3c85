//! Linked-cell particle container: cells, their SoA caches and the grid.
pub mod cell_data_soa;
pub mod linked_cells;
pub mod particle_cell;

pub use cell_data_soa::CellDataSoA;
pub use linked_cells::{GridGeometry, LinkedCells};
pub use particle_cell::{CellRegion, LeavingState, ParticleCell};
