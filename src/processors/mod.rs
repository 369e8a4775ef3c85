pub mod cell_processor;
pub mod lennard_jones;
pub mod pair_count;

pub use cell_processor::{counts_towards_macroscopic, CellProcessor};
pub use lennard_jones::{LennardJones, LennardJonesProcessor};
pub use pair_count::PairCountProcessor;
