//! Molecules, the rigid components they are built from, and their wire record.
pub mod component;
pub mod lattice;
pub mod molecule;
pub mod velocities;

pub use component::{Component, ComponentTable, LjSite};
pub use lattice::{lattice_molecules, lattice_positions, LatticeStyle};
pub use molecule::{decode_molecules, encode_molecules, position_is_less_than, Molecule};
pub use velocities::{kinetic_energy, start_velocities, temperature_of};
