//! Linked-cell particle container with halo exchange for domain-decomposed
//! molecular dynamics.
extern crate nalgebra as na;

pub mod cells;
pub mod constants;
pub mod errors;
pub mod extensions;
pub mod integrators;
pub mod math;
pub mod molecules;
pub mod parallel;
pub mod processors;
pub mod readers;
pub mod simulation_box;
pub mod system;
pub mod traversals;
pub mod wire;
