pub mod leapfrog;

pub use leapfrog::Leapfrog;
