use crate::molecules::{ComponentTable, Molecule};
use crate::traversals::TraversalKind;

pub struct StartVelocity {
    pub temperature: f64,
    pub seed: u64,
}

impl Default for StartVelocity {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            seed: 0,
        }
    }
}

/// Lattice requested by the `lattice` command, filled in during
/// contextualization once the box is known.
pub struct LatticeArgs {
    pub style: String,
    pub spacing: f64,
    pub cells: [usize; 3],
    pub component_id: u32,
    pub line: usize,
}

/// Everything the input deck configures. Built once by the command parser
/// and handed to every rank.
pub struct SimulationContext {
    pub domain: Option<[f64; 3]>,
    pub pbc: [bool; 3],
    pub cutoff: f64,
    pub skin: f64,
    pub cells_in_cutoff: usize,
    pub ranks: usize,
    pub traversal: TraversalKind,
    pub components: ComponentTable,
    pub molecules: Vec<Molecule>,
    pub lattice: Option<LatticeArgs>,
    pub starting_velocity: Option<StartVelocity>,
    /// the data file carried velocities, which take precedence
    pub velocities_given: bool,
    pub timestep: f64,
    pub steps: usize,
    /// rebalance the process grid every this many steps
    pub rebalance_every: Option<usize>,
    /// inner stages of the overlapped force step; `None` runs the plain step
    pub overlap_stages: Option<usize>,
    pub thermo_every: usize,
}

impl Default for SimulationContext {
    fn default() -> Self {
        Self {
            domain: None,
            pbc: [true; 3],
            cutoff: 2.5,
            skin: 0.0,
            cells_in_cutoff: 1,
            ranks: 1,
            traversal: TraversalKind::default(),
            components: ComponentTable::default(),
            molecules: Vec::new(),
            lattice: None,
            starting_velocity: None,
            velocities_given: false,
            timestep: 0.005,
            steps: 100,
            rebalance_every: None,
            overlap_stages: None,
            thermo_every: 1,
        }
    }
}
