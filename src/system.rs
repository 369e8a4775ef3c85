//! The pivotal struct to set up and run a simulation can be found here
use std::{
    fs::File,
    io::{BufRead, BufReader},
};

use log::{info, warn};

use crate::{
    cells::LinkedCells,
    errors::{CellMdError, Result},
    integrators::Leapfrog,
    molecules::{kinetic_energy, lattice_molecules, start_velocities, temperature_of, ComponentTable, LatticeStyle},
    parallel::{Communicator, DomainDecomposition, LocalCluster},
    processors::LennardJonesProcessor,
    readers::{input_file::commands::Command, simulation_context::SimulationContext},
    simulation_box::SimulationBox,
    traversals::{CellPairTraversal, TraversalKind},
};

/// Global thermodynamic state after a step, identical on every rank.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thermo {
    pub step: usize,
    pub molecules: u64,
    pub upot: f64,
    pub kinetic: f64,
    pub temperature: f64,
}

impl Thermo {
    pub fn total_energy(&self) -> f64 {
        self.upot + self.kinetic
    }
}

/// [`System`] is the basic API for running a simulation.
///
/// [`System::new`] takes the path to the input deck. [`System::read`] parses
/// it into a [`SimulationContext`], [`System::contextualize`] builds the
/// molecules and the box from it, and [`System::run`] runs the ranks.
///
/// # Examples
///
/// ```no_run
/// use cellmd::system::System;
///
/// let thermo = System::new("input.cmd".to_string())
///     .read()?
///     .contextualize()?
///     .run()?;
/// println!("{}", thermo.total_energy());
/// # Ok::<(), cellmd::errors::CellMdError>(())
/// ```
pub struct System {
    /// the path to the input deck
    infile: String,
    ctx: SimulationContext,
    sim_box: Option<SimulationBox>,
}

impl System {
    pub fn new(infile: String) -> Self {
        Self::from_context(infile, SimulationContext::default())
    }

    /// A system around an already populated context.
    pub fn from_context(infile: String, ctx: SimulationContext) -> Self {
        Self {
            infile,
            ctx,
            sim_box: None,
        }
    }

    pub fn context(&self) -> &SimulationContext {
        &self.ctx
    }

    /// Reads the input deck and collects every command in the context.
    pub fn read(&mut self) -> Result<&mut Self> {
        let file = File::open(&self.infile).map_err(|e| CellMdError::InputFileError {
            path: self.infile.clone(),
            source: e,
        })?;
        let reader = BufReader::new(file);

        for (line_num, line) in reader.lines().enumerate() {
            let line_num = line_num + 1;
            let line = line.map_err(|e| CellMdError::DataFileError {
                path: self.infile.clone(),
                line: line_num,
                source: e,
            })?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            // Considering only the part of the line that is before the commented part.
            let uncommented = line
                .split_once('#')
                .map(|(before, _)| before)
                .unwrap_or(line)
                .trim();

            let line_split: Vec<&str> = uncommented.split_whitespace().collect();
            let command = line_split[0];
            let args = &line_split[1..];

            match Command::from_str(command) {
                Some(cmd) => cmd.run(args, line_num, &mut self.ctx)?,
                None => {
                    return Err(CellMdError::UnknownCommand {
                        command: command.to_string(),
                        line: line_num,
                    })
                }
            }
        }
        Ok(self)
    }

    /// Replaces the rank count read from the deck, if one is given.
    pub fn override_ranks(&mut self, ranks: Option<usize>) -> Result<&mut Self> {
        if let Some(ranks) = ranks {
            if ranks == 0 {
                return Err(CellMdError::NotTileable { ranks });
            }
            self.ctx.ranks = ranks;
        }
        Ok(self)
    }

    /// Builds the box and the initial molecules from what [`System::read`]
    /// collected.
    pub fn contextualize(&mut self) -> Result<&mut Self> {
        let lengths = self.ctx.domain.ok_or(CellMdError::InvalidGeometry {
            reason: "no domain given".to_string(),
        })?;
        let sim_box = SimulationBox::new(lengths, self.ctx.pbc)?;

        if let Some(lattice) = &self.ctx.lattice {
            let style = LatticeStyle::from_name(&lattice.style).ok_or(CellMdError::InvalidArgument {
                string: lattice.style.clone(),
                line: lattice.line,
            })?;
            self.ctx.components.get(lattice.component_id)?;
            for d in 0..3 {
                if lattice.cells[d] as f64 * lattice.spacing > lengths[d] {
                    return Err(CellMdError::InvalidArgument {
                        string: format!("lattice does not fit the domain along axis {d}"),
                        line: lattice.line,
                    });
                }
            }
            let first_id = self.ctx.molecules.iter().map(|m| m.id + 1).max().unwrap_or(1);
            let generated = lattice_molecules(style, lattice.spacing, lattice.cells, lattice.component_id, first_id);
            self.ctx.molecules.extend(generated);
        }

        if self.ctx.molecules.is_empty() {
            return Err(CellMdError::NoMoleculesDefined);
        }
        for molecule in self.ctx.molecules.iter_mut() {
            self.ctx.components.get(molecule.component_id)?;
            sim_box.wrap_position(&mut molecule.r);
            if !sim_box.contains(&molecule.r) {
                return Err(CellMdError::ParticleOutsideHalo {
                    id: molecule.id,
                    position: molecule.position(),
                });
            }
        }

        if let Some(start) = &self.ctx.starting_velocity {
            if !self.ctx.velocities_given {
                start_velocities(&mut self.ctx.molecules, &self.ctx.components, start.temperature, start.seed)?;
            }
        }
        info!(
            "{} molecules in a {:?} box on {} ranks, {} traversal",
            self.ctx.molecules.len(),
            lengths,
            self.ctx.ranks,
            self.ctx.traversal.name()
        );
        self.sim_box = Some(sim_box);
        Ok(self)
    }

    /// Runs every rank to completion and returns the final thermodynamic
    /// state.
    pub fn run(&mut self) -> Result<Thermo> {
        let sim_box = self.built_box()?;
        let ctx = &self.ctx;
        let mut finals = LocalCluster::run(ctx.ranks, |comm| run_rank(comm, ctx, &sim_box))?;
        finals.pop().ok_or(CellMdError::NotTileable { ranks: ctx.ranks })
    }

    /// Runs this process as one rank of `comm`. The rank count comes from
    /// `comm`, not from the deck.
    pub fn run_on<C: Communicator>(&mut self, comm: C) -> Result<Thermo> {
        let sim_box = self.built_box()?;
        if self.ctx.ranks != comm.size() {
            warn!(
                "deck asks for {} ranks, running on the {} of the communicator",
                self.ctx.ranks,
                comm.size()
            );
        }
        run_rank(comm, &self.ctx, &sim_box)
    }

    fn built_box(&self) -> Result<SimulationBox> {
        self.sim_box.clone().ok_or(CellMdError::InvalidGeometry {
            reason: "system run before contextualize".to_string(),
        })
    }
}

fn compute_forces(
    grid: &mut LinkedCells,
    traversal: &TraversalKind,
    processor: &mut LennardJonesProcessor,
    components: &ComponentTable,
) -> Result<()> {
    grid.update_molecule_caches(components)?;
    traversal.traverse_cell_pairs(grid, processor)
}

fn gather_thermo<C: Communicator>(
    dd: &mut DomainDecomposition<C>,
    grid: &LinkedCells,
    processor: &LennardJonesProcessor,
    components: &ComponentTable,
    step: usize,
) -> Result<Thermo> {
    let kinetic = kinetic_energy(grid.owned_molecules(), components)?;
    let sums = dd.global_sum(&[processor.upot(), kinetic])?;
    let counts = dd.global_count(&[grid.num_owned_molecules() as u64])?;
    Ok(Thermo {
        step,
        molecules: counts[0],
        upot: sums[0],
        kinetic: sums[1],
        temperature: temperature_of(sums[1], counts[0] as usize),
    })
}

fn print_thermo(thermo: &Thermo) {
    println!(
        "{} {} {:.6} {:.6} {:.6} {:.6}",
        thermo.step,
        thermo.molecules,
        thermo.upot,
        thermo.kinetic,
        thermo.total_energy(),
        thermo.temperature
    );
}

/// The whole run as seen by one rank.
fn run_rank<C: Communicator>(comm: C, ctx: &SimulationContext, sim_box: &SimulationBox) -> Result<Thermo> {
    let mut dd = DomainDecomposition::new(comm, sim_box.clone(), ctx.cutoff, ctx.skin)?;
    let mut grid = dd.create_container(ctx.cells_in_cutoff)?;
    for molecule in &ctx.molecules {
        if grid.is_owned_position(&molecule.position()) {
            grid.add_particle(molecule.clone(), true)?;
        }
    }
    let mut traversal = ctx.traversal.clone();
    traversal.rebuild(grid.cells(), grid.geometry())?;
    let mut processor = LennardJonesProcessor::new(ctx.cutoff, true);
    let integrator = Leapfrog::new(ctx.timestep);
    let is_root = dd.rank() == 0;

    dd.exchange_halo(&mut grid)?;
    compute_forces(&mut grid, &traversal, &mut processor, &ctx.components)?;
    grid.flush_forces()?;
    grid.delete_outer_particles();
    let mut thermo = gather_thermo(&mut dd, &grid, &processor, &ctx.components, 0)?;
    if is_root {
        println!("step molecules upot kinetic total temperature");
        print_thermo(&thermo);
    }

    for step in 1..=ctx.steps {
        integrator.event_new_timestep(&mut grid, &ctx.components)?;
        grid.update()?;
        grid.clear_forces();

        let rebalance = ctx.rebalance_every.is_some_and(|every| step % every == 0);
        match ctx.overlap_stages {
            Some(stages) if !rebalance => {
                dd.perform_overlapping_step(&mut grid, &traversal, &mut processor, &ctx.components, stages)?;
            }
            _ => {
                if dd.balance_and_exchange(&mut grid, rebalance)? {
                    traversal.rebuild(grid.cells(), grid.geometry())?;
                }
                compute_forces(&mut grid, &traversal, &mut processor, &ctx.components)?;
            }
        }
        grid.flush_forces()?;
        grid.delete_outer_particles();
        integrator.event_forces_calculated(&mut grid, &ctx.components)?;

        if step % ctx.thermo_every == 0 || step == ctx.steps {
            thermo = gather_thermo(&mut dd, &grid, &processor, &ctx.components, step)?;
            if is_root {
                print_thermo(&thermo);
            }
        }
    }
    Ok(thermo)
}
