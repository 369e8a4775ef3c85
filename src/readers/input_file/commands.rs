//! Parsers for the individual commands of the input deck.
use crate::{
    errors::{CellMdError, Result},
    extensions::ArgsExt,
    molecules::{Component, LatticeStyle, LjSite},
    readers::{
        data_reader::DataReader,
        simulation_context::{LatticeArgs, SimulationContext, StartVelocity},
    },
    traversals::TraversalKind,
};

/// One command of the input deck. The first word of a line selects it, the
/// remaining words are its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Domain,
    Periodic,
    Cutoff,
    Skin,
    CellsInCutoff,
    Ranks,
    Traversal,
    Component,
    Site,
    Lattice,
    ReadData,
    Velocity,
    TimeStep,
    Run,
    Rebalance,
    Overlap,
    Thermo,
}

impl Command {
    pub fn from_str(command: &str) -> Option<Self> {
        let cmd = match command {
            "domain" => Self::Domain,
            "periodic" => Self::Periodic,
            "cutoff" => Self::Cutoff,
            "skin" => Self::Skin,
            "cells_in_cutoff" => Self::CellsInCutoff,
            "ranks" => Self::Ranks,
            "traversal" => Self::Traversal,
            "component" => Self::Component,
            "site" => Self::Site,
            "lattice" => Self::Lattice,
            "read_data" => Self::ReadData,
            "velocity" => Self::Velocity,
            "timestep" => Self::TimeStep,
            "run" => Self::Run,
            "rebalance" => Self::Rebalance,
            "overlap" => Self::Overlap,
            "thermo" => Self::Thermo,
            _ => return None,
        };
        Some(cmd)
    }

    pub fn run(&self, args: &[&str], line: usize, ctx: &mut SimulationContext) -> Result<()> {
        match self {
            // domain Lx Ly Lz
            Self::Domain => {
                let mut lengths = [0.0; 3];
                for (d, length) in lengths.iter_mut().enumerate() {
                    *length = positive(args.parse_float_at(d, line)?, args[d], line)?;
                }
                ctx.domain = Some(lengths);
            }
            // periodic 1 1 0
            Self::Periodic => {
                for d in 0..3 {
                    ctx.pbc[d] = args.parse_flag_at(d, line)?;
                }
            }
            Self::Cutoff => {
                ctx.cutoff = positive(args.parse_float_at(0, line)?, args[0], line)?;
            }
            Self::Skin => {
                let skin = args.parse_float_at(0, line)?;
                if skin < 0.0 {
                    return Err(invalid(args[0], line));
                }
                ctx.skin = skin;
            }
            Self::CellsInCutoff => {
                ctx.cells_in_cutoff = at_least_one(args.parse_usize_at(0, line)?, args[0], line)?;
            }
            Self::Ranks => {
                ctx.ranks = at_least_one(args.parse_usize_at(0, line)?, args[0], line)?;
            }
            Self::Traversal => {
                let name = args.get_required(0, line)?;
                ctx.traversal = TraversalKind::from_name(name).ok_or_else(|| invalid(name, line))?;
            }
            // component id mass [epsilon sigma]
            Self::Component => {
                let id = args.parse_usize_at(0, line)? as u32;
                let mass = positive(args.parse_float_at(1, line)?, args[1], line)?;
                let component = if args.len() > 2 {
                    let epsilon = args.parse_float_at(2, line)?;
                    let sigma = positive(args.parse_float_at(3, line)?, args[3], line)?;
                    Component::single_site(id, mass, epsilon, sigma)
                } else {
                    Component {
                        id,
                        mass,
                        sites: Vec::new(),
                    }
                };
                ctx.components.insert(component);
            }
            // site component_id dx dy dz epsilon sigma
            Self::Site => {
                let id = args.parse_usize_at(0, line)? as u32;
                let offset = na::Vector3::new(
                    args.parse_float_at(1, line)?,
                    args.parse_float_at(2, line)?,
                    args.parse_float_at(3, line)?,
                );
                let epsilon = args.parse_float_at(4, line)?;
                let sigma = positive(args.parse_float_at(5, line)?, args[5], line)?;
                let mut component = ctx.components.get(id)?.clone();
                component.sites.push(LjSite::new(offset, epsilon, sigma));
                ctx.components.insert(component);
            }
            // lattice sc|fcc a nx ny nz [component_id]
            Self::Lattice => {
                let style = args.get_required(0, line)?;
                if LatticeStyle::from_name(style).is_none() {
                    return Err(invalid(style, line));
                }
                let spacing = positive(args.parse_float_at(1, line)?, args[1], line)?;
                let mut cells = [0usize; 3];
                for (d, n) in cells.iter_mut().enumerate() {
                    *n = at_least_one(args.parse_usize_at(2 + d, line)?, args[2 + d], line)?;
                }
                let component_id = match args.get(5) {
                    Some(_) => args.parse_usize_at(5, line)? as u32,
                    None => 0,
                };
                ctx.lattice = Some(LatticeArgs {
                    style: style.to_string(),
                    spacing,
                    cells,
                    component_id,
                    line,
                });
            }
            Self::ReadData => {
                let path = args.get_required(0, line)?;
                let data = DataReader::new(path.to_string()).read()?;
                if let Some(lengths) = data.lengths {
                    ctx.domain = Some(lengths);
                }
                for component in data.components {
                    ctx.components.insert(component);
                }
                ctx.molecules.extend(data.molecules);
                ctx.velocities_given |= data.has_velocities;
            }
            // velocity create T [seed]
            Self::Velocity => {
                let style = args.get_required(0, line)?;
                if style != "create" {
                    return Err(invalid(style, line));
                }
                let temperature = args.parse_float_at(1, line)?;
                if temperature < 0.0 {
                    return Err(invalid(args[1], line));
                }
                let seed = match args.get(2) {
                    Some(_) => args.parse_usize_at(2, line)? as u64,
                    None => StartVelocity::default().seed,
                };
                ctx.starting_velocity = Some(StartVelocity { temperature, seed });
            }
            Self::TimeStep => {
                ctx.timestep = positive(args.parse_float_at(0, line)?, args[0], line)?;
            }
            Self::Run => {
                ctx.steps = args.parse_usize_at(0, line)?;
            }
            // rebalance N, 0 switches it off
            Self::Rebalance => {
                let every = args.parse_usize_at(0, line)?;
                ctx.rebalance_every = (every > 0).then_some(every);
            }
            // overlap stages, 0 switches it off
            Self::Overlap => {
                let stages = args.parse_usize_at(0, line)?;
                ctx.overlap_stages = (stages > 0).then_some(stages);
            }
            Self::Thermo => {
                ctx.thermo_every = at_least_one(args.parse_usize_at(0, line)?, args[0], line)?;
            }
        }
        Ok(())
    }
}

fn invalid(arg: &str, line: usize) -> CellMdError {
    CellMdError::InvalidArgument {
        string: arg.to_string(),
        line,
    }
}

fn positive(value: f64, arg: &str, line: usize) -> Result<f64> {
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(invalid(arg, line))
    }
}

fn at_least_one(value: usize, arg: &str, line: usize) -> Result<usize> {
    if value == 0 {
        return Err(invalid(arg, line));
    }
    Ok(value)
}
