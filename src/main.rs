mod args_parser;

use clap::Parser;
use env_logger::{Builder, Env};

use cellmd::errors::Result;
#[cfg(feature = "mpi")]
use cellmd::parallel::{Communicator, MpiCommunicator};
use cellmd::system::{System, Thermo};

use crate::args_parser::Args;

fn main() -> anyhow::Result<()> {
    Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mut system = System::new(args.infile);
    system.read()?.override_ranks(args.ranks)?.contextualize()?;
    let thermo = run(&mut system)?;
    log::info!(
        "finished after {} steps with total energy {:.6}",
        thermo.step,
        thermo.total_energy()
    );
    Ok(())
}

/// One rank per process when started by `mpirun` with more than one
/// process, otherwise every rank on a thread of this process.
#[cfg(feature = "mpi")]
fn run(system: &mut System) -> Result<Thermo> {
    let Some(mut comm) = MpiCommunicator::initialize().filter(|comm| comm.size() > 1) else {
        return system.run();
    };
    match system.run_on(&mut comm) {
        Ok(thermo) => Ok(thermo),
        Err(e) => {
            log::error!("rank {} failed: {}", comm.rank(), e);
            comm.abort(1)
        }
    }
}

#[cfg(not(feature = "mpi"))]
fn run(system: &mut System) -> Result<Thermo> {
    system.run()
}
