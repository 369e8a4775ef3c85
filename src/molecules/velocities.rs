use na::Vector3;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::constants::KB_REDUCED;
use crate::errors::{CellMdError, Result};
use crate::molecules::{ComponentTable, Molecule};

/// Maxwell-Boltzmann velocities at `temperature`, with the centre-of-mass
/// drift removed and the result rescaled to hit the temperature exactly.
pub fn start_velocities(
    molecules: &mut [Molecule],
    components: &ComponentTable,
    temperature: f64,
    seed: u64,
) -> Result<()> {
    if molecules.is_empty() {
        return Ok(());
    }
    initialise_velocities(molecules, components, temperature, seed)?;
    remove_drift(molecules, components)?;
    rescale_to_temperature(molecules, components, temperature)
}

fn initialise_velocities(
    molecules: &mut [Molecule],
    components: &ComponentTable,
    temperature: f64,
    seed: u64,
) -> Result<()> {
    let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
    for molecule in molecules.iter_mut() {
        let mass = components.get(molecule.component_id)?.mass;
        let sigma = (KB_REDUCED * temperature / mass).sqrt();
        let normal = Normal::new(0.0, sigma).map_err(|_| CellMdError::InvalidGeometry {
            reason: format!("no velocity distribution for temperature {temperature} and mass {mass}"),
        })?;
        molecule.v = Vector3::new(
            normal.sample(&mut rng),
            normal.sample(&mut rng),
            normal.sample(&mut rng),
        );
    }
    Ok(())
}

fn remove_drift(molecules: &mut [Molecule], components: &ComponentTable) -> Result<()> {
    let mut total_mass = 0.0;
    let mut total_momentum: Vector3<f64> = Vector3::zeros();
    for molecule in molecules.iter() {
        let mass = components.get(molecule.component_id)?.mass;
        total_mass += mass;
        total_momentum += molecule.v * mass;
    }
    let velocity_cm = total_momentum / total_mass;
    for molecule in molecules.iter_mut() {
        molecule.v -= velocity_cm;
    }
    Ok(())
}

fn rescale_to_temperature(molecules: &mut [Molecule], components: &ComponentTable, temperature: f64) -> Result<()> {
    let kinetic_energy = kinetic_energy(molecules.iter(), components)?;
    let current = temperature_of(kinetic_energy, molecules.len());
    if current <= 0.0 {
        return Ok(());
    }
    let lambda = (temperature / current).sqrt();
    for molecule in molecules.iter_mut() {
        molecule.v *= lambda;
    }
    Ok(())
}

/// Translational kinetic energy.
pub fn kinetic_energy<'a>(
    molecules: impl Iterator<Item = &'a Molecule>,
    components: &ComponentTable,
) -> Result<f64> {
    let mut ke = 0.0;
    for molecule in molecules {
        ke += 0.5 * components.get(molecule.component_id)?.mass * molecule.v.norm_squared();
    }
    Ok(ke)
}

/// Instantaneous temperature from three translational degrees of freedom
/// per molecule.
pub fn temperature_of(kinetic_energy: f64, n_molecules: usize) -> f64 {
    if n_molecules == 0 {
        return 0.0;
    }
    2.0 * kinetic_energy / (3.0 * n_molecules as f64 * KB_REDUCED)
}
