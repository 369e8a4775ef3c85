use na::Vector3;

use crate::errors::{CellMdError, Result};

/// A Lennard-Jones centre fixed in the body frame of its molecule.
#[derive(Debug, Clone, PartialEq)]
pub struct LjSite {
    pub offset: Vector3<f64>,
    pub epsilon: f64,
    pub sigma: f64,
}

impl LjSite {
    pub fn new(offset: Vector3<f64>, epsilon: f64, sigma: f64) -> Self {
        Self {
            offset,
            epsilon,
            sigma,
        }
    }
}

/// A rigid molecule type. Molecules refer to it by `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub id: u32,
    pub mass: f64,
    pub sites: Vec<LjSite>,
}

impl Component {
    /// A single-centre component with the site in the centre of mass.
    pub fn single_site(id: u32, mass: f64, epsilon: f64, sigma: f64) -> Self {
        Self {
            id,
            mass,
            sites: vec![LjSite::new(Vector3::zeros(), epsilon, sigma)],
        }
    }

    pub fn num_sites(&self) -> usize {
        self.sites.len()
    }
}

/// All components of a run, looked up by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentTable {
    components: Vec<Component>,
}

impl ComponentTable {
    pub fn new(mut components: Vec<Component>) -> Self {
        components.sort_by_key(|c| c.id);
        Self { components }
    }

    pub fn insert(&mut self, component: Component) {
        match self.components.binary_search_by_key(&component.id, |c| c.id) {
            Ok(pos) => self.components[pos] = component,
            Err(pos) => self.components.insert(pos, component),
        }
    }

    pub fn get(&self, id: u32) -> Result<&Component> {
        self.components
            .binary_search_by_key(&id, |c| c.id)
            .map(|pos| &self.components[pos])
            .map_err(|_| CellMdError::UnknownComponent { id })
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.components.iter()
    }

    /// Largest sigma over all sites, used to pick a default cutoff.
    pub fn max_sigma(&self) -> f64 {
        self.components
            .iter()
            .flat_map(|c| c.sites.iter())
            .map(|s| s.sigma)
            .fold(0.0, f64::max)
    }
}
