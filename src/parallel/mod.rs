pub mod communication_partner;
pub mod communicator;
pub mod domain_decomposition;
pub mod halo_region;
#[cfg(feature = "mpi")]
pub mod mpi_communicator;
pub mod neighbor_acquirer;
pub mod process_grid;

pub use communication_partner::{CommunicationPartner, PartnerRegion};
pub use communicator::{Communicator, LocalCluster, LocalCommunicator};
pub use domain_decomposition::DomainDecomposition;
pub use halo_region::{margin_regions, surrounding_regions, HaloRegion};
#[cfg(feature = "mpi")]
pub use mpi_communicator::MpiCommunicator;
pub use neighbor_acquirer::{acquire_neighbours, periodic_images, AcquiredPartners};
pub use process_grid::ProcessGrid;
