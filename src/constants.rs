/// Boltzmann constant in reduced units
pub const KB_REDUCED: f64 = 1.0;

/// Tolerance used when deciding how many cells a length spans
pub const CELL_COUNT_TOLERANCE: f64 = 1e-9;

/// Bytes of one serialized molecule: id, component, r, v, q, D
pub const MOLECULE_RECORD_BYTES: usize = 8 + 4 + 3 * 8 + 3 * 8 + 4 * 8 + 3 * 8;

/// Bytes of one serialized halo region: rmin, rmax, offset, width
pub const HALO_REGION_BYTES: usize = 3 * 8 + 3 * 8 + 3 * 4 + 8;

/// Bytes of one region answered during neighbour acquisition: region plus shift
pub const ACQUIRED_REGION_BYTES: usize = HALO_REGION_BYTES + 3 * 8;
