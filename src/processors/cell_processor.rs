use crate::cells::ParticleCell;
use crate::errors::{CellMdError, Result};
use crate::molecules::position_is_less_than;

/// Per-visit work done by a traversal. A traversal calls `init_traversal`,
/// then `process_cell` / `process_cell_pair` once per visit, then
/// `end_traversal`. Visits may run on several threads at once, but never two
/// at the same time on the same cell.
pub trait CellProcessor: Sync {
    fn init_traversal(&mut self) {}

    fn process_cell(&self, cell: &mut ParticleCell) -> Result<()>;

    fn process_cell_pair(&self, a: &mut ParticleCell, b: &mut ParticleCell) -> Result<()>;

    fn end_traversal(&mut self) {}
}

/// Whether a pair of molecules contributes to macroscopic sums on this
/// process. Owned pairs always do, halo pairs never; an owned/halo pair is
/// seen by both processes and only counted where the owned molecule is the
/// smaller one.
pub fn counts_towards_macroscopic(
    a_halo: bool,
    b_halo: bool,
    a: (&na::Vector3<f64>, u64),
    b: (&na::Vector3<f64>, u64),
) -> Result<bool> {
    let ordered = |first: (&na::Vector3<f64>, u64), second: (&na::Vector3<f64>, u64)| {
        position_is_less_than(first.0, second.0).ok_or(CellMdError::CoincidentMolecules {
            a: first.1,
            b: second.1,
            position: [first.0[0], first.0[1], first.0[2]],
        })
    };
    match (a_halo, b_halo) {
        (false, false) => Ok(true),
        (true, true) => Ok(false),
        (false, true) => ordered(a, b),
        (true, false) => ordered(b, a),
    }
}
