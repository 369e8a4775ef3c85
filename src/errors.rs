use thiserror::Error;

use crate::cells::LeavingState;

#[derive(Error, Debug)]
pub enum CellMdError {
    // File I/O Errors
    #[error("Failed to open input file '{path}': {source}")]
    InputFileError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read line {line} in file '{path}': {source}")]
    DataFileError {
        path: String,
        line: usize,
        #[source]
        source: std::io::Error,
    },

    // Parsing Errors
    #[error("Invalid command {command} found on line: {line}")]
    UnknownCommand { command: String, line: usize },

    #[error("Missing argument on line {line}")]
    MissingArgument { line: usize },

    #[error("Error parsing floating number from string {string}: {source}")]
    FloatParseError {
        string: String,
        #[source]
        source: std::num::ParseFloatError,
    },

    #[error("Error parsing integer number from string {string}: {source}")]
    IntParseError {
        string: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("Negative value {value} not allowed on line: {line}")]
    NegativeValue { value: i64, line: usize },

    #[error("Invalid argument: {string} at line: {line}")]
    InvalidArgument { string: String, line: usize },

    // Configuration errors
    #[error("No molecules defined in input file")]
    NoMoleculesDefined,

    #[error("Component {id} is not defined")]
    UnknownComponent { id: u32 },

    // Precondition violations
    #[error("Invalid geometry: {reason}")]
    InvalidGeometry { reason: String },

    #[error("Malformed halo region rmin={rmin:?} rmax={rmax:?}")]
    MalformedRegion { rmin: [f64; 3], rmax: [f64; 3] },

    #[error("Empty list of desired regions")]
    NoDesiredRegions,

    #[error("Molecule {id} is already stored in this cell")]
    DuplicateMolecule { id: u64 },

    #[error("Traversal was built for dims {expected:?} but run on dims {found:?} with {cells} cells")]
    TraversalDimsMismatch {
        expected: [usize; 3],
        found: [usize; 3],
        cells: usize,
    },

    #[error("Traversal used before rebuild")]
    TraversalNotBuilt,

    #[error("Stage {stage} out of range for {stage_count} stages")]
    InvalidStage { stage: usize, stage_count: usize },

    #[error("SoA cache of cell {cell} is stale")]
    StaleSoA { cell: usize },

    #[error("Cannot tile the domain with {ranks} processes")]
    NotTileable { ranks: usize },

    #[error("Molecules {a} and {b} share the position {position:?}")]
    CoincidentMolecules { a: u64, b: u64, position: [f64; 3] },

    // Consistency violations
    #[error("Molecule {id} at {position:?} lies outside the halo of this process")]
    ParticleOutsideHalo { id: u64, position: [f64; 3] },

    #[error("Molecule {id} at {position:?} was routed to rank {rank} which does not own it")]
    MisroutedMolecule { id: u64, position: [f64; 3], rank: usize },

    #[error("Cell {cell} cannot {action} in leaving state {state:?}")]
    LeavingOutOfOrder {
        cell: usize,
        state: LeavingState,
        action: &'static str,
    },

    #[error("Update identified {identified} leaving molecules but reinserted {reinserted}")]
    LostMolecules { identified: usize, reinserted: usize },

    #[error("Halo copy of molecule {id} at {position:?} landed in an owned cell")]
    HaloCopyInOwnedCell { id: u64, position: [f64; 3] },

    // Communication errors
    #[error("Channel to rank {rank} is closed")]
    ChannelClosed { rank: usize },

    #[error("Unexpected message from rank {source_rank} with tag {tag}")]
    UnexpectedSender { source_rank: usize, tag: u32 },

    #[error("Expected {expected} {what} but received {found}")]
    ReceiveCountMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Message of {found} bytes does not fit record size {record_size}")]
    TruncatedMessage { found: usize, record_size: usize },
}

pub type Result<T> = std::result::Result<T, CellMdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consistency_error_reports_offending_molecule() {
        let err = CellMdError::ParticleOutsideHalo {
            id: 42,
            position: [13.0, 1.0, 2.0],
        };
        let msg = err.to_string();
        assert!(msg.contains("42"));
        assert!(msg.contains("13.0"));
    }

    #[test]
    fn io_errors_keep_their_source() {
        let err = CellMdError::InputFileError {
            path: "missing.cmd".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        let dyn_err: &dyn std::error::Error = &err;
        assert!(dyn_err.source().is_some());
    }
}
