pub mod data_reader;
pub mod input_file;
pub mod simulation_context;
