use clap::Parser;

/// Runs a domain-decomposed linked-cell simulation described by an input deck.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Args {
    #[arg(short, long, default_value_t = String::from("input.cmd"))]
    pub infile: String,
    /// number of ranks, overriding the deck's `ranks` command
    #[arg(short, long)]
    pub ranks: Option<usize>,
}
