use std::{
    fs::File,
    io::{BufWriter, Write},
};

use clap::Parser;

use cellmd::molecules::{lattice_positions, LatticeStyle};

/// Writes a data file with molecules on a lattice.
#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// sc or fcc
    #[arg(short, long, default_value_t = String::from("fcc"))]
    style: String,
    /// edge of the unit cell
    #[arg(short, long, default_value_t = 1.5874)]
    a: f64,
    /// unit cells per axis
    #[arg(short, long, num_args = 3, default_values_t = [5, 5, 5])]
    cells: Vec<usize>,
    #[arg(long, default_value_t = 1.0)]
    mass: f64,
    #[arg(long, default_value_t = 1.0)]
    epsilon: f64,
    #[arg(long, default_value_t = 1.0)]
    sigma: f64,
    #[arg(short, long, default_value_t = String::from("lattice.data"))]
    output: String,
}

fn generate_data_file(args: &Args, style: LatticeStyle, cells: [usize; 3]) -> std::io::Result<()> {
    let positions = lattice_positions(style, args.a, cells);

    let file = File::create(&args.output)?;
    let mut out = BufWriter::new(file);

    writeln!(out, "{} molecules\n", positions.len())?;
    writeln!(out, "0.0 {} xlo xhi", cells[0] as f64 * args.a)?;
    writeln!(out, "0.0 {} ylo yhi", cells[1] as f64 * args.a)?;
    writeln!(out, "0.0 {} zlo zhi\n", cells[2] as f64 * args.a)?;

    writeln!(out, "Components\n0 {} {} {}\n", args.mass, args.epsilon, args.sigma)?;

    writeln!(out, "Molecules")?;
    for (i, pos) in positions.iter().enumerate() {
        writeln!(out, "{} 0 {} {} {}", i + 1, pos[0], pos[1], pos[2])?;
    }
    out.flush()
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let style = LatticeStyle::from_name(&args.style)
        .ok_or_else(|| anyhow::anyhow!("unknown lattice style {}", args.style))?;
    let cells = [args.cells[0], args.cells[1], args.cells[2]];
    generate_data_file(&args, style, cells)?;
    println!("wrote {}", args.output);
    Ok(())
}
