use std::{
    fs::File,
    io::{BufRead, BufReader},
};

use na::Vector3;

use crate::{
    errors::{CellMdError, Result},
    extensions::ArgsExt,
    molecules::{Component, Molecule},
};

/// Contents of a molecule data file. Positions are relative to the lower
/// box corner.
#[derive(Debug, Default)]
pub struct DataFile {
    pub lengths: Option<[f64; 3]>,
    pub components: Vec<Component>,
    pub molecules: Vec<Molecule>,
    pub has_velocities: bool,
}

/// Reader for data files laid out like
///
/// ```text
/// 8 molecules
/// 0.0 10.0 xlo xhi
/// 0.0 10.0 ylo yhi
/// 0.0 10.0 zlo zhi
///
/// Components
/// 0 1.0 1.0 1.0        # id mass epsilon sigma
///
/// Molecules
/// 1 0 2.5 2.5 2.5      # id component x y z
///
/// Velocities
/// 1 0.1 0.0 0.0        # id vx vy vz
/// ```
pub struct DataReader {
    infile: String,
}

impl DataReader {
    pub fn new(infile: String) -> Self {
        Self { infile }
    }

    pub fn read(&self) -> Result<DataFile> {
        let file = File::open(&self.infile).map_err(|e| CellMdError::InputFileError {
            path: self.infile.clone(),
            source: e,
        })?;
        let reader = BufReader::new(file);

        let mut section = String::new();
        let mut n_molecules: Option<usize> = None;
        let mut lo = [0.0; 3];
        let mut hi: [Option<f64>; 3] = [None; 3];
        let mut data = DataFile::default();
        let mut velocities: Vec<(u64, Vector3<f64>, usize)> = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line_num = line_num + 1;
            let line = line.map_err(|e| CellMdError::DataFileError {
                path: self.infile.clone(),
                line: line_num,
                source: e,
            })?;
            let line = line.split_once('#').map(|(before, _)| before).unwrap_or(&line).trim();
            if line.is_empty() {
                continue;
            }
            let line_split: Vec<&str> = line.split_whitespace().collect();

            match line_split[0] {
                "Components" | "Molecules" => {
                    section = line_split[0].to_string();
                    continue;
                }
                "Velocities" => {
                    data.has_velocities = true;
                    section = line_split[0].to_string();
                    continue;
                }
                _ => {}
            }

            // "8 molecules"
            if line_split.len() == 2 && line_split[1] == "molecules" {
                n_molecules = Some(line_split.parse_usize_at(0, line_num)?);
                continue;
            }

            // "0.0 10.0 xlo xhi"
            if line_split.len() > 2 {
                let axis = match line_split[2] {
                    "xlo" => Some(0),
                    "ylo" => Some(1),
                    "zlo" => Some(2),
                    _ => None,
                };
                if let Some(d) = axis {
                    lo[d] = line_split.parse_float_at(0, line_num)?;
                    hi[d] = Some(line_split.parse_float_at(1, line_num)?);
                    continue;
                }
            }

            match section.as_str() {
                "Components" => {
                    let id = line_split.parse_usize_at(0, line_num)? as u32;
                    let mass = line_split.parse_float_at(1, line_num)?;
                    let epsilon = line_split.parse_float_at(2, line_num)?;
                    let sigma = line_split.parse_float_at(3, line_num)?;
                    data.components.push(Component::single_site(id, mass, epsilon, sigma));
                }
                "Molecules" => {
                    let id = line_split.parse_usize_at(0, line_num)? as u64;
                    let component_id = line_split.parse_usize_at(1, line_num)? as u32;
                    let mut r = Vector3::zeros();
                    for d in 0..3 {
                        r[d] = line_split.parse_float_at(2 + d, line_num)? - lo[d];
                    }
                    data.molecules.push(Molecule::new(id, component_id, r, Vector3::zeros()));
                }
                "Velocities" => {
                    let id = line_split.parse_usize_at(0, line_num)? as u64;
                    let mut v = Vector3::zeros();
                    for d in 0..3 {
                        v[d] = line_split.parse_float_at(1 + d, line_num)?;
                    }
                    velocities.push((id, v, line_num));
                }
                _ => {
                    return Err(CellMdError::InvalidArgument {
                        string: line.to_string(),
                        line: line_num,
                    })
                }
            }
        }

        for (id, v, line) in velocities {
            let molecule = data
                .molecules
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or(CellMdError::InvalidArgument {
                    string: format!("velocity for unknown molecule {id}"),
                    line,
                })?;
            molecule.v = v;
        }
        if let (Some(x), Some(y), Some(z)) = (hi[0], hi[1], hi[2]) {
            data.lengths = Some([x - lo[0], y - lo[1], z - lo[2]]);
        }
        if let Some(n) = n_molecules {
            if n != data.molecules.len() {
                return Err(CellMdError::InvalidArgument {
                    string: format!("header announces {n} molecules, found {}", data.molecules.len()),
                    line: 0,
                });
            }
        }
        Ok(data)
    }
}
