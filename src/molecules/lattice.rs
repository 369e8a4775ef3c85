use na::{Matrix3, Matrix3xX, Vector3};

use crate::molecules::Molecule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatticeStyle {
    SimpleCubic,
    Fcc,
}

impl LatticeStyle {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sc" => Some(Self::SimpleCubic),
            "fcc" => Some(Self::Fcc),
            _ => None,
        }
    }

    fn basis_frac(&self) -> Matrix3xX<f64> {
        match self {
            Self::SimpleCubic => Matrix3xX::from_columns(&[Vector3::zeros()]),
            Self::Fcc => Matrix3xX::from_columns(&[
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(0.0, 0.5, 0.5),
                Vector3::new(0.5, 0.0, 0.5),
                Vector3::new(0.5, 0.5, 0.0),
            ]),
        }
    }
}

/// Lattice sites of `cells` unit cells of edge `a`, moved in by a quarter of
/// the smallest basis spacing so that no site lies on a box face.
pub fn lattice_positions(style: LatticeStyle, a: f64, cells: [usize; 3]) -> Vec<Vector3<f64>> {
    let h = Matrix3::identity() * a;
    let basis_frac = style.basis_frac();
    let inset = match style {
        LatticeStyle::SimpleCubic => 0.25,
        LatticeStyle::Fcc => 0.125,
    };
    let offset = Vector3::repeat(inset);
    let mut positions = Vec::with_capacity(cells[0] * cells[1] * cells[2] * basis_frac.ncols());
    for iz in 0..cells[2] {
        for iy in 0..cells[1] {
            for ix in 0..cells[0] {
                let cell_origin_frac = Vector3::new(ix as f64, iy as f64, iz as f64);
                for b in basis_frac.column_iter() {
                    let frac = cell_origin_frac + b + offset;
                    positions.push(h * frac);
                }
            }
        }
    }
    positions
}

/// Molecules of `component_id` on a lattice, numbered from `first_id`.
pub fn lattice_molecules(
    style: LatticeStyle,
    a: f64,
    cells: [usize; 3],
    component_id: u32,
    first_id: u64,
) -> Vec<Molecule> {
    lattice_positions(style, a, cells)
        .into_iter()
        .enumerate()
        .map(|(i, r)| Molecule::new(first_id + i as u64, component_id, r, Vector3::zeros()))
        .collect()
}
