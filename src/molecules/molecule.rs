use na::{Quaternion, UnitQuaternion, Vector3};

use crate::constants::MOLECULE_RECORD_BYTES;
use crate::errors::{CellMdError, Result};
use crate::wire::{ByteReader, ByteWriter};

/// A rigid molecule: translational and rotational state plus accumulated
/// force and torque. Site positions follow from the component and `q`.
#[derive(Debug, Clone, PartialEq)]
pub struct Molecule {
    pub id: u64,
    pub component_id: u32,
    pub r: Vector3<f64>,
    pub v: Vector3<f64>,
    pub q: UnitQuaternion<f64>,
    /// angular momentum
    pub d: Vector3<f64>,
    pub f: Vector3<f64>,
    /// torque
    pub m: Vector3<f64>,
}

impl Molecule {
    pub fn new(id: u64, component_id: u32, r: Vector3<f64>, v: Vector3<f64>) -> Self {
        Self {
            id,
            component_id,
            r,
            v,
            q: UnitQuaternion::identity(),
            d: Vector3::zeros(),
            f: Vector3::zeros(),
            m: Vector3::zeros(),
        }
    }

    pub fn at(id: u64, r: [f64; 3]) -> Self {
        Self::new(id, 0, Vector3::from(r), Vector3::zeros())
    }

    pub fn position(&self) -> [f64; 3] {
        [self.r[0], self.r[1], self.r[2]]
    }

    pub fn site_position(&self, offset: &Vector3<f64>) -> Vector3<f64> {
        self.r + self.q * offset
    }

    pub fn shift(&mut self, shift: &[f64; 3]) {
        for d in 0..3 {
            self.r[d] += shift[d];
        }
    }

    pub fn clear_forces(&mut self) {
        self.f = Vector3::zeros();
        self.m = Vector3::zeros();
    }

    /// Strict ordering on (z, y, x). Two molecules sharing a position cannot
    /// be ordered and indicate a corrupted configuration.
    pub fn is_less_than(&self, other: &Molecule) -> Result<bool> {
        position_is_less_than(&self.r, &other.r).ok_or(CellMdError::CoincidentMolecules {
            a: self.id,
            b: other.id,
            position: self.position(),
        })
    }

    /// Appends the migration record: id u64 | component u32 | r 3xf64 |
    /// v 3xf64 | q (w,x,y,z) 4xf64 | D 3xf64. Force and torque are not sent.
    pub fn write_record(&self, out: &mut ByteWriter) {
        out.put_u64(self.id);
        out.put_u32(self.component_id);
        out.put_f64s(self.r.as_slice());
        out.put_f64s(self.v.as_slice());
        let quat = self.q.quaternion();
        out.put_f64s(&[quat.w, quat.i, quat.j, quat.k]);
        out.put_f64s(self.d.as_slice());
    }

    pub fn read_record(input: &mut ByteReader) -> Result<Self> {
        let id = input.get_u64()?;
        let component_id = input.get_u32()?;
        let r = Vector3::from(input.get_f64x3()?);
        let v = Vector3::from(input.get_f64x3()?);
        let w = input.get_f64()?;
        let [i, j, k] = input.get_f64x3()?;
        // the sender's quaternion was already unit length; keep its bits
        let q = UnitQuaternion::new_unchecked(Quaternion::new(w, i, j, k));
        let d = Vector3::from(input.get_f64x3()?);
        Ok(Self {
            id,
            component_id,
            r,
            v,
            q,
            d,
            f: Vector3::zeros(),
            m: Vector3::zeros(),
        })
    }
}

/// (z, y, x) ordering of two positions, `None` if they coincide.
pub fn position_is_less_than(a: &Vector3<f64>, b: &Vector3<f64>) -> Option<bool> {
    for d in (0..3).rev() {
        if a[d] < b[d] {
            return Some(true);
        }
        if a[d] > b[d] {
            return Some(false);
        }
    }
    None
}

pub fn encode_molecules(molecules: &[Molecule]) -> Vec<u8> {
    let mut out = ByteWriter::with_capacity(molecules.len() * MOLECULE_RECORD_BYTES);
    for molecule in molecules {
        molecule.write_record(&mut out);
    }
    out.into_bytes()
}

pub fn decode_molecules(bytes: &[u8]) -> Result<Vec<Molecule>> {
    let mut input = ByteReader::new(bytes, MOLECULE_RECORD_BYTES);
    let n = input.record_count()?;
    let mut molecules = Vec::with_capacity(n);
    for _ in 0..n {
        molecules.push(Molecule::read_record(&mut input)?);
    }
    Ok(molecules)
}
