use crate::constants::HALO_REGION_BYTES;
use crate::errors::{CellMdError, Result};
use crate::math;
use crate::wire::{ByteReader, ByteWriter};

/// A box of space one process sends to or receives from another.
/// `offset` is the direction from the owning box, in {-1, 0, 1}^3.
#[derive(Debug, Clone, PartialEq)]
pub struct HaloRegion {
    pub rmin: [f64; 3],
    pub rmax: [f64; 3],
    pub offset: [i32; 3],
    pub width: f64,
}

impl HaloRegion {
    pub fn new(rmin: [f64; 3], rmax: [f64; 3], offset: [i32; 3], width: f64) -> Self {
        Self {
            rmin,
            rmax,
            offset,
            width,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let well_formed = (0..3).all(|d| self.rmin[d].is_finite() && self.rmax[d].is_finite() && self.rmin[d] < self.rmax[d])
            && self.offset.iter().all(|o| (-1..=1).contains(o));
        if !well_formed {
            return Err(CellMdError::MalformedRegion {
                rmin: self.rmin,
                rmax: self.rmax,
            });
        }
        Ok(())
    }

    pub fn overlaps(&self, other: &HaloRegion) -> bool {
        math::boxes_overlap(&self.rmin, &self.rmax, &other.rmin, &other.rmax)
    }

    /// The part of `self` inside `other`, keeping offset and width.
    pub fn clipped_to(&self, other: &HaloRegion) -> HaloRegion {
        let (rmin, rmax) = math::intersect(&self.rmin, &self.rmax, &other.rmin, &other.rmax);
        HaloRegion::new(rmin, rmax, self.offset, self.width)
    }

    pub fn shifted(&self, shift: &[f64; 3]) -> HaloRegion {
        let mut out = self.clone();
        for d in 0..3 {
            out.rmin[d] += shift[d];
            out.rmax[d] += shift[d];
        }
        out
    }

    pub fn enlarged(&self, margin: f64) -> HaloRegion {
        let mut out = self.clone();
        for d in 0..3 {
            out.rmin[d] -= margin;
            out.rmax[d] += margin;
        }
        out
    }

    /// rmin | rmax | offset | width
    pub fn write_record(&self, out: &mut ByteWriter) {
        out.put_f64s(&self.rmin);
        out.put_f64s(&self.rmax);
        for o in self.offset {
            out.put_i32(o);
        }
        out.put_f64(self.width);
    }

    pub fn read_record(input: &mut ByteReader) -> Result<Self> {
        let rmin = input.get_f64x3()?;
        let rmax = input.get_f64x3()?;
        let offset = [input.get_i32()?, input.get_i32()?, input.get_i32()?];
        let width = input.get_f64()?;
        Ok(Self::new(rmin, rmax, offset, width))
    }
}

/// The halo slabs around `[own_min, own_max)`: one per face, edge and corner
/// direction, each `width` thick.
pub fn surrounding_regions(own_min: &[f64; 3], own_max: &[f64; 3], width: f64) -> Vec<HaloRegion> {
    let outer_min = own_min.map(|x| x - width);
    let outer_max = own_max.map(|x| x + width);
    margin_regions(own_min, own_max, &outer_min, &outer_max)
}

/// The 26 slabs between `[own_min, own_max)` and the enclosing box
/// `[outer_min, outer_max)`, whose margins may differ per axis.
pub fn margin_regions(
    own_min: &[f64; 3],
    own_max: &[f64; 3],
    outer_min: &[f64; 3],
    outer_max: &[f64; 3],
) -> Vec<HaloRegion> {
    let width = (0..3)
        .map(|d| (own_min[d] - outer_min[d]).max(outer_max[d] - own_max[d]))
        .fold(0.0, f64::max);
    let mut regions = Vec::with_capacity(26);
    for oz in -1..=1 {
        for oy in -1..=1 {
            for ox in -1..=1 {
                let offset = [ox, oy, oz];
                if offset == [0, 0, 0] {
                    continue;
                }
                let mut rmin = [0.0; 3];
                let mut rmax = [0.0; 3];
                for d in 0..3 {
                    (rmin[d], rmax[d]) = match offset[d] {
                        -1 => (outer_min[d], own_min[d]),
                        1 => (own_max[d], outer_max[d]),
                        _ => (own_min[d], own_max[d]),
                    };
                }
                regions.push(HaloRegion::new(rmin, rmax, offset, width));
            }
        }
    }
    regions
}

/// Desired-region message: rank i32 | count i32 | regions.
pub fn encode_desired(rank: usize, regions: &[HaloRegion]) -> Vec<u8> {
    let mut out = ByteWriter::with_capacity(8 + regions.len() * HALO_REGION_BYTES);
    out.put_i32(rank as i32);
    out.put_i32(regions.len() as i32);
    for region in regions {
        region.write_record(&mut out);
    }
    out.into_bytes()
}

pub fn decode_desired(bytes: &[u8]) -> Result<(usize, Vec<HaloRegion>)> {
    let mut input = ByteReader::new(bytes, HALO_REGION_BYTES);
    let rank = input.get_i32()?;
    let count = input.get_i32()?;
    if rank < 0 || count < 0 || input.remaining() != count as usize * HALO_REGION_BYTES {
        return Err(CellMdError::TruncatedMessage {
            found: bytes.len(),
            record_size: HALO_REGION_BYTES,
        });
    }
    let regions = (0..count)
        .map(|_| HaloRegion::read_record(&mut input))
        .collect::<Result<Vec<_>>>()?;
    Ok((rank as usize, regions))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twenty_six_disjoint_slabs() {
        let regions = surrounding_regions(&[0.0; 3], &[4.0; 3], 1.0);
        assert_eq!(regions.len(), 26);
        for (i, a) in regions.iter().enumerate() {
            a.validate().unwrap();
            for b in &regions[i + 1..] {
                assert!(!a.overlaps(b));
            }
        }
        let corner = regions.iter().find(|r| r.offset == [1, -1, 1]).unwrap();
        assert_eq!(corner.rmin, [4.0, -1.0, 4.0]);
        assert_eq!(corner.rmax, [5.0, 0.0, 5.0]);
    }

    #[test]
    fn margins_follow_the_outer_box_per_axis() {
        let regions = margin_regions(&[0.0; 3], &[4.0; 3], &[-1.0, -2.0, -0.5], &[5.0, 6.0, 4.5]);
        assert_eq!(regions.len(), 26);
        let face = regions.iter().find(|r| r.offset == [0, 1, 0]).unwrap();
        assert_eq!(face.rmin, [0.0, 4.0, 0.0]);
        assert_eq!(face.rmax, [4.0, 6.0, 4.0]);
        assert_eq!(face.width, 2.0);
    }

    #[test]
    fn inverted_or_flat_regions_are_rejected() {
        let flat = HaloRegion::new([0.0; 3], [1.0, 0.0, 1.0], [0, 0, 1], 1.0);
        assert!(matches!(flat.validate(), Err(CellMdError::MalformedRegion { .. })));
        let bad_offset = HaloRegion::new([0.0; 3], [1.0; 3], [2, 0, 0], 1.0);
        assert!(bad_offset.validate().is_err());
    }

    #[test]
    fn desired_message_layout() {
        let regions = surrounding_regions(&[0.0; 3], &[2.0; 3], 0.5);
        let bytes = encode_desired(3, &regions[..2]);
        assert_eq!(bytes.len(), 8 + 2 * HALO_REGION_BYTES);
        assert_eq!(HALO_REGION_BYTES, 68);
        let (rank, back) = decode_desired(&bytes).unwrap();
        assert_eq!(rank, 3);
        assert_eq!(back, regions[..2].to_vec());
        assert!(decode_desired(&bytes[..bytes.len() - 1]).is_err());
    }
}
