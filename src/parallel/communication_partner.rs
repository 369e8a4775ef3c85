use crate::cells::LinkedCells;
use crate::constants::ACQUIRED_REGION_BYTES;
use crate::errors::Result;
use crate::molecules::Molecule;
use crate::parallel::halo_region::HaloRegion;
use crate::wire::{ByteReader, ByteWriter};

/// One region exchanged with a partner. The region is in local
/// coordinates; adding `shift` maps it into the partner's coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PartnerRegion {
    pub region: HaloRegion,
    pub shift: [f64; 3],
}

impl PartnerRegion {
    /// rmin | rmax | offset | width | shift
    pub fn write_record(&self, out: &mut ByteWriter) {
        self.region.write_record(out);
        out.put_f64s(&self.shift);
    }

    pub fn read_record(input: &mut ByteReader) -> Result<Self> {
        let region = HaloRegion::read_record(input)?;
        let shift = input.get_f64x3()?;
        Ok(Self { region, shift })
    }

    pub fn is_shifted(&self) -> bool {
        self.shift.iter().any(|s| *s != 0.0)
    }
}

pub fn encode_partner_regions(regions: &[PartnerRegion]) -> Vec<u8> {
    let mut out = ByteWriter::with_capacity(regions.len() * ACQUIRED_REGION_BYTES);
    for region in regions {
        region.write_record(&mut out);
    }
    out.into_bytes()
}

pub fn decode_partner_regions(bytes: &[u8]) -> Result<Vec<PartnerRegion>> {
    let mut input = ByteReader::new(bytes, ACQUIRED_REGION_BYTES);
    let n = input.record_count()?;
    (0..n).map(|_| PartnerRegion::read_record(&mut input)).collect()
}

/// A rank this process exchanges molecules with, and the regions involved.
#[derive(Debug, Clone, PartialEq)]
pub struct CommunicationPartner {
    rank: usize,
    regions: Vec<PartnerRegion>,
}

impl CommunicationPartner {
    pub fn new(rank: usize, region: HaloRegion, shift: [f64; 3]) -> Self {
        Self {
            rank,
            regions: vec![PartnerRegion { region, shift }],
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn regions(&self) -> &[PartnerRegion] {
        &self.regions
    }

    pub fn add(&mut self, other: CommunicationPartner) {
        debug_assert_eq!(self.rank, other.rank);
        self.regions.extend(other.regions);
    }

    /// Copies (or, with `remove`, takes) the molecules in all regions out of
    /// the grid, already shifted into the partner's coordinates.
    pub fn collect_molecules(&self, grid: &mut LinkedCells, remove: bool) -> Vec<Molecule> {
        let mut out = Vec::new();
        for entry in &self.regions {
            let mut molecules = grid.collect_in_region(&entry.region.rmin, &entry.region.rmax, remove);
            for molecule in molecules.iter_mut() {
                molecule.shift(&entry.shift);
            }
            out.append(&mut molecules);
        }
        out
    }
}

/// Merges partners of the same rank into one entry, ordered by rank. Regions
/// keep their relative order.
pub fn squeeze_partners(partners: Vec<CommunicationPartner>) -> Vec<CommunicationPartner> {
    let mut squeezed: Vec<CommunicationPartner> = Vec::new();
    for partner in partners {
        match squeezed.iter_mut().find(|p| p.rank == partner.rank) {
            Some(existing) => existing.add(partner),
            None => squeezed.push(partner),
        }
    }
    squeezed.sort_by_key(|p| p.rank);
    squeezed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(x: f64) -> HaloRegion {
        HaloRegion::new([x, 0.0, 0.0], [x + 1.0, 1.0, 1.0], [1, 0, 0], 1.0)
    }

    #[test]
    fn squeezing_merges_by_rank() {
        let partners = vec![
            CommunicationPartner::new(3, region(0.0), [0.0; 3]),
            CommunicationPartner::new(1, region(1.0), [0.0; 3]),
            CommunicationPartner::new(3, region(2.0), [-10.0, 0.0, 0.0]),
        ];
        let squeezed = squeeze_partners(partners);
        assert_eq!(squeezed.len(), 2);
        assert_eq!(squeezed[0].rank(), 1);
        assert_eq!(squeezed[1].rank(), 3);
        assert_eq!(squeezed[1].regions().len(), 2);
        assert_eq!(squeezed[1].regions()[0].region, region(0.0));
        assert!(squeezed[1].regions()[1].is_shifted());
    }

    #[test]
    fn acquired_region_record_carries_shift() {
        let entries = vec![PartnerRegion {
            region: region(7.0),
            shift: [-10.0, 0.0, 10.0],
        }];
        let bytes = encode_partner_regions(&entries);
        assert_eq!(bytes.len(), ACQUIRED_REGION_BYTES);
        assert_eq!(decode_partner_regions(&bytes).unwrap(), entries);
    }

    #[test]
    fn collected_molecules_are_shifted() {
        let mut grid = LinkedCells::new([8.0, 0.0, 0.0], [10.0, 10.0, 10.0], 2.5, 0.0, 1).unwrap();
        grid.add_particle(Molecule::at(1, [9.0, 5.0, 5.0]), false).unwrap();
        let partner = CommunicationPartner::new(
            0,
            HaloRegion::new([7.5, 0.0, 0.0], [10.0, 10.0, 10.0], [-1, 0, 0], 2.5),
            [-10.0, 0.0, 0.0],
        );
        let sent = partner.collect_molecules(&mut grid, false);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].position(), [-1.0, 5.0, 5.0]);
        assert_eq!(grid.num_molecules(), 1);
    }
}
