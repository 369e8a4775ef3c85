//! Discovery of who exchanges which regions with whom.
//!
//! 1. Every rank all-gathers the list of regions it would like to receive.
//! 2. Every rank intersects each foreign wish, and each periodic image of it,
//!    with its own box enlarged by the skin. A hit becomes a send-side
//!    partner here and is queued for the wishing rank.
//! 3. The per-destination hit counts are summed over all ranks, so every
//!    rank knows how many regions it will be told about.
//! 4. The hits are sent point to point; each rank receives until it has the
//!    announced number, producing its receive-side partners.
use log::debug;

use crate::errors::{CellMdError, Result};
use crate::parallel::communication_partner::{
    decode_partner_regions, encode_partner_regions, squeeze_partners, CommunicationPartner, PartnerRegion,
};
use crate::parallel::communicator::{Communicator, TAG_ACQUIRED_REGIONS};
use crate::parallel::halo_region::{decode_desired, encode_desired, HaloRegion};
use crate::simulation_box::SimulationBox;

/// Result of one acquisition round. `receive` partners own parts of the
/// regions this rank asked for; `send` partners asked for parts of this
/// rank's box.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquiredPartners {
    pub receive: Vec<CommunicationPartner>,
    pub send: Vec<CommunicationPartner>,
}

/// Images of `region` under the periodic shifts that can bring it within
/// `skin` of the global box. The unshifted region always comes first.
pub fn periodic_images(sim_box: &SimulationBox, region: &HaloRegion, skin: f64) -> Vec<(HaloRegion, [f64; 3])> {
    let mut candidates: [Vec<f64>; 3] = [vec![0.0], vec![0.0], vec![0.0]];
    for d in 0..3 {
        if !sim_box.is_periodic(d) {
            continue;
        }
        let length = sim_box.length(d);
        if region.rmax[d] > length - skin {
            candidates[d].push(-length);
        }
        if region.rmin[d] < skin {
            candidates[d].push(length);
        }
    }
    let mut images = Vec::new();
    for &sz in &candidates[2] {
        for &sy in &candidates[1] {
            for &sx in &candidates[0] {
                let shift = [sx, sy, sz];
                images.push((region.shifted(&shift), shift));
            }
        }
    }
    images
}

pub fn acquire_neighbours<C: Communicator + ?Sized>(
    comm: &mut C,
    sim_box: &SimulationBox,
    own: &HaloRegion,
    desired: &[HaloRegion],
    skin: f64,
) -> Result<AcquiredPartners> {
    own.validate()?;
    if desired.is_empty() {
        return Err(CellMdError::NoDesiredRegions);
    }
    for region in desired {
        region.validate()?;
    }
    let my_rank = comm.rank();
    let size = comm.size();
    let enlarged = own.enlarged(skin);

    // round 1
    let wishes = comm.all_gather(encode_desired(my_rank, desired))?;

    // round 2
    let mut send_partners = Vec::new();
    let mut outgoing: Vec<Vec<PartnerRegion>> = vec![Vec::new(); size];
    for (source, bytes) in wishes.iter().enumerate() {
        let (rank, regions) = decode_desired(bytes)?;
        if rank != source {
            return Err(CellMdError::UnexpectedSender {
                source_rank: rank,
                tag: TAG_ACQUIRED_REGIONS,
            });
        }
        for region in &regions {
            for (image, shift) in periodic_images(sim_box, region, skin) {
                // a rank never needs its own box unshifted
                if rank == my_rank && shift == [0.0; 3] {
                    continue;
                }
                if !enlarged.overlaps(&image) {
                    continue;
                }
                let overlap = image.clipped_to(&enlarged);
                let back = [-shift[0], -shift[1], -shift[2]];
                outgoing[rank].push(PartnerRegion {
                    region: overlap.shifted(&back),
                    shift,
                });
                send_partners.push(CommunicationPartner::new(rank, overlap, back));
            }
        }
    }

    // round 3
    let counts: Vec<u64> = outgoing.iter().map(|r| r.len() as u64).collect();
    let totals = comm.all_reduce_sum(&counts)?;
    let expected = totals[my_rank] as usize;

    // round 4
    for (dest, regions) in outgoing.iter().enumerate() {
        if !regions.is_empty() {
            comm.send(dest, TAG_ACQUIRED_REGIONS, encode_partner_regions(regions))?;
        }
    }
    let mut receive_partners = Vec::new();
    let mut received = 0;
    while received < expected {
        let (source, bytes) = comm.recv_any(TAG_ACQUIRED_REGIONS)?;
        for entry in decode_partner_regions(&bytes)? {
            receive_partners.push(CommunicationPartner::new(source, entry.region, entry.shift));
            received += 1;
        }
    }
    if received != expected {
        return Err(CellMdError::ReceiveCountMismatch {
            what: "acquired regions",
            expected,
            found: received,
        });
    }
    comm.barrier()?;

    let acquired = AcquiredPartners {
        receive: squeeze_partners(receive_partners),
        send: squeeze_partners(send_partners),
    };
    debug!(
        "rank {my_rank}: receive from {:?}, send to {:?}",
        acquired.receive.iter().map(|p| p.rank()).collect::<Vec<_>>(),
        acquired.send.iter().map(|p| p.rank()).collect::<Vec<_>>()
    );
    Ok(acquired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::communicator::LocalCluster;
    use crate::parallel::halo_region::surrounding_regions;

    #[test]
    fn shift_detection_on_every_axis() {
        let sim_box = SimulationBox::periodic([10.0, 20.0, 30.0]).unwrap();
        for d in 0..3 {
            let length = sim_box.length(d);
            let mut above = HaloRegion::new([1.0; 3], [2.0; 3], [0, 0, 0], 1.0);
            above.rmin[d] = length;
            above.rmax[d] = length + 2.0;
            above.offset[d] = 1;
            let images = periodic_images(&sim_box, &above, 0.0);
            assert_eq!(images.len(), 2, "axis {d}");
            let mut expected = [0.0; 3];
            expected[d] = -length;
            assert_eq!(images[1].1, expected);
            assert_eq!(images[1].0.rmin[d], 0.0);

            let mut below = HaloRegion::new([1.0; 3], [2.0; 3], [0, 0, 0], 1.0);
            below.rmin[d] = -2.0;
            below.rmax[d] = 0.0;
            below.offset[d] = -1;
            let images = periodic_images(&sim_box, &below, 0.0);
            assert_eq!(images.len(), 2, "axis {d}");
            expected[d] = length;
            assert_eq!(images[1].1, expected);
            assert_eq!(images[1].0.rmax[d], length);
        }
    }

    #[test]
    fn open_axes_are_never_shifted() {
        let sim_box = SimulationBox::new([10.0; 3], [false, true, false]).unwrap();
        let region = HaloRegion::new([-2.0; 3], [0.0; 3], [-1, -1, -1], 2.0);
        let images = periodic_images(&sim_box, &region, 0.5);
        assert_eq!(images.len(), 2);
        assert_eq!(images[1].1, [0.0, 10.0, 0.0]);
    }

    #[test]
    fn empty_wish_list_is_rejected() {
        let sim_box = SimulationBox::periodic([10.0; 3]).unwrap();
        let own = HaloRegion::new([0.0; 3], [10.0; 3], [0; 3], 0.0);
        let result = LocalCluster::run(1, |comm| acquire_neighbours(comm, &sim_box, &own, &[], 0.0));
        assert!(matches!(result, Err(CellMdError::NoDesiredRegions)));
    }

    #[test]
    fn single_periodic_rank_is_its_own_neighbour() {
        let sim_box = SimulationBox::periodic([10.0; 3]).unwrap();
        let own = HaloRegion::new([0.0; 3], [10.0; 3], [0; 3], 0.0);
        let desired = surrounding_regions(&own.rmin, &own.rmax, 2.5);
        let acquired = LocalCluster::run(1, |comm| acquire_neighbours(comm, &sim_box, &own, &desired, 0.0))
            .unwrap()
            .remove(0);
        assert_eq!(acquired.receive.len(), 1);
        assert_eq!(acquired.send.len(), 1);
        assert_eq!(acquired.receive[0].regions().len(), 26);
        assert_eq!(acquired.send[0].regions().len(), 26);
        assert!(acquired.send[0].regions().iter().all(|r| r.is_shifted()));
    }
}
