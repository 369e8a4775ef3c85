//! [`Communicator`] over MPI for runs started with `mpirun`, one process per
//! rank.
//!
//! Point-to-point messages are posted as immediate sends. While a send is in
//! flight, and while a receive waits, every message that arrives is received
//! and stashed until someone asks for its source and tag. Collectives map
//! straight onto their MPI counterparts.
use std::cell::RefCell;
use std::collections::VecDeque;

use log::{debug, trace};
use mpi::collective::SystemOperation;
use mpi::datatype::PartitionMut;
use mpi::environment::Universe;
use mpi::point_to_point::{Message, Status};
use mpi::request;
use mpi::topology::{Rank, SimpleCommunicator};
use mpi::traits::{Communicator as _, CommunicatorCollectives, Destination, Source};
use mpi::{Count, Tag};

use crate::errors::{CellMdError, Result};
use crate::parallel::communicator::Communicator;

#[derive(Debug)]
struct Envelope {
    source: usize,
    tag: u32,
    payload: Vec<u8>,
}

pub struct MpiCommunicator {
    world: SimpleCommunicator,
    /// received but not yet matched, in arrival order
    pending: RefCell<VecDeque<Envelope>>,
    /// finalizes MPI when dropped, so it goes last
    _universe: Universe,
}

impl MpiCommunicator {
    /// Initializes MPI and joins its world. `None` if MPI was already
    /// initialized in this process.
    pub fn initialize() -> Option<Self> {
        let universe = mpi::initialize()?;
        let world = universe.world();
        debug!("joined MPI world as rank {} of {}", world.rank(), world.size());
        Some(Self {
            world,
            pending: RefCell::new(VecDeque::new()),
            _universe: universe,
        })
    }

    /// Brings down the whole job.
    pub fn abort(&self, code: i32) -> ! {
        self.world.abort(code)
    }

    fn stash(&self, message: Message, status: Status) {
        let (payload, _) = message.matched_receive_vec::<u8>();
        self.pending.borrow_mut().push_back(Envelope {
            source: status.source_rank() as usize,
            tag: status.tag() as u32,
            payload,
        });
    }

    /// Receives everything that has arrived, without blocking.
    fn stash_arrivals(&self) {
        while let Some((message, status)) = self.world.any_process().immediate_matched_probe() {
            self.stash(message, status);
        }
    }

    fn take_pending(&self, source: Option<usize>, tag: u32) -> Option<Envelope> {
        let mut pending = self.pending.borrow_mut();
        let pos = pending
            .iter()
            .position(|e| e.tag == tag && source.map_or(true, |s| s == e.source))?;
        pending.remove(pos)
    }

    fn wait_for(&self, source: Option<usize>, tag: u32) -> Envelope {
        loop {
            if let Some(envelope) = self.take_pending(source, tag) {
                return envelope;
            }
            let (message, status) = self.world.any_process().matched_probe();
            self.stash(message, status);
        }
    }
}

impl Communicator for MpiCommunicator {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn send(&self, dest: usize, tag: u32, payload: Vec<u8>) -> Result<()> {
        if dest >= self.size() {
            return Err(CellMdError::ChannelClosed { rank: dest });
        }
        trace!("rank {} -> {} tag {} ({} bytes)", self.rank(), dest, tag, payload.len());
        let process = self.world.process_at_rank(dest as Rank);
        request::scope(|scope| {
            let mut sent = process.immediate_send_with_tag(scope, &payload[..], tag as Tag);
            // the destination may itself be sending to us
            loop {
                match sent.test() {
                    Ok(_) => break,
                    Err(in_flight) => sent = in_flight,
                }
                self.stash_arrivals();
            }
        });
        Ok(())
    }

    fn recv_from(&mut self, source: usize, tag: u32) -> Result<Vec<u8>> {
        if source >= self.size() {
            return Err(CellMdError::UnexpectedSender {
                source_rank: source,
                tag,
            });
        }
        Ok(self.wait_for(Some(source), tag).payload)
    }

    fn recv_any(&mut self, tag: u32) -> Result<(usize, Vec<u8>)> {
        let envelope = self.wait_for(None, tag);
        Ok((envelope.source, envelope.payload))
    }

    fn try_recv_from(&mut self, source: usize, tag: u32) -> Result<Option<Vec<u8>>> {
        self.stash_arrivals();
        Ok(self.take_pending(Some(source), tag).map(|e| e.payload))
    }

    fn all_gather(&mut self, payload: Vec<u8>) -> Result<Vec<Vec<u8>>> {
        let mut counts = vec![0 as Count; self.size()];
        self.world.all_gather_into(&(payload.len() as Count), &mut counts[..]);
        let displs: Vec<Count> = counts
            .iter()
            .scan(0, |offset, &n| {
                let at = *offset;
                *offset += n;
                Some(at)
            })
            .collect();
        let total = counts.iter().map(|&n| n as usize).sum();
        let mut buffer = vec![0u8; total];
        {
            let mut partition = PartitionMut::new(&mut buffer[..], counts.clone(), &displs[..]);
            self.world.all_gather_varcount_into(&payload[..], &mut partition);
        }
        Ok(displs
            .iter()
            .zip(&counts)
            .map(|(&at, &n)| buffer[at as usize..(at + n) as usize].to_vec())
            .collect())
    }

    fn all_reduce_sum(&mut self, values: &[u64]) -> Result<Vec<u64>> {
        let mut sum = vec![0u64; values.len()];
        self.world.all_reduce_into(values, &mut sum[..], SystemOperation::sum());
        Ok(sum)
    }

    fn all_reduce_sum_f64(&mut self, values: &[f64]) -> Result<Vec<f64>> {
        let mut sum = vec![0.0; values.len()];
        self.world.all_reduce_into(values, &mut sum[..], SystemOperation::sum());
        Ok(sum)
    }

    fn barrier(&mut self) -> Result<()> {
        self.world.barrier();
        Ok(())
    }
}
