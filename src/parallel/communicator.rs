//! Point-to-point and collective messaging between ranks.
//!
//! [`LocalCluster`] runs every rank on its own OS thread and connects them
//! with unbounded crossbeam channels. Messages between one sender and one
//! receiver with the same tag arrive in the order they were sent. With the
//! `mpi` feature, `MpiCommunicator` gives the same interface across
//! processes.
use std::collections::VecDeque;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{error, trace};

use crate::errors::{CellMdError, Result};
use crate::wire::{ByteReader, ByteWriter};

pub const TAG_COLLECTIVE: u32 = 1;
pub const TAG_DESIRED_REGIONS: u32 = 2;
pub const TAG_ACQUIRED_REGIONS: u32 = 3;
pub const TAG_LEAVING: u32 = 4;
pub const TAG_HALO: u32 = 5;
pub const TAG_REBALANCE: u32 = 6;
/// sent by a rank that is giving up; never matched as data
const TAG_ABORT: u32 = u32::MAX;

pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Queues `payload` for `dest` and returns immediately.
    fn send(&self, dest: usize, tag: u32, payload: Vec<u8>) -> Result<()>;

    /// Blocks until a message with `tag` from `source` arrives.
    fn recv_from(&mut self, source: usize, tag: u32) -> Result<Vec<u8>>;

    /// Blocks until a message with `tag` from any rank arrives.
    fn recv_any(&mut self, tag: u32) -> Result<(usize, Vec<u8>)>;

    /// Returns a message with `tag` from `source` if one has arrived.
    fn try_recv_from(&mut self, source: usize, tag: u32) -> Result<Option<Vec<u8>>>;

    /// Every rank's contribution, indexed by rank.
    fn all_gather(&mut self, payload: Vec<u8>) -> Result<Vec<Vec<u8>>> {
        for dest in 0..self.size() {
            self.send(dest, TAG_COLLECTIVE, payload.clone())?;
        }
        (0..self.size())
            .map(|source| self.recv_from(source, TAG_COLLECTIVE))
            .collect()
    }

    /// Elementwise sum over all ranks.
    fn all_reduce_sum(&mut self, values: &[u64]) -> Result<Vec<u64>> {
        let mut out = ByteWriter::with_capacity(values.len() * 8);
        for v in values {
            out.put_u64(*v);
        }
        let mut sum = vec![0u64; values.len()];
        for contribution in self.all_gather(out.into_bytes())? {
            let mut input = ByteReader::new(&contribution, 8);
            for s in sum.iter_mut() {
                *s += input.get_u64()?;
            }
        }
        Ok(sum)
    }

    /// Elementwise sum over all ranks, the same on every rank. The default
    /// adds the contributions up in rank order.
    fn all_reduce_sum_f64(&mut self, values: &[f64]) -> Result<Vec<f64>> {
        let mut out = ByteWriter::with_capacity(values.len() * 8);
        out.put_f64s(values);
        let mut sum = vec![0.0; values.len()];
        for contribution in self.all_gather(out.into_bytes())? {
            let mut input = ByteReader::new(&contribution, 8);
            for s in sum.iter_mut() {
                *s += input.get_f64()?;
            }
        }
        Ok(sum)
    }

    fn barrier(&mut self) -> Result<()> {
        self.all_gather(Vec::new()).map(|_| ())
    }
}

impl<C: Communicator + ?Sized> Communicator for &mut C {
    fn rank(&self) -> usize {
        (**self).rank()
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn send(&self, dest: usize, tag: u32, payload: Vec<u8>) -> Result<()> {
        (**self).send(dest, tag, payload)
    }

    fn recv_from(&mut self, source: usize, tag: u32) -> Result<Vec<u8>> {
        (**self).recv_from(source, tag)
    }

    fn recv_any(&mut self, tag: u32) -> Result<(usize, Vec<u8>)> {
        (**self).recv_any(tag)
    }

    fn try_recv_from(&mut self, source: usize, tag: u32) -> Result<Option<Vec<u8>>> {
        (**self).try_recv_from(source, tag)
    }
}

#[derive(Debug)]
struct Envelope {
    source: usize,
    tag: u32,
    payload: Vec<u8>,
}

/// One rank's end of a [`LocalCluster`].
pub struct LocalCommunicator {
    rank: usize,
    peers: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    /// arrived but not yet matched, in arrival order
    pending: VecDeque<Envelope>,
    aborted: Vec<bool>,
}

impl LocalCommunicator {
    fn take_pending(&mut self, source: Option<usize>, tag: u32) -> Option<Envelope> {
        let pos = self
            .pending
            .iter()
            .position(|e| e.tag == tag && source.map_or(true, |s| s == e.source))?;
        self.pending.remove(pos)
    }

    fn check_aborted(&self, source: Option<usize>) -> Result<()> {
        let dead = match source {
            Some(s) => self.aborted[s].then_some(s),
            None => self.aborted.iter().position(|a| *a),
        };
        match dead {
            Some(rank) => Err(CellMdError::ChannelClosed { rank }),
            None => Ok(()),
        }
    }

    fn accept(&mut self, envelope: Envelope) {
        if envelope.tag == TAG_ABORT {
            self.aborted[envelope.source] = true;
        } else {
            self.pending.push_back(envelope);
        }
    }

    fn wait_for(&mut self, source: Option<usize>, tag: u32) -> Result<Envelope> {
        loop {
            if let Some(envelope) = self.take_pending(source, tag) {
                return Ok(envelope);
            }
            self.check_aborted(source)?;
            let envelope = self
                .inbox
                .recv()
                .map_err(|_| CellMdError::ChannelClosed { rank: self.rank })?;
            self.accept(envelope);
        }
    }

    /// Tells every peer that this rank will not send anything more.
    pub fn abort(&self) {
        for peer in &self.peers {
            let _ = peer.send(Envelope {
                source: self.rank,
                tag: TAG_ABORT,
                payload: Vec::new(),
            });
        }
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, dest: usize, tag: u32, payload: Vec<u8>) -> Result<()> {
        trace!("rank {} -> {} tag {} ({} bytes)", self.rank, dest, tag, payload.len());
        let peer = self
            .peers
            .get(dest)
            .ok_or(CellMdError::ChannelClosed { rank: dest })?;
        peer.send(Envelope {
            source: self.rank,
            tag,
            payload,
        })
        .map_err(|_| CellMdError::ChannelClosed { rank: dest })
    }

    fn recv_from(&mut self, source: usize, tag: u32) -> Result<Vec<u8>> {
        if source >= self.size() {
            return Err(CellMdError::UnexpectedSender {
                source_rank: source,
                tag,
            });
        }
        Ok(self.wait_for(Some(source), tag)?.payload)
    }

    fn recv_any(&mut self, tag: u32) -> Result<(usize, Vec<u8>)> {
        let envelope = self.wait_for(None, tag)?;
        Ok((envelope.source, envelope.payload))
    }

    fn try_recv_from(&mut self, source: usize, tag: u32) -> Result<Option<Vec<u8>>> {
        while let Ok(envelope) = self.inbox.try_recv() {
            self.accept(envelope);
        }
        if let Some(envelope) = self.take_pending(Some(source), tag) {
            return Ok(Some(envelope.payload));
        }
        self.check_aborted(Some(source))?;
        Ok(None)
    }
}

/// A group of ranks living in one process.
pub struct LocalCluster;

impl LocalCluster {
    /// Connected communicators for ranks `0..size`.
    pub fn new(size: usize) -> Vec<LocalCommunicator> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalCommunicator {
                rank,
                peers: senders.clone(),
                inbox,
                pending: VecDeque::new(),
                aborted: vec![false; size],
            })
            .collect()
    }

    /// Runs `task` once per rank on its own thread and collects the results
    /// in rank order. A failing rank aborts its peers instead of leaving them
    /// waiting.
    pub fn run<T, F>(size: usize, task: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&mut LocalCommunicator) -> Result<T> + Sync,
    {
        let task = &task;
        let results: Vec<Result<T>> = thread::scope(|scope| {
            let handles: Vec<_> = Self::new(size)
                .into_iter()
                .map(|mut comm| {
                    scope.spawn(move || {
                        let result = task(&mut comm);
                        if let Err(e) = &result {
                            error!("rank {} failed: {}", comm.rank(), e);
                            comm.abort();
                        }
                        result
                    })
                })
                .collect();
            handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| {
                    handle
                        .join()
                        .unwrap_or(Err(CellMdError::ChannelClosed { rank }))
                })
                .collect()
        });
        results.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_by_source_and_tag() {
        let mut comms = LocalCluster::new(2);
        let mut second = comms.pop().unwrap();
        let first = comms.pop().unwrap();
        first.send(1, TAG_HALO, vec![1]).unwrap();
        first.send(1, TAG_LEAVING, vec![2]).unwrap();
        first.send(1, TAG_HALO, vec![3]).unwrap();
        assert_eq!(second.recv_from(0, TAG_LEAVING).unwrap(), vec![2]);
        assert_eq!(second.recv_from(0, TAG_HALO).unwrap(), vec![1]);
        assert_eq!(second.try_recv_from(0, TAG_HALO).unwrap(), Some(vec![3]));
        assert_eq!(second.try_recv_from(0, TAG_HALO).unwrap(), None);
    }

    #[test]
    fn collectives_agree_on_every_rank() {
        let sums = LocalCluster::run(4, |comm| {
            let rank = comm.rank() as u64;
            let ints = comm.all_reduce_sum(&[rank, 1])?;
            let floats = comm.all_reduce_sum_f64(&[0.5 * rank as f64])?;
            comm.barrier()?;
            let gathered = comm.all_gather(vec![comm.rank() as u8])?;
            Ok((ints, floats, gathered))
        })
        .unwrap();
        for (ints, floats, gathered) in sums {
            assert_eq!(ints, vec![6, 4]);
            assert_eq!(floats, vec![3.0]);
            assert_eq!(gathered, vec![vec![0], vec![1], vec![2], vec![3]]);
        }
    }

    #[test]
    fn failing_rank_releases_waiting_peers() {
        let result = LocalCluster::run(2, |comm| {
            if comm.rank() == 0 {
                return Err(CellMdError::NoDesiredRegions);
            }
            comm.recv_from(0, TAG_HALO).map(|_| ())
        });
        assert!(result.is_err());
    }
}
