// SPDX-License-Identifier: MPL-2.0

//! Blocking collective communication between the workers of a group.
//!
//! A transport only has to move [`Payload`]s point to point between ranks,
//! in order for each pair of ranks. The collectives (barrier, broadcast,
//! scatter and gather with variable counts) are built on top of that and are
//! rendezvous points: every rank of the group must call the same collectives
//! in the same order.
//!
//! [`LocalGroup`] runs a group of workers as threads of the current process.

use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use rustfft::num_complex::Complex;
use tracing::{trace, warn};

use super::partition::DistributionTable;
use crate::error::{Error, Result};

/// Rank of the coordinator of a group.
pub const COORDINATOR: usize = 0;

/// A message exchanged between two ranks.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Integers, used for row assignments and barrier tokens.
    Words(Vec<u64>),
    /// Single precision samples.
    Real32(Vec<f32>),
    /// Double precision samples.
    Real(Vec<f64>),
    /// Complex samples.
    Complex(Vec<Complex<f64>>),
}

impl Payload {
    fn kind(&self) -> &'static str {
        match self {
            Payload::Words(_) => "words",
            Payload::Real32(_) => "f32",
            Payload::Real(_) => "f64",
            Payload::Complex(_) => "complex",
        }
    }
}

/// Sample types that can travel in a [`Payload`].
pub trait Element: Copy + Send + 'static {
    /// Wrap a buffer into a payload.
    fn into_payload(data: Vec<Self>) -> Payload;
    /// Unwrap a payload, `Err` with the payload back if it holds another type.
    fn from_payload(payload: Payload) -> std::result::Result<Vec<Self>, Payload>;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            fn into_payload(data: Vec<Self>) -> Payload {
                Payload::$variant(data)
            }
            fn from_payload(payload: Payload) -> std::result::Result<Vec<Self>, Payload> {
                match payload {
                    Payload::$variant(data) => Ok(data),
                    other => Err(other),
                }
            }
        }
    };
}

impl_element!(u64, Words);
impl_element!(f32, Real32);
impl_element!(f64, Real);
impl_element!(Complex<f64>, Complex);

/// Member of a group of cooperating workers.
pub trait Communicator {
    /// Rank of this member, in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of members of the group.
    fn size(&self) -> usize;

    /// Send a payload to `dest`. `op` names the collective for error reports.
    fn send_payload(&self, dest: usize, op: &'static str, payload: Payload) -> Result<()>;

    /// Receive the next payload from `source`, blocking.
    fn recv_payload(&self, source: usize, op: &'static str) -> Result<Payload>;

    /// True for the coordinator, rank 0.
    fn is_coordinator(&self) -> bool {
        self.rank() == COORDINATOR
    }

    /// Send a typed buffer to `dest`.
    fn send<T: Element>(&self, dest: usize, op: &'static str, data: Vec<T>) -> Result<()> {
        self.send_payload(dest, op, T::into_payload(data))
    }

    /// Receive a typed buffer from `source`.
    fn recv<T: Element>(&self, source: usize, op: &'static str) -> Result<Vec<T>> {
        let payload = self.recv_payload(source, op)?;
        T::from_payload(payload).map_err(|other| {
            Error::protocol(format!(
                "{}: unexpected {} payload from rank {}",
                op,
                other.kind(),
                source
            ))
        })
    }

    /// Wait until every member of the group reached the barrier.
    fn barrier(&self) -> Result<()> {
        const OP: &str = "barrier";
        if self.is_coordinator() {
            for source in 1..self.size() {
                self.recv::<u64>(source, OP)?;
            }
            for dest in 1..self.size() {
                self.send::<u64>(dest, OP, Vec::new())?;
            }
        } else {
            self.send::<u64>(COORDINATOR, OP, Vec::new())?;
            self.recv::<u64>(COORDINATOR, OP)?;
        }
        Ok(())
    }

    /// Copy `data` of `root` to every member.
    fn broadcast<T: Element>(&self, root: usize, data: &mut Vec<T>) -> Result<()> {
        const OP: &str = "broadcast";
        if self.rank() == root {
            for dest in (0..self.size()).filter(|&r| r != root) {
                self.send(dest, OP, data.clone())?;
            }
        } else {
            *data = self.recv(root, OP)?;
        }
        Ok(())
    }

    /// Split the buffer of `root` according to `table`, each rank receiving its slice in `recv`.
    ///
    /// Only `root` provides `send`, other ranks pass `None`.
    fn scatterv<T: Element>(
        &self,
        root: usize,
        send: Option<(&[T], &DistributionTable)>,
        recv: &mut [T],
    ) -> Result<()> {
        const OP: &str = "scatterv";
        if self.rank() != root {
            let data: Vec<T> = self.recv(root, OP)?;
            return copy_exact(OP, recv, &data);
        }
        let (data, table) =
            send.ok_or_else(|| Error::protocol("scatterv: root has no send buffer"))?;
        check_table(OP, table, self.size())?;
        for (dest, entry) in table.entries().iter().enumerate() {
            let chunk = data
                .get(entry.offset..entry.offset + entry.count)
                .ok_or_else(|| Error::protocol("scatterv: table exceeds send buffer"))?;
            if dest == root {
                copy_exact(OP, recv, chunk)?;
            } else {
                self.send(dest, OP, chunk.to_vec())?;
            }
        }
        Ok(())
    }

    /// Assemble the `send` buffers of every rank into the buffer of `root` according to `table`.
    ///
    /// Only `root` provides `recv`, other ranks pass `None`.
    fn gatherv<T: Element>(
        &self,
        root: usize,
        send: &[T],
        recv: Option<(&mut [T], &DistributionTable)>,
    ) -> Result<()> {
        const OP: &str = "gatherv";
        if self.rank() != root {
            return self.send(root, OP, send.to_vec());
        }
        let (data, table) =
            recv.ok_or_else(|| Error::protocol("gatherv: root has no receive buffer"))?;
        check_table(OP, table, self.size())?;
        for (source, entry) in table.entries().iter().enumerate() {
            let slot = data
                .get_mut(entry.offset..entry.offset + entry.count)
                .ok_or_else(|| Error::protocol("gatherv: table exceeds receive buffer"))?;
            if source == root {
                copy_exact(OP, slot, send)?;
            } else {
                let chunk: Vec<T> = self.recv(source, OP)?;
                copy_exact(OP, slot, &chunk)?;
            }
        }
        Ok(())
    }
}

fn check_table(op: &'static str, table: &DistributionTable, size: usize) -> Result<()> {
    if table.len() != size {
        return Err(Error::protocol(format!(
            "{}: table has {} entries for a group of {}",
            op,
            table.len(),
            size
        )));
    }
    Ok(())
}

fn copy_exact<T: Copy>(op: &'static str, dst: &mut [T], src: &[T]) -> Result<()> {
    if dst.len() != src.len() {
        return Err(Error::protocol(format!(
            "{}: {} samples for a buffer of {}",
            op,
            src.len(),
            dst.len()
        )));
    }
    dst.copy_from_slice(src);
    Ok(())
}

/// Builder of groups of workers living in the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalGroup {
    timeout: Option<Duration>,
}

impl LocalGroup {
    /// Group whose collectives wait forever, like MPI.
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up on a receive after `timeout` and report a [`Error::CollectiveTimeout`].
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create the endpoints of a group of `size` members, in rank order.
    pub fn endpoints(&self, size: usize) -> Vec<LocalEndpoint> {
        // senders[src][dst] and receivers[dst][src] are the two ends of one channel.
        let mut senders: Vec<Vec<Sender<Payload>>> = (0..size).map(|_| Vec::new()).collect();
        let mut receivers: Vec<Vec<Receiver<Payload>>> = (0..size).map(|_| Vec::new()).collect();
        for src in 0..size {
            for dst in 0..size {
                let (tx, rx) = unbounded();
                senders[src].push(tx);
                receivers[dst].push(rx);
            }
        }
        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (senders, receivers))| LocalEndpoint {
                rank,
                size,
                senders,
                receivers,
                timeout: self.timeout,
            })
            .collect()
    }

    /// Run `worker` on every rank of a group of `size` threads,
    /// and collect the results in rank order.
    ///
    /// A panicking worker is resumed on the calling thread once all threads ended.
    pub fn run<F, R>(&self, size: usize, worker: F) -> Vec<R>
    where
        F: Fn(LocalEndpoint) -> R + Sync,
        R: Send,
    {
        let worker = &worker;
        std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .endpoints(size)
                .into_iter()
                .map(|endpoint| scope.spawn(move || worker(endpoint)))
                .collect();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }
}

/// One member of a [`LocalGroup`].
#[derive(Debug)]
pub struct LocalEndpoint {
    rank: usize,
    size: usize,
    senders: Vec<Sender<Payload>>,
    receivers: Vec<Receiver<Payload>>,
    timeout: Option<Duration>,
}

impl LocalEndpoint {
    fn check_peer(&self, op: &'static str, peer: usize) -> Result<()> {
        if peer >= self.size {
            return Err(Error::protocol(format!(
                "{}: rank {} outside of a group of {}",
                op, peer, self.size
            )));
        }
        Ok(())
    }
}

impl Communicator for LocalEndpoint {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send_payload(&self, dest: usize, op: &'static str, payload: Payload) -> Result<()> {
        self.check_peer(op, dest)?;
        trace!(rank = self.rank, dest, op, kind = payload.kind(), "send");
        self.senders[dest]
            .send(payload)
            .map_err(|_| Error::Disconnected { op, peer: dest })
    }

    fn recv_payload(&self, source: usize, op: &'static str) -> Result<Payload> {
        self.check_peer(op, source)?;
        let receiver = &self.receivers[source];
        match self.timeout {
            None => receiver
                .recv()
                .map_err(|_| Error::Disconnected { op, peer: source }),
            Some(timeout) => receiver.recv_timeout(timeout).map_err(|err| match err {
                RecvTimeoutError::Timeout => {
                    warn!(rank = self.rank, source, op, "collective timed out");
                    Error::CollectiveTimeout {
                        op,
                        rank: self.rank,
                    }
                }
                RecvTimeoutError::Disconnected => Error::Disconnected { op, peer: source },
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::partition::all_rows;

    #[test]
    fn broadcast_reaches_every_rank() {
        let results = LocalGroup::new().run(4, |comm| {
            let mut data = if comm.is_coordinator() {
                vec![255u64]
            } else {
                Vec::new()
            };
            comm.barrier()?;
            comm.broadcast(COORDINATOR, &mut data)?;
            Ok::<_, Error>(data)
        });
        for result in results {
            assert_eq!(result.unwrap(), vec![255]);
        }
    }

    #[test]
    fn scatter_then_gather_restores_buffer() {
        let n = 5;
        let results = LocalGroup::new().run(3, |comm| {
            let parts = all_rows(n, comm.size());
            let table = DistributionTable::from_descriptors(n, n, &parts)?;
            let mut full: Vec<f32> = (0..n * n).map(|i| i as f32).collect();
            let local_rows = parts[comm.rank()];
            let mut local = vec![0.0f32; local_rows.row_count * n];

            let send = if comm.is_coordinator() {
                Some((full.as_slice(), &table))
            } else {
                None
            };
            comm.scatterv(COORDINATOR, send, &mut local)?;
            let first = local.first().copied();
            for v in local.iter_mut() {
                *v += 0.5;
            }

            if comm.is_coordinator() {
                full.iter_mut().for_each(|v| *v = 0.0);
            }
            let recv = if comm.is_coordinator() {
                Some((full.as_mut_slice(), &table))
            } else {
                None
            };
            comm.gatherv(COORDINATOR, &local, recv)?;
            Ok::<_, Error>((first, full))
        });

        let results: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
        // Block split of 5 rows over 3 ranks: 0..2, 2..4, 4..5.
        assert_eq!(results[0].0, Some(0.0));
        assert_eq!(results[1].0, Some(10.0));
        assert_eq!(results[2].0, Some(20.0));
        let expected: Vec<f32> = (0..n * n).map(|i| i as f32 + 0.5).collect();
        assert_eq!(results[0].1, expected);
    }

    #[test]
    fn wrong_payload_type_is_a_protocol_error() {
        let mut endpoints = LocalGroup::new().endpoints(2);
        let b = endpoints.pop().unwrap();
        let a = endpoints.pop().unwrap();
        a.send(1, "test", vec![1.0f64]).unwrap();
        let err = b.recv::<u64>(0, "test").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn missing_peer_times_out() {
        let mut endpoints = LocalGroup::new()
            .with_timeout(Some(Duration::from_millis(20)))
            .endpoints(2);
        let _silent = endpoints.pop().unwrap();
        let coordinator = endpoints.pop().unwrap();
        let err = coordinator.barrier().unwrap_err();
        assert!(matches!(
            err,
            Error::CollectiveTimeout {
                op: "barrier",
                rank: 0
            }
        ));
    }

    #[test]
    fn dropped_peer_is_reported() {
        let mut endpoints = LocalGroup::new().endpoints(2);
        drop(endpoints.pop());
        let coordinator = endpoints.pop().unwrap();
        let err = coordinator.barrier().unwrap_err();
        assert!(matches!(err, Error::Disconnected { peer: 1, .. }));
    }

    #[test]
    fn single_member_group_needs_no_messages() {
        let results = LocalGroup::new().run(1, |comm| {
            comm.barrier()?;
            let table = DistributionTable::from_descriptors(2, 2, &all_rows(2, 1))?;
            let mut out = vec![0u64; 4];
            comm.scatterv(COORDINATOR, Some((&[1, 2, 3, 4][..], &table)), &mut out)?;
            Ok::<_, Error>(out)
        });
        assert_eq!(results[0].as_ref().unwrap(), &vec![1, 2, 3, 4]);
    }
}
