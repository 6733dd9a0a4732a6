// SPDX-License-Identifier: MPL-2.0

//! Row distributed forward transform of N×N fields.
//!
//! Each frame goes through the same rounds on every rank:
//!
//! 1. barrier, then the coordinator scatters the rows of the source image,
//! 2. each rank loads its rows into its zeroed complex buffer,
//! 3. barrier, then the distributed transform: every rank transforms its rows,
//!    the coordinator gathers and transposes them, scatters the transposed rows,
//!    every rank transforms them and the coordinator gathers the result.
//!
//! The coordinator ends the frame with the full spectrum, in natural order.

use rayon::prelude::*;
use rustfft::num_complex::Complex;
use tracing::{debug, info};

use super::collective::{Communicator, COORDINATOR};
use super::partition::{local_rows, DistributionTable, PartitionDescriptor};
use crate::error::{Error, Result};
use crate::field::ComplexField;
use crate::pipeline::FrameCounter;
use crate::slice::{transpose_square, TransformPlan};

/// State of one rank of a row distributed forward transform.
#[derive(Debug)]
pub struct DistributedFft<C: Communicator> {
    comm: C,
    size: usize,
    plan: TransformPlan,
    local: PartitionDescriptor,
    input: Vec<f64>,
    buffer: Vec<Complex<f64>>,
    coordinator: Option<CoordinatorState>,
    counter: FrameCounter,
}

/// Buffers only the coordinator owns.
#[derive(Debug)]
struct CoordinatorState {
    table: DistributionTable,
    spectrum: ComplexField,
}

impl<C: Communicator> DistributedFft<C> {
    /// Size the local rows and collect the row assignments on the coordinator.
    ///
    /// This is a collective call. If the assignments do not tile the N rows,
    /// every rank returns an [`Error::Partition`] before any frame is run.
    pub fn new(comm: C, size: usize) -> Result<Self> {
        let local = local_rows(size, comm.size(), comm.rank());
        Self::with_rows(comm, size, local)
    }

    /// Same as [`new`](Self::new) with rows assigned by the caller.
    pub fn with_rows(comm: C, size: usize, local: PartitionDescriptor) -> Result<Self> {
        let plan = TransformPlan::forward(size)?;
        debug!(
            rank = comm.rank(),
            starting_row = local.starting_row,
            row_count = local.row_count,
            "local rows"
        );
        let table = collect_assignments(&comm, size, local)?;
        let coordinator = table.map(|table| CoordinatorState {
            table,
            spectrum: ComplexField::zeros(size),
        });
        Ok(Self {
            comm,
            size,
            plan,
            local,
            input: vec![0.0; local.row_count * size],
            buffer: vec![Complex::default(); local.row_count * size],
            coordinator,
            counter: FrameCounter::new(),
        })
    }

    /// The communicator of this rank.
    pub fn communicator(&self) -> &C {
        &self.comm
    }

    /// Rows owned by this rank.
    pub fn local_rows(&self) -> PartitionDescriptor {
        self.local
    }

    /// The distribution table, on the coordinator only.
    pub fn table(&self) -> Option<&DistributionTable> {
        self.coordinator.as_ref().map(|c| &c.table)
    }

    /// Frame counter of this rank.
    pub fn counter(&self) -> &FrameCounter {
        &self.counter
    }

    /// Run one frame.
    ///
    /// The coordinator provides the N×N source samples and gets back the spectrum,
    /// the other ranks pass `None` and get `None`.
    pub fn step(&mut self, source: Option<&[f64]>) -> Result<Option<&ComplexField>> {
        let n = self.size;
        let send = match (&self.coordinator, source) {
            (Some(state), Some(source)) => {
                if source.len() != n * n {
                    return Err(Error::SizeMismatch {
                        expected: n * n,
                        actual: source.len(),
                    });
                }
                Some((source, &state.table))
            }
            (Some(_), None) => {
                return Err(Error::protocol("coordinator needs the source image"));
            }
            (None, _) => None,
        };

        self.comm.barrier()?;
        self.comm.scatterv(COORDINATOR, send, &mut self.input)?;
        self.buffer
            .par_iter_mut()
            .zip(self.input.par_iter())
            .for_each(|(z, &v)| *z = Complex::new(v, 0.0));
        self.comm.barrier()?;

        self.forward()?;
        self.counter.increment();
        Ok(self.coordinator.as_ref().map(|c| &c.spectrum))
    }

    /// Run `frames` frames on the same source, calling `on_spectrum` on the coordinator after each.
    pub fn run<F>(&mut self, source: Option<&[f64]>, frames: u64, mut on_spectrum: F) -> Result<()>
    where
        F: FnMut(u64, &ComplexField),
    {
        for _ in 0..frames {
            let frame = self.counter.frames() + 1;
            if let Some(spectrum) = self.step(source)? {
                on_spectrum(frame, spectrum);
            }
        }
        if self.comm.is_coordinator() {
            info!(
                workers = self.comm.size(),
                frames = self.counter.frames(),
                fps = self.counter.fps(),
                "distributed transform done"
            );
        }
        Ok(())
    }

    /// This rank's part of the 2D transform of the rows in `buffer`.
    fn forward(&mut self) -> Result<()> {
        let n = self.size;

        // Rows.
        self.plan.execute_rows(&mut self.buffer)?;
        let recv = self
            .coordinator
            .as_mut()
            .map(|c| (c.spectrum.as_mut_slice(), &c.table));
        self.comm.gatherv(COORDINATOR, &self.buffer, recv)?;
        if let Some(state) = self.coordinator.as_mut() {
            transpose_square(n, state.spectrum.as_mut_slice());
        }

        // Columns, which are the rows of the transposed field.
        let send = self
            .coordinator
            .as_ref()
            .map(|c| (c.spectrum.as_slice(), &c.table));
        self.comm.scatterv(COORDINATOR, send, &mut self.buffer)?;
        self.plan.execute_rows(&mut self.buffer)?;
        let recv = self
            .coordinator
            .as_mut()
            .map(|c| (c.spectrum.as_mut_slice(), &c.table));
        self.comm.gatherv(COORDINATOR, &self.buffer, recv)?;
        if let Some(state) = self.coordinator.as_mut() {
            transpose_square(n, state.spectrum.as_mut_slice());
        }
        Ok(())
    }
}

fn collect_assignments<C: Communicator>(
    comm: &C,
    size: usize,
    local: PartitionDescriptor,
) -> Result<Option<DistributionTable>> {
    const OP: &str = "row assignment";
    comm.barrier()?;
    if !comm.is_coordinator() {
        comm.send(COORDINATOR, OP, local.to_wire().to_vec())?;
        let mut status: Vec<u64> = Vec::new();
        comm.broadcast(COORDINATOR, &mut status)?;
        return match status.as_slice() {
            [1] => Ok(None),
            _ => Err(Error::partition("row assignment rejected by the coordinator")),
        };
    }

    let mut descriptors = vec![local];
    for source in 1..comm.size() {
        let wire: Vec<u64> = comm.recv(source, OP)?;
        descriptors.push(PartitionDescriptor::from_wire(&wire)?);
    }
    for (rank, d) in descriptors.iter().enumerate() {
        debug!(rank, offset = d.starting_row * size, count = d.row_count * size, "assignment");
    }
    let table = DistributionTable::from_descriptors(size, size, &descriptors);
    let mut status = vec![u64::from(table.is_ok())];
    comm.broadcast(COORDINATOR, &mut status)?;
    table.map(Some)
}
