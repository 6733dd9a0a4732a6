// SPDX-License-Identifier: MPL-2.0

//! Forward transform split by rows over a group of cooperating workers.
//!
//! Rank 0 is the coordinator: it owns the source image, collects the row
//! assignments of all ranks and drives the scatter and gather of every frame.
//!
//! ```no_run
//! use holofft::distributed::{Communicator, DistributedFft, LocalGroup};
//!
//! let size = 1024;
//! let image = vec![0.0; size * size];
//! LocalGroup::new().run(4, |comm| {
//!     let is_coordinator = comm.is_coordinator();
//!     let mut fft = DistributedFft::new(comm, size)?;
//!     let source = if is_coordinator { Some(&image[..]) } else { None };
//!     fft.run(source, 300, |_frame, _spectrum| {})
//! });
//! ```

pub mod collective;
pub mod partition;
pub mod worker;

pub use collective::{Communicator, Element, LocalEndpoint, LocalGroup, Payload, COORDINATOR};
pub use partition::{
    all_rows, local_rows, DistributionEntry, DistributionTable, PartitionDescriptor,
};
pub use worker::DistributedFft;
