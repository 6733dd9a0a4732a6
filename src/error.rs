// SPDX-License-Identifier: MPL-2.0

//! Error type shared by the reconstruction pipeline and its distributed variant.

use thiserror::Error;

/// Result type for holofft operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while setting up or running a reconstruction.
///
/// Everything except the collective errors signals a static configuration
/// defect and is reported before the first frame is processed.
#[derive(Debug, Error)]
pub enum Error {
    /// The transform backend could not plan a transform of this size.
    #[error("cannot plan a {size}x{size} transform")]
    Plan {
        /// Requested side length.
        size: usize,
    },

    /// Input image dimensions do not match the configured field size.
    #[error("image is {width}x{height}, expected {expected}x{expected}")]
    ImageSize {
        /// Width of the rejected image.
        width: usize,
        /// Height of the rejected image.
        height: usize,
        /// Configured field side length.
        expected: usize,
    },

    /// A buffer does not have the length required by the plan or field it is used with.
    #[error("buffer holds {actual} samples, expected {expected}")]
    SizeMismatch {
        /// Required number of samples.
        expected: usize,
        /// Number of samples provided.
        actual: usize,
    },

    /// Worker row assignments do not tile the rows of the field exactly.
    #[error("invalid row partition: {0}")]
    Partition(String),

    /// A collective did not complete within the transport timeout.
    #[error("collective {op} timed out on rank {rank}")]
    CollectiveTimeout {
        /// Name of the collective operation.
        op: &'static str,
        /// Rank that gave up waiting.
        rank: usize,
    },

    /// A peer left the group while a collective was in flight.
    #[error("rank {peer} disconnected during {op}")]
    Disconnected {
        /// Name of the collective operation.
        op: &'static str,
        /// Rank of the missing peer.
        peer: usize,
    },

    /// A collective received a payload of the wrong kind or length.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a partition error with a custom message.
    pub fn partition<S: Into<String>>(msg: S) -> Self {
        Error::Partition(msg.into())
    }

    /// Create a protocol error with a custom message.
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Error::Protocol(msg.into())
    }

    /// Create a configuration error with a custom message.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_size_display() {
        let err = Error::ImageSize {
            width: 640,
            height: 480,
            expected: 1024,
        };
        assert_eq!(err.to_string(), "image is 640x480, expected 1024x1024");
    }

    #[test]
    fn partition_constructor() {
        let err = Error::partition("rows sum to 7, expected 8");
        assert!(matches!(err, Error::Partition(_)));
        assert!(err.to_string().contains("invalid row partition"));
    }

    #[test]
    fn timeout_display_names_rank() {
        let err = Error::CollectiveTimeout {
            op: "barrier",
            rank: 3,
        };
        assert_eq!(err.to_string(), "collective barrier timed out on rank 3");
    }
}
