// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types for session and registry operations.

use std::io;
use std::sync::Arc;
use thiserror::Error;

use crate::device::DeviceId;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by sessions and the session registry.
///
/// Causes are kept behind an `Arc` so that a single failed connect can be
/// handed to every caller waiting on it.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("failed to connect to {id}: {source}")]
    ConnectionFailed {
        id: DeviceId,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("failed to write to {id}: {source}")]
    WriteFailed {
        id: DeviceId,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("failed to read from {id}: {source}")]
    ReadFailed {
        id: DeviceId,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("failed to close {id}: {source}")]
    CloseFailed {
        id: DeviceId,
        #[source]
        source: Arc<io::Error>,
    },
}

impl Error {
    pub(crate) fn connection_failed(id: &DeviceId, source: io::Error) -> Self {
        Self::ConnectionFailed {
            id: id.clone(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn write_failed(id: &DeviceId, source: io::Error) -> Self {
        Self::WriteFailed {
            id: id.clone(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn read_failed(id: &DeviceId, source: io::Error) -> Self {
        Self::ReadFailed {
            id: id.clone(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn close_failed(id: &DeviceId, source: io::Error) -> Self {
        Self::CloseFailed {
            id: id.clone(),
            source: Arc::new(source),
        }
    }

    /// Device the failed operation was addressed to.
    pub fn device_id(&self) -> &DeviceId {
        match self {
            Self::ConnectionFailed { id, .. }
            | Self::WriteFailed { id, .. }
            | Self::ReadFailed { id, .. }
            | Self::CloseFailed { id, .. } => id,
        }
    }

    /// Underlying transport error.
    pub fn io_error(&self) -> &io::Error {
        match self {
            Self::ConnectionFailed { source, .. }
            | Self::WriteFailed { source, .. }
            | Self::ReadFailed { source, .. }
            | Self::CloseFailed { source, .. } => source,
        }
    }
}

/// The error reported for I/O on a session that has already been closed.
pub(crate) fn session_closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "session is closed")
}
