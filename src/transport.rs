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

//! Transport capabilities consumed by the session registry.
//!
//! The registry never builds a transport itself: it is handed a
//! [`TransportConnector`] for each open and a [`KnownDevices`] provider for
//! enumerating candidates.

use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::device::DeviceId;

/// A duplex byte stream a session can own.
pub trait DuplexStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> DuplexStream for T {}

/// Type-erased duplex stream.
pub type BoxedStream = Box<dyn DuplexStream>;

/// Capability that opens a duplex stream to a device.
///
/// `connect` may take an unbounded amount of time (device negotiation); the
/// registry always drives it from a spawned task.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(&self, id: &DeviceId) -> io::Result<BoxedStream>;
}

#[async_trait]
impl<C: TransportConnector + ?Sized> TransportConnector for Arc<C> {
    async fn connect(&self, id: &DeviceId) -> io::Result<BoxedStream> {
        (**self).connect(id).await
    }
}

/// Capability that lists the devices a caller may connect to.
#[async_trait]
pub trait KnownDevices: Send + Sync {
    async fn list_known(&self) -> io::Result<Vec<DeviceId>>;
}

/// Provider with no known devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoKnownDevices;

#[async_trait]
impl KnownDevices for NoKnownDevices {
    async fn list_known(&self) -> io::Result<Vec<DeviceId>> {
        Ok(Vec::new())
    }
}

/// A fixed list of devices.
#[async_trait]
impl KnownDevices for Vec<DeviceId> {
    async fn list_known(&self) -> io::Result<Vec<DeviceId>> {
        Ok(self.clone())
    }
}

/// Adapts a blocking connect function into a [`TransportConnector`].
///
/// The function runs on tokio's blocking pool.
pub struct BlockingConnector<F> {
    connect: Arc<F>,
}

impl<F, S> BlockingConnector<F>
where
    F: Fn(&DeviceId) -> io::Result<S> + Send + Sync + 'static,
    S: DuplexStream + 'static,
{
    pub fn new(connect: F) -> Self {
        Self {
            connect: Arc::new(connect),
        }
    }
}

#[async_trait]
impl<F, S> TransportConnector for BlockingConnector<F>
where
    F: Fn(&DeviceId) -> io::Result<S> + Send + Sync + 'static,
    S: DuplexStream + 'static,
{
    async fn connect(&self, id: &DeviceId) -> io::Result<BoxedStream> {
        let connect = self.connect.clone();
        let id = id.clone();

        let stream = tokio::task::spawn_blocking(move || connect(&id))
            .await
            .map_err(io::Error::other)??;

        Ok(Box::new(stream))
    }
}
