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

//! Bluetooth RFCOMM client implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bluer::rfcomm::{SocketAddr, Stream};
use bluer::{Adapter, Address};
use std::io;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::BluetoothConfig;
use crate::device::DeviceId;
use crate::encoding::TextEncoding;
use crate::registry::SessionRegistry;
use crate::transport::{BoxedStream, KnownDevices, TransportConnector};

/// Standard SPP UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// Open a BlueZ session and return the named adapter, or the default one.
///
/// The adapter is powered on if it is not already.
pub async fn open_adapter(name: Option<&str>) -> Result<Adapter> {
    info!("Initializing Bluetooth adapter...");

    let session = bluer::Session::new()
        .await
        .context("connecting to bluetoothd")?;
    let adapter = match name {
        Some(name) => session.adapter(name)?,
        None => session.default_adapter().await?,
    };
    info!("Using Bluetooth adapter: {}", adapter.name());

    if !adapter.is_powered().await? {
        info!("Powering on Bluetooth adapter...");
        adapter.set_powered(true).await?;
    }

    Ok(adapter)
}

/// Build a registry whose candidates are the adapter's paired devices, along
/// with a connector for opening sessions on it.
pub async fn open_registry(
    config: &BluetoothConfig,
    encoding: TextEncoding,
) -> Result<(SessionRegistry, RfcommConnector)> {
    let adapter = open_adapter(config.adapter.as_deref()).await?;
    let registry = SessionRegistry::new(PairedDevices::new(adapter.clone()))
        .with_default_encoding(encoding);
    let connector = RfcommConnector::new(adapter, config.channel);
    Ok((registry, connector))
}

/// Parse a device identifier as a Bluetooth address.
pub fn parse_address(id: &DeviceId) -> io::Result<Address> {
    id.as_str().parse::<Address>().map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid Bluetooth address {:?}: {}", id.as_str(), e),
        )
    })
}

/// Connects RFCOMM streams on a fixed channel.
#[derive(Clone)]
pub struct RfcommConnector {
    adapter: Adapter,
    channel: u8,
}

impl RfcommConnector {
    pub fn new(adapter: Adapter, channel: u8) -> Self {
        Self { adapter, channel }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }
}

#[async_trait]
impl TransportConnector for RfcommConnector {
    async fn connect(&self, id: &DeviceId) -> io::Result<BoxedStream> {
        let address = parse_address(id)?;
        debug!(
            "Connecting to {} via {} (SPP {}, channel {})",
            address,
            self.adapter.name(),
            SPP_UUID,
            self.channel
        );

        let stream = Stream::connect(SocketAddr::new(address, self.channel)).await?;
        info!("RFCOMM connection established: {}", address);
        Ok(Box::new(stream))
    }
}

/// Lists the adapter's paired devices.
#[derive(Clone)]
pub struct PairedDevices {
    adapter: Adapter,
}

impl PairedDevices {
    pub fn new(adapter: Adapter) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl KnownDevices for PairedDevices {
    async fn list_known(&self) -> io::Result<Vec<DeviceId>> {
        let mut devices = Vec::new();

        for addr in self.adapter.device_addresses().await.map_err(io::Error::other)? {
            let device = self.adapter.device(addr).map_err(io::Error::other)?;
            if device.is_paired().await.map_err(io::Error::other)? {
                devices.push(DeviceId::new(addr.to_string()));
            }
        }

        Ok(devices)
    }
}
