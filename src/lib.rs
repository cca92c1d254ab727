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

//! Cached, line-oriented serial sessions.
//!
//! A [`SessionRegistry`] opens at most one [`Session`] per device through a
//! caller-supplied [`TransportConnector`] and hands the same session back on
//! later opens. With the `bluetooth` feature, [`bluetooth`] provides an RFCOMM
//! connector backed by BlueZ.

#[cfg(feature = "bluetooth")]
pub mod bluetooth;
pub mod config;
pub mod device;
pub mod encoding;
pub mod error;
pub mod interface;
pub mod registry;
pub mod session;
pub mod transport;

pub use config::Config;
pub use device::DeviceId;
pub use encoding::TextEncoding;
pub use error::{Error, Result};
pub use interface::{SessionEvent, SessionInterface};
pub use registry::{SessionHandle, SessionRegistry};
pub use session::Session;
pub use transport::{
    BlockingConnector, BoxedStream, DuplexStream, KnownDevices, NoKnownDevices,
    TransportConnector,
};
