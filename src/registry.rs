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

//! Session registry: a cache of open sessions keyed by device.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::device::DeviceId;
use crate::encoding::TextEncoding;
use crate::error::{Error, Result};
use crate::session::Session;
use crate::transport::{KnownDevices, NoKnownDevices, TransportConnector};

/// Anything that names the device a session belongs to.
///
/// Lets [`SessionRegistry::close`] take an identifier, a session or an
/// interface wrapping one.
pub trait SessionHandle {
    fn device_id(&self) -> &str;
}

impl SessionHandle for str {
    fn device_id(&self) -> &str {
        self
    }
}

impl SessionHandle for String {
    fn device_id(&self) -> &str {
        self
    }
}

impl SessionHandle for DeviceId {
    fn device_id(&self) -> &str {
        self.as_str()
    }
}

impl SessionHandle for Session {
    fn device_id(&self) -> &str {
        self.id().as_str()
    }
}

impl<H: SessionHandle + ?Sized> SessionHandle for Arc<H> {
    fn device_id(&self) -> &str {
        (**self).device_id()
    }
}

type PendingOpen = Shared<BoxFuture<'static, Result<Arc<Session>>>>;

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<DeviceId, Arc<Session>>,
    pending: HashMap<DeviceId, PendingOpen>,
}

/// Cache and lifecycle coordinator for sessions.
///
/// Holds at most one session per device. Opening a device that is already
/// cached returns the cached session; opening one that is being connected
/// waits for that connect instead of starting another. Cloning the registry
/// yields another handle to the same cache.
///
/// Call [`close_all`](Self::close_all) on teardown.
#[derive(Clone)]
pub struct SessionRegistry {
    state: Arc<Mutex<RegistryState>>,
    known: Arc<dyn KnownDevices>,
    default_encoding: TextEncoding,
}

impl SessionRegistry {
    /// Create a registry that lists candidates from `known`.
    pub fn new(known: impl KnownDevices + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState::default())),
            known: Arc::new(known),
            default_encoding: TextEncoding::default(),
        }
    }

    /// Set the encoding used by [`open`](Self::open).
    pub fn with_default_encoding(mut self, encoding: TextEncoding) -> Self {
        self.default_encoding = encoding;
        self
    }

    pub fn default_encoding(&self) -> TextEncoding {
        self.default_encoding
    }

    /// List devices a session could be opened to, as reported by the
    /// provider.
    pub async fn list_candidates(&self) -> io::Result<Vec<DeviceId>> {
        self.known.list_known().await
    }

    /// Open a session using the registry's default encoding.
    pub async fn open<C>(&self, id: impl Into<DeviceId>, connector: C) -> Result<Arc<Session>>
    where
        C: TransportConnector + 'static,
    {
        self.open_with_encoding(id, connector, self.default_encoding)
            .await
    }

    /// Open a session to `id`, or return the cached one.
    ///
    /// On a cache hit `connector` and `encoding` are ignored: the encoding
    /// chosen by the first opener stays for the life of the session.
    ///
    /// The connect runs on a spawned task and is attempted exactly once.
    /// Dropping the returned future does not abort it; a session that
    /// connects after every caller has gone away is still cached.
    pub async fn open_with_encoding<C>(
        &self,
        id: impl Into<DeviceId>,
        connector: C,
        encoding: TextEncoding,
    ) -> Result<Arc<Session>>
    where
        C: TransportConnector + 'static,
    {
        let id = id.into();

        let pending = {
            let mut state = self.state.lock();
            if let Some(session) = state.sessions.get(&id) {
                debug!("Reusing open session for {}", id);
                return Ok(session.clone());
            }

            match state.pending.get(&id) {
                Some(pending) => {
                    debug!("Joining in-flight connect for {}", id);
                    pending.clone()
                }
                None => {
                    let pending = self.spawn_connect(id.clone(), connector, encoding);
                    state.pending.insert(id, pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Start the connect task. Must be called with the state lock held so
    /// that the task's cleanup runs after the pending entry is inserted.
    fn spawn_connect<C>(&self, id: DeviceId, connector: C, encoding: TextEncoding) -> PendingOpen
    where
        C: TransportConnector + 'static,
    {
        info!("Connecting to {}...", id);
        let state = self.state.clone();
        let cleanup = self.state.clone();
        let task_id = id.clone();

        let task = tokio::spawn(async move {
            let id = task_id;
            let connected = connector.connect(&id).await;

            let mut state = state.lock();
            state.pending.remove(&id);

            match connected {
                Ok(stream) => {
                    let session = Arc::new(Session::new(id.clone(), stream, encoding));
                    state.sessions.insert(id.clone(), session.clone());
                    info!("Session opened: {} ({})", id, encoding);
                    Ok(session)
                }
                Err(e) => {
                    warn!("Connection to {} failed: {}", id, e);
                    Err(Error::connection_failed(&id, e))
                }
            }
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(join_err) => {
                    // The task died before it could clear its own entry.
                    cleanup.lock().pending.remove(&id);
                    warn!("Connect task for {} aborted: {}", id, join_err);
                    Err(Error::connection_failed(&id, io::Error::other(join_err)))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Cached session for `id`, if any.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.state.lock().sessions.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().sessions.contains_key(id)
    }

    /// Number of cached sessions.
    pub fn len(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().sessions.is_empty()
    }

    /// Remove a session from the cache and close it.
    ///
    /// Close errors are logged and discarded so the cache is always left
    /// consistent. Unknown identifiers are ignored. An in-flight open for the
    /// same device is not cancelled.
    pub async fn close<H: SessionHandle + ?Sized>(&self, handle: &H) {
        let id = handle.device_id();
        let removed = self.state.lock().sessions.remove(id);

        if let Some(session) = removed {
            if let Err(e) = session.close().await {
                warn!("Ignoring close error for {}: {}", id, e);
            }
        }
    }

    /// Close every cached session and empty the cache.
    ///
    /// A failure closing one session does not stop the others from being
    /// closed.
    pub async fn close_all(&self) {
        let sessions = std::mem::take(&mut self.state.lock().sessions);
        if sessions.is_empty() {
            return;
        }

        info!("Closing {} session(s)", sessions.len());
        for (id, session) in sessions {
            if let Err(e) = session.close().await {
                warn!("Ignoring close error for {}: {}", id, e);
            }
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(NoKnownDevices)
    }
}
