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

//! Event-driven wrapper around a session.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::SessionConfig;
use crate::error::Result;
use crate::registry::SessionHandle;
use crate::session::Session;

/// Events emitted by a [`SessionInterface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A line arrived from the device.
    MessageReceived(String),
    /// A line was written to the device.
    MessageSent(String),
    /// Reading or writing failed.
    Error(String),
    /// The input side reached end of stream or failed; no more lines follow.
    Disconnected,
}

/// Reads lines from a session in the background and reports them as events.
///
/// Dropping the interface stops the reader task but leaves the session open;
/// close it through the registry.
pub struct SessionInterface {
    session: Arc<Session>,
    event_tx: mpsc::Sender<SessionEvent>,
    reader: JoinHandle<()>,
}

impl SessionInterface {
    /// Start reading from `session`.
    ///
    /// This takes over the session's input side; do not call
    /// [`Session::read_line`] elsewhere while the interface is alive.
    pub fn spawn(
        session: Arc<Session>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(capacity);

        let reader = tokio::spawn(Self::read_loop(session.clone(), event_tx.clone()));

        (
            Self {
                session,
                event_tx,
                reader,
            },
            event_rx,
        )
    }

    /// Start reading from `session` with the channel capacity from `config`.
    pub fn spawn_with_config(
        session: Arc<Session>,
        config: &SessionConfig,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        Self::spawn(session, config.event_capacity)
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Send a line to the device.
    ///
    /// The `MessageSent`/`Error` event is dropped, with a warning, if the
    /// event channel is full, so this never waits on the event consumer.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        match self.session.write_line(text).await {
            Ok(()) => {
                self.emit(SessionEvent::MessageSent(text.to_string()));
                Ok(())
            }
            Err(e) => {
                self.emit(SessionEvent::Error(e.to_string()));
                Err(e)
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("Event channel full, dropping {:?}", event);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    async fn read_loop(session: Arc<Session>, event_tx: mpsc::Sender<SessionEvent>) {
        info!("Reader started for {}", session.id());

        loop {
            match session.read_line().await {
                Ok(Some(line)) => {
                    if event_tx
                        .send(SessionEvent::MessageReceived(line))
                        .await
                        .is_err()
                    {
                        // Nobody is listening any more.
                        break;
                    }
                }
                Ok(None) => {
                    info!("Connection closed by remote: {}", session.id());
                    let _ = event_tx.send(SessionEvent::Disconnected).await;
                    break;
                }
                Err(e) => {
                    error!("Read error: {}", e);
                    let _ = event_tx.send(SessionEvent::Error(e.to_string())).await;
                    let _ = event_tx.send(SessionEvent::Disconnected).await;
                    break;
                }
            }
        }
    }
}

impl SessionHandle for SessionInterface {
    fn device_id(&self) -> &str {
        self.session.id().as_str()
    }
}

impl Drop for SessionInterface {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
