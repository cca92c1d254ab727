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

//! A single open serial session.

use std::fmt;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::device::DeviceId;
use crate::encoding::TextEncoding;
use crate::error::{session_closed, Error, Result};
use crate::transport::BoxedStream;

/// Line terminator appended by [`Session::write_line`].
pub const LINE_TERMINATOR: u8 = b'\n';

/// One open connection to a device.
///
/// A session exclusively owns its stream. Reads and writes are independent:
/// a pending [`read_line`](Session::read_line) never blocks a write.
/// Concurrent readers are serialized, but which one gets which line is
/// unspecified, so keep to a single reader per session.
///
/// Sessions are created by [`SessionRegistry`](crate::SessionRegistry) and
/// should be closed through it so the cache stays consistent.
pub struct Session {
    id: DeviceId,
    encoding: TextEncoding,
    reader: Mutex<Option<BufReader<ReadHalf<BoxedStream>>>>,
    writer: Mutex<Option<WriteHalf<BoxedStream>>>,
    closed: CancellationToken,
}

impl Session {
    pub(crate) fn new(id: DeviceId, stream: BoxedStream, encoding: TextEncoding) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            id,
            encoding,
            reader: Mutex::new(Some(BufReader::new(reader))),
            writer: Mutex::new(Some(writer)),
            closed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    /// Encoding used for line reads and writes.
    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    pub fn is_open(&self) -> bool {
        !self.closed.is_cancelled()
    }

    /// Read the next line.
    ///
    /// Returns `Ok(None)` at end of stream. The terminator (`\n` or `\r\n`)
    /// is stripped. A final line without a terminator is still returned.
    pub async fn read_line(&self) -> Result<Option<String>> {
        let mut reader = self.reader.lock().await;
        let reader = reader
            .as_mut()
            .ok_or_else(|| Error::read_failed(&self.id, session_closed()))?;

        let mut buf = Vec::new();
        let read = tokio::select! {
            res = reader.read_until(LINE_TERMINATOR, &mut buf) => res,
            _ = self.closed.cancelled() => Err(session_closed()),
        };

        match read {
            Ok(0) => {
                debug!("End of stream from {}", self.id);
                Ok(None)
            }
            Ok(_) => {
                if buf.last() == Some(&LINE_TERMINATOR) {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                let line = self.encoding.decode(&buf);
                debug!("Received from {}: {}", self.id, line);
                Ok(Some(line))
            }
            Err(e) => Err(Error::read_failed(&self.id, e)),
        }
    }

    /// Read raw bytes from the input side. Returns `Ok(0)` at end of stream.
    pub async fn read_bytes(&self, buf: &mut [u8]) -> Result<usize> {
        let mut reader = self.reader.lock().await;
        let reader = reader
            .as_mut()
            .ok_or_else(|| Error::read_failed(&self.id, session_closed()))?;

        tokio::select! {
            res = reader.read(buf) => res.map_err(|e| Error::read_failed(&self.id, e)),
            _ = self.closed.cancelled() => Err(Error::read_failed(&self.id, session_closed())),
        }
    }

    /// Write raw bytes and flush.
    ///
    /// A write stalled because the peer stopped reading fails with
    /// [`Error::WriteFailed`] once the session is closed.
    pub async fn write_bytes(&self, data: &[u8]) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(Error::write_failed(&self.id, session_closed()));
        }

        let mut writer = self.writer.lock().await;
        let writer = writer
            .as_mut()
            .ok_or_else(|| Error::write_failed(&self.id, session_closed()))?;

        let written = tokio::select! {
            res = async {
                writer.write_all(data).await?;
                writer.flush().await
            } => res,
            _ = self.closed.cancelled() => Err(session_closed()),
        };
        written.map_err(|e| Error::write_failed(&self.id, e))
    }

    /// Encode `text` and write it followed by `\n`.
    pub async fn write_line(&self, text: &str) -> Result<()> {
        let mut data = self.encoding.encode(text);
        data.push(LINE_TERMINATOR);
        debug!("Sending to {}: {}", self.id, text);
        self.write_bytes(&data).await
    }

    /// Close the underlying stream.
    ///
    /// Pending reads fail with [`Error::ReadFailed`] and pending writes with
    /// [`Error::WriteFailed`]. Closing an already closed session reports
    /// [`Error::CloseFailed`]; callers going through the registry never do
    /// that.
    pub async fn close(&self) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(Error::close_failed(&self.id, session_closed()));
        }
        // Wake blocked I/O first so the locks below are released.
        self.closed.cancel();

        let writer = self.writer.lock().await.take();
        let Some(mut writer) = writer else {
            return Err(Error::close_failed(&self.id, session_closed()));
        };

        let shutdown = writer.shutdown().await;
        drop(writer);
        self.reader.lock().await.take();

        info!("Session closed: {}", self.id);
        shutdown.map_err(|e| Error::close_failed(&self.id, e))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("encoding", &self.encoding)
            .field("open", &self.is_open())
            .finish()
    }
}
