//! Audio inputs for a session's transmit path.

use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

/// Where outbound audio comes from.
pub enum AudioSource {
    /// A finite in-memory buffer.
    Buffer(Bytes),
    /// Any async reader, read until EOF.
    Reader(Box<dyn AsyncRead + Send + Unpin>),
    /// Chunks pushed by an [`AudioFeeder`]; ends when every feeder is dropped.
    Channel(mpsc::Receiver<Bytes>),
}

impl AudioSource {
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        AudioSource::Buffer(data.into())
    }

    pub fn from_reader<R: AsyncRead + Send + Unpin + 'static>(reader: R) -> Self {
        AudioSource::Reader(Box::new(reader))
    }

    /// A caller-fed source; `capacity` bounds how many chunks may be queued.
    pub fn channel(capacity: usize) -> (AudioSource, AudioFeeder) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (AudioSource::Channel(rx), AudioFeeder { tx })
    }

    /// Next non-empty chunk of at most `chunk_size` bytes, `None` at end of input.
    pub(crate) async fn next_chunk(&mut self, chunk_size: usize) -> Result<Option<Bytes>> {
        match self {
            AudioSource::Buffer(data) => {
                if data.is_empty() {
                    return Ok(None);
                }
                let n = chunk_size.min(data.len());
                Ok(Some(data.split_to(n)))
            }
            AudioSource::Reader(reader) => {
                let mut buf = BytesMut::zeroed(chunk_size);
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    return Ok(None);
                }
                buf.truncate(n);
                Ok(Some(buf.freeze()))
            }
            AudioSource::Channel(rx) => loop {
                match rx.recv().await {
                    Some(chunk) if chunk.is_empty() => continue,
                    other => return Ok(other),
                }
            },
        }
    }
}

impl std::fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioSource::Buffer(b) => f.debug_tuple("Buffer").field(&b.len()).finish(),
            AudioSource::Reader(_) => f.write_str("Reader"),
            AudioSource::Channel(_) => f.write_str("Channel"),
        }
    }
}

/// Sending half of [`AudioSource::Channel`].
///
/// `send` waits while the queue is full, so a slow connection slows the
/// producer instead of growing memory. Dropping every feeder ends the audio.
#[derive(Clone)]
pub struct AudioFeeder {
    tx: mpsc::Sender<Bytes>,
}

impl AudioFeeder {
    pub async fn send(&self, chunk: impl Into<Bytes>) -> Result<()> {
        self.tx
            .send(chunk.into())
            .await
            .map_err(|_| Error::SessionClosed)
    }

    /// Give up this handle's share of the audio stream.
    ///
    /// Audio ends once every clone of the feeder has been finished or dropped;
    /// a clone still held elsewhere keeps the stream open.
    pub fn finish(self) {}

    /// True once the session stopped reading audio.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
