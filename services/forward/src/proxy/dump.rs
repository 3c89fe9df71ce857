//! Data dump sink for relayed chunks.
//!
//! At [`LogLevel::Data`](crate::LogLevel::Data) every chunk a pump relays is
//! copied here, framed so consecutive chunks stay visually apart. Status
//! logging goes to stderr through `tracing`; dumps default to stdout.

use std::io::{self, Write};

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

/// Marker appended to chunks that do not end in a newline.
pub const END_MARKER: &[u8] = b"<<END>>\n";

enum Frame {
    Chunk(Vec<u8>),
    Flush(oneshot::Sender<()>),
}

/// Queue of framed chunks drained by a dedicated writer thread.
///
/// Pumps only enqueue, so a slow stdout reader never blocks the runtime.
/// Chunks are written in the order they were queued.
#[derive(Clone)]
pub struct DataDump {
    frames: mpsc::UnboundedSender<Frame>,
}

impl DataDump {
    pub fn new<W>(writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        let (frames, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || write_frames(writer, rx));
        Self { frames }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Queue one framed chunk: `<tag>Data:\n`, the bytes, then [`END_MARKER`]
    /// unless the chunk already ends in a newline.
    pub fn chunk(&self, tag: &str, data: &[u8]) -> io::Result<()> {
        let mut framed = Vec::with_capacity(tag.len() + 6 + data.len() + END_MARKER.len());
        framed.extend_from_slice(tag.as_bytes());
        framed.extend_from_slice(b"Data:\n");
        framed.extend_from_slice(data);
        if data.last() != Some(&b'\n') {
            framed.extend_from_slice(END_MARKER);
        }

        self.frames
            .send(Frame::Chunk(framed))
            .map_err(|_| io::Error::other("data dump writer stopped"))
    }

    /// Wait until every chunk queued before this call has been written.
    pub async fn flush(&self) {
        let (done, written) = oneshot::channel();
        if self.frames.send(Frame::Flush(done)).is_ok() {
            let _ = written.await;
        }
    }
}

/// Writer thread body. Exits once every [`DataDump`] handle is dropped.
fn write_frames<W: Write>(mut writer: W, mut frames: mpsc::UnboundedReceiver<Frame>) {
    while let Some(frame) = frames.blocking_recv() {
        match frame {
            Frame::Chunk(bytes) => {
                if let Err(e) = writer.write_all(&bytes).and_then(|()| writer.flush()) {
                    warn!(error = %e, "Failed to write data dump");
                }
            }
            Frame::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

impl Default for DataDump {
    fn default() -> Self {
        Self::stdout()
    }
}

impl std::fmt::Debug for DataDump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataDump").finish_non_exhaustive()
    }
}
