//! Video stream intake.
//!
//! Once `streamon` is issued the drone pushes raw H.264 at the stream port
//! in UDP chunks of at most 1460 bytes; a shorter chunk marks the end of the
//! current frame. The receive loop reassembles chunks into frames and hands
//! them to the consumer over a channel, so a slow consumer never blocks the
//! socket read.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// Port the drone streams video to.
const VIDEO_STREAM_PORT: u16 = 11111;

/// Full chunk size; anything smaller terminates the frame.
const VIDEO_CHUNK_SIZE: usize = 1460;

/// Collects stream chunks until a frame boundary.
pub struct FrameAssembler {
    buf: Vec<u8>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Append one chunk. Returns the completed frame when this chunk is the
    /// frame's last one.
    pub fn push(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        self.buf.extend_from_slice(chunk);
        if chunk.len() < VIDEO_CHUNK_SIZE {
            Some(std::mem::take(&mut self.buf))
        } else {
            None
        }
    }
}

pub struct VideoStream {
    socket: Arc<UdpSocket>,
}

impl VideoStream {
    /// Bind the stream port.
    pub async fn bind() -> Result<Self, String> {
        let addr = format!("0.0.0.0:{VIDEO_STREAM_PORT}");
        let socket = UdpSocket::bind(&addr)
            .await
            .map_err(|e| format!("Failed to bind video stream socket on {addr}: {e}"))?;
        log::info!("Video stream socket bound on {addr}");
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    /// Spawn the receive loop. Each reassembled frame is sent to the
    /// returned channel; the loop ends when the receiver is dropped.
    pub fn spawn_recv_loop(&self) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let socket = self.socket.clone();

        tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            let mut assembler = FrameAssembler::new();
            loop {
                let len = match socket.recv_from(&mut buf).await {
                    Ok((len, _)) => len,
                    Err(e) => {
                        log::warn!("Video stream recv error: {e}");
                        continue;
                    }
                };

                if let Some(frame) = assembler.push(&buf[..len]) {
                    if tx.send(frame).is_err() {
                        log::info!("Video recv loop: channel closed, stopping");
                        break;
                    }
                }
            }
        });

        rx
    }
}
