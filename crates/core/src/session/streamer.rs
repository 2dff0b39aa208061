use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Result, RtspError};
use crate::media::FrameSource;
use crate::media::packetizer::{MAX_FRAME_LEN, Packetizer};
use crate::transport::UdpTransport;

use super::{SessionRegistry, SessionState};

/// Default pacing interval: 25 frames per second.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(40);

/// What a finished streaming thread hands back to its session.
pub struct StreamOutcome {
    /// The frame source, returned so the session can resume or close it.
    pub frames: Box<dyn FrameSource>,
    /// Packets sent during this run.
    pub sent: u64,
    /// Set when the thread stopped on its own because a send failed.
    pub error: Option<RtspError>,
}

/// Handle to the streaming thread of one playing session.
///
/// The thread owns the session's frame source while it runs. Each tick it
/// waits on the stop channel with the tick as timeout, so a stop request is
/// observed within one interval. [`stop`](Self::stop) signals and joins:
/// once it returns, no further packet can leave for this session.
///
/// A thread that stops on a send failure marks its registry entry Ready
/// before exiting; the owning session joins it on its next request.
pub struct StreamTask {
    session_id: u32,
    stop_tx: Sender<()>,
    handle: JoinHandle<StreamOutcome>,
}

impl StreamTask {
    pub fn spawn(
        session_id: u32,
        frames: Box<dyn FrameSource>,
        transport: UdpTransport,
        packetizer: Packetizer,
        interval: Duration,
        sessions: SessionRegistry,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(format!("stream-{session_id}"))
            .spawn(move || {
                let mut frames = frames;
                let mut sent = 0u64;
                let error = loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break None,
                    }

                    let Some(frame) = frames.next_frame() else {
                        tracing::trace!(session_id, "no frame this tick");
                        continue;
                    };
                    let frame_number = frames.frame_number();
                    if frame.len() > MAX_FRAME_LEN {
                        tracing::warn!(
                            session_id,
                            frame = frame_number,
                            len = frame.len(),
                            "frame exceeds datagram size, skipped"
                        );
                        continue;
                    }

                    let packet = packetizer.packetize(frame_number, &frame);
                    match transport.send(&packet) {
                        Ok(_) => {
                            sent += 1;
                            tracing::trace!(session_id, frame = frame_number, "packet sent");
                        }
                        Err(e) => {
                            tracing::warn!(
                                session_id,
                                peer = %transport.peer(),
                                error = %e,
                                "data send failed, stopping stream"
                            );
                            break Some(e);
                        }
                    }
                };

                if error.is_some() {
                    sessions.set_state(session_id, SessionState::Ready);
                }
                tracing::debug!(session_id, sent, "stream loop exited");
                StreamOutcome {
                    frames,
                    sent,
                    error,
                }
            })?;

        tracing::debug!(session_id, ?interval, "stream started");
        Ok(Self {
            session_id,
            stop_tx,
            handle,
        })
    }

    /// Whether the thread has already exited on its own.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the thread to stop and wait for it to exit.
    pub fn stop(self) -> Result<StreamOutcome> {
        // A send error only means the thread already left its loop.
        let _ = self.stop_tx.send(());
        self.handle
            .join()
            .map_err(|_| RtspError::StreamPanicked(self.session_id))
    }
}
