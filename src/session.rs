//! Connect and read tasks for one connection session.
//!
//! Both tasks run their blocking transport calls on tokio's blocking pool
//! and report back through the dispatch queue, tagged with the session epoch
//! so the engine can drop results of cancelled sessions.

use std::io;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::dispatch::{Job, JobSender};
use crate::error::TransportError;
use crate::notify::DisconnectReason;
use crate::protocol::{Decoded, FrameDecoder, FrameProfile};
use crate::reading::{Reading, ReadingSlot};
use crate::transport::{Adapter, Connection, DeviceHandle};

/// Connect task.
///
/// Waits for the tasks of earlier sessions to wind down, then cancels
/// discovery and connects. On failure the channel is closed before the
/// failure is reported.
pub(crate) async fn connect_task<A: Adapter>(
    adapter: Arc<A>,
    conn: Arc<A::Connection>,
    device: DeviceHandle,
    epoch: u64,
    retired: Vec<JoinHandle<()>>,
    queue: JobSender<A>,
) {
    for task in retired {
        let _ = task.await;
    }

    tracing::debug!(device = %device, epoch, "Connecting");

    let outcome = {
        let conn = conn.clone();
        tokio::task::spawn_blocking(move || {
            adapter.cancel_discovery();
            conn.connect()
        })
        .await
    };

    let job = match outcome {
        Ok(Ok(())) => Job::Connected { epoch },
        Ok(Err(error)) => {
            conn.close();
            Job::ConnectFailed { epoch, error }
        }
        Err(join_error) => {
            conn.close();
            let error = io::Error::new(io::ErrorKind::Other, join_error.to_string());
            Job::ConnectFailed {
                epoch,
                error: TransportError::Io(error),
            }
        }
    };

    let _ = queue.send(job);
}

/// Read task. Runs until the stream ends, fails or the channel is closed.
pub(crate) async fn read_task<A: Adapter>(
    conn: Arc<A::Connection>,
    profile: Arc<dyn FrameProfile>,
    reading: Arc<ReadingSlot>,
    epoch: u64,
    queue: JobSender<A>,
) {
    let reason = tokio::task::spawn_blocking(move || {
        let mut decoder = FrameDecoder::new(profile);
        read_loop(&*conn, &mut decoder, &reading)
    })
    .await
    .unwrap_or_else(|join_error| {
        DisconnectReason::ReadFailed(TransportError::Io(io::Error::new(
            io::ErrorKind::Other,
            join_error.to_string(),
        )))
    });

    tracing::debug!(epoch, %reason, "Read loop stopped");
    let _ = queue.send(Job::ReadEnded { epoch, reason });
}

/// Blocking read loop: fill the frame buffer, decode, publish.
pub(crate) fn read_loop<C, P>(
    conn: &C,
    decoder: &mut FrameDecoder<P>,
    reading: &ReadingSlot,
) -> DisconnectReason
where
    C: Connection + ?Sized,
    P: FrameProfile,
{
    loop {
        let n = match conn.read(decoder.unfilled_mut()) {
            Ok(0) => return DisconnectReason::EndOfStream,
            Ok(n) => n,
            Err(e) => return DisconnectReason::ReadFailed(e),
        };

        if let Decoded::Value(value) = decoder.commit(n) {
            tracing::trace!(hr = value, "Heart rate");
            reading.publish(Reading::now(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{polar, zephyr, PolarProfile, ZephyrProfile};
    use crate::transport::ScriptedConnection;

    #[test]
    fn test_read_loop_publishes_and_ends() {
        let frame = zephyr::build_frame(75);
        let conn = ScriptedConnection::new()
            .with_chunk(frame[..20].to_vec())
            .with_chunk(frame[20..].to_vec());
        conn.end();

        let slot = ReadingSlot::new();
        let mut decoder = FrameDecoder::new(ZephyrProfile);
        let reason = read_loop(&conn, &mut decoder, &slot);

        assert!(matches!(reason, DisconnectReason::EndOfStream));
        assert_eq!(slot.latest().map(|r| r.value), Some(75));
    }

    #[test]
    fn test_read_loop_keeps_latest() {
        let conn = ScriptedConnection::new();
        for (seq, hr) in [61u8, 62, 63].into_iter().enumerate() {
            conn.feed(polar::build_frame(hr, seq as u8).to_vec());
        }
        conn.end();

        let slot = ReadingSlot::new();
        let mut decoder = FrameDecoder::new(PolarProfile);
        read_loop(&conn, &mut decoder, &slot);

        assert_eq!(slot.latest().map(|r| r.value), Some(63));
    }

    #[test]
    fn test_read_loop_reports_errors() {
        let conn = ScriptedConnection::new().with_chunk(vec![0u8; 5]);
        conn.fail(io::ErrorKind::ConnectionAborted);

        let slot = ReadingSlot::new();
        let mut decoder = FrameDecoder::new(ZephyrProfile);
        let reason = read_loop(&conn, &mut decoder, &slot);

        match reason {
            DisconnectReason::ReadFailed(TransportError::Io(e)) => {
                assert_eq!(e.kind(), io::ErrorKind::ConnectionAborted)
            }
            other => panic!("unexpected reason: {:?}", other),
        }
        assert!(slot.latest().is_none());
        assert_eq!(decoder.len(), 5);
    }

    #[test]
    fn test_read_loop_noise_never_publishes() {
        let conn = ScriptedConnection::new().with_chunk(vec![0x42u8; 600]);
        conn.end();

        let slot = ReadingSlot::new();
        let mut decoder = FrameDecoder::new(ZephyrProfile);
        read_loop(&conn, &mut decoder, &slot);

        assert!(slot.latest().is_none());
    }
}
