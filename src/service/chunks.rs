//! Chunked range encoder.
//!
//! A range scan streams back as HTTP chunked transfer: one chunk per
//! record, each chunk's body being `key '\n' value` with no escaping —
//! consumers split on the first `\n` byte only. Tombstones never reach
//! the encoder (scans are over the fresh view), and the transport writes
//! the terminating zero-length chunk when the stream ends.
//!
//! The scan itself is blocking (memtable walks and mmap reads), so it
//! runs on a blocking thread and feeds the response body through a
//! bounded channel; a client that disconnects closes the channel and
//! aborts the scan mid-range.

use axum::body::{Body, Bytes};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::error;

use crate::engine::Engine;

/// Records buffered between the scanning thread and the socket writer.
const CHANNEL_DEPTH: usize = 64;

/// One record, framed for its chunk: `key '\n' value`.
pub fn record_frame(key: &[u8], value: &[u8]) -> Bytes {
    let mut frame = Vec::with_capacity(key.len() + 1 + value.len());
    frame.extend_from_slice(key);
    frame.push(b'\n');
    frame.extend_from_slice(value);
    Bytes::from(frame)
}

/// Streams records with `start <= key < end` (`end` unbounded when
/// `None`) as a chunked response body. Range scans read local state
/// only; they do not consult the quorum.
pub fn range_body(engine: Engine, start: Vec<u8>, end: Option<Vec<u8>>) -> Body {
    let (frames, body) = tokio::sync::mpsc::channel::<Bytes>(CHANNEL_DEPTH);

    tokio::task::spawn_blocking(move || {
        let scan = match engine.range_scan(&start) {
            Ok(scan) => scan,
            Err(err) => {
                error!(%err, "range scan failed to start");
                return;
            }
        };
        for (key, value) in scan {
            if let Some(end) = &end {
                if key.as_slice() >= end.as_slice() {
                    break;
                }
            }
            // A send failure means the client went away; stop scanning.
            if frames.blocking_send(record_frame(&key, &value)).is_err() {
                break;
            }
        }
    });

    Body::from_stream(ReceiverStream::new(body).map(Ok::<_, std::convert::Infallible>))
}
