//! Per-viewer video streaming: each connection gets its own throttled loop
//! over the frame slot and emits the latest JPEG as one chunk of a
//! `multipart/x-mixed-replace` body. Dropping the response body (client
//! gone) ends the loop.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio::time::{interval, Interval, MissedTickBehavior};

use crate::frame::{Frame, FrameReader};
use crate::AppState;

const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";
const CHUNK_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";

pub async fn video_feed(State(state): State<AppState>) -> Response {
    state.coordinator.ensure_started();
    let reader = state.coordinator.frame_reader();
    let period = state.config.viewer_period();

    Response::builder()
        .header(CONTENT_TYPE, MULTIPART_CONTENT_TYPE)
        .body(Body::from_stream(frame_stream(reader, period)))
        .expect("static multipart response header is valid")
}

/// Emit the latest frame once per period. While no frame exists yet, wait on
/// the slot's change signal instead of polling. A viewer that lags simply
/// skips intermediate frames; during a stale spell it sees the last good
/// frame again.
fn frame_stream(
    reader: FrameReader,
    period: Duration,
) -> impl Stream<Item = Result<Bytes, Infallible>> {
    let mut throttle = interval(period);
    throttle.set_missed_tick_behavior(MissedTickBehavior::Skip);

    futures::stream::unfold(
        (reader, throttle),
        |(mut reader, mut throttle): (FrameReader, Interval)| async move {
            throttle.tick().await;
            loop {
                if let Some(frame) = reader.latest() {
                    return Some((Ok(frame_chunk(&frame)), (reader, throttle)));
                }
                if !reader.changed().await {
                    // Producer gone before the first frame ever appeared.
                    return None;
                }
            }
        },
    )
}

fn frame_chunk(frame: &Frame) -> Bytes {
    let mut chunk = BytesMut::with_capacity(CHUNK_HEADER.len() + frame.bytes.len() + 2);
    chunk.extend_from_slice(CHUNK_HEADER);
    chunk.extend_from_slice(&frame.bytes);
    chunk.extend_from_slice(b"\r\n");
    chunk.freeze()
}
