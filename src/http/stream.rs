//! Push transports: SSE and WebSocket.
//!
//! Both forward the subscriber's frame stream and, independently, a heartbeat
//! on its own timer. Heartbeats never enter the frame stream.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{
        sse::{Event, Sse},
        Response,
    },
};
use futures::{stream, SinkExt, Stream, StreamExt};
use tokio::time::{interval_at, Instant};
use tokio_stream::wrappers::IntervalStream;

use crate::http::AppState;
use crate::types::Frame;

/// Keep-alive ticks, first one a full period after subscribing.
pub fn heartbeats(period: Duration) -> IntervalStream {
    IntervalStream::new(interval_at(Instant::now() + period, period))
}

/// `GET /api/odds/stream`
pub async fn sse_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let frames = state.feed.subscribe().filter_map(|frame| async move {
        match Event::default().event(frame.kind.as_str()).json_data(&*frame) {
            Ok(ev) => Some(Ok::<_, Infallible>(ev)),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode odds frame");
                None
            }
        }
    });
    let pings = heartbeats(state.heartbeat)
        .map(|_| Ok::<_, Infallible>(Event::default().event("ping").comment("heartbeat")));

    Sse::new(stream::select(frames, pings).take_until(state.shutdown.clone().cancelled_owned()))
}

/// `GET /api/odds/ws`
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| ws_session(socket, state))
}

async fn ws_session(socket: WebSocket, state: AppState) {
    let (mut sink, mut inbound) = socket.split();
    let mut frames = state.feed.subscribe();
    let mut pings = heartbeats(state.heartbeat);
    let session = frames.id();
    tracing::debug!(%session, "websocket session opened");

    loop {
        let outbound = tokio::select! {
            frame = frames.next() => match frame {
                Some(frame) => match encode_frame(&frame) {
                    Some(text) => text,
                    None => continue,
                },
                None => break,
            },
            _ = pings.next() => ping_message(),
            _ = state.shutdown.cancelled() => break,
            msg = inbound.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    tracing::trace!(%session, message = %text.as_str(), "received websocket message");
                    continue;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
        };

        if sink.send(Message::Text(outbound.into())).await.is_err() {
            break;
        }
    }

    tracing::debug!(%session, "websocket session closed");
}

fn encode_frame(frame: &Frame) -> Option<String> {
    match serde_json::to_string(frame) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode odds frame");
            None
        }
    }
}

fn ping_message() -> String {
    serde_json::json!({
        "type": "ping",
        "ts": chrono::Utc::now().timestamp_millis(),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[tokio::test]
    async fn heartbeat_waits_one_period() {
        let mut hb = heartbeats(Duration::from_millis(30));
        assert!(hb.next().now_or_never().is_none());
        let started = std::time::Instant::now();
        hb.next().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn ping_is_not_a_frame() {
        let v: serde_json::Value = serde_json::from_str(&ping_message()).unwrap();
        assert_eq!(v["type"], "ping");
        assert!(v["ts"].is_i64());
        assert!(serde_json::from_value::<Frame>(v).is_err());
    }
}
