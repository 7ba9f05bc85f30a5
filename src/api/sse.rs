//! Server-Sent Events for room updates

use crate::room::Message;
use crate::runtime::{RoomSnapshot, RoomUpdate};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// An `init` event with the current room and messages, then every update
pub fn sse_stream(
    room: RoomSnapshot,
    messages: Vec<Message>,
    broadcast_rx: tokio::sync::broadcast::Receiver<RoomUpdate>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let init_data = json!({
        "type": "init",
        "room": room,
        "messages": messages,
    });
    let init = futures::stream::once(async move {
        Ok(Event::default().event("init").data(init_data.to_string()))
    });

    let updates = BroadcastStream::new(broadcast_rx).filter_map(|result| match result {
        Ok(update) => Some(Ok(update_to_event(&update))),
        // Lagged: the next room or messages update carries full state
        Err(_) => None,
    });

    Sse::new(init.chain(updates)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn update_to_event(update: &RoomUpdate) -> Event {
    let event_type = match update {
        RoomUpdate::Room { .. } => "room",
        RoomUpdate::Messages { .. } => "messages",
        RoomUpdate::Error { .. } => "error",
    };
    let data = serde_json::to_string(update)
        .unwrap_or_else(|e| json!({"type": "error", "message": e.to_string()}).to_string());

    Event::default().event(event_type).data(data)
}
