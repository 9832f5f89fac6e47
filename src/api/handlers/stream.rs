//! `GET events/stream(processId?)` — server-sent stream with named
//! events `activity`, `task-event`, `heartbeat`, `error`; replays
//! history before appending live events (§6, §4.4).

use async_stream::stream;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;

use crate::api::routes::AppState;
use crate::domain::ExecutionEventKind;
use crate::events::BusMessage;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(rename = "processId")]
    pub process_id: Option<String>,
}

pub async fn events_stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let target_id = query.process_id.unwrap_or_else(|| state.default_tenant_id.clone());
    let mut subscription = state.events.subscribe(&target_id);

    let body = stream! {
        while let Some(message) = subscription.receiver.recv().await {
            let event = match message {
                BusMessage::Activity(activity) => {
                    let name = match activity.kind {
                        ExecutionEventKind::RouteNode => "activity",
                        ExecutionEventKind::ProcessTask => "task-event",
                    };
                    Event::default().event(name).json_data(&activity).unwrap_or_else(|_| Event::default().event("error").data("serialization failure"))
                }
                BusMessage::Heartbeat { timestamp } => {
                    Event::default().event("heartbeat").data(timestamp.to_rfc3339())
                }
                BusMessage::Error { message } => {
                    Event::default().event("error").data(message)
                }
            };
            yield Ok(event);
        }
    };

    Sse::new(body).keep_alive(KeepAlive::default())
}
