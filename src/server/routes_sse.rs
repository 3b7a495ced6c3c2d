use crate::error::AppError;
use crate::server::AppContext;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use vidsentry_core::events::MediaEvent;
use vidsentry_core::{Error, MediaItemId};

pub fn sse_routes() -> Router<AppContext> {
    Router::new().route("/events", get(events_handler))
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventsQuery {
    /// Only deliver events for this media item.
    pub item_id: Option<String>,
}

/// GET /api/events
///
/// Item events are unnamed SSE messages carrying the JSON-encoded
/// [`MediaEvent`]; heartbeats are named `heartbeat`.
#[utoipa::path(
    get,
    path = "/api/events",
    tag = "events",
    params(EventsQuery),
    responses(
        (status = 200, description = "Server-sent event stream", body = String, content_type = "text/event-stream"),
        (status = 400, description = "Invalid item_id filter")
    )
)]
pub async fn events_handler(
    State(ctx): State<AppContext>,
    Query(params): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let filter = params
        .item_id
        .as_deref()
        .map(str::parse::<MediaItemId>)
        .transpose()
        .map_err(|_| Error::Validation("Invalid item_id filter".into()))?;

    // Subscribe before the response is sent so nothing published after the
    // client sees the headers is missed.
    let mut subscription = ctx.event_bus.subscribe();
    let heartbeat_secs = ctx.config.events.heartbeat_secs;

    let stream = async_stream::stream! {
        let mut heartbeat = tokio::time::interval(Duration::from_secs(heartbeat_secs.max(1)));
        loop {
            let next = tokio::select! {
                event = subscription.next() => Wake::Event(event),
                _ = heartbeat.tick(), if heartbeat_secs > 0 => Wake::Heartbeat,
            };
            match next {
                Wake::Event(None) => break,
                Wake::Event(Some(event)) => {
                    if filter.is_some_and(|id| id != event.item_id) {
                        continue;
                    }
                    yield Ok::<_, Infallible>(message(&event));
                }
                Wake::Heartbeat => {
                    yield Ok::<_, Infallible>(Event::default().event("heartbeat").data("{}"));
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

enum Wake {
    Event(Option<MediaEvent>),
    Heartbeat,
}

fn message(event: &MediaEvent) -> Event {
    let data = serde_json::to_string(event)
        .unwrap_or_else(|e| format!(r#"{{"error": "serialization failed: {}"}}"#, e));
    Event::default().data(data)
}
