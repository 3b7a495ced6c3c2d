//! Integration tests for the server-sent event stream.

mod common;

use std::time::Duration;

use common::{sample_bytes, upload_ok, TestHarness, ALICE};
use futures::StreamExt;
use vidsentry_core::events::MediaEvent;
use vidsentry_core::{MediaItemId, MediaStatus};

/// Minimal SSE reader yielding the JSON payload of unnamed events.
struct SseReader {
    stream: futures::stream::BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    buffer: String,
}

impl SseReader {
    async fn connect(url: String) -> Self {
        let resp = reqwest::get(url).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert!(resp
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));
        Self {
            stream: resp.bytes_stream().boxed(),
            buffer: String::new(),
        }
    }

    async fn next_event(&mut self) -> MediaEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                while let Some(pos) = self.buffer.find("\n\n") {
                    let block: String = self.buffer.drain(..pos + 2).collect();
                    if block.lines().any(|l| l.starts_with("event:")) {
                        continue;
                    }
                    let data: String = block
                        .lines()
                        .filter_map(|l| l.strip_prefix("data:"))
                        .map(str::trim_start)
                        .collect();
                    if !data.is_empty() {
                        return serde_json::from_str(&data).unwrap();
                    }
                }
                let chunk = self.stream.next().await.expect("stream ended").unwrap();
                self.buffer.push_str(&String::from_utf8_lossy(&chunk));
            }
        })
        .await
        .expect("timed out waiting for SSE event")
    }

    async fn until_terminal(&mut self, id: MediaItemId) -> Vec<MediaEvent> {
        let mut events = Vec::new();
        loop {
            let event = self.next_event().await;
            if event.item_id != id {
                continue;
            }
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                return events;
            }
        }
    }
}

#[tokio::test]
async fn stream_delivers_ordered_lifecycle() {
    let (_h, addr) = TestHarness::with_server().await;
    let mut sse = SseReader::connect(format!("http://{addr}/api/events")).await;

    let id = upload_ok(addr, ALICE, sample_bytes(128)).await;
    let events = sse.until_terminal(id).await;

    assert_eq!(events[0].status, Some(MediaStatus::Queued));
    assert_eq!(events[1].status, Some(MediaStatus::Processing));
    assert_eq!(events.last().unwrap().status, Some(MediaStatus::Safe));

    let progress: Vec<u8> = events.iter().filter_map(|e| e.progress).collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");
    assert_eq!(progress.last(), Some(&100));
}

#[tokio::test]
async fn item_filter_excludes_other_items() {
    let (h, addr) = TestHarness::with_server().await;
    let other = h.insert_item(ALICE, &sample_bytes(16), "video/mp4");
    let watched = h.insert_item(ALICE, &sample_bytes(16), "video/mp4");

    let mut sse =
        SseReader::connect(format!("http://{addr}/api/events?item_id={}", watched.id)).await;

    assert!(h.ctx.pipeline.schedule(other.id));
    h.wait_for_terminal(other.id).await;
    assert!(h.ctx.pipeline.schedule(watched.id));

    let first = sse.next_event().await;
    assert_eq!(first.item_id, watched.id);
    assert_eq!(first.status, Some(MediaStatus::Processing));

    let rest = sse.until_terminal(watched.id).await;
    assert_eq!(rest.last().unwrap().status, Some(MediaStatus::Safe));
}

#[tokio::test]
async fn invalid_filter_is_rejected() {
    let (_h, addr) = TestHarness::with_server().await;

    let resp = reqwest::get(format!("http://{addr}/api/events?item_id=garbage"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn multiple_subscribers_see_same_sequence() {
    let (_h, addr) = TestHarness::with_server().await;
    let mut a = SseReader::connect(format!("http://{addr}/api/events")).await;
    let mut b = SseReader::connect(format!("http://{addr}/api/events")).await;

    let id = upload_ok(addr, ALICE, sample_bytes(64)).await;

    let (from_a, from_b) = tokio::join!(a.until_terminal(id), b.until_terminal(id));
    assert_eq!(from_a, from_b);
}
