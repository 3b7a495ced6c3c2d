//! Integration tests for range-aware content delivery.

mod common;

use common::{sample_bytes, TestHarness, ALICE};
use vidsentry_core::config::Config;
use vidsentry_core::Verdict;

async fn get_range(addr: std::net::SocketAddr, path: &str, range: Option<&str>) -> reqwest::Response {
    let mut request = reqwest::Client::new().get(format!("http://{addr}{path}"));
    if let Some(range) = range {
        request = request.header("range", range);
    }
    request.send().await.unwrap()
}

fn header<'a>(resp: &'a reqwest::Response, name: &str) -> &'a str {
    resp.headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing {name} header"))
        .to_str()
        .unwrap()
}

#[tokio::test]
async fn full_content_without_range() {
    let (h, addr) = TestHarness::with_server().await;
    let data = sample_bytes(1000);
    let item = h.insert_classified(ALICE, &data, Verdict::safe(0.9));

    let resp = get_range(addr, &format!("/api/media/{}/stream", item.id), None).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "content-type"), "video/mp4");
    assert_eq!(header(&resp, "accept-ranges"), "bytes");
    assert_eq!(header(&resp, "content-length"), "1000");
    assert!(resp.headers().get("content-range").is_none());
    assert_eq!(resp.bytes().await.unwrap().to_vec(), data);
}

#[tokio::test]
async fn first_hundred_bytes() {
    let (h, addr) = TestHarness::with_server().await;
    let data = sample_bytes(1000);
    let item = h.insert_classified(ALICE, &data, Verdict::safe(0.9));

    let resp = get_range(addr, &format!("/api/media/{}/stream", item.id), Some("bytes=0-99")).await;
    assert_eq!(resp.status(), 206);
    assert_eq!(header(&resp, "content-range"), "bytes 0-99/1000");
    assert_eq!(header(&resp, "content-length"), "100");
    assert_eq!(resp.bytes().await.unwrap().to_vec(), &data[0..100]);
}

#[tokio::test]
async fn open_ended_range() {
    let (h, addr) = TestHarness::with_server().await;
    let data = sample_bytes(1000);
    let item = h.insert_classified(ALICE, &data, Verdict::safe(0.9));

    let resp = get_range(addr, &format!("/api/media/{}/stream", item.id), Some("bytes=500-")).await;
    assert_eq!(resp.status(), 206);
    assert_eq!(header(&resp, "content-range"), "bytes 500-999/1000");
    assert_eq!(header(&resp, "content-length"), "500");
    assert_eq!(resp.bytes().await.unwrap().to_vec(), &data[500..]);
}

#[tokio::test]
async fn suffix_range() {
    let (h, addr) = TestHarness::with_server().await;
    let data = sample_bytes(1000);
    let item = h.insert_classified(ALICE, &data, Verdict::safe(0.9));

    let resp = get_range(addr, &format!("/api/media/{}/stream", item.id), Some("bytes=-10")).await;
    assert_eq!(resp.status(), 206);
    assert_eq!(header(&resp, "content-range"), "bytes 990-999/1000");
    assert_eq!(resp.bytes().await.unwrap().to_vec(), &data[990..]);
}

#[tokio::test]
async fn range_past_end_is_not_satisfiable() {
    let (h, addr) = TestHarness::with_server().await;
    let item = h.insert_classified(ALICE, &sample_bytes(1000), Verdict::safe(0.9));

    let resp = get_range(addr, &format!("/api/media/{}/stream", item.id), Some("bytes=1000-")).await;
    assert_eq!(resp.status(), 416);
    assert_eq!(header(&resp, "content-range"), "bytes */1000");
}

#[tokio::test]
async fn multi_range_falls_back_to_full_content() {
    let (h, addr) = TestHarness::with_server().await;
    let item = h.insert_classified(ALICE, &sample_bytes(1000), Verdict::safe(0.9));

    let resp = get_range(
        addr,
        &format!("/api/media/{}/stream", item.id),
        Some("bytes=0-10,20-30"),
    )
    .await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.bytes().await.unwrap().len(), 1000);
}

#[tokio::test]
async fn stream_is_not_owner_scoped() {
    let (h, addr) = TestHarness::with_server().await;
    let item = h.insert_classified(ALICE, &sample_bytes(64), Verdict::safe(0.9));

    let resp = reqwest::Client::new()
        .get(format!("http://{addr}/api/media/{}/stream", item.id))
        .header(common::OWNER_HEADER, common::BOB)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn queued_item_is_streamable() {
    let (h, addr) = TestHarness::with_server().await;
    let item = h.insert_item(ALICE, &sample_bytes(64), "video/webm");

    let resp = get_range(addr, &format!("/api/media/{}/stream", item.id), None).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "content-type"), "video/webm");
}

#[tokio::test]
async fn flagged_item_is_forbidden() {
    let (h, addr) = TestHarness::with_server().await;
    let item = h.insert_classified(ALICE, &sample_bytes(64), Verdict::flagged(0.9));

    let resp = get_range(addr, &format!("/api/media/{}/stream", item.id), None).await;
    assert_eq!(resp.status(), 403);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "forbidden");
}

#[tokio::test]
async fn flagged_item_served_when_enabled() {
    let mut config = Config::default();
    config.delivery.serve_flagged = true;
    let (h, addr) = TestHarness::with_config(config).serve().await;
    let item = h.insert_classified(ALICE, &sample_bytes(64), Verdict::flagged(0.9));

    let resp = get_range(addr, &format!("/api/media/{}/stream", item.id), None).await;
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn unknown_and_invalid_ids() {
    let (_h, addr) = TestHarness::with_server().await;

    let resp = get_range(
        addr,
        &format!("/api/media/{}/stream", vidsentry_core::MediaItemId::new()),
        None,
    )
    .await;
    assert_eq!(resp.status(), 404);

    let resp = get_range(addr, "/api/media/nope/stream", None).await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn missing_content_is_not_found() {
    let (h, addr) = TestHarness::with_server().await;
    let item = h.insert_classified(ALICE, &sample_bytes(64), Verdict::safe(0.9));
    std::fs::remove_file(&item.file_path).unwrap();

    let resp = get_range(addr, &format!("/api/media/{}/stream", item.id), None).await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn concurrent_ranges_do_not_interfere() {
    let (h, addr) = TestHarness::with_server().await;
    let data = sample_bytes(64 * 1024 * 3);
    let item = h.insert_classified(ALICE, &data, Verdict::safe(0.9));
    let path = format!("/api/media/{}/stream", item.id);

    let ranges = [(0u64, 70_000u64), (65_536, 131_071), (150_000, 196_607)];
    let mut tasks = Vec::new();
    for (start, end) in ranges {
        let path = path.clone();
        tasks.push(tokio::spawn(async move {
            let resp = get_range(addr, &path, Some(&format!("bytes={start}-{end}"))).await;
            assert_eq!(resp.status(), 206);
            (start, end, resp.bytes().await.unwrap().to_vec())
        }));
    }

    for task in tasks {
        let (start, end, body) = task.await.unwrap();
        assert_eq!(body, &data[start as usize..=end as usize]);
    }
}
