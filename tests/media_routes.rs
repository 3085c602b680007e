//! Integration tests for the `/media/{name}` routes.

use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::Router;
use tempfile::TempDir;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};
use tower::ServiceExt;

use media_range::config::Config;
use media_range::router::{router, AppState, MediaLibrary};
use media_range::{ContentTypes, FsStore, InvertedRange, KnownSize, MediaResponder, MediaStore};

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

struct Harness {
    _dir: TempDir,
    app: Router,
}

impl Harness {
    fn new(inverted: InvertedRange) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("party.mp4"), pattern(1000)).unwrap();
        std::fs::write(dir.path().join("bling.mp3"), pattern(2048)).unwrap();
        std::fs::write(dir.path().join("notes.zzzunknown"), pattern(10)).unwrap();

        let config = Config::from_toml(&format!(
            r#"
            media_root = {root:?}

            [media]
            party = "party.mp4"
            bling = "bling.mp3"
            notes = "notes.zzzunknown"
            gone = "gone.mp4"
            "#,
            root = dir.path().display().to_string(),
        ))
        .unwrap();

        let responder = MediaResponder::new(config.content_types().unwrap()).inverted(inverted);
        let app = router(AppState::new(config.library(), responder));
        Harness { _dir: dir, app }
    }

    async fn get(&self, uri: &str, range: Option<&str>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let mut request = Request::builder().uri(uri);
        if let Some(range) = range {
            request = request.header("range", range);
        }
        let response = self
            .app
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }
}

fn header<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).map(|value| value.to_str().unwrap())
}

#[tokio::test]
async fn middle_range_is_partial_content() {
    let h = Harness::new(InvertedRange::Clamp);

    let (status, headers, body) = h.get("/media/party", Some("bytes=500-599")).await;

    assert_eq!(StatusCode::PARTIAL_CONTENT, status);
    assert_eq!(Some("bytes 500-599/1000"), header(&headers, "content-range"));
    assert_eq!(Some("100"), header(&headers, "content-length"));
    assert_eq!(Some("bytes"), header(&headers, "accept-ranges"));
    assert_eq!(Some("video/mp4"), header(&headers, "content-type"));
    assert_eq!(&pattern(1000)[500..600], &body[..]);
}

#[tokio::test]
async fn open_ended_range_runs_to_last_byte() {
    let h = Harness::new(InvertedRange::Clamp);

    let (status, headers, body) = h.get("/media/party", Some("bytes=900-")).await;

    assert_eq!(StatusCode::PARTIAL_CONTENT, status);
    assert_eq!(Some("bytes 900-999/1000"), header(&headers, "content-range"));
    assert_eq!(Some("100"), header(&headers, "content-length"));
    assert_eq!(&pattern(1000)[900..], &body[..]);
}

#[tokio::test]
async fn missing_range_header_is_416_for_every_file() {
    let h = Harness::new(InvertedRange::Clamp);

    for (name, total) in [("party", 1000), ("bling", 2048), ("notes", 10)] {
        let (status, headers, body) = h.get(&format!("/media/{name}"), None).await;
        assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, status, "{name}");
        assert_eq!(Some(format!("bytes */{total}").as_str()), header(&headers, "content-range"));
        assert!(body.is_empty());
    }
}

#[tokio::test]
async fn missing_file_is_404_before_range_is_checked() {
    let h = Harness::new(InvertedRange::Clamp);

    let (status, _, body) = h.get("/media/gone", Some("bytes=0-0")).await;
    assert_eq!(StatusCode::NOT_FOUND, status);
    assert!(body.is_empty());

    let (status, _, body) = h.get("/media/gone", None).await;
    assert_eq!(StatusCode::NOT_FOUND, status);
    assert!(body.is_empty());
}

#[tokio::test]
async fn unregistered_name_is_404() {
    let h = Harness::new(InvertedRange::Clamp);

    let (status, _, body) = h.get("/media/nothing", Some("bytes=0-1")).await;

    assert_eq!(StatusCode::NOT_FOUND, status);
    assert!(body.is_empty());
}

#[tokio::test]
async fn malformed_and_unsatisfiable_ranges_are_416() {
    let h = Harness::new(InvertedRange::Clamp);

    for range in ["bytes=0-1,4-5", "items=0-10", "bytes=abc-", "bytes=1000-", "bytes=-0"] {
        let (status, headers, body) = h.get("/media/party", Some(range)).await;
        assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, status, "{range}");
        assert_eq!(Some("bytes */1000"), header(&headers, "content-range"));
        assert!(body.is_empty());
    }
}

#[tokio::test]
async fn non_ascii_range_header_is_416() {
    let h = Harness::new(InvertedRange::Clamp);
    let request = Request::builder()
        .uri("/media/party")
        .header("range", HeaderValue::from_bytes(b"bytes=\xff-").unwrap())
        .body(Body::empty())
        .unwrap();

    let response = h.app.clone().oneshot(request).await.unwrap();

    assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, response.status());
}

#[tokio::test]
async fn suffix_range_serves_tail() {
    let h = Harness::new(InvertedRange::Clamp);

    let (status, headers, body) = h.get("/media/bling", Some("bytes=-48")).await;

    assert_eq!(StatusCode::PARTIAL_CONTENT, status);
    assert_eq!(Some("bytes 2000-2047/2048"), header(&headers, "content-range"));
    assert_eq!(&pattern(2048)[2000..], &body[..]);
}

#[tokio::test]
async fn inverted_range_follows_policy() {
    let clamp = Harness::new(InvertedRange::Clamp);
    let (status, headers, body) = clamp.get("/media/party", Some("bytes=10-5")).await;
    assert_eq!(StatusCode::PARTIAL_CONTENT, status);
    assert_eq!(Some("bytes 4-5/1000"), header(&headers, "content-range"));
    assert_eq!(&pattern(1000)[4..6], &body[..]);

    let reject = Harness::new(InvertedRange::Reject);
    let (status, _, body) = reject.get("/media/party", Some("bytes=10-5")).await;
    assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, status);
    assert!(body.is_empty());
}

#[tokio::test]
async fn unknown_extension_is_octet_stream() {
    let h = Harness::new(InvertedRange::Clamp);

    let (_, headers, _) = h.get("/media/notes", Some("bytes=0-")).await;

    assert_eq!(Some("application/octet-stream"), header(&headers, "content-type"));
}

#[tokio::test]
async fn chunked_ranges_reassemble_the_file() {
    let h = Harness::new(InvertedRange::Clamp);

    let mut assembled = Vec::new();
    for start in (0..2048).step_by(300) {
        let end = (start + 299).min(2047);
        let (status, _, body) = h.get("/media/bling", Some(&format!("bytes={start}-{end}"))).await;
        assert_eq!(StatusCode::PARTIAL_CONTENT, status);
        assert_eq!(end - start + 1, body.len());
        assembled.extend(body);
    }

    assert_eq!(pattern(2048), assembled);
}

#[tokio::test]
async fn repeated_request_is_identical() {
    let h = Harness::new(InvertedRange::Clamp);

    let first = h.get("/media/party", Some("bytes=17-733")).await;
    let second = h.get("/media/party", Some("bytes=17-733")).await;

    assert_eq!(first, second);
}

#[tokio::test]
async fn serves_over_tcp_and_survives_client_disconnect() {
    let dir = tempfile::tempdir().unwrap();
    let size = 8 * 1024 * 1024;
    let path = dir.path().join("big.mp4");
    std::fs::write(&path, pattern(size)).unwrap();

    let mut library = MediaLibrary::default();
    library.insert("big", &path);
    let app = router(AppState::new(library, MediaResponder::new(ContentTypes::default())));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let client = reqwest::Client::new();
    let url = format!("http://{addr}/media/big");

    // read one chunk of the whole file, then hang up
    let mut response = client.get(&url).header("range", "bytes=0-").send().await.unwrap();
    assert_eq!(206, response.status().as_u16());
    assert_eq!(Some(size as u64), response.content_length());
    assert!(response.chunk().await.unwrap().is_some());
    drop(response);

    let response = client.get(&url).header("range", "bytes=4096-8191").send().await.unwrap();
    assert_eq!(206, response.status().as_u16());
    assert_eq!(
        format!("bytes 4096-8191/{size}"),
        response.headers()["content-range"].to_str().unwrap()
    );
    let body = response.bytes().await.unwrap();
    assert_eq!(&pattern(size)[4096..8192], &body[..]);
}

/// File handle that keeps `live` up to date for as long as it is open.
struct Tracked {
    file: File,
    live: Arc<AtomicUsize>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AsyncRead for Tracked {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_read(cx, buf)
    }
}

impl AsyncSeek for Tracked {
    fn start_seek(mut self: Pin<&mut Self>, position: io::SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.file).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.file).poll_complete(cx)
    }
}

/// Filesystem store that counts the sources currently open.
#[derive(Default)]
struct CountingStore {
    live: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl MediaStore for CountingStore {
    type Body = KnownSize<Tracked>;

    async fn stat(&self, path: &Path) -> io::Result<u64> {
        FsStore.stat(path).await
    }

    async fn open(&self, path: &Path, start: u64, total: u64) -> io::Result<Self::Body> {
        let file = FsStore.open(path, start, total).await?.into_inner();
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(KnownSize::sized(Tracked { file, live: self.live.clone() }, total))
    }
}

async fn wait_for_live(live: &AtomicUsize, expected: usize) {
    let settled = tokio::time::timeout(Duration::from_secs(5), async {
        while live.load(Ordering::SeqCst) != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(settled.is_ok(), "expected {expected} open sources, found {}", live.load(Ordering::SeqCst));
}

#[tokio::test]
async fn client_disconnect_releases_source() {
    let dir = tempfile::tempdir().unwrap();
    let size = 32 * 1024 * 1024;
    let path = dir.path().join("big.mp4");
    std::fs::write(&path, pattern(size)).unwrap();

    let store = CountingStore::default();
    let live = store.live.clone();
    let mut library = MediaLibrary::default();
    library.insert("big", &path);
    let responder = MediaResponder::with_store(store, ContentTypes::default());
    let app = router(AppState::new(library, responder));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let client = reqwest::Client::new();
    let url = format!("http://{addr}/media/big");

    let mut response = client.get(&url).header("range", "bytes=0-").send().await.unwrap();
    assert_eq!(206, response.status().as_u16());
    assert!(response.chunk().await.unwrap().is_some());
    assert_eq!(1, live.load(Ordering::SeqCst));

    drop(response);
    wait_for_live(&live, 0).await;

    // a completed range releases its source too
    let response = client.get(&url).header("range", "bytes=0-1023").send().await.unwrap();
    assert_eq!(1024, response.bytes().await.unwrap().len());
    wait_for_live(&live, 0).await;
}
