// Wire-level tests for the HTTP repository against a loopback axum server
// that records every request it receives.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use binary_deployer::HttpRepository;
use binary_deployer_core::config::HttpConfig;
use binary_deployer_core::contract::MockCredentialStore;
use binary_deployer_core::node::{ByteStream, FileNode, MemoryNode};
use binary_deployer_core::upload::UploadOptions;
use binary_deployer_core::{Binary, Credential, ErrorKind, ExecutionContext, Repository};
use futures::stream;
use tokio::io::AsyncReadExt;

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    authorization: Option<String>,
    body: Vec<u8>,
}

#[derive(Clone)]
struct Server {
    requests: Arc<Mutex<Vec<Recorded>>>,
    /// Path suffix answered with `status` instead of 201.
    reject: Option<(&'static str, StatusCode)>,
}

impl Server {
    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn record(
    State(server): State<Server>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, HeaderMap) {
    server.requests.lock().unwrap().push(Recorded {
        method,
        path: uri.path().to_string(),
        authorization: headers
            .get(header::AUTHORIZATION)
            .map(|v| v.to_str().unwrap().to_string()),
        body: body.to_vec(),
    });

    let mut response_headers = HeaderMap::new();
    match server.reject {
        Some((suffix, status)) if uri.path().ends_with(suffix) => {
            if status.is_redirection() {
                response_headers.insert(header::LOCATION, "/elsewhere/".parse().unwrap());
            }
            (status, response_headers)
        }
        _ => (StatusCode::CREATED, response_headers),
    }
}

/// Starts a recording server and returns it with its base URL (no trailing slash).
async fn start(reject: Option<(&'static str, StatusCode)>) -> (Server, String) {
    let server = Server {
        requests: Arc::new(Mutex::new(Vec::new())),
        reject,
    };
    let app = Router::new().fallback(record).with_state(server.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (server, format!("http://{addr}/repo"))
}

fn binaries(n: usize) -> Vec<Binary> {
    (1..=n)
        .map(|i| {
            Binary::with_parent(
                MemoryNode::file(format!("file{i}.bin"), format!("payload-{i}")),
                Some("dist"),
            )
            .unwrap()
        })
        .collect()
}

/// A leaf whose content stream fails after the first chunk.
#[derive(Debug)]
struct TruncatedFile;

impl FileNode for TruncatedFile {
    fn name(&self) -> &str {
        "truncated.bin"
    }

    fn is_directory(&self) -> bool {
        false
    }

    fn size(&self) -> u64 {
        64
    }

    fn children(&self) -> io::Result<Vec<Arc<dyn FileNode>>> {
        Err(io::Error::new(io::ErrorKind::InvalidInput, "not a directory"))
    }

    fn open_stream(&self) -> io::Result<ByteStream> {
        Ok(Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"first chunk")),
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "device went away")),
        ])))
    }
}

fn nexus_store() -> Arc<MockCredentialStore> {
    let mut store = MockCredentialStore::new();
    store
        .expect_lookup()
        .withf(|id, ctx| id == "nexus" && ctx.job == "release")
        .returning(|_, _| {
            Some(Credential::UsernamePassword {
                username: "deployer".into(),
                password: "s3cret".into(),
            })
        });
    Arc::new(store)
}

fn repository(base: &str, credentials_id: Option<&str>, store: Arc<MockCredentialStore>) -> HttpRepository {
    HttpRepository::new(
        &HttpConfig {
            remote_location: base.to_string(),
            credentials_id: credentials_id.map(String::from),
        },
        store,
    )
    .unwrap()
}

#[tokio::test]
async fn anonymous_upload_posts_each_binary_below_the_remote_location() {
    let (server, base) = start(None).await;
    let repo = repository(&base, None, Arc::new(MockCredentialStore::new()));

    let result = repo
        .deploy(&binaries(2), &ExecutionContext::new("release", "1"))
        .await;

    assert!(result.is_success(), "{:?}", result.failure);
    assert_eq!(result.succeeded, 2);
    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].path, "/repo/dist/file1.bin");
    assert_eq!(requests[1].path, "/repo/dist/file2.bin");
    assert_eq!(requests[1].body, b"payload-2");
    assert!(requests.iter().all(|r| r.authorization.is_none()));
}

#[tokio::test]
async fn authenticated_upload_sends_basic_auth_on_every_request() {
    let (server, base) = start(None).await;
    let repo = repository(&format!("{base}/"), Some("nexus"), nexus_store());

    let result = repo
        .deploy(&binaries(3), &ExecutionContext::new("release", "2"))
        .await;

    assert!(result.is_success(), "{:?}", result.failure);
    let expected = format!("Basic {}", STANDARD.encode("deployer:s3cret"));
    let requests = server.requests();
    assert_eq!(requests.len(), 3);
    for request in &requests {
        assert_eq!(request.authorization.as_deref(), Some(expected.as_str()));
    }
}

#[tokio::test]
async fn rejected_third_binary_stops_the_deployment() {
    let (server, base) = start(Some(("file3.bin", StatusCode::INTERNAL_SERVER_ERROR))).await;
    let repo = repository(&base, None, Arc::new(MockCredentialStore::new()));

    let result = repo
        .deploy(&binaries(5), &ExecutionContext::new("release", "3"))
        .await;

    assert_eq!(result.succeeded, 2);
    match result.failure {
        Some(binary_deployer_core::DeployError::RemoteRejected { binary, status_line }) => {
            assert_eq!(binary, "dist/file3.bin");
            assert_eq!(status_line, "HTTP/1.1 500 Internal Server Error");
        }
        other => panic!("unexpected failure {other:?}"),
    }
    let paths: Vec<String> = server.requests().into_iter().map(|r| r.path).collect();
    assert_eq!(
        paths,
        vec!["/repo/dist/file1.bin", "/repo/dist/file2.bin", "/repo/dist/file3.bin"]
    );
}

#[tokio::test]
async fn redirects_are_reported_not_followed() {
    let (server, base) = start(Some(("file1.bin", StatusCode::TEMPORARY_REDIRECT))).await;
    let repo = repository(&base, None, Arc::new(MockCredentialStore::new()));

    let result = repo
        .deploy(&binaries(2), &ExecutionContext::new("release", "4"))
        .await;

    assert_eq!(result.succeeded, 0);
    assert_eq!(result.failure.unwrap().kind(), ErrorKind::RemoteRejected);
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn missing_credentials_fail_before_any_request() {
    let (server, base) = start(None).await;
    let repo = repository(&base, Some("nexus"), nexus_store());

    // nexus_store only serves the release job.
    let result = repo
        .deploy(&binaries(2), &ExecutionContext::new("nightly", "5"))
        .await;

    assert_eq!(result.succeeded, 0);
    let failure = result.failure.unwrap();
    assert_eq!(failure.kind(), ErrorKind::CredentialsNotFound);
    assert!(failure.to_string().contains("nexus"));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn concurrent_uploads_still_reach_every_path() {
    let (server, base) = start(None).await;
    let repo = repository(&base, None, Arc::new(MockCredentialStore::new())).with_options(UploadOptions {
        concurrency: 4,
        ..UploadOptions::default()
    });

    let result = repo
        .deploy(&binaries(8), &ExecutionContext::new("release", "6"))
        .await;

    assert!(result.is_success());
    assert_eq!(result.succeeded, 8);
    let mut paths: Vec<String> = server.requests().into_iter().map(|r| r.path).collect();
    paths.sort();
    assert_eq!(paths.len(), 8);
    assert_eq!(paths[0], "/repo/dist/file1.bin");
}

#[tokio::test]
async fn unreachable_server_is_a_transport_failure() {
    // Bind then drop to get a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let repo = repository(&format!("http://{addr}/"), None, Arc::new(MockCredentialStore::new()));

    let result = repo
        .deploy(&binaries(2), &ExecutionContext::new("release", "7"))
        .await;

    assert_eq!(result.succeeded, 0);
    let failure = result.failure.unwrap();
    assert_eq!(failure.kind(), ErrorKind::Transport);
    assert_eq!(failure.binary(), Some("dist/file1.bin"));
}

#[tokio::test]
async fn source_read_failure_stops_before_the_next_binary() {
    let (server, base) = start(None).await;
    let repo = repository(&base, None, Arc::new(MockCredentialStore::new()));
    let mut list = binaries(3);
    list[1] = Binary::with_parent(Arc::new(TruncatedFile), Some("dist")).unwrap();

    let result = repo
        .deploy(&list, &ExecutionContext::new("release", "8"))
        .await;

    assert_eq!(result.succeeded, 1);
    let failure = result.failure.unwrap();
    assert_eq!(failure.kind(), ErrorKind::Io);
    assert_eq!(failure.binary(), Some("dist/truncated.bin"));
    let paths: Vec<String> = server.requests().into_iter().map(|r| r.path).collect();
    assert_eq!(paths, vec!["/repo/dist/file1.bin"]);
}

#[tokio::test]
async fn dropped_connection_is_reported_without_resending() {
    // Reads the request head, then hangs up without answering.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            drop(socket);
        }
    });
    let repo = repository(&format!("http://{addr}/repo"), None, Arc::new(MockCredentialStore::new()));

    let result = repo
        .deploy(&binaries(2), &ExecutionContext::new("release", "9"))
        .await;

    assert_eq!(result.succeeded, 0);
    let failure = result.failure.unwrap();
    assert_eq!(failure.kind(), ErrorKind::Transport);
    assert_eq!(failure.binary(), Some("dist/file1.bin"));
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}
