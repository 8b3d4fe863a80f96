//! `HttpFetcher` against a throwaway local HTTP responder.

use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use movenet_core::{BundleFormat, KaggleCredentials, Locator, NamedUrl};
use movenet_sync::{ArtifactFetcher, FetchError, HttpFetcher};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Route {
    status: u16,
    headers: Vec<(&'static str, String)>,
    body: Vec<u8>,
    /// Required `Authorization` header value, answered with 401 otherwise.
    auth: Option<&'static str>,
}

impl Route {
    fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
            auth: None,
        }
    }

    fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
            auth: None,
        }
    }

    fn redirect(to: &str) -> Self {
        Self {
            status: 302,
            headers: vec![("Location", to.to_string())],
            body: Vec::new(),
            auth: None,
        }
    }
}

/// Serve `routes` on an ephemeral port until the test ends.
async fn serve(routes: HashMap<&'static str, Route>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let routes = Arc::new(routes);
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let routes = routes.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let text = String::from_utf8_lossy(&request).to_string();
                let target = text.split_whitespace().nth(1).unwrap_or("/");
                let path = target.split('?').next().unwrap_or(target).to_string();
                let authorization = text
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("authorization")
                            .then(|| value.trim().to_string())
                    });

                let route = match routes.get(path.as_str()) {
                    Some(route) => match route.auth {
                        Some(expected) if authorization.as_deref() != Some(expected) => {
                            Route::status(401, "unauthorized")
                        }
                        _ => route.clone(),
                    },
                    None => Route::status(404, "not found"),
                };

                let mut head = format!(
                    "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n",
                    route.status,
                    route.body.len()
                );
                for (name, value) in &route.headers {
                    head.push_str(&format!("{name}: {value}\r\n"));
                }
                head.push_str("\r\n");
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&route.body).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

fn fetcher(kaggle: Option<KaggleCredentials>) -> HttpFetcher {
    HttpFetcher::new(Duration::from_secs(10), kaggle).unwrap()
}

fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, bytes) in files {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn tar_gz_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, bytes) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *bytes).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn relative_paths(set: &movenet_sync::ArtifactSet) -> Vec<&str> {
    set.files().iter().map(|f| f.relative_path.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Locator strategies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_url_lands_under_url_file_name() {
    let addr = serve(HashMap::from([(
        "/models/movenet.tflite",
        Route::ok(&b"TFL3weights"[..]),
    )]))
    .await;
    let dest = TempDir::new().unwrap();
    let locator = Locator::Url {
        url: format!("http://{addr}/models/movenet.tflite?v=4"),
        file_name: None,
    };

    let set = fetcher(None).fetch(&locator, dest.path()).await.unwrap();

    assert_eq!(relative_paths(&set), ["movenet.tflite"]);
    assert_eq!(
        std::fs::read(dest.path().join("movenet.tflite")).unwrap(),
        b"TFL3weights"
    );
}

#[tokio::test]
async fn explicit_file_name_wins_and_redirects_are_followed() {
    let addr = serve(HashMap::from([
        ("/download", Route::redirect("/blob/abc")),
        ("/blob/abc", Route::ok(&b"TFL3"[..])),
    ]))
    .await;
    let dest = TempDir::new().unwrap();
    let locator = Locator::Url {
        url: format!("http://{addr}/download"),
        file_name: Some("model.tflite".to_string()),
    };

    let set = fetcher(None).fetch(&locator, dest.path()).await.unwrap();
    assert_eq!(relative_paths(&set), ["model.tflite"]);
}

#[tokio::test]
async fn multi_url_places_each_entry_in_its_own_directory() {
    let addr = serve(HashMap::from([
        ("/tflite/model.tflite", Route::ok(&b"TFL3"[..])),
        ("/tfjs/model.json", Route::ok(&b"{\"weightsManifest\":[]}"[..])),
    ]))
    .await;
    let dest = TempDir::new().unwrap();
    let locator = Locator::MultiUrl {
        files: vec![
            NamedUrl {
                name: "tflite".to_string(),
                url: format!("http://{addr}/tflite/model.tflite"),
                file_name: None,
            },
            NamedUrl {
                name: "tfjs".to_string(),
                url: format!("http://{addr}/tfjs/model.json"),
                file_name: None,
            },
        ],
    };

    let set = fetcher(None).fetch(&locator, dest.path()).await.unwrap();
    assert_eq!(
        relative_paths(&set),
        ["tfjs/model.json", "tflite/model.tflite"]
    );
}

#[tokio::test]
async fn zip_bundle_is_extracted() {
    let archive = zip_bytes(&[
        ("model.json", b"{}"),
        ("group1-shard1of2.bin", b"one"),
        ("group1-shard2of2.bin", b"two"),
    ]);
    let addr = serve(HashMap::from([("/bundle.zip", Route::ok(archive))])).await;
    let dest = TempDir::new().unwrap();
    let locator = Locator::Bundle {
        url: format!("http://{addr}/bundle.zip"),
        format: None,
    };

    let set = fetcher(None).fetch(&locator, dest.path()).await.unwrap();
    assert_eq!(
        relative_paths(&set),
        ["group1-shard1of2.bin", "group1-shard2of2.bin", "model.json"]
    );
}

#[tokio::test]
async fn tar_gz_bundle_is_extracted_when_format_is_explicit() {
    let archive = tar_gz_bytes(&[("saved_model/saved_model.pb", b"pb")]);
    let addr = serve(HashMap::from([("/export", Route::ok(archive))])).await;
    let dest = TempDir::new().unwrap();
    let locator = Locator::Bundle {
        url: format!("http://{addr}/export"),
        format: Some(BundleFormat::TarGz),
    };

    let set = fetcher(None).fetch(&locator, dest.path()).await.unwrap();
    assert_eq!(relative_paths(&set), ["saved_model/saved_model.pb"]);
}

#[tokio::test]
async fn kaggle_dataset_uses_basic_auth_against_api_base() {
    let archive = zip_bytes(&[("4.tflite", b"TFL3")]);
    let mut route = Route::ok(archive);
    // base64("alice:secret")
    route.auth = Some("Basic YWxpY2U6c2VjcmV0");
    let addr = serve(HashMap::from([(
        "/api/v1/datasets/download/google/movenet",
        route,
    )]))
    .await;
    let dest = TempDir::new().unwrap();
    let locator = Locator::KaggleDataset {
        dataset: "google/movenet".to_string(),
    };
    let creds = KaggleCredentials {
        username: "alice".to_string(),
        key: "secret".to_string(),
    };

    let set = fetcher(Some(creds))
        .with_kaggle_api(format!("http://{addr}/api/v1/"))
        .fetch(&locator, dest.path())
        .await
        .unwrap();
    assert_eq!(relative_paths(&set), ["4.tflite"]);

    let wrong = KaggleCredentials {
        username: "alice".to_string(),
        key: "nope".to_string(),
    };
    let dest = TempDir::new().unwrap();
    let err = fetcher(Some(wrong))
        .with_kaggle_api(format!("http://{addr}/api/v1"))
        .fetch(&locator, dest.path())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FetchError::Unreachable { status: Some(401), .. }
    ));
}

#[tokio::test]
async fn kaggle_dataset_without_credentials_is_unreachable() {
    let dest = TempDir::new().unwrap();
    let locator = Locator::KaggleDataset {
        dataset: "google/movenet".to_string(),
    };
    let err = fetcher(None).fetch(&locator, dest.path()).await.unwrap_err();
    match err {
        FetchError::Unreachable { status, reason, .. } => {
            assert_eq!(status, None);
            assert!(reason.contains("credentials"), "got {reason}");
        }
        other => panic!("expected Unreachable, got {other}"),
    }
}

// ---------------------------------------------------------------------------
// Failure modes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn not_found_is_unreachable_with_status() {
    let addr = serve(HashMap::new()).await;
    let dest = TempDir::new().unwrap();
    let locator = Locator::Url {
        url: format!("http://{addr}/missing.tflite"),
        file_name: None,
    };

    let err = fetcher(None).fetch(&locator, dest.path()).await.unwrap_err();
    match err {
        FetchError::Unreachable { status, locator, .. } => {
            assert_eq!(status, Some(404));
            assert!(locator.contains("missing.tflite"));
        }
        other => panic!("expected Unreachable, got {other}"),
    }
}

#[tokio::test]
async fn html_error_page_with_200_is_invalid_payload() {
    let addr = serve(HashMap::from([(
        "/model.tflite",
        Route::ok(&b"<!DOCTYPE html><html><body>Sign in</body></html>"[..]),
    )]))
    .await;
    let dest = TempDir::new().unwrap();
    let locator = Locator::Url {
        url: format!("http://{addr}/model.tflite"),
        file_name: None,
    };

    let err = fetcher(None).fetch(&locator, dest.path()).await.unwrap_err();
    assert!(matches!(err, FetchError::InvalidPayload { .. }), "got {err}");
}

#[tokio::test]
async fn html_page_served_as_bundle_is_invalid_payload() {
    let addr = serve(HashMap::from([(
        "/bundle.zip",
        Route::ok(&b"<html>quota exceeded</html>"[..]),
    )]))
    .await;
    let dest = TempDir::new().unwrap();
    let locator = Locator::Bundle {
        url: format!("http://{addr}/bundle.zip"),
        format: None,
    };

    let err = fetcher(None).fetch(&locator, dest.path()).await.unwrap_err();
    assert!(matches!(err, FetchError::InvalidPayload { .. }), "got {err}");
    assert_eq!(std::fs::read_dir(dest.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn redirect_loop_is_unreachable() {
    let addr = serve(HashMap::from([("/loop", Route::redirect("/loop"))])).await;
    let dest = TempDir::new().unwrap();
    let locator = Locator::Url {
        url: format!("http://{addr}/loop"),
        file_name: None,
    };

    let err = fetcher(None).fetch(&locator, dest.path()).await.unwrap_err();
    match err {
        FetchError::Unreachable { reason, .. } => {
            assert!(reason.contains("redirect"), "got {reason}")
        }
        other => panic!("expected Unreachable, got {other}"),
    }
}

#[tokio::test]
async fn connection_refused_is_unreachable_without_status() {
    // Bind then drop to get a port nothing listens on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let dest = TempDir::new().unwrap();
    let locator = Locator::Url {
        url: format!("http://{addr}/model.tflite"),
        file_name: None,
    };

    let err = fetcher(None).fetch(&locator, dest.path()).await.unwrap_err();
    assert!(
        matches!(err, FetchError::Unreachable { status: None, .. }),
        "got {err}"
    );
}
