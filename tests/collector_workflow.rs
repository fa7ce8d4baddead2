//! End-to-end collection tests against a local results server

use async_trait::async_trait;
use car_dataset::{CollectConfig, Collector, ImageElement, ImageFinder, Query};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// 1x1 transparent GIF
const GIF_BASE64: &str = "R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";
/// First bytes of a PNG file
const PNG_BYTES: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

struct FixedFinder(Vec<ImageElement>);

#[async_trait]
impl ImageFinder for FixedFinder {
    async fn find_images(&self, _query: &Query) -> car_dataset::Result<Vec<ImageElement>> {
        Ok(self.0.clone())
    }
}

fn file_names(dir: &Path) -> BTreeSet<String> {
    std::fs::read_dir(dir)
        .expect("Failed to read query directory")
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect()
}

type Response = (&'static str, &'static str, Vec<u8>);

/// Serve every request on a local port with `route`, which maps a request
/// path to status line, content type and body
async fn spawn_server(route: fn(&str) -> Response) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let address = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buffer = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buffer).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buffer[..n]),
                    }
                }
                let request = String::from_utf8_lossy(&request);
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();

                let (status, content_type, body) = route(&path);
                let header = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = socket.write_all(header.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{address}")
}

/// `/search` is an HTML results page and `/img/car.png` an image
fn results_site(path: &str) -> Response {
    if path.starts_with("/search") {
        let html = format!(
            r#"<html><body>
                <img src="/img/car.png">
                <img data-src="data:image/gif;base64,{GIF_BASE64}">
                <img src="/img/missing.jpg">
                <img alt="no source">
            </body></html>"#
        );
        ("200 OK", "text/html", html.into_bytes())
    } else if path == "/img/car.png" {
        ("200 OK", "image/png", PNG_BYTES.to_vec())
    } else {
        ("404 Not Found", "text/plain", b"not found".to_vec())
    }
}

/// First results page holds two inline images, later pages are unavailable
fn rate_limited_site(path: &str) -> Response {
    if path.starts_with("/search") && path.ends_with("start=0") {
        let html = format!(
            r#"<img src="data:image/gif;base64,{GIF_BASE64}">
               <img src="data:image/gif;base64,{GIF_BASE64}AA==">"#
        );
        ("200 OK", "text/html", html.into_bytes())
    } else {
        ("503 Service Unavailable", "text/plain", b"slow down".to_vec())
    }
}

fn unavailable_site(_path: &str) -> Response {
    ("503 Service Unavailable", "text/plain", b"down".to_vec())
}

fn paged_config(temp: &TempDir, base: &str, query: Query) -> CollectConfig {
    CollectConfig::builder()
        .query(query)
        .data_dir(temp.path())
        .workers(3)
        .max_pages(3)
        .request_timeout_secs(10)
        .search_url(format!("{base}/search?q={{query}}&start={{start}}"))
        .build()
        .expect("Failed to build config")
}

#[tokio::test]
async fn test_collect_from_html_results_pages() {
    let base = spawn_server(results_site).await;
    let temp = TempDir::new().expect("Failed to create temp directory");
    let config = paged_config(
        &temp,
        &base,
        Query::with_directory("Koenigsegg One:1", "Koenigsegg One_1"),
    );

    let report = Collector::new(config)
        .expect("Failed to create collector")
        .run()
        .await
        .expect("Collection failed");

    let query = &report.queries[0];
    assert_eq!(query.error, None);
    // repeated pages add nothing new, so only the first page's elements count
    assert_eq!(query.discovered, 4);
    assert_eq!(query.downloaded, 2);
    assert_eq!(query.failed, 2);

    let names = file_names(&temp.path().join("Koenigsegg One_1"));
    let extensions: BTreeSet<_> = names
        .iter()
        .filter_map(|n| n.rsplit('.').next().map(str::to_string))
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.iter().all(|n| n.starts_with("img_")));
    assert_eq!(
        extensions,
        BTreeSet::from(["gif".to_string(), "png".to_string()])
    );
}

#[tokio::test]
async fn test_later_page_failure_keeps_earlier_results() {
    let base = spawn_server(rate_limited_site).await;
    let temp = TempDir::new().expect("Failed to create temp directory");
    let config = paged_config(&temp, &base, Query::new("Porsche 918"));

    let report = Collector::new(config)
        .expect("Failed to create collector")
        .run()
        .await
        .expect("Collection failed");

    let query = &report.queries[0];
    assert_eq!(query.error, None);
    assert_eq!(query.discovered, 2);
    assert_eq!(query.downloaded, 2);
    assert_eq!(file_names(&temp.path().join("Porsche 918")).len(), 2);
}

#[tokio::test]
async fn test_first_page_failure_is_a_query_error() {
    let base = spawn_server(unavailable_site).await;
    let temp = TempDir::new().expect("Failed to create temp directory");
    let config = paged_config(&temp, &base, Query::new("Porsche 918"));

    let report = Collector::new(config)
        .expect("Failed to create collector")
        .run()
        .await
        .expect("Collection failed");

    let query = &report.queries[0];
    assert_eq!(query.discovered, 0);
    assert!(query.error.as_deref().is_some_and(|e| e.contains("503")));
}

#[tokio::test]
async fn test_numbering_continues_across_queries_and_failures_are_skipped() {
    let temp = TempDir::new().expect("Failed to create temp directory");
    let elements = vec![
        ImageElement::with_src(format!("data:image/gif;base64,{GIF_BASE64}")),
        ImageElement::new(None, None),
        ImageElement::with_src("data:image/jpeg;base64,%%%"),
        ImageElement::with_src("http://127.0.0.1:9/refused.jpg"),
        ImageElement::new(
            Some(String::new()),
            Some(format!("data:image/gif;base64,{GIF_BASE64}")),
        ),
    ];

    let config = CollectConfig::builder()
        .query(Query::new("BMW i8"))
        .query(Query::new("Audi R8"))
        .data_dir(temp.path())
        .workers(32)
        .request_timeout_secs(5)
        .build()
        .expect("Failed to build config");

    let report = Collector::with_finder(config, Arc::new(FixedFinder(elements)))
        .expect("Failed to create collector")
        .run()
        .await
        .expect("Collection failed");

    assert_eq!(report.total_downloaded(), 4);
    assert_eq!(report.total_failed(), 6);

    let mut all: Vec<String> = file_names(&temp.path().join("BMW i8"))
        .into_iter()
        .chain(file_names(&temp.path().join("Audi R8")))
        .collect();
    all.sort();
    assert_eq!(all, vec!["img_1.gif", "img_2.gif", "img_3.gif", "img_4.gif"]);
}
