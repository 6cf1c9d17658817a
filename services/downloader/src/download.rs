//! HTTP access to the WMS: capabilities documents and GetMap tiles.
//!
//! Tiles are streamed into `<file>.part` and renamed once complete, so a
//! file at the final path is always a whole response body.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, Response};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};
use wms_common::TileRequest;
use wms_protocol::GetMapRequest;

pub const USER_AGENT: &str = "radar-history/1.0";

/// Fetches one tile to a destination path.
///
/// An `Err` means nothing was written to `dest`.
#[async_trait]
pub trait TileFetcher: Send + Sync {
    async fn fetch_tile(
        &self,
        layer: &str,
        time: DateTime<Utc>,
        tile: &TileRequest,
        dest: &Path,
    ) -> Result<()>;

    /// Human-readable description of a request, used in dry-run logs.
    fn describe(&self, layer: &str, time: DateTime<Utc>, tile: &TileRequest) -> String {
        format!("{} @ {} {}", layer, time, tile.bbox.to_wms_string())
    }
}

/// [`TileFetcher`] backed by a WMS GetMap endpoint.
pub struct HttpTileFetcher {
    client: Client,
    base_url: String,
}

impl HttpTileFetcher {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, layer: &str, time: DateTime<Utc>, tile: &TileRequest) -> Result<String> {
        GetMapRequest::for_tile(layer, time, tile)
            .to_url(&self.base_url)
            .with_context(|| format!("Invalid base URL {}", self.base_url))
    }
}

#[async_trait]
impl TileFetcher for HttpTileFetcher {
    #[instrument(skip(self, time, tile, dest), fields(time = %time))]
    async fn fetch_tile(
        &self,
        layer: &str,
        time: DateTime<Utc>,
        tile: &TileRequest,
        dest: &Path,
    ) -> Result<()> {
        let url = self.url(layer, time, tile)?;
        info!(url = %url, "Fetching tile");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("HTTP request failed")?;
        let response = check_response(response, &url)?;
        ensure_image(&response, &url)?;

        let bytes = write_atomically(response, dest).await?;
        debug!(path = %dest.display(), bytes, "Tile written");
        Ok(())
    }

    fn describe(&self, layer: &str, time: DateTime<Utc>, tile: &TileRequest) -> String {
        self.url(layer, time, tile)
            .unwrap_or_else(|e| format!("<{}>", e))
    }
}

/// Build the shared HTTP client.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to create HTTP client")
}

/// GET the capabilities document.
#[instrument(skip(client))]
pub async fn fetch_capabilities(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .context("Capabilities request failed")?;
    let response = check_response(response, url)?;
    let text = response
        .text()
        .await
        .context("Failed to read capabilities body")?;
    info!(bytes = text.len(), "Fetched capabilities");
    Ok(text)
}

fn check_response(response: Response, url: &str) -> Result<Response> {
    let status = response.status();
    if !status.is_success() {
        bail!("HTTP error {} for {}", status, url);
    }
    Ok(response)
}

/// True for `image/*` content types, ignoring parameters and case.
pub fn is_image_content_type(value: &str) -> bool {
    value
        .trim_start()
        .get(..6)
        .map_or(false, |prefix| prefix.eq_ignore_ascii_case("image/"))
}

fn ensure_image(response: &Response, url: &str) -> Result<()> {
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !is_image_content_type(content_type) {
        return Err(anyhow!(
            "Unexpected content type {:?} for {}",
            content_type,
            url
        ));
    }
    Ok(())
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Stream the body to `<dest>.part` then rename over `dest`.
async fn write_atomically(mut response: Response, dest: &Path) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let temp = part_path(dest);
    let written = async {
        let mut file = fs::File::create(&temp)
            .await
            .with_context(|| format!("Failed to create {}", temp.display()))?;
        let mut total = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .context("Error reading response body")?
        {
            file.write_all(&chunk).await.context("Error writing tile")?;
            total += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok::<_, anyhow::Error>(total)
    }
    .await;

    match written {
        Ok(total) => {
            fs::rename(&temp, dest)
                .await
                .with_context(|| format!("Failed to move tile into {}", dest.display()))?;
            Ok(total)
        }
        Err(e) => {
            fs::remove_file(&temp).await.ok();
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use wms_common::BoundingBox;

    const TILE_PATH: &str = "prectype/20250101T060000Z/tile_0_0_1_2_3.png";

    /// Serve a single HTTP response on a loopback port and return the WMS URL.
    async fn serve_once(content_type: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                content_type,
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{}/wms", addr)
    }

    fn loopback_fetcher(url: String) -> HttpTileFetcher {
        let client = Client::builder().no_proxy().build().unwrap();
        HttpTileFetcher::new(client, url)
    }

    fn sample_tile() -> TileRequest {
        TileRequest::new(BoundingBox::new("EPSG:3575", 0.0, 1.0, 2.0, 3.0), 256, 256)
    }

    #[test]
    fn test_image_content_types() {
        assert!(is_image_content_type("image/png"));
        assert!(is_image_content_type("Image/PNG; charset=binary"));
        assert!(!is_image_content_type("text/xml"));
        assert!(!is_image_content_type("application/vnd.ogc.se_xml"));
        assert!(!is_image_content_type(""));
    }

    #[test]
    fn test_part_path() {
        let dest = Path::new("data/prectype/20250101T000000Z/tile_0_1_2_3_4.png");
        assert_eq!(
            part_path(dest),
            Path::new("data/prectype/20250101T000000Z/tile_0_1_2_3_4.png.part")
        );
    }

    #[test]
    fn test_http_fetcher_describes_getmap_url() {
        let client = build_client(Duration::from_secs(5)).unwrap();
        let fetcher = HttpTileFetcher::new(client, "https://example.com/wms");
        let time = test_utils::utc(2025, 1, 1, 6, 0);
        let url = fetcher.describe("prectype", time, &sample_tile());
        assert!(url.starts_with("https://example.com/wms?REQUEST=GetMap"));
        assert!(url.contains("TIME=2025-01-01T06%3A00%3A00Z"));
        assert!(url.contains("LAYERS=prectype"));
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_image_response() {
        let url = serve_once("text/xml", b"<ServiceExceptionReport/>").await;
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join(TILE_PATH);

        let fetcher = loopback_fetcher(url);
        let time = test_utils::utc(2025, 1, 1, 6, 0);
        let err = fetcher
            .fetch_tile("prectype", time, &sample_tile(), &dest)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Unexpected content type"));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_fetch_writes_image_body() {
        let url = serve_once("image/png", b"\x89PNG tile body").await;
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join(TILE_PATH);

        let fetcher = loopback_fetcher(url);
        let time = test_utils::utc(2025, 1, 1, 6, 0);
        fetcher
            .fetch_tile("prectype", time, &sample_tile(), &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"\x89PNG tile body");
        assert!(!part_path(&dest).exists());
    }
}
