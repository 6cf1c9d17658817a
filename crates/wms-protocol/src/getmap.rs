//! WMS 1.1.1 GetMap request construction.

use chrono::{DateTime, Utc};
use url::Url;

use wms_common::time::format_instant;
use wms_common::{BoundingBox, TileRequest};

/// Everything needed to request one transparent PNG tile for one instant.
#[derive(Debug, Clone)]
pub struct GetMapRequest<'a> {
    pub layer: &'a str,
    pub time: DateTime<Utc>,
    pub bbox: &'a BoundingBox,
    pub width: u32,
    pub height: u32,
}

impl<'a> GetMapRequest<'a> {
    pub fn for_tile(layer: &'a str, time: DateTime<Utc>, tile: &'a TileRequest) -> Self {
        Self {
            layer,
            time,
            bbox: &tile.bbox,
            width: tile.width,
            height: tile.height,
        }
    }

    /// Query parameters in the order they are sent.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("REQUEST", "GetMap".to_string()),
            ("SERVICE", "WMS".to_string()),
            ("VERSION", "1.1.1".to_string()),
            ("FORMAT", "image/png".to_string()),
            ("STYLES", String::new()),
            ("TRANSPARENT", "true".to_string()),
            ("TIME", format_instant(&self.time)),
            ("LAYERS", self.layer.to_string()),
            ("WIDTH", self.width.to_string()),
            ("HEIGHT", self.height.to_string()),
            ("SRS", self.bbox.crs.clone()),
            ("BBOX", self.bbox.to_wms_string()),
        ]
    }

    /// Full request URL. Existing query parameters on `base_url` are kept.
    pub fn to_url(&self, base_url: &str) -> Result<String, url::ParseError> {
        let url = Url::parse_with_params(base_url, self.params())?;
        Ok(url.into())
    }
}

/// Convenience wrapper around [`GetMapRequest::to_url`].
pub fn build_getmap_url(
    base_url: &str,
    layer: &str,
    time: DateTime<Utc>,
    bbox: &BoundingBox,
    width: u32,
    height: u32,
) -> Result<String, url::ParseError> {
    GetMapRequest {
        layer,
        time,
        bbox,
        width,
        height,
    }
    .to_url(base_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_build_getmap_url() {
        let bbox = BoundingBox::new("EPSG:3575", -10.5, 0.0, 20.0, 30.0);
        let time = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let base = "https://example.com/map";
        let url = build_getmap_url(base, "prectype", time, &bbox, 512, 256).unwrap();

        let prefix = "https://example.com/map?REQUEST=GetMap&SERVICE=WMS&VERSION=1.1.1";
        assert!(url.starts_with(prefix));
        assert!(url.contains("FORMAT=image%2Fpng"));
        assert!(url.contains("&STYLES=&"));
        assert!(url.contains("TRANSPARENT=true"));
        assert!(url.contains("LAYERS=prectype"));
        assert!(url.contains("TIME=2025-01-01T00%3A00%3A00Z"));
        assert!(url.contains("WIDTH=512&HEIGHT=256"));
        assert!(url.contains("SRS=EPSG%3A3575"));
        assert!(url.contains("BBOX=-10.5%2C0%2C20%2C30"));
    }

    #[test]
    fn test_invalid_base_url() {
        let bbox = BoundingBox::new("EPSG:3575", 0.0, 0.0, 1.0, 1.0);
        let time = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert!(build_getmap_url("not a url", "x", time, &bbox, 1, 1).is_err());
    }
}
