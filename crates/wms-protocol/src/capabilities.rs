//! WMS GetCapabilities parsing.
//!
//! Extracts every named `Layer` with its title, available times and a
//! preferred bounding box. Only direct children of a `Layer` are considered
//! for that layer, so nested layers do not inherit or leak metadata.
//! Namespaces and prefixes are ignored.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use wms_common::bbox::{BboxParseError, HOME_CRS};
use wms_common::time::expand_time_values;
use wms_common::{BoundingBox, LayerInfo};

#[derive(Debug, thiserror::Error)]
pub enum CapabilitiesError {
    #[error("XML parsing error at position {position}: {source}")]
    Xml {
        position: usize,
        #[source]
        source: quick_xml::Error,
    },

    #[error("Malformed capabilities document: {0}")]
    Malformed(String),

    #[error("Invalid bounding box for layer '{layer}': {source}")]
    InvalidBbox {
        layer: String,
        #[source]
        source: BboxParseError,
    },
}

/// Parse a capabilities document into layers, in document order.
pub fn parse_capabilities(xml: &str) -> Result<Vec<LayerInfo>, CapabilitiesError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut parser = CapabilitiesParser::default();
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|source| CapabilitiesError::Xml {
                position: reader.buffer_position(),
                source,
            })?;

        match event {
            Event::Start(e) => parser.start(&e)?,
            Event::Empty(e) => {
                parser.start(&e)?;
                parser.end()?;
            }
            Event::End(_) => parser.end()?,
            Event::Text(t) => {
                let text = t.unescape().map_err(|source| CapabilitiesError::Xml {
                    position: reader.buffer_position(),
                    source,
                })?;
                parser.text(&text);
            }
            Event::CData(c) => parser.text(&String::from_utf8_lossy(&c)),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    parser.finish()
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Name,
    Title,
    Time,
}

/// Text being collected for a direct child of the innermost layer.
#[derive(Debug)]
struct Capture {
    field: Field,
    depth: usize,
    text: String,
}

#[derive(Debug)]
struct BboxCandidate {
    crs: String,
    attributes: Vec<(String, String)>,
}

impl BboxCandidate {
    fn coordinate(&self, key: &'static str) -> Result<f64, BboxParseError> {
        let raw = self
            .attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.trim())
            .ok_or(BboxParseError::MissingAttribute(key))?;
        raw.parse()
            .map_err(|_| BboxParseError::InvalidNumber(raw.to_string()))
    }

    fn to_bbox(&self) -> Result<BoundingBox, BboxParseError> {
        Ok(BoundingBox::new(
            self.crs.clone(),
            self.coordinate("minx")?,
            self.coordinate("miny")?,
            self.coordinate("maxx")?,
            self.coordinate("maxy")?,
        ))
    }
}

#[derive(Debug)]
struct LayerBuilder {
    /// Position in document order, reserved when the layer opens
    slot: usize,
    name: Option<String>,
    title: Option<String>,
    times: Vec<DateTime<Utc>>,
    bboxes: Vec<BboxCandidate>,
}

impl LayerBuilder {
    fn new(slot: usize) -> Self {
        Self {
            slot,
            name: None,
            title: None,
            times: Vec::new(),
            bboxes: Vec::new(),
        }
    }

    fn build(self) -> Result<Option<LayerInfo>, CapabilitiesError> {
        let Some(name) = self.name else {
            return Ok(None);
        };

        let bbox = select_bbox(&self.bboxes)
            .map(BboxCandidate::to_bbox)
            .transpose()
            .map_err(|source| CapabilitiesError::InvalidBbox {
                layer: name.clone(),
                source,
            })?;

        if self.times.is_empty() {
            debug!(layer = %name, "No time dimension found for layer");
        }

        Ok(Some(LayerInfo::new(name, self.title, self.times, bbox)))
    }
}

/// Prefer a bbox in the home projection, else the first one in document order.
fn select_bbox(candidates: &[BboxCandidate]) -> Option<&BboxCandidate> {
    candidates
        .iter()
        .find(|c| c.crs.eq_ignore_ascii_case(HOME_CRS))
        .or_else(|| candidates.first())
}

#[derive(Debug, Default)]
struct CapabilitiesParser {
    /// Local names of the currently open elements
    elements: Vec<Vec<u8>>,
    /// Open layers, innermost last
    open_layers: Vec<LayerBuilder>,
    /// Finished layers indexed by slot
    layers: Vec<Option<LayerInfo>>,
    capture: Option<Capture>,
    saw_root: bool,
}

impl CapabilitiesParser {
    fn start(&mut self, e: &BytesStart<'_>) -> Result<(), CapabilitiesError> {
        let local = e.local_name().as_ref().to_vec();
        let parent_is_layer = self
            .elements
            .last()
            .is_some_and(|parent| parent.as_slice() == b"Layer");

        self.saw_root = true;
        self.elements.push(local.clone());
        let depth = self.elements.len();

        if local.as_slice() == b"Layer" {
            self.open_layers.push(LayerBuilder::new(self.layers.len()));
            self.layers.push(None);
            return Ok(());
        }

        if !parent_is_layer {
            return Ok(());
        }

        let field = match local.as_slice() {
            b"Name" => Some(Field::Name),
            b"Title" => Some(Field::Title),
            b"Dimension" | b"Extent" => attribute(e, b"name")?
                .filter(|name| name.trim().eq_ignore_ascii_case("time"))
                .map(|_| Field::Time),
            b"BoundingBox" => {
                if let Some(candidate) = bbox_candidate(e)? {
                    if let Some(layer) = self.open_layers.last_mut() {
                        layer.bboxes.push(candidate);
                    }
                }
                None
            }
            _ => None,
        };

        if let Some(field) = field {
            self.capture = Some(Capture {
                field,
                depth,
                text: String::new(),
            });
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        let depth = self.elements.len();
        if let Some(capture) = self.capture.as_mut().filter(|c| c.depth == depth) {
            capture.text.push_str(text);
        }
    }

    fn end(&mut self) -> Result<(), CapabilitiesError> {
        let depth = self.elements.len();
        if self.capture.as_ref().is_some_and(|c| c.depth == depth) {
            let capture = self.capture.take();
            if let (Some(capture), Some(layer)) = (capture, self.open_layers.last_mut()) {
                apply_capture(layer, capture);
            }
        }

        let closed = self
            .elements
            .pop()
            .ok_or_else(|| CapabilitiesError::Malformed("unexpected closing tag".to_string()))?;

        if closed.as_slice() == b"Layer" {
            if let Some(builder) = self.open_layers.pop() {
                let slot = builder.slot;
                self.layers[slot] = builder.build()?;
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<Vec<LayerInfo>, CapabilitiesError> {
        if !self.saw_root {
            return Err(CapabilitiesError::Malformed("no root element".to_string()));
        }
        if let Some(open) = self.elements.last() {
            return Err(CapabilitiesError::Malformed(format!(
                "unclosed element <{}>",
                String::from_utf8_lossy(open)
            )));
        }
        Ok(self.layers.into_iter().flatten().collect())
    }
}

fn apply_capture(layer: &mut LayerBuilder, capture: Capture) {
    let text = capture.text.trim();
    match capture.field {
        Field::Name if layer.name.is_none() && !text.is_empty() => {
            layer.name = Some(text.to_string());
        }
        Field::Title if layer.title.is_none() && !text.is_empty() => {
            layer.title = Some(text.to_string());
        }
        Field::Time => layer.times.extend(expand_time_values(text)),
        _ => {}
    }
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, CapabilitiesError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| CapabilitiesError::Xml {
            position: 0,
            source: err.into(),
        })?;
        if attr.key.local_name().as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|source| CapabilitiesError::Xml {
                    position: 0,
                    source,
                })?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// A `BoundingBox` element with a usable `SRS` (1.1.1) or `CRS` (1.3.0).
fn bbox_candidate(e: &BytesStart<'_>) -> Result<Option<BboxCandidate>, CapabilitiesError> {
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| CapabilitiesError::Xml {
            position: 0,
            source: err.into(),
        })?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value: Cow<'_, str> = attr
            .unescape_value()
            .map_err(|source| CapabilitiesError::Xml {
                position: 0,
                source,
            })?;
        attributes.push((key, value.into_owned()));
    }

    let lookup = |key: &str| {
        attributes
            .iter()
            .find(|(name, value)| name == key && !value.trim().is_empty())
            .map(|(_, value)| value.trim().to_string())
    };
    let Some(crs) = lookup("SRS").or_else(|| lookup("CRS")) else {
        return Ok(None);
    };

    Ok(Some(BboxCandidate { crs, attributes }))
}
