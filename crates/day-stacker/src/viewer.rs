//! Static HTML viewer for the daily composites.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{StackError, StackResult};
use crate::manifest::Manifest;

pub const DEFAULT_TITLE: &str = "Daily Precipitation Stack";

/// File name the viewer is written to.
pub const VIEWER_FILE: &str = "index.html";

/// Page template. Placeholders: `{{TITLE}}`, `{{INITIAL_LAYER}}`,
/// `{{INITIAL_DAY}}`, `{{EMPTY_HIDDEN}}`, `{{TILE_BASE}}`, `{{MANIFEST}}`.
const VIEWER_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{{TITLE}}</title>
    <style>
        :root { --bg: #0f1720; --panel: #17212c; --text: #e6edf3; --muted: #8b9bab; --accent: #4fb3ff; }
        * { box-sizing: border-box; }
        body { margin: 0; font-family: system-ui, sans-serif; background: var(--bg); color: var(--text); }
        header { padding: 24px 32px; background: linear-gradient(135deg, #12324f 0%, #0f1720 100%); }
        header h1 { margin: 0; font-size: 1.6rem; font-weight: 600; }
        header .subtitle { margin: 6px 0 0; color: var(--muted); font-size: 0.9rem; }
        .controls { display: flex; gap: 16px; padding: 16px 32px; background: var(--panel); align-items: end; }
        .controls label { display: flex; flex-direction: column; gap: 4px; font-size: 0.8rem; color: var(--muted); }
        .controls select { min-width: 200px; padding: 6px 8px; background: var(--bg); color: var(--text); border: 1px solid #2b3a4a; border-radius: 4px; }
        .meta { margin-left: auto; font-size: 0.85rem; color: var(--muted); }
        .grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(280px, 1fr)); gap: 16px; padding: 24px 32px; }
        .tile { background: var(--panel); border-radius: 6px; overflow: hidden; animation: floatIn 0.3s ease-out; }
        .tile img { display: block; width: 100%; height: auto; background: #22303d; }
        .tile-caption { padding: 8px 10px; font-size: 0.8rem; color: var(--muted); }
        .empty { margin: 48px 32px; padding: 24px; border: 1px dashed #2b3a4a; border-radius: 6px; text-align: center; color: var(--muted); }
        @keyframes floatIn { from { opacity: 0; transform: translateY(6px); } to { opacity: 1; transform: none; } }
    </style>
</head>
<body data-initial-layer="{{INITIAL_LAYER}}" data-initial-day="{{INITIAL_DAY}}">
    <header>
        <h1>{{TITLE}}</h1>
        <p class="subtitle">Daily composites built from radar frames so precipitation footprints stand out.</p>
    </header>
    <div class="controls">
        <label>Layer <select id="layerSelect"></select></label>
        <label>Day <select id="daySelect"></select></label>
        <div class="meta" id="dayMeta"></div>
    </div>
    <div class="grid" id="tileGrid"></div>
    <div class="empty" id="emptyState"{{EMPTY_HIDDEN}}>No stacked tiles found. Run the stacker first.</div>
    <script id="manifestData" type="application/json">{{MANIFEST}}</script>
    <script>
        const tileBase = "{{TILE_BASE}}";
        const manifest = JSON.parse(document.getElementById("manifestData").textContent);
        const layerSelect = document.getElementById("layerSelect");
        const daySelect = document.getElementById("daySelect");
        const grid = document.getElementById("tileGrid");
        const meta = document.getElementById("dayMeta");
        const emptyEl = document.getElementById("emptyState");

        function option(value, label) {
            const el = document.createElement("option");
            el.value = value;
            el.textContent = label;
            return el;
        }

        function currentLayer() {
            return manifest.layers.find((layer) => layer.name === layerSelect.value);
        }

        function loadDays(layer, selected) {
            daySelect.replaceChildren(...layer.days.map((day) => option(day.date, day.date)));
            daySelect.value = selected || (layer.days[0] ? layer.days[0].date : "");
        }

        function render() {
            grid.replaceChildren();
            const layer = currentLayer();
            const day = layer && layer.days.find((item) => item.date === daySelect.value);
            if (!day || day.tiles.length === 0) {
                meta.textContent = "";
                emptyEl.hidden = false;
                return;
            }
            emptyEl.hidden = true;
            meta.textContent = `${day.times.length} frames from ${day.times[0] || "?"} to ${day.times[day.times.length - 1] || "?"}`;
            for (const tile of day.tiles) {
                const card = document.createElement("div");
                card.className = "tile";
                const img = document.createElement("img");
                img.loading = "lazy";
                img.src = tileBase + tile.path;
                img.alt = `${layer.name} ${day.date} tile ${tile.index}`;
                const caption = document.createElement("div");
                caption.className = "tile-caption";
                caption.textContent = `Tile ${tile.index} | ${tile.width}x${tile.height} | ${tile.count} frames`;
                card.appendChild(img);
                card.appendChild(caption);
                grid.appendChild(card);
            }
        }

        function init() {
            if (manifest.layers.length === 0) {
                emptyEl.hidden = false;
                return;
            }
            layerSelect.replaceChildren(...manifest.layers.map((layer) => option(layer.name, layer.name)));
            layerSelect.value = document.body.dataset.initialLayer || manifest.layers[0].name;
            const layer = currentLayer() || manifest.layers[0];
            loadDays(layer, document.body.dataset.initialDay);
            render();
            layerSelect.addEventListener("change", () => {
                const selected = currentLayer();
                if (selected) {
                    loadDays(selected);
                    render();
                }
            });
            daySelect.addEventListener("change", render);
        }

        init();
    </script>
</body>
</html>
"#;

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape for a double-quoted JavaScript string literal inside `<script>`.
fn escape_js_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            '<' if chars.peek() == Some(&'/') => out.push_str("<\\"),
            _ => out.push(c),
        }
    }
    out
}

/// Substitute `{{NAME}}` placeholders in a single pass, so substituted
/// values are never scanned for further placeholders.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let extra: usize = values.iter().map(|(_, value)| value.len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let value = after.find("}}").and_then(|end| {
            let key = &after[..end];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value, end + 2))
        });
        match value {
            Some((value, consumed)) => {
                out.push_str(value);
                rest = &after[consumed..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Render the viewer page. `tile_base` is prefixed to every tile path.
pub fn render_viewer_html(manifest: &Manifest, title: &str, tile_base: &str) -> String {
    // Serializing the manifest types does not fail.
    let data = serde_json::to_string(manifest).unwrap_or_else(|_| r#"{"layers":[]}"#.to_string());

    let first_layer = manifest.layers.first();
    let initial_layer = first_layer
        .map(|layer| layer.name.as_str())
        .unwrap_or_default();
    let initial_day = first_layer
        .and_then(|layer| layer.days.first())
        .map(|day| day.date.to_string())
        .unwrap_or_default();
    let empty_hidden = if manifest.layers.is_empty() { "" } else { " hidden" };

    fill_template(
        VIEWER_HTML,
        &[
            ("TITLE", &escape_html(title)),
            ("INITIAL_LAYER", &escape_html(initial_layer)),
            ("INITIAL_DAY", &escape_html(&initial_day)),
            ("EMPTY_HIDDEN", empty_hidden),
            ("TILE_BASE", &escape_js_string(tile_base)),
            ("MANIFEST", &data.replace("</", "<\\/")),
        ],
    )
}

/// Write `index.html` into `output_dir`.
pub fn write_viewer(
    output_dir: &Path,
    manifest: &Manifest,
    title: &str,
    tile_base: &str,
) -> StackResult<PathBuf> {
    fs::create_dir_all(output_dir).map_err(StackError::io(output_dir))?;
    let path = output_dir.join(VIEWER_FILE);
    let html = render_viewer_html(manifest, title, tile_base);
    fs::write(&path, html).map_err(StackError::io(&path))?;
    info!(path = %path.display(), layers = manifest.layers.len(), "Wrote viewer");
    Ok(path)
}
