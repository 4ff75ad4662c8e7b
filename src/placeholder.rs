use std::sync::{Arc, OnceLock};

use crate::foundation::core::{Bitmap, ImageSize, Rgb8};

const NO_DATA_TEXT: &str = "No data";
const FAILED_TEXT: &str = "Failed to render";

const NO_DATA_BG: Rgb8 = Rgb8::WHITE;
const FAILED_BG: Rgb8 = Rgb8::new(255, 240, 240);
const FAILED_BORDER: Rgb8 = Rgb8::new(176, 48, 48);

/// Builds the bitmaps shown in place of frames that have no data or failed to render: a flat
/// background with a centered bold message.
///
/// The system font database is loaded on first use and shared by every bitmap the factory makes.
#[derive(Default)]
pub struct PlaceholderFactory {
    fontdb: OnceLock<Arc<usvg::fontdb::Database>>,
}

impl std::fmt::Debug for PlaceholderFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaceholderFactory")
            .field("fonts_loaded", &self.fontdb.get().is_some())
            .finish()
    }
}

impl PlaceholderFactory {
    /// Create a factory. Fonts are not loaded until the first bitmap is requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// "No data" bitmap.
    pub fn no_data(&self, size: ImageSize) -> Bitmap {
        self.render(size, NO_DATA_TEXT, NO_DATA_BG, None)
    }

    /// "Failed to render" bitmap, tinted and framed so it is distinguishable from "No data".
    pub fn failed(&self, size: ImageSize) -> Bitmap {
        self.render(size, FAILED_TEXT, FAILED_BG, Some(FAILED_BORDER))
    }

    fn fontdb(&self) -> Arc<usvg::fontdb::Database> {
        self.fontdb
            .get_or_init(|| {
                let mut db = usvg::fontdb::Database::new();
                db.load_system_fonts();
                tracing::debug!(faces = db.len(), "loaded placeholder fonts");
                Arc::new(db)
            })
            .clone()
    }

    fn render(&self, size: ImageSize, text: &str, bg: Rgb8, border: Option<Rgb8>) -> Bitmap {
        match self.rasterize(size, text, bg, border) {
            Ok(bitmap) => bitmap,
            Err(e) => {
                tracing::warn!(error = %e, %size, "placeholder text rendering failed, using flat fill");
                Bitmap::filled(size, [bg.r, bg.g, bg.b, 255])
            }
        }
    }

    fn rasterize(
        &self,
        size: ImageSize,
        text: &str,
        bg: Rgb8,
        border: Option<Rgb8>,
    ) -> anyhow::Result<Bitmap> {
        let svg = placeholder_svg(size, text, bg, border);
        let opts = usvg::Options {
            fontdb: self.fontdb(),
            ..Default::default()
        };
        let tree = usvg::Tree::from_str(&svg, &opts)?;

        let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width, size.height)
            .ok_or_else(|| anyhow::anyhow!("failed to allocate {size} pixmap"))?;
        resvg::render(
            &tree,
            resvg::tiny_skia::Transform::identity(),
            &mut pixmap.as_mut(),
        );

        let mut data = Vec::with_capacity(size.pixel_count() * 4);
        for px in pixmap.pixels() {
            let c = px.demultiply();
            data.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        Ok(Bitmap::from_rgba8(size.width, size.height, data)?)
    }
}

fn placeholder_svg(size: ImageSize, text: &str, bg: Rgb8, border: Option<Rgb8>) -> String {
    let (w, h) = (size.width, size.height);
    let font_size = (w.min(h) as f32 / 12.0).clamp(8.0, 48.0);
    let frame = border
        .map(|c| {
            format!(
                r##"<rect x="1" y="1" width="{}" height="{}" fill="none" stroke="#{}" stroke-width="2"/>"##,
                w.saturating_sub(2),
                h.saturating_sub(2),
                c.to_hex()
            )
        })
        .unwrap_or_default();
    format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><rect width="{w}" height="{h}" fill="#{bg}"/>{frame}<text x="{cx}" y="{cy}" font-family="sans-serif" font-weight="bold" font-size="{font_size}" text-anchor="middle" dominant-baseline="central" fill="#000000">{text}</text></svg>"##,
        bg = bg.to_hex(),
        cx = w as f32 / 2.0,
        cy = h as f32 / 2.0,
    )
}

#[cfg(test)]
#[path = "../tests/unit/placeholder.rs"]
mod tests;
