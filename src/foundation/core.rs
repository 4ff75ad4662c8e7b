use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context as _;

use crate::foundation::error::{MapAnimError, MapAnimResult};

/// Target image dimensions in pixels. Both sides are non-zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ImageSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl ImageSize {
    /// Create a validated size with non-zero sides.
    pub fn new(width: u32, height: u32) -> MapAnimResult<Self> {
        let size = Self { width, height };
        size.validate()?;
        Ok(size)
    }

    /// Reject zero-sized images.
    pub fn validate(self) -> MapAnimResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(MapAnimError::validation(format!(
                "image size must be non-zero, got {self}"
            )));
        }
        Ok(())
    }

    /// Number of pixels covered by this size.
    pub fn pixel_count(self) -> usize {
        (self.width as usize).saturating_mul(self.height as usize)
    }
}

impl Default for ImageSize {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Opaque RGB8 color, used as the render and composite background.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Rgb8 {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb8 {
    /// Pure white, the default animation background.
    pub const WHITE: Self = Self::new(255, 255, 255);
    /// Pure black.
    pub const BLACK: Self = Self::new(0, 0, 0);

    /// Construct from channels.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `rrggbb` lowercase hex form, as expected by display drivers.
    pub fn to_hex(self) -> String {
        format!("{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// `r:g:b` decimal form, as expected by command parameters.
    pub fn to_colon(self) -> String {
        format!("{}:{}:{}", self.r, self.g, self.b)
    }
}

impl Default for Rgb8 {
    fn default() -> Self {
        Self::WHITE
    }
}

impl From<[u8; 3]> for Rgb8 {
    fn from(v: [u8; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl From<Rgb8> for [u8; 3] {
    fn from(c: Rgb8) -> Self {
        [c.r, c.g, c.b]
    }
}

impl FromStr for Rgb8 {
    type Err = MapAnimError;

    /// Accepts `r,g,b`, `r:g:b`, `rrggbb` and `#rrggbb`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bad = || MapAnimError::validation(format!("invalid color '{s}'"));

        if s.contains(',') || s.contains(':') {
            let parts = s
                .split([',', ':'])
                .map(|p| p.trim().parse::<u8>().map_err(|_| bad()))
                .collect::<MapAnimResult<Vec<_>>>()?;
            let [r, g, b] = parts[..] else {
                return Err(bad());
            };
            return Ok(Self::new(r, g, b));
        }

        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(bad());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| bad());
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

/// In-memory straight-alpha RGBA8 bitmap, row-major and tightly packed.
///
/// Pixel storage is shared: cloning a bitmap is cheap, which lets the cache hand out copies to
/// display surfaces without duplicating frames.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    data: Arc<Vec<u8>>,
}

impl Bitmap {
    /// Wrap RGBA8 bytes, checking that the buffer matches the dimensions.
    pub fn from_rgba8(width: u32, height: u32, data: Vec<u8>) -> MapAnimResult<Self> {
        let size = ImageSize::new(width, height)?;
        if data.len() != size.pixel_count().saturating_mul(4) {
            return Err(MapAnimError::validation(format!(
                "bitmap data length {} does not match {size} rgba8",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data: Arc::new(data),
        })
    }

    /// A bitmap where every pixel is `rgba`.
    pub fn filled(size: ImageSize, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity(size.pixel_count() * 4);
        for _ in 0..size.pixel_count() {
            data.extend_from_slice(&rgba);
        }
        Self {
            width: size.width,
            height: size.height,
            data: Arc::new(data),
        }
    }

    /// Convert a decoded `image` buffer.
    pub fn from_image(img: image::RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: Arc::new(img.into_raw()),
        }
    }

    /// Decode an image file (PPM, PNG, ...) into a bitmap.
    pub fn decode_file(path: &Path) -> MapAnimResult<Self> {
        let img = image::open(path)
            .with_context(|| format!("decode image '{}'", path.display()))?
            .to_rgba8();
        if img.width() == 0 || img.height() == 0 {
            return Err(MapAnimError::validation(format!(
                "image '{}' is empty",
                path.display()
            )));
        }
        Ok(Self::from_image(img))
    }

    /// Encode as PNG at `path`.
    pub fn save_png(&self, path: &Path) -> MapAnimResult<()> {
        image::save_buffer_with_format(
            path,
            &self.data,
            self.width,
            self.height,
            image::ExtendedColorType::Rgba8,
            image::ImageFormat::Png,
        )
        .with_context(|| format!("write png '{}'", path.display()))?;
        Ok(())
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Dimensions as an [`ImageSize`].
    pub fn size(&self) -> ImageSize {
        ImageSize {
            width: self.width,
            height: self.height,
        }
    }

    /// Raw RGBA8 bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// RGBA of the pixel at `(x, y)`. Out-of-range coordinates return `None`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        let px = &self.data[i..i + 4];
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Copy out the `w`x`h` rectangle at `(x, y)`, clamped to the bitmap bounds.
    pub fn cropped(&self, x: u32, y: u32, w: u32, h: u32) -> MapAnimResult<Self> {
        let x = x.min(self.width);
        let y = y.min(self.height);
        let w = w.min(self.width - x);
        let h = h.min(self.height - y);
        let row = self.width as usize * 4;
        let mut out = Vec::with_capacity(w as usize * h as usize * 4);
        for yy in y..y + h {
            let start = yy as usize * row + x as usize * 4;
            out.extend_from_slice(&self.data[start..start + w as usize * 4]);
        }
        Self::from_rgba8(w, h, out)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
