//! PNG rasterisation backed by `resvg`.

use std::str::FromStr;
use std::sync::Arc;

use resvg::tiny_skia::{Color, Pixmap, Transform};
use resvg::usvg::fontdb;
use tracing::debug;

use super::svg::{parse_tree, system_fonts};
use super::{ENGINE_TARGET, EncodeError, RasterEncoder, RasterOptions, Size};

/// Largest accepted raster side, in pixels.
pub const MAX_RASTER_SIZE: u32 = 8192;

/// Raster encoder producing PNG bytes.
///
/// The output is scaled so its larger side equals the requested size while
/// keeping the element's aspect ratio, and is filled with the requested
/// background colour before drawing.
#[derive(Debug, Clone)]
pub struct ResvgEncoder {
    fonts: Arc<fontdb::Database>,
}

impl ResvgEncoder {
    /// Creates an encoder using the system font database.
    #[must_use]
    pub fn new() -> Self {
        Self::with_fonts(system_fonts())
    }

    /// Creates an encoder sharing an existing font database.
    #[must_use]
    pub const fn with_fonts(fonts: Arc<fontdb::Database>) -> Self {
        Self { fonts }
    }
}

impl Default for ResvgEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterEncoder for ResvgEncoder {
    fn encode(&self, markup: &str, options: &RasterOptions) -> Result<Vec<u8>, EncodeError> {
        let (width, height) = target_dimensions(options.intrinsic, options.size)?;
        let background = parse_background(&options.background)?;
        let tree = parse_tree(markup, &self.fonts)
            .map_err(|error| EncodeError::new(format!("cannot rasterise markup: {error}")))?;

        let tree_size = tree.size();
        let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
            EncodeError::new(format!("cannot allocate a {width}x{height} raster"))
        })?;
        pixmap.fill(background);

        #[expect(
            clippy::cast_precision_loss,
            reason = "raster sides are bounded by MAX_RASTER_SIZE"
        )]
        let transform = Transform::from_scale(
            width as f32 / tree_size.width(),
            height as f32 / tree_size.height(),
        );
        resvg::render(&tree, transform, &mut pixmap.as_mut());

        debug!(
            target: ENGINE_TARGET,
            width,
            height,
            "rasterised markup"
        );
        pixmap
            .encode_png()
            .map_err(|error| EncodeError::new(format!("PNG encoding failed: {error}")))
    }
}

/// Computes the output dimensions for an element of the given size.
fn target_dimensions(intrinsic: Size, size: u32) -> Result<(u32, u32), EncodeError> {
    if size == 0 || size > MAX_RASTER_SIZE {
        return Err(EncodeError::new(format!(
            "unsupported size {size}: expected 1 to {MAX_RASTER_SIZE} pixels"
        )));
    }
    if intrinsic.is_empty() {
        return Err(EncodeError::new(format!(
            "element has no drawable area ({}x{})",
            intrinsic.width, intrinsic.height
        )));
    }

    let longest = f64::from(intrinsic.width.max(intrinsic.height));
    let scale = f64::from(size) / longest;
    let scaled = |extent: f32| -> u32 {
        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "the scaled extent is positive and at most `size`"
        )]
        let pixels = (f64::from(extent) * scale).round() as u32;
        pixels.clamp(1, size)
    };
    Ok((scaled(intrinsic.width), scaled(intrinsic.height)))
}

/// Parses a background colour in any SVG colour syntax.
fn parse_background(value: &str) -> Result<Color, EncodeError> {
    let color = svgtypes::Color::from_str(value.trim())
        .map_err(|error| EncodeError::new(format!("invalid background '{value}': {error}")))?;
    Ok(Color::from_rgba8(
        color.red,
        color.green,
        color.blue,
        color.alpha,
    ))
}
