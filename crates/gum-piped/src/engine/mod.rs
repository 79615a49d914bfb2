//! Graphics collaborators invoked by the task handlers.
//!
//! The dispatch layer only sees three seams: an [`Evaluator`] that turns
//! graphics-description source into an [`Element`], the element's own
//! serialisation to markup, and a [`RasterEncoder`] that turns markup into
//! image bytes. Each seam reports failures with its own error type so the
//! task registry can tag them with the right pipeline stage.
//!
//! Three implementations ship with the binary:
//!
//! - [`SvgEvaluator`] treats the source as SVG markup and parses it in
//!   process. It is the default when no external evaluator is configured.
//! - [`ProcessEvaluator`] delegates evaluation to an external command that
//!   speaks a one-line JSON protocol over stdio.
//! - [`ResvgEncoder`] rasterises markup to PNG.

mod error;
mod process;
mod raster;
mod svg;

pub use self::error::{EncodeError, EvaluateError, SerializeError};
pub use self::process::ProcessEvaluator;
pub use self::raster::{MAX_RASTER_SIZE, ResvgEncoder};
pub use self::svg::{MarkupElement, SvgEvaluator, TreeElement};
pub(crate) use self::svg::system_fonts;

/// Tracing target for collaborator calls.
pub(crate) const ENGINE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::engine");

/// Intrinsic dimensions of an evaluated element, in user units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    /// Horizontal extent.
    pub width: f32,
    /// Vertical extent.
    pub height: f32,
}

impl Size {
    /// Creates a size from its extents.
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Returns `true` when either extent is zero, negative or not finite.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0)
    }
}

/// Options forwarded to an [`Evaluator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluateOptions {
    /// Requested output size in pixels along the larger side.
    pub size: u32,
    /// Theme identifier.
    pub theme: String,
}

/// Options forwarded to a [`RasterEncoder`].
#[derive(Debug, Clone, PartialEq)]
pub struct RasterOptions {
    /// Output size in pixels along the larger side.
    pub size: u32,
    /// Background colour in any SVG colour syntax.
    pub background: String,
    /// Intrinsic size reported by the element that produced the markup.
    pub intrinsic: Size,
}

/// Evaluates graphics-description source into an element tree.
#[cfg_attr(test, mockall::automock)]
pub trait Evaluator: Send + Sync {
    /// Evaluates `code`.
    ///
    /// # Errors
    ///
    /// Returns an [`EvaluateError`] when the source cannot be evaluated.
    fn evaluate(
        &self,
        code: &str,
        options: &EvaluateOptions,
    ) -> Result<Box<dyn Element>, EvaluateError>;
}

/// An evaluated graphic awaiting serialisation.
#[cfg_attr(test, mockall::automock)]
pub trait Element {
    /// Serialises the element to markup.
    ///
    /// # Errors
    ///
    /// Returns a [`SerializeError`] when the element tree cannot be written.
    fn to_markup(&self) -> Result<String, SerializeError>;

    /// Intrinsic size of the element.
    fn size(&self) -> Size;
}

/// Encodes markup into raster image bytes.
#[cfg_attr(test, mockall::automock)]
pub trait RasterEncoder: Send + Sync {
    /// Rasterises `markup`.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] when the markup cannot be rasterised with the
    /// requested options.
    fn encode(&self, markup: &str, options: &RasterOptions) -> Result<Vec<u8>, EncodeError>;
}
