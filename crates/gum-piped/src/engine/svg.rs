//! In-process SVG evaluation backed by `usvg`.

use std::sync::Arc;

use resvg::usvg::{self, fontdb};
use tracing::debug;

use super::{
    ENGINE_TARGET, Element, EvaluateError, EvaluateOptions, Evaluator, SerializeError, Size,
};

/// Loads the system font database shared by parsing and rasterising.
pub(crate) fn system_fonts() -> Arc<fontdb::Database> {
    let mut database = fontdb::Database::new();
    database.load_system_fonts();
    debug!(
        target: ENGINE_TARGET,
        faces = database.len(),
        "loaded system font database"
    );
    Arc::new(database)
}

/// Parses SVG markup into a render tree.
pub(crate) fn parse_tree(
    markup: &str,
    fonts: &Arc<fontdb::Database>,
) -> Result<usvg::Tree, usvg::Error> {
    let options = usvg::Options {
        fontdb: Arc::clone(fonts),
        ..usvg::Options::default()
    };
    usvg::Tree::from_str(markup, &options)
}

fn tree_size(tree: &usvg::Tree) -> Size {
    let size = tree.size();
    Size::new(size.width(), size.height())
}

/// Evaluator that accepts SVG markup as its source language.
///
/// The size and theme options have no meaning for literal markup and are
/// ignored. A document that fails to parse is reported as a syntax failure.
#[derive(Debug, Clone)]
pub struct SvgEvaluator {
    fonts: Arc<fontdb::Database>,
}

impl SvgEvaluator {
    /// Creates an evaluator using the system font database.
    #[must_use]
    pub fn new() -> Self {
        Self::with_fonts(system_fonts())
    }

    /// Creates an evaluator sharing an existing font database.
    #[must_use]
    pub const fn with_fonts(fonts: Arc<fontdb::Database>) -> Self {
        Self { fonts }
    }
}

impl Default for SvgEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator for SvgEvaluator {
    fn evaluate(
        &self,
        code: &str,
        _options: &EvaluateOptions,
    ) -> Result<Box<dyn Element>, EvaluateError> {
        let tree = parse_tree(code, &self.fonts)
            .map_err(|error| EvaluateError::syntax(format!("invalid SVG source: {error}")))?;
        Ok(Box::new(TreeElement::new(tree)))
    }
}

/// Element backed by a parsed `usvg` tree.
///
/// Serialisation writes the normalised tree, so the markup handed to the
/// raster encoder is the exact document `usvg` understood.
pub struct TreeElement {
    tree: usvg::Tree,
}

impl TreeElement {
    /// Wraps a parsed tree.
    #[must_use]
    pub const fn new(tree: usvg::Tree) -> Self {
        Self { tree }
    }
}

impl Element for TreeElement {
    fn to_markup(&self) -> Result<String, SerializeError> {
        Ok(self.tree.to_string(&usvg::WriteOptions::default()))
    }

    fn size(&self) -> Size {
        tree_size(&self.tree)
    }
}

/// Element holding markup produced by an external evaluator.
///
/// The markup is validated when serialised; a document `usvg` rejects is a
/// serialisation failure rather than an evaluation failure because the
/// evaluator itself reported success.
#[derive(Debug, Clone)]
pub struct MarkupElement {
    markup: String,
    size: Size,
}

impl MarkupElement {
    /// Wraps evaluator output with its reported size.
    pub fn new(markup: impl Into<String>, size: Size) -> Self {
        Self {
            markup: markup.into(),
            size,
        }
    }
}

impl Element for MarkupElement {
    fn to_markup(&self) -> Result<String, SerializeError> {
        usvg::Tree::from_str(&self.markup, &usvg::Options::default())
            .map_err(|error| SerializeError::new(format!("evaluator produced invalid markup: {error}")))?;
        Ok(self.markup.clone())
    }

    fn size(&self) -> Size {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    const RECT: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="50"><rect width="100" height="50" fill="red"/></svg>"#;

    #[fixture]
    fn evaluator() -> SvgEvaluator {
        SvgEvaluator::with_fonts(Arc::new(fontdb::Database::new()))
    }

    #[fixture]
    fn options() -> EvaluateOptions {
        EvaluateOptions {
            size: 750,
            theme: "light".to_owned(),
        }
    }

    #[rstest]
    fn evaluates_svg_source(evaluator: SvgEvaluator, options: EvaluateOptions) {
        let element = evaluator.evaluate(RECT, &options).expect("valid svg");
        assert_eq!(element.size(), Size::new(100.0, 50.0));
        let markup = element.to_markup().expect("serialise");
        assert!(markup.contains("<svg"), "unexpected markup: {markup}");
    }

    #[rstest]
    fn rejects_malformed_source(evaluator: SvgEvaluator, options: EvaluateOptions) {
        let Err(error) = evaluator.evaluate("<svg", &options) else {
            panic!("malformed source should fail");
        };
        assert!(matches!(error, EvaluateError::Syntax { .. }));
        assert!(error.to_string().starts_with("invalid SVG source"));
    }

    #[rstest]
    fn rejects_non_svg_source(evaluator: SvgEvaluator, options: EvaluateOptions) {
        assert!(evaluator.evaluate("return Rect()", &options).is_err());
    }

    #[test]
    fn markup_element_returns_valid_markup_unchanged() {
        let element = MarkupElement::new(RECT, Size::new(100.0, 50.0));
        assert_eq!(element.to_markup().expect("valid markup"), RECT);
    }

    #[test]
    fn markup_element_rejects_invalid_markup() {
        let element = MarkupElement::new("<svg><g>", Size::new(1.0, 1.0));
        let error = element.to_markup().expect_err("unclosed markup");
        assert!(error.to_string().contains("invalid markup"));
    }
}
