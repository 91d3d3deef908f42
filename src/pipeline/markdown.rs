//! Content transformation: Markdown → complete printable HTML document.
//!
//! comrak with the GitHub-flavoured extensions is the renderer. Raw HTML in
//! the source is passed through by default, as most Markdown-to-PDF tools do;
//! set [`crate::config::ConversionConfig::allow_raw_html`] to `false` to have
//! it escaped instead.

use crate::error::Md2PdfError;
use crate::style::wrap_document;
use comrak::{format_html, parse_document, Arena, Options};
use tracing::debug;

fn options(allow_raw_html: bool) -> Options<'static> {
    let mut options = Options::default();

    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;
    ext.footnotes = true;

    let render = &mut options.render;
    render.github_pre_lang = true;
    render.r#unsafe = allow_raw_html;

    options
}

/// Render Markdown to an HTML fragment (no `<html>`/`<head>`).
pub fn to_html_fragment(markdown: &str, allow_raw_html: bool) -> Result<String, Md2PdfError> {
    let options = options(allow_raw_html);
    let arena = Arena::new();
    let root = parse_document(&arena, markdown, &options);

    let mut html = String::new();
    format_html(root, &options, &mut html).map_err(|e| Md2PdfError::Conversion {
        detail: e.to_string(),
    })?;
    Ok(html)
}

/// Render Markdown to the full styled document handed to the engine.
pub fn to_html_document(markdown: &str, allow_raw_html: bool) -> Result<String, Md2PdfError> {
    let fragment = to_html_fragment(markdown, allow_raw_html)?;
    debug!(
        "Markdown {} bytes → HTML fragment {} bytes",
        markdown.len(),
        fragment.len()
    );
    Ok(wrap_document(&fragment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_and_paragraph() {
        let html = to_html_fragment("# Hello\n\nWorld", true).unwrap();
        assert!(html.contains("<h1>Hello</h1>"), "got: {html}");
        assert!(html.contains("<p>World</p>"), "got: {html}");
    }

    #[test]
    fn gfm_table_and_strikethrough() {
        let md = "| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~";
        let html = to_html_fragment(md, true).unwrap();
        assert!(html.contains("<table>"), "got: {html}");
        assert!(html.contains("<del>gone</del>"), "got: {html}");
    }

    #[test]
    fn fenced_code_keeps_language() {
        let html = to_html_fragment("```rust\nfn main() {}\n```", true).unwrap();
        assert!(html.contains("<pre lang=\"rust\">"), "got: {html}");
    }

    #[test]
    fn raw_html_toggle() {
        let md = "<div class=\"note\">x</div>";
        assert!(to_html_fragment(md, true).unwrap().contains("<div class=\"note\">"));
        assert!(!to_html_fragment(md, false).unwrap().contains("<div class=\"note\">"));
    }

    #[test]
    fn document_wraps_fragment_with_style() {
        let doc = to_html_document("*hi*", true).unwrap();
        assert!(doc.starts_with("<!DOCTYPE html>"));
        assert!(doc.contains("<em>hi</em>"));
        assert!(doc.contains("font-family: Arial"));
    }
}
