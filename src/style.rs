//! Fixed page style and HTML template for generated PDFs.
//!
//! Every document is printed with the same style sheet. Keeping it here, and
//! not inline in the pipeline, means the look of every PDF the service emits
//! can be reviewed (and tested) in one place.
//!
//! The `@page` rule carries the A4 geometry and 2 cm margins to the engine:
//! Chromium's command-line printer has no margin flags, so page setup must
//! come from CSS. `print-color-adjust: exact` makes it print backgrounds
//! (code blocks) instead of dropping them as ink-savers.

/// Style sheet embedded in the `<head>` of every rendered document.
pub const DEFAULT_STYLESHEET: &str = r#"
@page {
    size: A4;
    margin: 2cm;
}
html {
    -webkit-print-color-adjust: exact;
    print-color-adjust: exact;
}
body {
    font-family: Arial, sans-serif;
    margin: 2cm;
    line-height: 1.5;
}
h1, h2, h3, h4, h5, h6 {
    color: #333;
}
pre {
    background-color: #f4f4f4;
    padding: 10px;
    border: 1px solid #ddd;
    border-radius: 4px;
}
img {
    max-width: 100%;
    height: auto;
}
"#;

/// Wrap an HTML fragment in the complete printable document.
pub fn wrap_document(body_html: &str) -> String {
    let mut doc = String::with_capacity(body_html.len() + DEFAULT_STYLESHEET.len() + 160);
    doc.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<style>");
    doc.push_str(DEFAULT_STYLESHEET);
    doc.push_str("</style>\n</head>\n<body>\n");
    doc.push_str(body_html);
    doc.push_str("</body>\n</html>\n");
    doc
}
