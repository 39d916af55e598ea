//! Print document shell.
//!
//! Captured page content is a bare `<article>` fragment stripped of the site's
//! own CSS. The shell gives it a charset and a small stylesheet so the PDF is
//! readable on its own.

/// Stylesheet injected into every rendered page.
pub const PRINT_STYLESHEET: &str = "\
body { font-family: Arial, sans-serif; }
article { max-width: 800px; margin: 0 auto; padding: 20px; }
h1, h2, h3 { color: #333; }
p { line-height: 1.6; }
code { background-color: #f4f4f4; padding: 2px 4px; border-radius: 3px; }
pre { background-color: #f8f8f8; padding: 15px; border-radius: 5px; overflow-x: auto; }
img { max-width: 100%; height: auto; }
";

/// Wrap a content fragment in a complete UTF-8 HTML document.
pub fn wrap_document(markup: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n{PRINT_STYLESHEET}</style>\n</head>\n<body>\n{markup}\n</body>\n</html>\n"
    )
}
