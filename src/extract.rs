//! Turning docset documents into bounded plain text.

use std::{
    borrow::Cow,
    path::{Component, Path, PathBuf},
    sync::LazyLock,
};

use percent_encoding::percent_decode_str;
use regex::Regex;

/// Maximum number of characters of extracted text.
pub const MAX_CONTENT_CHARS: usize = 5000;

/// Extensions tried when an index path does not exist as written.
const ALTERNATE_EXTENSIONS: &[&str] = &["html", "htm"];

static NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<!--.*?-->|<script\b.*?</script\s*>|<style\b.*?</style\s*>|<nav\b.*?</nav\s*>|<header\b.*?</header\s*>|<footer\b.*?</footer\s*>",
    )
    .expect("static regex")
});
static MAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<main\b[^>]*>(.*?)</main\s*>").expect("static regex")
});
static ARTICLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<article\b[^>]*>(.*?)</article\s*>")
        .expect("static regex")
});
static CLASSED_DIV: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<div\b[^>]*?\bclass\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)[^>]*>"#,
    )
    .expect("static regex")
});
static CONTENT_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("content|main|body").expect("static regex"));
static DIV_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(/?)div\b[^>]*>").expect("static regex")
});
static BODY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<body\b[^>]*>(.*)</body\s*>").expect("static regex")
});
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));
static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);")
        .expect("static regex")
});
static DASH_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<dash_entry_[^>]*>").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Html,
    Text,
}

impl Format {
    /// Handler for a file, keyed by lowercase extension.
    pub fn for_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "html" | "htm" => Some(Self::Html),
            "md" | "markdown" | "txt" => Some(Self::Text),
            _ => None,
        }
    }

    pub fn extract(self, raw: &str) -> String {
        match self {
            Self::Html => html_to_text(raw),
            Self::Text => truncate_chars(raw, MAX_CONTENT_CHARS).to_string(),
        }
    }
}

/// Extract text from `path`.
///
/// Returns `None` for unsupported formats. Read failures are logged and
/// yield empty text.
pub fn extract_file(path: &Path) -> Option<String> {
    let format = Format::for_path(path)?;
    match std::fs::read(path) {
        Ok(bytes) => Some(format.extract(&String::from_utf8_lossy(&bytes))),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "error extracting content");
            Some(String::new())
        }
    }
}

/// Locate the file behind an index path inside `docs_root`.
///
/// The fragment and Dash entry markers are dropped and the rest is
/// percent-decoded. The literal path is tried first, then the alternate
/// HTML extensions. Paths that would leave `docs_root` never resolve.
pub fn resolve_document(docs_root: &Path, index_path: &str) -> Option<PathBuf> {
    let relative = clean_index_path(index_path)?;
    let candidate = docs_root.join(&relative);
    if candidate.is_file() {
        return Some(candidate);
    }

    ALTERNATE_EXTENSIONS
        .iter()
        .map(|ext| candidate.with_extension(ext))
        .find(|p| p.is_file())
}

fn clean_index_path(index_path: &str) -> Option<PathBuf> {
    if index_path.contains("://") {
        return None;
    }

    let without_markers = DASH_MARKER.replace_all(index_path, "");
    let without_fragment = without_markers
        .split('#')
        .next()
        .unwrap_or_default();
    let decoded = percent_decode_str(without_fragment).decode_utf8_lossy();

    let relative = PathBuf::from(decoded.as_ref());
    let escapes = relative.components().any(|c| {
        matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_))
    });
    if escapes || relative.as_os_str().is_empty() {
        return None;
    }
    Some(relative)
}

/// Strip an HTML page down to its readable text.
pub fn html_to_text(html: &str) -> String {
    let cleaned = NOISE.replace_all(html, " ");

    let region = captured(&MAIN, &cleaned)
        .or_else(|| captured(&ARTICLE, &cleaned))
        .or_else(|| content_div(&cleaned))
        .or_else(|| captured(&BODY, &cleaned))
        .unwrap_or(&cleaned);

    let text = TAG.replace_all(region, " ");
    let text = decode_entities(&text);
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");

    truncate_chars(&collapsed, MAX_CONTENT_CHARS).to_string()
}

fn captured<'a>(re: &Regex, html: &'a str) -> Option<&'a str> {
    re.captures(html).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Inner HTML of the first `div` whose class mentions content, main or
/// body. Nested `div`s are balanced; an unclosed one runs to the end.
fn content_div(html: &str) -> Option<&str> {
    let open = CLASSED_DIV
        .captures_iter(html)
        .find(|c| CONTENT_CLASS.is_match(&c[1]))?
        .get(0)?;

    let inner = &html[open.end()..];
    let mut depth = 1usize;
    for tag in DIV_TAG.captures_iter(inner) {
        if tag[1].is_empty() {
            depth += 1;
        } else {
            depth -= 1;
            if depth == 0 {
                return tag.get(0).map(|m| &inner[..m.start()]);
            }
        }
    }
    Some(inner)
}

fn decode_entities(text: &str) -> Cow<'_, str> {
    ENTITY.replace_all(text, |caps: &regex::Captures<'_>| {
        let entity = &caps[1];
        let decoded = if let Some(hex) = entity
            .strip_prefix("#x")
            .or_else(|| entity.strip_prefix("#X"))
        {
            u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
        } else if let Some(dec) = entity.strip_prefix('#') {
            dec.parse().ok().and_then(char::from_u32)
        } else {
            match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => None,
            }
        };
        decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
    })
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_drops_scripts_and_chrome() {
        let html = r#"<html><head><style>body{}</style></head>
            <body><nav>Menu</nav><header>Top</header>
            <p>Returns a <code>Promise</code>.</p>
            <script>alert(1)</script><footer>Bottom</footer></body></html>"#;

        assert_eq!(html_to_text(html), "Returns a Promise .");
    }

    #[test]
    fn html_prefers_main_region() {
        let html = "<body><div>Sidebar</div><main><h1>map()</h1><p>Creates a new array.</p></main></body>";
        assert_eq!(html_to_text(html), "map() Creates a new array.");
    }

    #[test]
    fn html_falls_back_to_content_div() {
        let html = r#"<body><div class="sidebar">Index of all pages</div>
            <div class="page-content"><h1>reduce()</h1><div class="note">Runs a reducer.</div><p>Returns one value.</p></div>
            <div class="footer-links">More</div></body>"#;

        assert_eq!(html_to_text(html), "reduce() Runs a reducer. Returns one value.");
    }

    #[test]
    fn html_without_matching_div_uses_body() {
        let html = "<body><div class='sidebar'>Menu</div><p>Text</p></body>";
        assert_eq!(html_to_text(html), "Menu Text");

        let unclosed = "<body><div id=x class=main>Open <b>ended</b>";
        assert_eq!(html_to_text(unclosed), "Open ended");
    }

    #[test]
    fn html_decodes_entities() {
        assert_eq!(
            html_to_text("<p>a &lt; b &amp;&amp; c &#62; d&#x21; &copy;</p>"),
            "a < b && c > d! &copy;"
        );
    }

    #[test]
    fn html_output_is_bounded() {
        let html = format!("<p>{}</p>", "é".repeat(MAX_CONTENT_CHARS * 2));
        assert_eq!(html_to_text(&html).chars().count(), MAX_CONTENT_CHARS);
    }

    #[test]
    fn markdown_passes_through_bounded() {
        let md = "# Title\n\nSome *text*.";
        assert_eq!(Format::Text.extract(md), md);

        let long = "x".repeat(MAX_CONTENT_CHARS + 10);
        assert_eq!(Format::Text.extract(&long).len(), MAX_CONTENT_CHARS);
    }

    #[test]
    fn format_is_keyed_by_lowercase_extension() {
        assert_eq!(Format::for_path(Path::new("a/B.HTML")), Some(Format::Html));
        assert_eq!(Format::for_path(Path::new("x.htm")), Some(Format::Html));
        assert_eq!(Format::for_path(Path::new("x.md")), Some(Format::Text));
        assert_eq!(Format::for_path(Path::new("x.pdf")), None);
        assert_eq!(Format::for_path(Path::new("README")), None);
    }

    #[test]
    fn extract_file_unsupported_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("image.png");
        std::fs::write(&path, "binary").unwrap();

        assert_eq!(extract_file(&path), None);
    }

    #[test]
    fn extract_file_missing_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(
            extract_file(&tmp.path().join("gone.html")),
            Some(String::new())
        );
    }

    #[test]
    fn resolve_literal_then_alternate_extensions() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("api")).unwrap();
        std::fs::write(root.join("api/fetch.html"), "<p>fetch</p>").unwrap();
        std::fs::write(root.join("api/old.htm"), "<p>old</p>").unwrap();

        assert_eq!(
            resolve_document(root, "api/fetch.html#section"),
            Some(root.join("api/fetch.html"))
        );
        assert_eq!(
            resolve_document(root, "api/fetch"),
            Some(root.join("api/fetch.html"))
        );
        assert_eq!(
            resolve_document(root, "api/old.php"),
            Some(root.join("api/old.htm"))
        );
        assert_eq!(resolve_document(root, "api/none"), None);
    }

    #[test]
    fn resolve_decodes_and_strips_markers() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::write(root.join("My Page.html"), "x").unwrap();

        assert_eq!(
            resolve_document(
                root,
                "<dash_entry_name=foo><dash_entry_originalName=bar>My%20Page.html#//apple_ref/x"
            ),
            Some(root.join("My Page.html"))
        );
    }

    #[test]
    fn resolve_refuses_escapes_and_urls() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("docs");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(tmp.path().join("secret.txt"), "x").unwrap();

        assert_eq!(resolve_document(&root, "../secret.txt"), None);
        assert_eq!(resolve_document(&root, "/etc/passwd"), None);
        assert_eq!(resolve_document(&root, "https://example.com/a.html"), None);
        assert_eq!(resolve_document(&root, ""), None);
    }
}
