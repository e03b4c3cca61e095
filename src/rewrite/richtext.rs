//! Page links inside rich-text markup.
//!
//! Rich text stores internal links as `<a linktype="page" id="42">`. Only the
//! start tags of mapped anchors are re-emitted; every other byte of the
//! fragment is copied through unchanged, so a fragment without page links
//! round-trips byte for byte.
//!
//! Anchor tags are located with a small HTML-tolerant scan (stray `<` and `&`
//! in text are fine, comments are skipped) and their attributes are read with
//! quick-xml's HTML attribute parser.

use super::RefContext;
use crate::document::PageId;
use crate::error::Diagnostics;
use quick_xml::events::BytesStart;
use std::borrow::Cow;

/// One attribute of an anchor tag, as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AnchorAttribute {
    key: String,
    /// Escaped value; `None` for a bare attribute such as `download`.
    value: Option<String>,
}

/// A page-link anchor found in the markup.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PageAnchor {
    id: PageId,
    /// Tag name as written (`a` or `A`).
    name: String,
    /// Attributes in source order.
    attributes: Vec<AnchorAttribute>,
}

impl PageAnchor {
    /// Canonical start tag with the `id` attribute replaced.
    fn render(&self, id: PageId, empty: bool) -> String {
        let mut tag = format!("<{}", self.name);
        for attribute in &self.attributes {
            tag.push(' ');
            tag.push_str(&attribute.key);
            let value = if attribute.key.eq_ignore_ascii_case("id") {
                Some(id.to_string())
            } else {
                attribute.value.as_ref().map(|v| v.replace('"', "&quot;"))
            };
            if let Some(value) = value {
                tag.push_str("=\"");
                tag.push_str(&value);
                tag.push('"');
            }
        }
        tag.push_str(if empty { "/>" } else { ">" });
        tag
    }
}

/// What an `<a>` start tag turned out to be.
#[derive(Debug, PartialEq, Eq)]
enum Anchor {
    /// Not a page link.
    Other,
    Page(PageAnchor),
    /// Declares `linktype="page"` but has no usable id, or its attributes
    /// could not be read.
    Malformed,
}

/// A located `<a ...>` start tag.
#[derive(Debug, PartialEq, Eq)]
struct AnchorTag<'a> {
    /// Byte offset of the opening `<`.
    open: usize,
    /// Byte offset just past the closing `>`.
    close: usize,
    /// Tag name and attributes, without the brackets or a self-closing `/`.
    content: &'a str,
    empty: bool,
}

/// Outcome of scanning for the next anchor tag.
#[derive(Debug, PartialEq, Eq)]
enum Scan<'a> {
    Tag(AnchorTag<'a>),
    /// An `<a` tag that never closes; holds its offset.
    Unterminated(usize),
    Done,
}

/// Offset of the `>` closing the tag whose body starts at `from`, ignoring
/// `>` inside quoted attribute values.
fn tag_end(html: &str, from: usize) -> Option<usize> {
    let mut quote = None;
    for (i, byte) in html.as_bytes()[from..].iter().enumerate() {
        match (quote, byte) {
            (Some(q), b) if *b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(*byte),
            (None, b'>') => return Some(from + i),
            (None, _) => {}
        }
    }
    None
}

/// Find the next `<a>` start tag at or after `from`.
fn next_anchor_tag(html: &str, mut from: usize) -> Scan<'_> {
    let bytes = html.as_bytes();
    while let Some(offset) = html[from..].find('<') {
        let open = from + offset;
        let rest = &html[open..];
        if rest.starts_with("<!--") {
            match rest[4..].find("-->") {
                Some(end) => {
                    from = open + 4 + end + 3;
                    continue;
                }
                None => return Scan::Done,
            }
        }

        let is_anchor = bytes.get(open + 1).is_some_and(|b| b.eq_ignore_ascii_case(&b'a'))
            && bytes
                .get(open + 2)
                .is_some_and(|b| b.is_ascii_whitespace() || *b == b'>' || *b == b'/');
        if !is_anchor {
            from = open + 1;
            continue;
        }

        let Some(end) = tag_end(html, open + 2) else {
            return Scan::Unterminated(open);
        };
        let inner = &html[open + 1..end];
        let trimmed = inner.trim_end();
        let (content, empty) = match trimmed.strip_suffix('/') {
            Some(content) => (content, true),
            None => (inner, false),
        };
        return Scan::Tag(AnchorTag {
            open,
            close: end + 1,
            content,
            empty,
        });
    }
    Scan::Done
}

/// Offset of `part` inside `whole`, when it is a subslice of it.
fn offset_within(whole: &str, part: &[u8]) -> Option<usize> {
    let offset = (part.as_ptr() as usize).checked_sub(whole.as_ptr() as usize)?;
    (offset + part.len() <= whole.len()).then_some(offset)
}

/// Classify a located anchor tag.
fn classify(content: &str) -> Anchor {
    let tag = BytesStart::from_content(Cow::Borrowed(content), 1);
    let mut attributes = Vec::new();
    let mut readable = true;
    for attr in tag.html_attributes() {
        let Ok(attr) = attr else {
            readable = false;
            break;
        };
        let key_bytes = attr.key.as_ref();
        // a key not followed by `=` is a bare attribute
        let bare = offset_within(content, key_bytes)
            .map(|at| !content[at + key_bytes.len()..].trim_start().starts_with('='))
            .unwrap_or(false);
        let key = String::from_utf8_lossy(key_bytes).into_owned();
        let value = (!bare).then(|| String::from_utf8_lossy(&attr.value).into_owned());
        attributes.push(AnchorAttribute { key, value });
    }

    let is_page_link = attributes.iter().any(|a| {
        a.key.eq_ignore_ascii_case("linktype")
            && a.value.as_deref().is_some_and(|v| v.trim().eq_ignore_ascii_case("page"))
    });
    if !readable {
        return if content.to_ascii_lowercase().contains("linktype") {
            Anchor::Malformed
        } else {
            Anchor::Other
        };
    }
    if !is_page_link {
        return Anchor::Other;
    }

    let id = attributes
        .iter()
        .find(|a| a.key.eq_ignore_ascii_case("id"))
        .and_then(|a| a.value.as_deref())
        .and_then(|v| v.trim().parse().ok());
    match id {
        Some(id) => Anchor::Page(PageAnchor {
            id,
            name: content[..1].to_string(),
            attributes,
        }),
        None => Anchor::Malformed,
    }
}

/// Remap every page link in `html` through the context's id map.
///
/// Unmapped links are left untouched and reported once each, as are page
/// links whose tag cannot be read.
pub fn rewrite_rich_text(html: &str, ctx: &RefContext<'_>, diagnostics: &mut Diagnostics) -> String {
    let mut out = String::with_capacity(html.len());
    let mut copied = 0usize;
    let mut from = 0usize;

    loop {
        let tag = match next_anchor_tag(html, from) {
            Scan::Tag(tag) => tag,
            Scan::Unterminated(open) => {
                if html[open..].to_ascii_lowercase().contains("linktype") {
                    diagnostics.warn(format!(
                        "{}: rich text in field '{}' has an unterminated link tag at byte {}; left unchanged",
                        ctx.host(),
                        ctx.field,
                        open
                    ));
                }
                break;
            }
            Scan::Done => break,
        };
        from = tag.close;

        match classify(tag.content) {
            Anchor::Other => {}
            Anchor::Malformed => diagnostics.warn(format!(
                "{}: rich text in field '{}' has a page link without a readable id ({}); left unchanged",
                ctx.host(),
                ctx.field,
                &html[tag.open..tag.close]
            )),
            Anchor::Page(anchor) => match ctx.id_map.get(anchor.id) {
                Some(mapped) => {
                    out.push_str(&html[copied..tag.open]);
                    out.push_str(&anchor.render(mapped, tag.empty));
                    copied = tag.close;
                }
                None => diagnostics.warn(format!(
                    "{}: rich text in field '{}' links to page {} which is not part of the import",
                    ctx.host(),
                    ctx.field,
                    anchor.id
                )),
            },
        }
    }

    out.push_str(&html[copied..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::IdMap;

    fn rewrite(html: &str, map: &IdMap) -> (String, Diagnostics) {
        let ctx = RefContext::new(Some(7), "intro", map);
        let mut diagnostics = Diagnostics::new();
        let out = rewrite_rich_text(html, &ctx, &mut diagnostics);
        (out, diagnostics)
    }

    #[test]
    fn test_no_page_links_is_identity() {
        let map: IdMap = [(3, 30)].into_iter().collect();
        let html = "<p>Plain <b>bold</b> text&nbsp;with <a href=\"https://example.com\">a link</a><br/>and<br></p>";
        let (out, diagnostics) = rewrite(html, &map);
        assert_eq!(out, html);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_mapped_link_is_rewritten() {
        let map: IdMap = [(3, 30)].into_iter().collect();
        let (out, diagnostics) = rewrite(r#"<p>See <a linktype="page" id="3">home</a>.</p>"#, &map);
        assert_eq!(out, r#"<p>See <a linktype="page" id="30">home</a>.</p>"#);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_attribute_order_and_quotes_are_canonicalized() {
        let map: IdMap = [(3, 30)].into_iter().collect();
        let (out, _) = rewrite("<p><a id='3'   linktype='page'>x</a></p>", &map);
        assert_eq!(out, r#"<p><a id="30" linktype="page">x</a></p>"#);
    }

    #[test]
    fn test_unmapped_link_warns_and_is_left_alone() {
        let map: IdMap = [(3, 30)].into_iter().collect();
        let html = r#"<p><a linktype="page" id="99">gone</a> and <a linktype="page" id="3">kept</a></p>"#;
        let (out, diagnostics) = rewrite(html, &map);
        assert_eq!(
            out,
            r#"<p><a linktype="page" id="99">gone</a> and <a linktype="page" id="30">kept</a></p>"#
        );
        assert_eq!(diagnostics.warnings.len(), 1);
        assert!(diagnostics.warnings[0].contains("99"));
        assert!(diagnostics.warnings[0].contains("'intro'"));
        assert!(diagnostics.warnings[0].contains("Page 7"));
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let map: IdMap = [(3, 30)].into_iter().collect();
        let identity: IdMap = [(30, 30)].into_iter().collect();
        let html = "<h2>T</h2><p><a id='3' linktype='page' data-x=\"1\">x</a><br/></p>";

        let (first, _) = rewrite(html, &map);
        let (second, _) = rewrite(&first, &identity);
        assert_eq!(first, second);
    }

    #[test]
    fn test_non_page_link_types_are_ignored() {
        let map: IdMap = [(3, 30)].into_iter().collect();
        let html = r#"<p><a linktype="document" id="3">doc</a><embed embedtype="image" id="3"/></p>"#;
        let (out, diagnostics) = rewrite(html, &map);
        assert_eq!(out, html);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_bare_less_than_in_text_does_not_hide_links() {
        let map: IdMap = [(3, 30)].into_iter().collect();
        let (out, diagnostics) = rewrite(r#"<p>1 < 2 <a linktype="page" id="3">x</a></p>"#, &map);
        assert_eq!(out, r#"<p>1 < 2 <a linktype="page" id="30">x</a></p>"#);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_bare_ampersand_in_text_is_tolerated() {
        let map: IdMap = [(3, 30)].into_iter().collect();
        let (out, diagnostics) = rewrite(
            r#"<p>Tom & Jerry <a linktype="page" id="3">home</a> &amp; more</p>"#,
            &map,
        );
        assert_eq!(
            out,
            r#"<p>Tom & Jerry <a linktype="page" id="30">home</a> &amp; more</p>"#
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_upper_case_tags_and_attributes_are_recognized() {
        let map: IdMap = [(3, 30)].into_iter().collect();
        let (out, diagnostics) = rewrite(r#"<P><A LINKTYPE="page" ID="3">x</A></P>"#, &map);
        assert_eq!(out, r#"<P><A LINKTYPE="page" ID="30">x</A></P>"#);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_bare_attributes_stay_bare() {
        let map: IdMap = [(3, 30)].into_iter().collect();
        let (out, _) = rewrite(
            r#"<a linktype="page" id="3" download title="">x</a>"#,
            &map,
        );
        assert_eq!(out, r#"<a linktype="page" id="30" download title="">x</a>"#);
    }

    #[test]
    fn test_links_inside_comments_are_ignored() {
        let map: IdMap = [(3, 30)].into_iter().collect();
        let html = r#"<!-- <a linktype="page" id="3">old</a> --><p>text</p>"#;
        let (out, diagnostics) = rewrite(html, &map);
        assert_eq!(out, html);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_page_link_without_id_warns() {
        let map: IdMap = [(3, 30)].into_iter().collect();
        let html = r#"<p><a linktype="page" id="abc">x</a><a linktype="page">y</a></p>"#;
        let (out, diagnostics) = rewrite(html, &map);
        assert_eq!(out, html);
        assert_eq!(diagnostics.warnings.len(), 2);
        assert!(diagnostics.warnings[0].contains("readable id"));
    }

    #[test]
    fn test_unterminated_page_link_warns() {
        let map: IdMap = [(3, 30)].into_iter().collect();
        let html = r#"<p>see <a linktype="page" id="3""#;
        let (out, diagnostics) = rewrite(html, &map);
        assert_eq!(out, html);
        assert_eq!(diagnostics.warnings.len(), 1);
        assert!(diagnostics.warnings[0].contains("unterminated"));
    }

    #[test]
    fn test_multibyte_text_is_preserved() {
        let map: IdMap = [(3, 30)].into_iter().collect();
        let (out, _) = rewrite(r#"<p>Café: <a linktype="page" id="3">naïve</a> ✓</p>"#, &map);
        assert_eq!(out, r#"<p>Café: <a linktype="page" id="30">naïve</a> ✓</p>"#);
    }
}
