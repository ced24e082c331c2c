//! Rewrites HTML links so a browser requests them back through this
//! server (SPEC_FULL.md §4.7 step 6). The document is parsed once to
//! find rewrite targets, then the original parse tree is re-serialized
//! with only those attribute values replaced — everything else is
//! reproduced byte-for-byte from the parsed structure, so no separate
//! "diff the source text" pass is needed.

use std::collections::HashMap;
use std::fmt::Write as _;

use ego_tree::NodeId;
use scraper::node::Node;
use scraper::Html;

use crystal_db::models::AliasRow;
use crystal_model::alias::{apply_alias, AliasedUrl};
use crystal_model::url::normalize;

use crate::archive_url::request_path_for_archive;

/// Attributes inspected for embedded/linked URLs, and the tag they're
/// only rewritten on (an attribute can mean something else elsewhere,
/// e.g. `value` on a form control).
const LINK_ATTRS: &[(&str, &str)] =
    &[("a", "href"), ("link", "href"), ("img", "src"), ("script", "src"), ("iframe", "src"), ("frame", "src")];

const VOID_ELEMENTS: &[&str] =
    &["area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track", "wbr"];

/// Resolves one `relative_url` found in the document against
/// `base_url`, returning its replacement or `None` if it should be
/// left exactly as found.
fn rewrite_link(relative_url: &str, base_url: &str, aliases: &[AliasRow]) -> Option<String> {
    if relative_url.starts_with('#') || relative_url.is_empty() {
        return None;
    }
    let base = url::Url::parse(base_url).ok()?;
    let resolved = base.join(relative_url).ok()?;
    let canonical = normalize(resolved.as_str()).ok()?;
    match apply_alias(&canonical, aliases) {
        // Map through the *source* prefix's own request path; the
        // runtime 307 to the external target happens when that path is
        // requested, not here.
        AliasedUrl::External(_) => request_path_for_archive(&canonical).ok(),
        AliasedUrl::Internal(url) => request_path_for_archive(&url).ok(),
    }
}

/// Parses `html`, rewrites every recognized link attribute relative to
/// `base_url`, and returns the re-serialized document.
pub fn rewrite_html(html: &str, base_url: &str, aliases: &[AliasRow]) -> String {
    let document = Html::parse_document(html);

    let mut rewrites: HashMap<NodeId, (&'static str, String)> = HashMap::new();
    for node_ref in document.tree.nodes() {
        let Node::Element(element) = node_ref.value() else { continue };
        let tag = element.name();
        for (link_tag, attr) in LINK_ATTRS {
            if tag != *link_tag {
                continue;
            }
            if let Some(value) = element.attr(attr) {
                if let Some(rewritten) = rewrite_link(value, base_url, aliases) {
                    rewrites.insert(node_ref.id(), (attr, rewritten));
                }
            }
        }
    }

    let mut out = String::with_capacity(html.len());
    for child in document.tree.root().children() {
        serialize(child, &rewrites, &mut out);
    }
    out
}

fn serialize(node: ego_tree::NodeRef<Node>, rewrites: &HashMap<NodeId, (&'static str, String)>, out: &mut String) {
    match node.value() {
        Node::Doctype(doctype) => {
            let _ = write!(out, "<!DOCTYPE {}>", doctype.name);
        }
        Node::Comment(comment) => {
            let _ = write!(out, "<!--{}-->", comment.comment);
        }
        Node::Text(text) => {
            escape_text(&text.text, out);
        }
        Node::Element(element) => {
            let tag = element.name();
            out.push('<');
            out.push_str(tag);
            let rewrite = rewrites.get(&node.id());
            for (name, value) in element.attrs() {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                match rewrite {
                    Some((attr, new_value)) if *attr == name => escape_attr(new_value, out),
                    _ => escape_attr(value, out),
                }
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&tag) {
                return;
            }
            if tag == "script" || tag == "style" {
                for child in node.children() {
                    if let Node::Text(text) = child.value() {
                        out.push_str(&text.text);
                    }
                }
            } else {
                for child in node.children() {
                    serialize(child, rewrites, out);
                }
            }
            let _ = write!(out, "</{tag}>");
        }
        Node::Document | Node::Fragment | Node::ProcessingInstruction(_) => {
            for child in node.children() {
                serialize(child, rewrites, out);
            }
        }
    }
}

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
}

fn escape_attr(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alias(source: &str, target: &str, external: bool) -> AliasRow {
        AliasRow { id: 0, source_url_prefix: source.to_string(), target_url_prefix: target.to_string(), target_is_external: external }
    }

    #[test]
    fn an_anchor_only_link_is_left_alone() {
        let out = rewrite_html(r#"<a href="#top">top</a>"#, "https://example.test/a/", &[]);
        assert!(out.contains(r#"href="#top""#));
    }

    #[test]
    fn a_relative_link_is_resolved_and_mapped_through_the_request_path() {
        let out = rewrite_html(r#"<a href="b.html">b</a>"#, "https://example.test/a/", &[]);
        assert!(out.contains(r#"href="/_/https/example.test/a/b.html""#));
    }

    #[test]
    fn an_externally_aliased_link_is_mapped_through_its_own_request_path() {
        let aliases = [alias("https://example.test/mirror/", "https://upstream.test/", true)];
        let out = rewrite_html(r#"<img src="mirror/x.png">"#, "https://example.test/", &aliases);
        assert!(out.contains(r#"src="/_/https/example.test/mirror/x.png""#));
    }

    #[test]
    fn non_link_attributes_are_reproduced_unchanged() {
        let out = rewrite_html(r#"<div class="x" data-y="z">hi</div>"#, "https://example.test/", &[]);
        assert!(out.contains(r#"class="x""#));
        assert!(out.contains(r#"data-y="z""#));
    }

    #[test]
    fn script_body_text_is_reproduced_without_escaping() {
        let out = rewrite_html(r#"<script>if (1 < 2) { x(); }</script>"#, "https://example.test/", &[]);
        assert!(out.contains("if (1 < 2) { x(); }"));
    }
}
