//! Low-level DOM mutation over scraper's node arena
//!
//! `scraper` exposes its parse tree as an `ego_tree` arena of nodes keyed by
//! ids; selectors give read access, and these helpers supply the handful of
//! mutations the rewriter needs. Detached subtrees stay in the arena until
//! the document is dropped at the end of the article, so node ids collected
//! up front remain valid throughout a pass.

use ego_tree::NodeId;
use scraper::{ElementRef, Html, Node, Selector};

/// Collects the node ids matching a selector
///
/// Mutation invalidates selector iterators, so passes collect ids first and
/// mutate second.
pub fn select_ids(doc: &Html, selector: &Selector) -> Vec<NodeId> {
    doc.select(selector).map(|el| el.id()).collect()
}

/// Removes a node (and its subtree) from the document
pub fn detach(doc: &mut Html, id: NodeId) {
    if let Some(mut node) = doc.tree.get_mut(id) {
        node.detach();
    }
}

/// Replaces a node by its children, preserving their order
pub fn unwrap_node(doc: &mut Html, id: NodeId) {
    let children: Vec<NodeId> = match doc.tree.get(id) {
        Some(node) => node.children().map(|c| c.id()).collect(),
        None => return,
    };
    for child in children {
        if let Some(mut anchor) = doc.tree.get_mut(id) {
            anchor.insert_id_before(child);
        }
    }
    detach(doc, id);
}

/// Overwrites the value of an existing attribute
///
/// Returns `false` when the node is gone, is not an element, or lacks the
/// attribute; the rewriter only ever updates attributes it has already read.
pub fn set_attr(doc: &mut Html, id: NodeId, name: &str, value: &str) -> bool {
    if let Some(mut node) = doc.tree.get_mut(id) {
        if let Node::Element(el) = node.value() {
            for (key, val) in el.attrs.iter_mut() {
                if key.local.as_ref() == name {
                    *val = value.into();
                    return true;
                }
            }
        }
    }
    false
}

/// Drops an attribute if present
pub fn remove_attr(doc: &mut Html, id: NodeId, name: &str) {
    if let Some(mut node) = doc.tree.get_mut(id) {
        if let Node::Element(el) = node.value() {
            el.attrs.retain(|key, _| key.local.as_ref() != name);
        }
    }
}

/// Strips `display:` declarations from a node's inline style
pub fn clear_display(doc: &mut Html, id: NodeId) {
    let style = match doc.tree.get(id).and_then(|n| {
        n.value()
            .as_element()
            .and_then(|el| el.attr("style"))
            .map(String::from)
    }) {
        Some(style) => style,
        None => return,
    };

    let kept: Vec<&str> = style
        .split(';')
        .map(str::trim)
        .filter(|decl| !decl.is_empty() && !decl.to_ascii_lowercase().starts_with("display"))
        .collect();

    set_attr(doc, id, "style", &kept.join("; "));
}

/// Whether any of an element's classes appears in `list`
pub fn has_class_from(el: &ElementRef, list: &[&str]) -> bool {
    el.value()
        .attr("class")
        .map(|raw| raw.split_whitespace().any(|c| list.contains(&c)))
        .unwrap_or(false)
}

/// Whether the subtree under `id` contains an element named `tag`
pub fn has_descendant(doc: &Html, id: NodeId, tag: &str) -> bool {
    match doc.tree.get(id) {
        Some(node) => node.descendants().skip(1).any(|n| {
            n.value()
                .as_element()
                .map(|el| el.name() == tag)
                .unwrap_or(false)
        }),
        None => false,
    }
}

/// Whether the subtree under `id` contains any non-whitespace text
pub fn has_text(doc: &Html, id: NodeId) -> bool {
    match doc.tree.get(id) {
        Some(node) => node.descendants().any(|n| {
            n.value()
                .as_text()
                .map(|t| !t.trim().is_empty())
                .unwrap_or(false)
        }),
        None => false,
    }
}

/// The parent of `id` when that parent is an element, with its tag name
pub fn parent_element(doc: &Html, id: NodeId) -> Option<(NodeId, String)> {
    let node = doc.tree.get(id)?;
    let parent = node.parent()?;
    let name = parent.value().as_element()?.name().to_string();
    Some((parent.id(), name))
}

/// Reads an attribute of the node at `id`
pub fn get_attr(doc: &Html, id: NodeId, name: &str) -> Option<String> {
    doc.tree
        .get(id)?
        .value()
        .as_element()?
        .attr(name)
        .map(String::from)
}

/// Serializes the document fragment back to HTML
pub fn serialize_fragment(doc: &Html) -> String {
    doc.root_element().inner_html()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(html: &str) -> Html {
        Html::parse_fragment(html)
    }

    fn first_id(doc: &Html, css: &str) -> NodeId {
        let sel = Selector::parse(css).unwrap();
        doc.select(&sel).next().unwrap().id()
    }

    #[test]
    fn test_detach_removes_subtree() {
        let mut doc = parse(r#"<div><span class="x">gone</span>kept</div>"#);
        let id = first_id(&doc, "span.x");
        detach(&mut doc, id);
        assert_eq!(serialize_fragment(&doc), "<div>kept</div>");
    }

    #[test]
    fn test_unwrap_preserves_children_order() {
        let mut doc = parse(r#"<p><a href="/x"><b>one</b><i>two</i></a></p>"#);
        let id = first_id(&doc, "a");
        unwrap_node(&mut doc, id);
        assert_eq!(serialize_fragment(&doc), "<p><b>one</b><i>two</i></p>");
    }

    #[test]
    fn test_unwrap_empty_node_just_removes_it() {
        let mut doc = parse(r#"<p>a<a href="/x"></a>b</p>"#);
        let id = first_id(&doc, "a");
        unwrap_node(&mut doc, id);
        assert_eq!(serialize_fragment(&doc), "<p>ab</p>");
    }

    #[test]
    fn test_set_attr_updates_existing() {
        let mut doc = parse(r#"<img src="http://up.example.org/a.jpg">"#);
        let id = first_id(&doc, "img");
        assert!(set_attr(&mut doc, id, "src", "m/a.jpg"));
        assert_eq!(get_attr(&doc, id, "src").as_deref(), Some("m/a.jpg"));
    }

    #[test]
    fn test_set_attr_missing_returns_false() {
        let mut doc = parse("<img>");
        let id = first_id(&doc, "img");
        assert!(!set_attr(&mut doc, id, "src", "m/a.jpg"));
    }

    #[test]
    fn test_remove_attr() {
        let mut doc = parse(r#"<img src="a.jpg" srcset="a.jpg 2x">"#);
        let id = first_id(&doc, "img");
        remove_attr(&mut doc, id, "srcset");
        assert_eq!(get_attr(&doc, id, "srcset"), None);
        assert!(get_attr(&doc, id, "src").is_some());
    }

    #[test]
    fn test_clear_display_keeps_other_declarations() {
        let mut doc = parse(r#"<div class="thumb" style="display: none; width: 10px">x</div>"#);
        let id = first_id(&doc, "div.thumb");
        clear_display(&mut doc, id);
        let style = get_attr(&doc, id, "style").unwrap();
        assert!(!style.contains("display"));
        assert!(style.contains("width: 10px"));
    }

    #[test]
    fn test_has_descendant() {
        let doc = parse(r#"<div class="hatnote"><span><a href="/x">link</a></span></div>"#);
        let id = first_id(&doc, "div.hatnote");
        assert!(has_descendant(&doc, id, "a"));
        assert!(!has_descendant(&doc, id, "img"));
    }

    #[test]
    fn test_has_text() {
        let doc = parse(r#"<p><b>words</b></p><p class="empty">   </p>"#);
        assert!(has_text(&doc, first_id(&doc, "p")));
        assert!(!has_text(&doc, first_id(&doc, "p.empty")));
    }

    #[test]
    fn test_parent_element() {
        let doc = parse(r#"<a href="/x"><img src="a.jpg"></a>"#);
        let img = first_id(&doc, "img");
        let (_, name) = parent_element(&doc, img).unwrap();
        assert_eq!(name, "a");
    }

    #[test]
    fn test_has_class_from() {
        let doc = parse(r#"<div class="noprint extra">x</div>"#);
        let sel = Selector::parse("div").unwrap();
        let el = doc.select(&sel).next().unwrap();
        assert!(has_class_from(&el, &["noprint", "metadata"]));
        assert!(!has_class_from(&el, &["ambox"]));
    }
}
