//! A small typed HTML tree.
//!
//! Pages are built as [`Element`] trees and serialized in one place, so text
//! and attribute escaping cannot be forgotten by individual renderers.

use std::fmt::Write as _;

const VOID_TAGS: &[&str] = &["meta", "link", "img", "input", "br", "source"];

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    /// Contents of `<script>`/`<style>`; written without entity escaping.
    RawText(String),
}

impl From<Element> for Node {
    fn from(value: Element) -> Self {
        Self::Element(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    tag: &'static str,
    attrs: Vec<(&'static str, Option<String>)>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(tag: &'static str) -> Self {
        Self {
            tag,
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.attrs.push((name, Some(value.into())));
        self
    }

    /// A boolean attribute such as `muted`.
    pub fn flag(mut self, name: &'static str) -> Self {
        self.attrs.push((name, None));
        self
    }

    pub fn style(self, style: &Style) -> Self {
        self.attr("style", style.to_string())
    }

    pub fn child(mut self, node: impl Into<Node>) -> Self {
        self.children.push(node.into());
        self
    }

    pub fn children(mut self, nodes: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(nodes);
        self
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        self.child(Node::Text(text.into()))
    }

    pub fn raw_text(self, text: impl Into<String>) -> Self {
        self.child(Node::RawText(text.into()))
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(self.tag);
        for (name, value) in &self.attrs {
            out.push(' ');
            out.push_str(name);
            if let Some(value) = value {
                out.push_str("=\"");
                out.push_str(&escape_attr(value));
                out.push('"');
            }
        }
        out.push('>');
        if VOID_TAGS.contains(&self.tag) {
            return;
        }
        for child in &self.children {
            child.write_to(out);
        }
        let _ = write!(out, "</{}>", self.tag);
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }
}

impl Node {
    fn write_to(&self, out: &mut String) {
        match self {
            Self::Element(el) => el.write_to(out),
            Self::Text(text) => out.push_str(&escape_text(text)),
            Self::RawText(text) => out.push_str(text),
        }
    }
}

/// Inline CSS declarations, rendered as `prop:value;` separated by spaces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Style {
    decls: Vec<(&'static str, String)>,
}

impl Style {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decl(mut self, prop: &'static str, value: impl Into<String>) -> Self {
        self.decls.push((prop, value.into()));
        self
    }

    pub fn extend(mut self, other: Style) -> Self {
        self.decls.extend(other.decls);
        self
    }
}

impl std::fmt::Display for Style {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (idx, (prop, value)) in self.decls.iter().enumerate() {
            if idx != 0 {
                f.write_str(" ")?;
            }
            write!(f, "{prop}:{value};")?;
        }
        Ok(())
    }
}

/// A complete document: `<!DOCTYPE html>` plus `<html>` with head and body.
#[derive(Debug, Clone)]
pub struct Document {
    pub html: Element,
    pub head: Vec<Node>,
    pub body: Element,
}

impl Document {
    pub fn new(lang: &str) -> Self {
        Self {
            html: Element::new("html").attr("lang", lang),
            head: Vec::new(),
            body: Element::new("body"),
        }
    }

    /// One head/body child per line so generated files stay diffable.
    pub fn render(&self) -> String {
        let mut out = String::from("<!DOCTYPE html>\n");
        let mut html_open = self.html.clone();
        html_open.children.clear();
        let open = html_open.render();
        out.push_str(open.trim_end_matches("</html>"));
        out.push_str("\n<head>\n");
        for node in &self.head {
            out.push_str("    ");
            node.write_to(&mut out);
            out.push('\n');
        }
        out.push_str("</head>\n");

        let mut body_open = self.body.clone();
        body_open.children.clear();
        let open = body_open.render();
        out.push_str(open.trim_end_matches("</body>"));
        out.push('\n');
        for node in &self.body.children {
            node.write_to(&mut out);
            out.push('\n');
        }
        out.push_str("</body>\n</html>\n");
        out
    }
}

pub fn escape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn escape_attr(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// JSON that is safe to place inside a `<script>` element.
pub fn script_json<T: serde::Serialize>(value: &T) -> serde_json::Result<String> {
    // `<` only appears inside JSON strings, where `<` is equivalent.
    Ok(serde_json::to_string(value)?.replace('<', "\\u003c"))
}
