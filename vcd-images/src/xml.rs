//! Namespace-agnostic document mapping.
//!
//! The platform qualifies element names with whatever namespace prefix the
//! responding service happens to use, and different endpoints use different
//! prefixes (or none). All lookups here match on the local element name,
//! case-insensitively, so the same extraction code works against every
//! variant of a document. Attribute names are never prefixed and are matched
//! verbatim.

use roxmltree::{Document, Node};
use vcd_core::{Result, VcdError};

/// Parses a raw response body into a document.
///
/// This is the only place a response can fail hard: malformed input is a
/// [`VcdError::Parse`]. Missing elements and attributes downstream are always
/// "no value", never errors.
pub fn parse(text: &str) -> Result<Document<'_>> {
    Document::parse(text).map_err(|e| VcdError::Parse(format!("malformed response document: {e}")))
}

/// True when `node` is an element whose local name matches `local`,
/// ignoring any namespace prefix and ASCII case.
pub fn name_is(node: Node<'_, '_>, local: &str) -> bool {
    node.is_element() && node.tag_name().name().eq_ignore_ascii_case(local)
}

/// All elements in the document whose local name matches `local`.
pub fn descendants_named<'a, 'input>(
    doc: &'a Document<'input>,
    local: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    doc.root().descendants().filter(move |n| name_is(*n, local))
}

/// The first element in the document whose local name matches `local`.
pub fn first_descendant<'a, 'input>(
    doc: &'a Document<'input>,
    local: &str,
) -> Option<Node<'a, 'input>> {
    doc.root().descendants().find(|n| name_is(*n, local))
}

/// Direct child elements of `node` whose local name matches `local`.
pub fn children_named<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    local: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(move |n| name_is(*n, local))
}

/// The first direct child element of `node` matching `local`.
pub fn first_child_named<'a, 'input>(
    node: Node<'a, 'input>,
    local: &str,
) -> Option<Node<'a, 'input>> {
    node.children().find(|n| name_is(*n, local))
}

/// An attribute value, trimmed; absent or blank attributes are `None`.
pub fn attr<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attribute(name).map(str::trim).filter(|v| !v.is_empty())
}

/// Text content of an element via its first text child, trimmed; absent or
/// empty text is `None`.
pub fn text<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    node.text().map(str::trim).filter(|t| !t.is_empty())
}

/// The verbatim source text of a node's subtree, exactly as it appeared on
/// the wire.
pub fn raw_fragment<'input>(doc: &Document<'input>, node: Node<'_, 'input>) -> &'input str {
    &doc.input_text()[node.range()]
}

/// Surfaces a platform-level failure encoded in a response body.
///
/// The platform reports failures as an `Error` element carrying a `message`
/// attribute and, usually, a `majorErrorCode`. A document without such an
/// element passes the check.
pub fn check_error(doc: &Document<'_>) -> Result<()> {
    let Some(node) = first_descendant(doc, "Error") else {
        return Ok(());
    };
    let message = attr(node, "message").unwrap_or("the platform reported an unspecified error");
    match attr(node, "majorErrorCode") {
        Some(code) => Err(VcdError::Cloud(format!("{message} [{code}]"))),
        None => Err(VcdError::Cloud(message.to_string())),
    }
}

/// Escapes text for inclusion in a request body.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
