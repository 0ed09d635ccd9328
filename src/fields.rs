//! Leaf field extraction and normalization.
//!
//! Pure functions over located nodes. Absent optional fields resolve to
//! their documented defaults; fields with an unexpected shape come back as
//! an error message the caller records against the owning entity.

use crate::model::{CommandType, Connection};
use crate::walker::{text_content, Walker};
use regex::{Captures, Regex};
use roxmltree::Node;
use std::borrow::Cow;
use std::sync::LazyLock;
use tracing::debug;

// Markup sections are matched whole so their contents are left alone.
static AMPERSAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)<!\[CDATA\[.*?\]\]>|<!--.*?-->|&(?:(lt|gt|amp|quot|apos|#[0-9]+|#[xX][0-9a-fA-F]+);)?",
    )
    .expect("ampersand pattern is valid")
});

/// Escape every `&` that does not start a predefined or numeric character
/// reference. `None` when there was nothing to repair.
pub fn escape_stray_ampersands(text: &str) -> Option<String> {
    let mut repaired = 0usize;
    let escaped = AMPERSAND_RE.replace_all(text, |caps: &Captures<'_>| {
        let whole = &caps[0];
        if !whole.starts_with('&') || caps.get(1).is_some() {
            return whole.to_string();
        }
        repaired += 1;
        "&amp;".to_string()
    });

    if repaired == 0 {
        return None;
    }
    debug!("Escaped {} stray ampersand(s)", repaired);
    Some(escaped.into_owned())
}

/// CRLF and lone CR become LF.
pub fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if !text.contains('\r') {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
}

/// Trim and line-ending normalization of parser-decoded text. Entity
/// references were resolved by the parser; literal `&amp;` in the result is
/// part of the SQL.
pub fn normalize_command_text(raw: &str) -> String {
    normalize_line_endings(raw.trim()).into_owned()
}

/// Command type from an optional leaf value; absent or blank means Text.
pub fn command_type(raw: Option<&str>) -> Result<CommandType, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(CommandType::Text),
        Some(value) => {
            CommandType::parse(value).ok_or_else(|| format!("unrecognized CommandType '{}'", value))
        }
    }
}

/// Embedded connection when a connect string was found, shared otherwise.
pub fn connection(connect_string: Option<&str>, reference: Option<&str>) -> Connection {
    match connect_string {
        Some(raw) => Connection::Embedded {
            connect_string: normalize_command_text(raw),
        },
        None => Connection::Shared {
            reference: reference
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
        },
    }
}

/// Leaf text of an element. An element with child elements is the wrong shape.
pub fn leaf_text(node: Node<'_, '_>) -> Result<String, String> {
    if let Some(child) = node.children().find(|n| n.is_element()) {
        return Err(format!(
            "<{}> has child element <{}>, expected text",
            node.tag_name().name(),
            child.tag_name().name()
        ));
    }
    Ok(text_content(node))
}

/// Required name attribute. A same-named child element instead of the
/// attribute is reported as a shape error.
pub fn required_attribute(
    walker: &Walker<'_>,
    node: Node<'_, '_>,
    attribute: &str,
) -> Result<String, String> {
    if let Some(value) = walker.attribute(node, attribute).map(str::trim) {
        if !value.is_empty() {
            return Ok(value.to_string());
        }
    }

    let element = node
        .children()
        .any(|n| n.is_element() && n.tag_name().name() == attribute);
    if element {
        Err(format!(
            "<{}> has {} as an element, expected an attribute",
            node.tag_name().name(),
            attribute
        ))
    } else {
        Err(format!(
            "<{}> at byte {} has no {} attribute",
            node.tag_name().name(),
            node.range().start,
            attribute
        ))
    }
}
