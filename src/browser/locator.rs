use std::fmt;

use serde::Serialize;

/// One way of finding a UI element. Lists of these are tried in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    /// Smallest element whose rendered text contains `text`.
    Text { text: String },
    /// Smallest element whose rendered text matches a regular expression.
    TextPattern { pattern: String },
    /// Elements of `tag` whose rendered text contains `text`.
    TagWithText { tag: String, text: String },
    /// Attribute / structural CSS selector.
    Css { selector: String },
    /// Elements exposing an ARIA role whose accessible name matches `name` (case-insensitive).
    Role { role: String, name: String },
}

impl Locator {
    pub fn text(text: &str) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn pattern(pattern: &str) -> Self {
        Self::TextPattern {
            pattern: pattern.into(),
        }
    }

    pub fn tag_text(tag: &str, text: &str) -> Self {
        Self::TagWithText {
            tag: tag.into(),
            text: text.into(),
        }
    }

    pub fn css(selector: &str) -> Self {
        Self::Css {
            selector: selector.into(),
        }
    }

    pub fn role(role: &str, name: &str) -> Self {
        Self::Role {
            role: role.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Text { text } => write!(f, "text={text}"),
            Locator::TextPattern { pattern } => write!(f, "text=/{pattern}/"),
            Locator::TagWithText { tag, text } => write!(f, "{tag}:has-text(\"{text}\")"),
            Locator::Css { selector } => f.write_str(selector),
            Locator::Role { role, name } => write!(f, "role={role}[name=/{name}/i]"),
        }
    }
}

/// A document the driver can search: `0` is the top-level page, `1..` are embedded frames in
/// document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scope(pub usize);

impl Scope {
    pub const MAIN: Scope = Scope(0);

    pub fn is_main(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_main() {
            f.write_str("main document")
        } else {
            write!(f, "frame #{}", self.0)
        }
    }
}

/// Opaque reference to an element a driver located earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHandle {
    pub scope: Scope,
    pub id: u64,
}
