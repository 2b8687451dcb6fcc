//! `"use client"` / `"use server"` directive handling.
//!
//! The framework only honours a directive that opens the module text. After
//! transpilation the directive can end up behind emitted helpers, so the
//! compiled text is scanned and the directive is re-emitted at offset 0.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Module boundary marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directive {
    #[default]
    None,
    /// Module executes in the browser; the server only sees references.
    UseClient,
    /// Module exports server functions callable from the client.
    UseServer,
}

impl Directive {
    /// Canonical statement text, `None` for plain modules.
    #[must_use]
    pub fn statement(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::UseClient => Some("\"use client\";"),
            Self::UseServer => Some("\"use server\";"),
        }
    }

    /// First directive found at the start of the text, after a newline, or
    /// after a `;`.
    #[must_use]
    pub fn detect(code: &str) -> Self {
        let Some(caps) = directive_pattern().and_then(|re| re.captures(code)) else {
            return Self::None;
        };
        match caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()) {
            Some("client") => Self::UseClient,
            Some("server") => Self::UseServer,
            _ => Self::None,
        }
    }
}

fn directive_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r#"(?:^|\n|;)(?:"use (client|server)"|'use (client|server)');"#).ok()
        })
        .as_ref()
}

/// Make the directive the first characters of `code`.
///
/// The original occurrence is left in place; a repeated directive in the
/// prologue is inert. Text already starting with the directive is returned
/// unchanged.
#[must_use]
pub fn hoist_directive(code: String) -> (String, Directive) {
    let directive = Directive::detect(&code);
    match directive.statement() {
        Some(statement) if !code.starts_with(statement) => {
            let mut hoisted = String::with_capacity(statement.len() + 1 + code.len());
            hoisted.push_str(statement);
            hoisted.push('\n');
            hoisted.push_str(&code);
            (hoisted, directive)
        }
        _ => (code, directive),
    }
}
