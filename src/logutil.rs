//! Logging helpers: single-line escaping for user supplied text, `&` color code
//! handling, and the debug-prefixed lifecycle log.

use log::{debug, info};

/// Escape a string for single-line logging:
/// - `\n` => `\\n`
/// - `\r` => `\\r`
/// - `\t` => `\\t`
/// - backslash => `\\\\`
///
/// Player names and death messages are short; anything longer than
/// `MAX_PREVIEW` characters is cut with an ellipsis.
pub fn escape_log(s: &str) -> String {
    const MAX_PREVIEW: usize = 120;
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

const SECTION_SIGN: char = '§';
const COLOR_CODES: &str = "0123456789AaBbCcDdEeFfKkLlMmNnOoRrXx";

/// Translate `&`-prefixed color codes into the section-sign form the game
/// client renders (`&7Bob` => `§7Bob`). A lone `&` is left untouched.
pub fn translate_color_codes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        match (ch, chars.peek()) {
            ('&', Some(&code)) if COLOR_CODES.contains(code) => {
                out.push(SECTION_SIGN);
                out.push(code.to_ascii_lowercase());
                chars.next();
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Remove `&x` and `§x` color codes, for text that ends up in a log file.
pub fn strip_color_codes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        match (ch, chars.peek()) {
            ('&' | SECTION_SIGN, Some(&code)) if COLOR_CODES.contains(code) => {
                chars.next();
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Replace `{name}` placeholders with their values.
pub fn fill_placeholders(template: &str, placeholders: &[(&str, &str)]) -> String {
    placeholders
        .iter()
        .fold(template.to_string(), |acc, (name, value)| {
            acc.replace(&format!("{{{}}}", name), value)
        })
}

/// Lifecycle logging controlled by the `[debug]` config section.
///
/// With debug enabled, lifecycle lines are promoted to `info` and carry the
/// configured prefix; otherwise they stay at `debug`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugLog {
    enabled: bool,
    prefix: String,
}

impl DebugLog {
    pub fn new(enabled: bool, prefix: &str) -> Self {
        Self {
            enabled,
            prefix: strip_color_codes(prefix),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, "")
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Prefix + message with placeholders filled.
    pub fn format(&self, message: &str, placeholders: &[(&str, &str)]) -> String {
        format!("{}{}", self.prefix, fill_placeholders(message, placeholders))
    }

    pub fn lifecycle(&self, message: &str) {
        self.lifecycle_with(message, &[]);
    }

    /// Like [`DebugLog::lifecycle`], filling `{name}` placeholders first.
    pub fn lifecycle_with(&self, template: &str, placeholders: &[(&str, &str)]) {
        if self.enabled {
            info!("{}", self.format(template, placeholders));
        } else {
            debug!("{}", fill_placeholders(template, placeholders));
        }
    }
}
