//! Post-processing: deterministic cleanup of recognized page text.
//!
//! Tesseract output carries a few artefacts that are noise for downstream
//! consumers:
//!
//! - a trailing form feed marking the end of the page
//! - `\r\n` line endings on some builds
//! - trailing spaces left by column layout
//! - long runs of blank lines where the page had white space
//! - zero-width characters and BOMs picked up from the training data
//!
//! Rules must run in this order: normalise line endings before trimming, and
//! strip the form feed before the blank-line collapse sees it.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to the raw engine output.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Turn form feeds into line breaks
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 2
/// 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 6. End with exactly one newline; blank output becomes empty
pub fn clean_ocr_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = form_feeds_to_breaks(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Form feeds to line breaks ───────────────────────────────────────

fn form_feeds_to_breaks(input: &str) -> String {
    input.replace('\u{000C}', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 5: Remove invisible Unicode characters ──────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 6: Ensure text ends with single newline ─────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.trim_start().is_empty() {
        String::new()
    } else {
        format!("{}\n", trimmed)
    }
}
