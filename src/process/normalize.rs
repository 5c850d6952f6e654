//! Terminal output normalisation.
//!
//! Lone carriage returns (progress-bar overwrites) become `\r\n` line
//! breaks, and trailing horizontal whitespace is stripped from each
//! terminated line while keeping any ANSI escape sequences that follow it.
//! Both rules are idempotent.

use std::sync::LazyLock;

use regex::Regex;

/// Trailing ANSI CSI sequence, e.g. `\x1b[0m` or `\x1b[2K`.
static TRAILING_ANSI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]$").unwrap_or_else(|_| unreachable!("static pattern"))
});

/// CSI sequence cut off by a chunk boundary, e.g. `\x1b` or `\x1b[3`.
static PARTIAL_ANSI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b(\[[0-9;?]*)?$").unwrap_or_else(|_| unreachable!("static pattern"))
});

/// Normalise a complete piece of text.
#[must_use]
pub fn normalize_output(text: &str) -> String {
    strip_trailing_whitespace(&collapse_lone_cr(text))
}

/// Streaming normaliser that is independent of chunk boundaries.
///
/// Concatenating the output of every [`push`](Self::push) and the final
/// [`finish`](Self::finish) equals [`normalize_output`] of the whole stream,
/// however the stream was split.
///
/// A chunk ending in `\r` cannot be classified until the next chunk shows
/// whether a `\n` follows, so that `\r` is held back. Likewise the trailing
/// whitespace and escape sequences of an unterminated line are held until
/// the line is terminated or the stream ends.
#[derive(Debug, Default)]
pub struct OutputNormalizer {
    held_tail: String,
    held_cr: bool,
}

impl OutputNormalizer {
    /// Normalise the next chunk.
    pub fn push(&mut self, chunk: &str) -> String {
        let mut input = std::mem::take(&mut self.held_tail);
        input.reserve(chunk.len() + 1);
        if std::mem::take(&mut self.held_cr) {
            input.push('\r');
        }
        input.push_str(chunk);

        if input.ends_with('\r') {
            input.pop();
            self.held_cr = true;
        }

        let mut out = strip_trailing_whitespace(&collapse_lone_cr(&input));
        let line_start = out.rfind('\n').map_or(0, |pos| pos + 1);
        let hold_from = line_start + strippable_suffix_start(&out[line_start..]);
        self.held_tail = out.split_off(hold_from);
        out
    }

    /// Flush held text at end of stream.
    pub fn finish(&mut self) -> String {
        let mut out = std::mem::take(&mut self.held_tail);
        if std::mem::take(&mut self.held_cr) {
            out.push_str("\r\n");
        }
        out
    }
}

fn collapse_lone_cr(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        if c == '\r' && chars.peek() != Some(&'\n') {
            out.push('\n');
        }
    }
    out
}

fn strip_trailing_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('\n') {
        let (line, tail) = rest.split_at(pos);
        let (line, cr) = match line.strip_suffix('\r') {
            Some(stripped) => (stripped, "\r"),
            None => (line, ""),
        };
        out.push_str(&strip_line(line));
        out.push_str(cr);
        out.push('\n');
        rest = &tail[1..];
    }

    out.push_str(rest);
    out
}

fn strip_line(line: &str) -> String {
    let (body, escapes) = split_strippable(line);
    let mut out = String::with_capacity(line.len());
    out.push_str(body);
    for escape in escapes.iter().rev() {
        out.push_str(escape);
    }
    out
}

/// Byte offset where the run of whitespace and escape sequences at the end
/// of an unterminated line begins.
fn strippable_suffix_start(line: &str) -> usize {
    let line = PARTIAL_ANSI.find(line).map_or(line, |m| &line[..m.start()]);
    split_strippable(line).0.len()
}

/// Split trailing horizontal whitespace and CSI sequences off `line`,
/// returning the body and the escapes in reverse order of appearance.
fn split_strippable(line: &str) -> (&str, Vec<&str>) {
    let mut body = line;
    let mut escapes: Vec<&str> = Vec::new();

    loop {
        if let Some(m) = TRAILING_ANSI.find(body) {
            escapes.push(m.as_str());
            body = &body[..m.start()];
        } else {
            let trimmed = body.trim_end_matches([' ', '\t']);
            if trimmed.len() == body.len() {
                break;
            }
            body = trimmed;
        }
    }

    (body, escapes)
}
