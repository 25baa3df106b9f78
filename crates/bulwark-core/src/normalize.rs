//! Query text normalization.
//!
//! Two queries that differ only in layout or comments must map to the same
//! statement pool key. Quoted text is copied verbatim: a `--` inside a
//! string literal is data, not a comment.

use std::iter::Peekable;
use std::str::Chars;

/// Normalize query text into a pool key.
///
/// Trims, collapses runs of whitespace to a single space, and strips `--`
/// line comments and `/* */` block comments. String literals (`'...'`) and
/// quoted identifiers (`"..."`, `` `...` ``) are preserved exactly.
pub fn normalize_query(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut pending_space = false;

    while let Some(c) = chars.next() {
        match c {
            '-' if chars.peek() == Some(&'-') => {
                skip_line_comment(&mut chars);
                pending_space = true;
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                skip_block_comment(&mut chars);
                pending_space = true;
            }
            c if c.is_whitespace() => pending_space = true,
            _ => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;

                if is_quote(c) {
                    copy_quoted(c, &mut chars, &mut out);
                } else {
                    out.push(c);
                }
            }
        }
    }

    out
}

/// Placeholders found in a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Placeholders {
    /// Count of bare `?` placeholders
    pub anonymous: usize,

    /// Whether any numbered or named placeholder (`?1`, `:name`, `@p`, `$x`, `$1`) appears
    pub numbered: bool,
}

/// Count bind placeholders outside literals and comments.
pub fn count_placeholders(sql: &str) -> Placeholders {
    let normalized = normalize_query(sql);
    let mut found = Placeholders::default();
    let mut chars = normalized.chars().peekable();
    let mut prev: Option<char> = None;

    while let Some(c) = chars.next() {
        if is_quote(c) {
            // Output buffer is irrelevant here; just step over the literal.
            copy_quoted(c, &mut chars, &mut String::new());
            prev = Some(c);
            continue;
        }

        match c {
            '?' => match chars.peek() {
                Some(d) if d.is_ascii_digit() => found.numbered = true,
                _ => found.anonymous += 1,
            },
            ':' | '@' | '$' => {
                // `:name` and the numeric `:1`, `@1`, `$1` forms
                let starts_name = chars
                    .peek()
                    .map(|n| n.is_ascii_alphanumeric() || *n == '_')
                    .unwrap_or(false);
                // `a::int` casts are not parameters.
                if starts_name && prev != Some(':') && chars.peek() != Some(&':') {
                    found.numbered = true;
                }
            }
            _ => {}
        }
        prev = Some(c);
    }

    found
}

fn is_quote(c: char) -> bool {
    matches!(c, '\'' | '"' | '`')
}

fn skip_line_comment(chars: &mut Peekable<Chars<'_>>) {
    for c in chars.by_ref() {
        if c == '\n' {
            break;
        }
    }
}

fn skip_block_comment(chars: &mut Peekable<Chars<'_>>) {
    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'/') {
            chars.next();
            break;
        }
    }
}

/// Copy a quoted run including both quotes. A doubled quote is an escaped
/// quote and does not terminate the run.
fn copy_quoted(quote: char, chars: &mut Peekable<Chars<'_>>, out: &mut String) {
    out.push(quote);
    while let Some(c) = chars.next() {
        out.push(c);
        if c == quote {
            if chars.peek() == Some(&quote) {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
                continue;
            }
            break;
        }
    }
}
