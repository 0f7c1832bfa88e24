//! The line grammar: `[label[:]] [op [arg, arg, ...]] [; comment]`.
//!
//! This is deliberately a thin, almost mechanical port of the reference
//! grammar (§4.1, §6) — it is the external-collaborator tokenizer the spec
//! says the core is built on top of, not itself part of the event-queue
//! engine.

use regex::Regex;

use crate::error::{DiosError, Result};

const LINE_PATTERN: &str = r#"^(?P<lbl>\w+:?)?(?:\s+(?P<op>\w+)(?:\s+(?P<args>(?:[^;]|\\.|"(?:[^"\\]|\\.)*")+))?)?(?:\s*(?P<cmnt>;.*))?\s*$"#;

/// One parsed line: the op keyword (absent for blank/label-only/comment-only
/// lines) and its raw, not-yet-split argument text.
pub struct LineParts<'a> {
    pub op: Option<&'a str>,
    pub args: Option<&'a str>,
}

pub fn line_regex() -> Regex {
    Regex::new(LINE_PATTERN).expect("static line grammar is a valid regex")
}

/// Split one line into its grammar parts, or fail citing `path:line`.
pub fn split_line<'a>(re: &Regex, line: &'a str, path: &str, lno: usize) -> Result<LineParts<'a>> {
    let caps = re
        .captures(line)
        .ok_or_else(|| DiosError::parse(path, lno, format!("Invalid line: {line}")))?;
    Ok(LineParts {
        op: caps.name("op").map(|m| m.as_str()),
        args: caps.name("args").map(|m| m.as_str()),
    })
}

/// Split a comma-separated argument string into its tokens: double-quoted
/// strings (escapes untouched, quotes kept), identifiers, or numeric
/// lexemes (accepted lexically, never evaluated).
pub fn split_args(path: &str, lno: usize, argstr: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut rest = argstr;

    while !rest.is_empty() {
        let first = rest.chars().next().unwrap();
        let token_len = if first == '"' {
            match scan_string(rest) {
                Some(len) => len,
                None => {
                    return Err(DiosError::parse(path, lno, format!("Unterminated string: {rest}")));
                }
            }
        } else if is_ident_start(first) {
            scan_while(rest, is_ident_char)
        } else if first.is_ascii_digit() {
            scan_while(rest, is_num_char)
        } else {
            return Err(DiosError::parse(path, lno, format!("Unknown argument: {rest}")));
        };

        args.push(rest[..token_len].to_string());
        rest = rest[token_len..].trim_start();

        if rest.is_empty() {
            break;
        }
        if !rest.starts_with(',') {
            return Err(DiosError::parse(path, lno, format!("Expected comma in argument: {rest}")));
        }
        rest = rest[1..].trim_start();
    }

    Ok(args)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_num_char(c: char) -> bool {
    c.is_ascii_hexdigit() || matches!(c, 'o' | 'O' | 'x' | 'X')
}

fn scan_while(s: &str, pred: impl Fn(char) -> bool) -> usize {
    let mut len = 0;
    for c in s.chars() {
        if !pred(c) {
            break;
        }
        len += c.len_utf8();
    }
    len
}

/// Length in bytes of a leading double-quoted string (including both
/// quotes), honoring backslash escapes, or `None` if unterminated.
fn scan_string(s: &str) -> Option<usize> {
    let mut chars = s.char_indices();
    let (_, opening) = chars.next()?;
    debug_assert_eq!(opening, '"');
    let mut escaped = false;
    for (idx, c) in chars {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => return Some(idx + 1),
            _ => {}
        }
    }
    None
}
