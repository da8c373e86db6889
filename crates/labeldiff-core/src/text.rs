//! Text canonicalisation used before any label comparison.
//!
//! Two operations live here:
//! - [`normalize`] collapses whitespace runs and trims, so `"a  b"` and
//!   `"a b"` compare equal.
//! - [`clean_rich_text`] strips multi-line text formatting directives
//!   (`\f...;`, `\H...;`, `\C...;`, any other `\X...;`, toggles and grouping
//!   braces) and keeps the paragraph break marker `\P` verbatim.
//!
//! Neither function fails. Directives that never reach their `;` are kept as
//! literal text.

/// Paragraph break marker inside multi-line text. Kept as-is by the cleaner.
pub const PARAGRAPH_BREAK: &str = "\\P";

/// Collapse every run of whitespace to a single space and trim both ends.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip multi-line text control codes and un-escape literal characters.
pub fn clean_rich_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let Some(&code) = chars.get(i + 1) else {
                    out.push('\\');
                    i += 1;
                    continue;
                };
                match code {
                    '\\' | '{' | '}' => {
                        out.push(code);
                        i += 2;
                    }
                    '~' => {
                        out.push(' ');
                        i += 2;
                    }
                    'P' => {
                        out.push_str(PARAGRAPH_BREAK);
                        i += 2;
                    }
                    // underline / overline / strike-through on and off
                    'L' | 'l' | 'O' | 'o' | 'K' | 'k' => i += 2,
                    'U' => match unicode_escape(&chars, i + 2) {
                        Some(c) => {
                            out.push(c);
                            i += 7;
                        }
                        None => i = skip_directive(&chars, i, &mut out),
                    },
                    _ => i = skip_directive(&chars, i, &mut out),
                }
            }
            '{' | '}' => i += 1,
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    collapse_spaces(&out)
}

/// Skip a `\X...;` directive starting at `start`. Returns the index after the
/// terminating `;`, or keeps the backslash literally when no `;` follows
/// before the next backslash.
fn skip_directive(chars: &[char], start: usize, out: &mut String) -> usize {
    for (j, c) in chars.iter().enumerate().skip(start + 1) {
        match c {
            ';' => return j + 1,
            '\\' => break,
            _ => {}
        }
    }
    out.push('\\');
    start + 1
}

/// Decode `+XXXX` (four hex digits) following a `\U`.
fn unicode_escape(chars: &[char], at: usize) -> Option<char> {
    if chars.get(at) != Some(&'+') {
        return None;
    }
    let digits = chars.get(at + 1..at + 5)?;
    let hex: String = digits.iter().collect();
    u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32)
}

fn collapse_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = false;
    for c in text.chars() {
        if c == ' ' {
            if !last_space {
                out.push(c);
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out.trim().to_string()
}
