// Tier 1: Response Decoder
//
// Concept: Turn untrusted classifier text into a typed value.
// Shared by every external call site, parameterized by target type.
//
// Algorithm:
// 1. Strip Markdown code fences (``` / ```json)
// 2. Locate candidate JSON spans by bracket matching (string-aware)
// 3. Parse each complete candidate strictly
// 4. Repair candidates (smart quotes, // comments, trailing commas,
//    unclosed strings/brackets) and parse again
// 5. Nothing parsed -> DecodeError

use crate::pipeline::types::DecodeError;
use serde::de::DeserializeOwned;

/// Upper bound on candidate spans examined per response
const MAX_CANDIDATES: usize = 32;

/// A bracket-delimited region of the response
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate<'a> {
    text: &'a str,
    /// False when input ended before the opening bracket was closed
    complete: bool,
}

/// Decode classifier output into `T`
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, DecodeError> {
    let unfenced = strip_code_fences(raw);

    let mut candidates = find_candidates(&unfenced);
    if candidates.is_empty() && unfenced != raw {
        candidates = find_candidates(raw);
    }
    if candidates.is_empty() {
        return Err(DecodeError::NoJson);
    }

    for candidate in candidates.iter().filter(|c| c.complete) {
        if let Ok(value) = serde_json::from_str::<T>(candidate.text) {
            return Ok(value);
        }
    }

    let mut last_error = None;
    for candidate in &candidates {
        let repaired = repair_json(candidate.text);
        match serde_json::from_str::<T>(&repaired) {
            Ok(value) => {
                tracing::debug!(
                    original_len = candidate.text.len(),
                    repaired_len = repaired.len(),
                    "Classifier JSON decoded after repair"
                );
                return Ok(value);
            }
            Err(e) => last_error = Some(e.to_string()),
        }
    }

    Err(DecodeError::Invalid {
        message: last_error.unwrap_or_else(|| "no candidate parsed".to_string()),
    })
}

/// Return the body of the first fenced block, or the input unchanged
pub fn strip_code_fences(raw: &str) -> String {
    let Some(open) = raw.find("```") else {
        return raw.to_string();
    };

    // Skip the info string ("json", "JSON", ...) on the opening fence line
    let after_open = &raw[open + 3..];
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(after_open.len());
    let body = &after_open[body_start..];

    match body.find("```") {
        Some(close) => body[..close].to_string(),
        None => body.to_string(),
    }
}

/// Bracket-matched spans starting at each `{` / `[` in order
fn find_candidates(text: &str) -> Vec<Candidate<'_>> {
    let mut candidates = Vec::new();
    for (start, c) in text.char_indices() {
        if c != '{' && c != '[' {
            continue;
        }
        candidates.push(match_from(text, start));
        if candidates.len() >= MAX_CANDIDATES {
            break;
        }
    }
    candidates
}

fn match_from(text: &str, start: usize) -> Candidate<'_> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                    if stack.is_empty() {
                        let end = start + offset + c.len_utf8();
                        return Candidate {
                            text: &text[start..end],
                            complete: true,
                        };
                    }
                } else {
                    // Mismatched closer: let repair sort it out
                    break;
                }
            }
            _ => {}
        }
    }

    Candidate {
        text: &text[start..],
        complete: false,
    }
}

/// Best-effort syntactic repair of a JSON fragment
pub fn repair_json(fragment: &str) -> String {
    let normalized = fragment.replace(['\u{201C}', '\u{201D}'], "\"");

    let mut out = String::with_capacity(normalized.len() + 8);
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = normalized.chars().peekable();

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '{' => {
                closers.push('}');
                out.push(c);
            }
            '[' => {
                closers.push(']');
                out.push(c);
            }
            '}' | ']' => {
                if closers.contains(&c) {
                    while let Some(top) = closers.pop() {
                        trim_dangling(&mut out);
                        out.push(top);
                        if top == c {
                            break;
                        }
                    }
                }
                if closers.is_empty() {
                    break;
                }
            }
            _ => out.push(c),
        }
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }

    if !closers.is_empty() {
        trim_dangling(&mut out);
        if out.ends_with(':') {
            out.push_str(" null");
        }
        while let Some(closer) = closers.pop() {
            trim_dangling(&mut out);
            out.push(closer);
        }
    }

    out
}

/// Drop trailing whitespace and a dangling comma
fn trim_dangling(out: &mut String) {
    loop {
        let trimmed = out.trim_end().len();
        out.truncate(trimmed);
        if out.ends_with(',') {
            out.pop();
        } else {
            break;
        }
    }
}
