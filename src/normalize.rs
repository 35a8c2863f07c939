//! Per-value text normalization.

use crate::source::NormalizeFlags;

/// Collapse whitespace runs and trim (if enabled), then apply at most one case
/// transform: lowercase, else titlecase, else uppercase.
pub fn normalize_value(raw: &str, flags: &NormalizeFlags) -> String {
    let mut s = if flags.collapse_whitespace {
        collapse_whitespace(raw)
    } else {
        raw.to_string()
    };
    if flags.lowercase {
        s = s.to_lowercase();
    } else if flags.titlecase {
        s = titlecase(&s);
    } else if flags.uppercase {
        s = s.to_uppercase();
    }
    s
}

pub fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for word in s.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// First letter of every run of letters upper-cased, the rest lower-cased.
/// Any non-letter (digit, apostrophe, punctuation) starts a new run.
pub fn titlecase(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_letter = false;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if prev_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_letter = true;
        } else {
            out.push(ch);
            prev_letter = false;
        }
    }
    out
}
