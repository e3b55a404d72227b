//! Insertion-string expansion.
//!
//! Two independent passes stand between the raw strings stored in a record
//! and a readable description. First, each insert may itself contain
//! `%%<id>` references into a *parameter* message file; without resolving
//! those, descriptions visibly leak literal `%%8961`-style tokens. Second,
//! the message template references the (now expanded) inserts positionally
//! as `%1`..`%N`.

use std::path::PathBuf;

use hashbrown::HashMap;
use log::trace;

use crate::message_resolver::{lookup_message_in_files, MessageProvider};

/// Runs both expansion passes.
///
/// Returns the parameter-expanded inserts (what the final record exposes)
/// and the formatted description. An empty template yields an empty
/// description; the inserts are expanded regardless.
pub fn expand(
    template: &str,
    raw_inserts: &[String],
    parameter_files: &[PathBuf],
    messages: &dyn MessageProvider,
) -> (Vec<String>, String) {
    let mut lookups: HashMap<u32, Option<String>> = HashMap::new();

    let resolved_inserts: Vec<String> = raw_inserts
        .iter()
        .map(|insert| expand_parameter_refs_cached(insert, parameter_files, messages, &mut lookups))
        .collect();

    let description = if template.is_empty() {
        String::new()
    } else {
        format_message_template(template, &resolved_inserts)
    };

    (resolved_inserts, description)
}

/// Replaces `%%<id>` tokens in one insert with the parameter-file message
/// for `<id>`. Unresolvable tokens pass through verbatim.
pub fn expand_parameter_refs(
    insert: &str,
    parameter_files: &[PathBuf],
    messages: &dyn MessageProvider,
) -> String {
    let mut lookups = HashMap::new();
    expand_parameter_refs_cached(insert, parameter_files, messages, &mut lookups)
}

fn expand_parameter_refs_cached(
    insert: &str,
    parameter_files: &[PathBuf],
    messages: &dyn MessageProvider,
    lookups: &mut HashMap<u32, Option<String>>,
) -> String {
    if !insert.contains("%%") {
        return insert.to_owned();
    }

    let bytes = insert.as_bytes();
    let mut out = String::with_capacity(insert.len());
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && bytes.get(i + 1) == Some(&b'%') {
            let digits_start = i + 2;
            let digits_end = scan_digits(bytes, digits_start);

            // `%%` with no digits is not a parameter reference.
            if digits_end > digits_start {
                let token = &insert[i..digits_end];

                // The digit run always parses unless it overflows u32; an
                // overflowing id cannot be a real parameter, pass it through.
                if let Ok(id) = insert[digits_start..digits_end].parse::<u32>() {
                    let replacement = lookups
                        .entry(id)
                        .or_insert_with(|| {
                            lookup_message_in_files(messages, parameter_files, id)
                                .map(|m| m.trim_end_matches(['\r', '\n']).to_owned())
                        })
                        .clone();

                    out.push_str(&insert[literal_start..i]);
                    match replacement {
                        Some(ref text) => {
                            trace!("parameter {id} expanded to {text:?}");
                            out.push_str(text);
                        }
                        None => out.push_str(token),
                    }

                    i = digits_end;
                    literal_start = i;
                    continue;
                }
            }

            // Skip the pair so `%%%4` is not re-matched mid-token.
            i += 2;
        } else {
            i += 1;
        }
    }

    out.push_str(&insert[literal_start..]);
    out
}

/// Formats a message template against positional inserts.
///
/// `%N` (N = 1..=99, up to two digits) substitutes insert N; `%%` escapes a
/// literal percent; any other `%`-sequence passes through verbatim. Indices
/// past the supplied inserts render as literal `%N`: some templates
/// reference more placeholders than the event supplied, and the mismatch is
/// deliberately not an error.
pub fn format_message_template(template: &str, inserts: &[String]) -> String {
    let highest = highest_insert_index(template);

    let mut positional: Vec<&str> = inserts.iter().map(String::as_str).collect();
    let padding: Vec<String> = (inserts.len() + 1..=highest)
        .map(|index| format!("%{index}"))
        .collect();
    positional.extend(padding.iter().map(String::as_str));

    let bytes = template.as_bytes();
    let mut out = String::with_capacity(template.len());
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }

        out.push_str(&template[literal_start..i]);

        match bytes.get(i + 1) {
            Some(b'%') => {
                out.push('%');
                i += 2;
            }
            Some(d) if d.is_ascii_digit() => {
                let digits_end = scan_digits(bytes, i + 1).min(i + 3);
                let index: usize = template[i + 1..digits_end]
                    .parse()
                    .expect("one or two ascii digits always parse");

                match index.checked_sub(1).and_then(|idx| positional.get(idx)) {
                    Some(insert) => out.push_str(insert),
                    // `%0` is not an insert index; keep it verbatim.
                    None => out.push_str(&template[i..digits_end]),
                }
                i = digits_end;
            }
            _ => {
                out.push('%');
                i += 1;
            }
        }

        literal_start = i;
    }

    out.push_str(&template[literal_start..]);
    out
}

/// The highest `%N` index literally present in a template, with `%%` pairs
/// skipped as escapes. Indices are capped at two digits, matching the
/// native formatter's `%1`..`%99` range.
pub fn highest_insert_index(template: &str) -> usize {
    let bytes = template.as_bytes();
    let mut highest = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }

        match bytes.get(i + 1) {
            Some(b'%') => i += 2,
            Some(d) if d.is_ascii_digit() => {
                let digits_end = scan_digits(bytes, i + 1).min(i + 3);
                let index: usize = template[i + 1..digits_end]
                    .parse()
                    .expect("one or two ascii digits always parse");
                highest = highest.max(index);
                i = digits_end;
            }
            _ => i += 1,
        }
    }

    highest
}

fn scan_digits(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    end
}
