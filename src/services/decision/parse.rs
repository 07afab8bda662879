//! Model output parsing.

use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{AiAction, AiDecision};

/// Locate the first balanced `[...]` in `text` that parses as a JSON array.
///
/// Brackets inside JSON strings are ignored, so prose, markdown fences or a
/// `reasoning` field containing `]` do not cut the array short.
pub fn extract_json_array(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut start = 0;

    while let Some(offset) = text[start..].find('[') {
        let open = start + offset;
        if let Some(close) = matching_bracket(bytes, open) {
            let candidate = &text[open..=close];
            if matches!(serde_json::from_str::<Value>(candidate), Ok(Value::Array(_))) {
                return Some(candidate);
            }
        }
        start = open + 1;
    }
    None
}

fn matching_bracket(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Turn model text into actionable decisions.
///
/// Never fails: no array means no decisions. Entries that do not match the
/// decision shape are skipped, and HOLD entries are dropped.
pub fn parse_decisions(text: &str) -> Vec<AiDecision> {
    let Some(raw) = extract_json_array(text) else {
        debug!("No JSON array in model response");
        return Vec::new();
    };

    let entries: Vec<Value> = match serde_json::from_str(raw) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to parse decisions: {}", e);
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<AiDecision>(entry) {
            Ok(decision) => Some(decision),
            Err(e) => {
                warn!("Skipping malformed decision: {}", e);
                None
            }
        })
        .filter(|d| d.action != AiAction::Hold)
        .collect()
}
