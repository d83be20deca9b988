//! Turning a model reply into a JSON result map.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Key holding the reply text when it contains no JSON object.
pub const RAW_RESPONSE_KEY: &str = "raw_response";

fn fenced_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)```").expect("fenced block regex is valid")
    })
}

/// Parse a model reply into a result map.
///
/// Accepts a bare JSON object, an object inside a fenced code block, or the
/// outermost `{...}` span inside prose. Anything else is wrapped under
/// [`RAW_RESPONSE_KEY`]. Returns `None` for an empty reply.
pub fn parse_result(reply: &str) -> Option<Map<String, Value>> {
    let reply = reply.trim();
    if reply.is_empty() {
        return None;
    }

    let mut candidates: Vec<&str> = vec![reply];
    if let Some(block) = fenced_block().captures(reply).and_then(|c| c.get(1)) {
        candidates.push(block.as_str().trim());
    }
    if let (Some(start), Some(end)) = (reply.find('{'), reply.rfind('}')) {
        if start < end {
            candidates.push(&reply[start..=end]);
        }
    }

    for candidate in candidates {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate) {
            return Some(map);
        }
    }

    let mut map = Map::new();
    map.insert(RAW_RESPONSE_KEY.to_string(), Value::String(reply.to_string()));
    Some(map)
}
