//! Endpoint recovery from historical request logs.
//!
//! The miner scans free-form log text for `URL:` occurrences, then looks for
//! a `method:` token and (for mutating methods) a JSON body block inside
//! fixed-size windows following each occurrence. Anything that does not match
//! contributes nothing: malformed logs degrade to smaller results, never to
//! errors. The body extractor is a small balanced-brace scanner rather than a
//! regex, so nested objects survive.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Everything learned about one path on one port.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MinedEndpoint {
    pub methods: Vec<String>,
    /// Per-method request body actually observed. First parse wins; later
    /// duplicates for the same method are ignored.
    pub templates: BTreeMap<String, Value>,
}

pub type MinedData = BTreeMap<u16, BTreeMap<String, MinedEndpoint>>;

/// Bytes after a URL occurrence in which the method token must appear.
const METHOD_WINDOW: usize = 120;
/// Bytes after the method token in which a request body may appear.
const BODY_WINDOW: usize = 600;

const MUTATING: &[&str] = &["POST", "PUT", "PATCH"];

/// Mine endpoint, method, and payload facts out of recorded request text.
pub fn mine(log: &str) -> MinedData {
    let url_re = Regex::new(r"URL:\s*https?://([^/\s:]+):(\d{1,5})(/\S+)").unwrap();
    let method_re = Regex::new(r"method:\s*([A-Z]+)").unwrap();
    let mut out: MinedData = BTreeMap::new();

    for caps in url_re.captures_iter(log) {
        let whole = caps.get(0).unwrap();
        let port: u16 = match caps[2].parse() {
            Ok(p) if p > 0 => p,
            _ => continue,
        };
        let path = caps[3].to_string();

        let window = bounded_window(log, whole.end(), METHOD_WINDOW);
        let method_caps = match method_re.captures(window) {
            Some(c) => c,
            None => continue,
        };
        let method = method_caps[1].to_string();

        let entry = out.entry(port).or_default().entry(path).or_default();
        if !entry.methods.contains(&method) {
            entry.methods.push(method.clone());
        }

        if MUTATING.contains(&method.as_str()) && !entry.templates.contains_key(&method) {
            let body_from = whole.end() + method_caps.get(0).unwrap().end();
            let body_window = bounded_window(log, body_from, BODY_WINDOW);
            if let Some(raw) = json_block(body_window) {
                match serde_json::from_str::<Value>(raw) {
                    Ok(body) => {
                        entry.templates.insert(method, body);
                    }
                    Err(_) => tracing::debug!("discarding unparseable body near {}", whole.start()),
                }
            }
        }
    }
    out
}

/// Slice up to `len` bytes starting at `from`, clamped to char boundaries so
/// multi-byte log content cannot panic the miner.
fn bounded_window(text: &str, from: usize, len: usize) -> &str {
    if from >= text.len() {
        return "";
    }
    let mut end = (from + len).min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[from..end]
}

/// First balanced `{ ... }` block in `s`, honoring string literals and escape
/// sequences. Returns None for unopened or unterminated blocks.
fn json_block(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let mut depth = 0usize;
    let mut in_str = false;
    let mut escaped = false;
    for (i, c) in s[start..].char_indices() {
        if in_str {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_str = false;
            }
            continue;
        }
        match c {
            '"' => in_str = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
