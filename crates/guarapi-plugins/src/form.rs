//! `application/x-www-form-urlencoded` decoding with nested keys.
//!
//! Keys may describe a path into a nested mapping:
//!
//! | key            | segments              |
//! |----------------|-----------------------|
//! | `a.b`          | `a`, `b`              |
//! | `a[b]`         | `a`, `b`              |
//! | `a[]`          | `a`, *next index*     |
//! | `a.1.2`        | `a`, `1`, `2`         |
//!
//! Numeric segments stay mapping keys (`{"1": ...}`), never array positions.
//! A path that is assigned more than once collects its values into a list in
//! the order they were encountered.

use serde_json::{Map, Value};

/// Keys nested deeper than this keep their remainder as one literal segment.
pub const MAX_DEPTH: usize = 20;

/// One step of a key path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// A named (or numeric) key.
    Key(String),
    /// `[]`: the next free index under the parent.
    Append,
}

/// Decode a form body into a nested mapping.
///
/// Pairs are split on `&` and on the first `=`, `+` decodes to a space and
/// percent escapes are decoded as UTF-8 (invalid sequences become U+FFFD).
/// Malformed escapes are kept literally. A pair without `=` has an empty
/// value. Empty pairs and pairs with an empty key are ignored.
#[must_use]
pub fn decode(input: &[u8]) -> Map<String, Value> {
    let mut root = Map::new();
    for (key, value) in form_urlencoded::parse(input) {
        if key.is_empty() {
            continue;
        }
        let path = parse_key(&key);
        insert(&mut root, &path, value.into_owned());
    }
    root
}

/// Split a form key into path segments.
#[must_use]
pub fn parse_key(key: &str) -> Vec<Segment> {
    let root_end = key
        .char_indices()
        .skip(1)
        .find(|(_, c)| matches!(c, '.' | '['))
        .map_or(key.len(), |(idx, _)| idx);
    let mut segments = vec![Segment::Key(key[..root_end].to_owned())];
    let mut rest = &key[root_end..];

    while !rest.is_empty() {
        if segments.len() >= MAX_DEPTH {
            segments.push(Segment::Key(rest.to_owned()));
            break;
        }

        if let Some(after) = rest.strip_prefix('[') {
            let Some(close) = after.find(']') else {
                // Unbalanced bracket: keep the remainder verbatim.
                segments.push(Segment::Key(rest.to_owned()));
                break;
            };
            let name = &after[..close];
            segments.push(if name.is_empty() {
                Segment::Append
            } else {
                Segment::Key(name.to_owned())
            });
            rest = &after[close + 1..];
        } else if let Some(after) = rest.strip_prefix('.') {
            let end = after.find(['.', '[']).unwrap_or(after.len());
            if end > 0 {
                segments.push(Segment::Key(after[..end].to_owned()));
            }
            rest = &after[end..];
        } else {
            // Text directly after a closing bracket, as in `a[b]c`.
            let end = rest.find(['.', '[']).unwrap_or(rest.len());
            segments.push(Segment::Key(rest[..end].to_owned()));
            rest = &rest[end..];
        }
    }

    segments
}

fn insert(map: &mut Map<String, Value>, path: &[Segment], value: String) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    let key = match first {
        Segment::Key(key) => key.clone(),
        Segment::Append => next_index(map),
    };

    if rest.is_empty() {
        match map.get_mut(&key) {
            None => {
                map.insert(key, Value::String(value));
            }
            Some(Value::Array(items)) => items.push(Value::String(value)),
            Some(Value::Object(child)) => {
                let index = next_index(child);
                child.insert(index, Value::String(value));
            }
            Some(existing) => {
                let previous = existing.take();
                *existing = Value::Array(vec![previous, Value::String(value)]);
            }
        }
        return;
    }

    let child = map
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()));
    if !child.is_object() {
        *child = Value::Object(promote(child.take()));
    }
    if let Value::Object(child) = child {
        insert(child, rest, value);
    }
}

/// Turn a scalar or list into a mapping keyed by position.
fn promote(value: Value) -> Map<String, Value> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| (idx.to_string(), item))
            .collect(),
        Value::Null => Map::new(),
        other => Map::from_iter([("0".to_owned(), other)]),
    }
}

/// The first numeric key, counting up from the number of entries, that is free.
fn next_index(map: &Map<String, Value>) -> String {
    let mut index = map.len();
    while map.contains_key(&index.to_string()) {
        index += 1;
    }
    index.to_string()
}
