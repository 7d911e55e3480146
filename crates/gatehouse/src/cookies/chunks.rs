// Cookie codec: chunking of oversized logical values.
//
// A logical cookie value that does not fit under the browser limit is
// split across physical cookies named `{base}.{index}`. Reads reassemble
// by numeric suffix. Stale chunk names from a previous, larger write must
// be expired in the same response or they would corrupt the next read.

use std::collections::HashMap;

/// Browser limit for one serialized cookie.
pub const ALLOWED_COOKIE_SIZE: usize = 4096;

/// Reserved headroom for the cookie name and attributes.
const ESTIMATED_OVERHEAD: usize = 160;

/// Maximum value bytes per physical cookie.
pub const CHUNK_SIZE: usize = ALLOWED_COOKIE_SIZE - ESTIMATED_OVERHEAD;

/// One physical cookie produced by the codec.
#[derive(Debug, Clone, PartialEq)]
pub struct CookieChunk {
    pub name: String,
    pub value: String,
}

/// Split a logical value into physical cookies.
///
/// Values at or under [`CHUNK_SIZE`] produce a single unsuffixed cookie.
/// Larger values produce `{name}.0`, `{name}.1`, … in order.
pub fn chunk(name: &str, value: &str) -> Vec<CookieChunk> {
    if value.len() <= CHUNK_SIZE {
        return vec![CookieChunk {
            name: name.to_string(),
            value: value.to_string(),
        }];
    }

    let bytes = value.as_bytes();
    let mut chunks = Vec::new();
    let mut offset = 0;
    let mut index = 0;

    while offset < bytes.len() {
        let end = (offset + CHUNK_SIZE).min(bytes.len());
        chunks.push(CookieChunk {
            name: format!("{}.{}", name, index),
            value: value[offset..end].to_string(),
        });
        offset = end;
        index += 1;
    }

    chunks
}

/// Reassemble a logical value from the request cookies.
///
/// Collects the unsuffixed cookie and every `{name}.{n}` chunk, sorts by
/// numeric suffix (missing suffix sorts as 0), and concatenates. Returns
/// None when no matching cookie exists. Reordered or dropped chunks yield
/// a corrupt string here; the sealed token codec rejects it downstream.
pub fn reconstruct(cookies: &HashMap<String, String>, name: &str) -> Option<String> {
    let chunk_prefix = format!("{}.", name);
    let mut parts: Vec<(usize, &str)> = Vec::new();

    for (cookie_name, value) in cookies {
        if cookie_name == name {
            parts.push((0, value.as_str()));
        } else if let Some(suffix) = cookie_name.strip_prefix(&chunk_prefix) {
            if let Ok(index) = suffix.parse::<usize>() {
                parts.push((index, value.as_str()));
            }
        }
    }

    if parts.is_empty() {
        return None;
    }

    parts.sort_by_key(|(index, _)| *index);
    Some(parts.into_iter().map(|(_, v)| v).collect())
}

/// Names of previously-set physical cookies that a fresh write no longer
/// covers. Each must be expired alongside the write so a chunked→single
/// (or shrinking) transition cannot leave corrupting leftovers.
pub fn stale_chunk_names(
    request_cookies: &HashMap<String, String>,
    name: &str,
    fresh: &[CookieChunk],
) -> Vec<String> {
    let chunk_prefix = format!("{}.", name);
    request_cookies
        .keys()
        .filter(|existing| {
            let matches_base = existing.as_str() == name;
            let matches_chunk = existing
                .strip_prefix(&chunk_prefix)
                .is_some_and(|suffix| suffix.parse::<usize>().is_ok());
            (matches_base || matches_chunk) && !fresh.iter().any(|c| &c.name == *existing)
        })
        .cloned()
        .collect()
}
