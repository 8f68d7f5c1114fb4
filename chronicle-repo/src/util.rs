//! Small conversions shared by every repository.

use serde_json::Value as Json;

/// Parse a `TEXT` column holding a JSON object back into a `Value`,
/// defaulting to an empty object if the stored text is somehow not
/// valid JSON (it is always written by [`json_to_text`], so this only
/// guards against a hand-edited database).
pub fn json_from_text(text: &str) -> Json {
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::json!({}))
}

/// Serialize a JSON value for storage in a `TEXT` column.
pub fn json_to_text(value: &Json) -> String {
    value.to_string()
}

/// Encode an embedding vector as a little-endian `f32` byte blob.
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Decode a little-endian `f32` byte blob back into a vector.
pub fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Current wall-clock time in milliseconds since epoch.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_round_trips() {
        let v = vec![1.0_f32, -2.5, 3.25];
        let blob = encode_embedding(&v);
        assert_eq!(decode_embedding(&blob), v);
    }

    #[test]
    fn malformed_json_text_falls_back_to_empty_object() {
        assert_eq!(json_from_text("not json"), serde_json::json!({}));
    }
}
