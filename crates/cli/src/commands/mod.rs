pub mod blob;
pub mod container;
pub mod events;
pub mod health;

use base64::Engine;

/// JSON field name and value for a body: text when it is UTF-8, base64 otherwise.
pub fn body_field(bytes: &[u8]) -> (&'static str, serde_json::Value) {
    match std::str::from_utf8(bytes) {
        Ok(text) => ("body", serde_json::Value::String(text.to_owned())),
        Err(_) => (
            "body_base64",
            serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)),
        ),
    }
}

/// Parse a `KEY=VALUE` argument.
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no `=` found in `{s}`"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_body_is_text() {
        let (field, value) = body_field(b"{\"total\": 42}");
        assert_eq!(field, "body");
        assert_eq!(value, "{\"total\": 42}");
    }

    #[test]
    fn binary_body_is_base64() {
        let (field, value) = body_field(&[0x89, b'P', b'N', b'G']);
        assert_eq!(field, "body_base64");
        assert_eq!(value, "iVBORw==");
    }

    #[test]
    fn key_val_splits_on_first_equals() {
        assert_eq!(
            parse_key_val("source=a=b").unwrap(),
            ("source".to_string(), "a=b".to_string())
        );
        assert!(parse_key_val("novalue").is_err());
    }
}
