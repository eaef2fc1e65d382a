//! Permission bit parsing

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Parse a mode given as `644` (decimal digits read as octal) or `"0644"`
pub fn parse_mode(value: &Value) -> Result<u32, String> {
    let digits = match value {
        Value::Number(n) => match n.as_u64() {
            Some(v) => v.to_string(),
            None => return Err(format!("invalid mode {}", n)),
        },
        Value::String(s) => s.trim().to_string(),
        other => return Err(format!("invalid mode {}", other)),
    };

    let digits = digits.strip_prefix("0o").unwrap_or(&digits);
    let mode = u32::from_str_radix(digits, 8).map_err(|_| format!("invalid octal mode '{}'", digits))?;
    if mode > 0o7777 {
        return Err(format!("mode {:o} out of range", mode));
    }
    Ok(mode)
}

/// Serde adapter for an optional `mode` field
pub fn deserialize_mode<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => parse_mode(&value).map(Some).map_err(serde::de::Error::custom),
    }
}

pub fn format_mode(mode: u32) -> String {
    format!("{:04o}", mode & 0o7777)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_mode_forms() {
        assert_eq!(parse_mode(&json!(644)).unwrap(), 0o644);
        assert_eq!(parse_mode(&json!("0640")).unwrap(), 0o640);
        assert_eq!(parse_mode(&json!("4755")).unwrap(), 0o4755);
    }

    #[test]
    fn test_parse_mode_rejects() {
        assert!(parse_mode(&json!(698)).is_err());
        assert!(parse_mode(&json!("rwx")).is_err());
        assert!(parse_mode(&json!(77777)).is_err());
        assert!(parse_mode(&json!(true)).is_err());
    }

    #[test]
    fn test_format_mode() {
        assert_eq!(format_mode(0o644), "0644");
        assert_eq!(format_mode(0o40755), "0755");
    }
}
