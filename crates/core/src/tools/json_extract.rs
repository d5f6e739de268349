//! Recover a JSON object from model output that may be wrapped in prose or
//! markdown fences.

use anyhow::{bail, Result};
use serde_json::Value;

pub fn extract_json_block(text: &str) -> Result<Value> {
    let cleaned = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        return Ok(value);
    }

    if cleaned.contains("```") {
        let unfenced = cleaned
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();
        if let Ok(value) = serde_json::from_str::<Value>(unfenced) {
            return Ok(value);
        }
    }

    match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => {
            Ok(serde_json::from_str(&cleaned[start..=end])?)
        }
        _ => bail!("No JSON object found in model output"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_and_fenced() {
        let plain = extract_json_block(r#"{"a": 1}"#).unwrap();
        assert_eq!(plain["a"], 1);

        let fenced = extract_json_block("```json\n{\"a\": 2}\n```").unwrap();
        assert_eq!(fenced["a"], 2);
    }

    #[test]
    fn test_embedded_in_prose() {
        let value = extract_json_block("Sure! Here it is: {\"ok\": true} Hope it helps").unwrap();
        assert_eq!(value["ok"], true);
        assert!(extract_json_block("no json here").is_err());
    }
}
