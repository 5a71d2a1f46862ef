use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Body of the establishment search endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest<'a> {
    pub text: &'a str,
}

/// Wrapper for search responses. A missing `data` key is treated as zero results.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub data: Vec<RegistryRecord>,
}

/// A single certified establishment as listed by the registry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegistryRecord {
    #[serde(default)]
    pub name: String,
    /// Postal codes come back as either strings or bare numbers.
    #[serde(default, deserialize_with = "string_or_number")]
    pub postal: Option<String>,
    /// Everything else the registry returns (address, scheme, certificate number, ...).
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl RegistryRecord {
    pub fn new(name: &str, postal: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            postal: postal.map(String::from),
            extra: HashMap::new(),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postal_accepts_strings_and_numbers() {
        let body = r#"{"data":[
            {"name":"A","postal":"018956"},
            {"name":"B","postal":569933},
            {"name":"C","postal":"  "},
            {"name":"D"}
        ]}"#;
        let resp: SearchResponse = serde_json::from_str(body).unwrap();
        let postals: Vec<_> = resp.data.iter().map(|r| r.postal.as_deref()).collect();
        assert_eq!(postals, vec![Some("018956"), Some("569933"), None, None]);
    }

    #[test]
    fn unknown_fields_are_kept() {
        let body = r#"{"data":[{"name":"A","postal":"1","scheme":"Eating Establishment"}]}"#;
        let resp: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            resp.data[0].extra.get("scheme").and_then(|v| v.as_str()),
            Some("Eating Establishment")
        );
    }

    #[test]
    fn missing_data_is_empty() {
        let resp: SearchResponse = serde_json::from_str(r#"{"message":"ok"}"#).unwrap();
        assert!(resp.data.is_empty());
    }
}
