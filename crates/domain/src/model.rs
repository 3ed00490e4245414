//! World foundation model catalogue.

use serde::{Deserialize, Serialize};

/// Model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Diffusion-based video model.
    Diffusion,
    /// Autoregressive video model.
    Autoregressive,
    /// Tokenizer used by the generators.
    Tokenizer,
    /// Anything the client does not know yet.
    #[serde(other)]
    Other,
}

impl ModelType {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Diffusion => "diffusion",
            Self::Autoregressive => "autoregressive",
            Self::Tokenizer => "tokenizer",
            Self::Other => "other",
        }
    }
}

/// A model available for training or generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Server id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Family.
    #[serde(rename = "type")]
    pub model_type: ModelType,
    /// Version label.
    #[serde(default)]
    pub version: String,
    /// Parameter count as shown to users, e.g. `7B`.
    #[serde(default)]
    pub parameters: Option<String>,
    /// Whether this is the active model.
    #[serde(default)]
    pub selected: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unknown_type_maps_to_other() {
        let model: Model =
            serde_json::from_str(r#"{"id":"m1","name":"Cosmos","type":"hybrid"}"#).unwrap();
        assert_eq!(model.model_type, ModelType::Other);
        assert!(!model.selected);
    }

    #[test]
    fn test_type_field_name() {
        let model = Model {
            id: "m1".into(),
            name: "Cosmos-7B".into(),
            model_type: ModelType::Diffusion,
            version: "1.0".into(),
            parameters: Some("7B".into()),
            selected: true,
        };
        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json["type"], "diffusion");
        assert_eq!(ModelType::Diffusion.as_str(), "diffusion");
    }
}
