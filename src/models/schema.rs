//! JSON Schema descriptor for structured output
//!
//! Only the subset the gateway checks before sending is modelled.

use crate::utils::error::{helpers::validation_error, ErrorContext, GatewayResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Recursive schema descriptor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Only meaningful for `object`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, JsonSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    /// Only meaningful for `array`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<JsonSchema>>,
    #[serde(rename = "additionalProperties", skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<bool>,
}

impl JsonSchema {
    pub fn new(schema_type: impl Into<String>) -> Self {
        Self {
            schema_type: schema_type.into(),
            ..Default::default()
        }
    }

    pub fn string() -> Self {
        Self::new("string")
    }

    /// Object schema with the given properties, all of them required
    pub fn object<I, K>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, JsonSchema)>,
        K: Into<String>,
    {
        let properties: BTreeMap<String, JsonSchema> =
            properties.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let required = properties.keys().cloned().collect();
        Self {
            schema_type: "object".to_string(),
            properties: Some(properties),
            required: Some(required),
            additional_properties: Some(false),
            ..Default::default()
        }
    }

    pub fn array(items: JsonSchema) -> Self {
        Self {
            schema_type: "array".to_string(),
            items: Some(Box::new(items)),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Parse an untyped schema, validating its structure first
    pub fn from_value(value: serde_json::Value) -> GatewayResult<Self> {
        validate_schema_value(&value)?;
        serde_json::from_value(value).validation_context("Invalid schema")
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Structural check run before a schema is sent
pub fn validate_schema(schema: &JsonSchema) -> GatewayResult<()> {
    if schema.schema_type.trim().is_empty() {
        return Err(validation_error("Schema must have a non-empty type"));
    }

    if schema.schema_type == "array" {
        if let Some(items) = &schema.items {
            validate_schema(items)?;
        }
    }

    Ok(())
}

/// Same check for schemas supplied as raw JSON
pub fn validate_schema_value(schema: &serde_json::Value) -> GatewayResult<()> {
    let obj = schema
        .as_object()
        .ok_or_else(|| validation_error("Schema must be a JSON object"))?;

    let schema_type = match obj.get("type") {
        Some(serde_json::Value::String(t)) if !t.trim().is_empty() => t.as_str(),
        Some(_) => return Err(validation_error("Schema type must be a non-empty string")),
        None => return Err(validation_error("Schema must have a type")),
    };

    match schema_type {
        "object" => {
            if let Some(properties) = obj.get("properties") {
                if !properties.is_object() {
                    return Err(validation_error("Schema properties must be an object"));
                }
            }
            if let Some(required) = obj.get("required") {
                if !required.is_array() {
                    return Err(validation_error("Schema required must be an array"));
                }
            }
        }
        "array" => {
            if let Some(items) = obj.get("items") {
                validate_schema_value(items)?;
            }
        }
        _ => {}
    }

    Ok(())
}
