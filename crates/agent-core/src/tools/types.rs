use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub function: FunctionSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl FunctionSchema {
    /// Names listed under `required`, in declaration order.
    ///
    /// Positional arguments bind to parameters in this order.
    pub fn required_params(&self) -> Vec<String> {
        self.parameters["required"]
            .as_array()
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| name.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Comma separated `name: type` list of the declared properties.
    pub fn describe_inputs(&self) -> String {
        let Some(properties) = self.parameters["properties"].as_object() else {
            return String::new();
        };

        properties
            .iter()
            .map(|(name, spec)| {
                let kind = spec["type"].as_str().unwrap_or("any");
                format!("{name}: {kind}")
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
