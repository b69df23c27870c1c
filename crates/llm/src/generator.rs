use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{LlmError, LlmResult};

/// A named JSON schema the model output must satisfy.
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: String,
    pub schema: Value,
}

impl OutputSchema {
    pub fn for_type<T: JsonSchema>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: schemars::schema_for!(T).to_value(),
        }
    }
}

/// Given a system prompt and a user prompt, produce text or structured data.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, system: &str, user: &str) -> LlmResult<String>;

    async fn generate_json(&self, system: &str, user: &str, schema: &OutputSchema)
        -> LlmResult<Value>;

    fn name(&self) -> &'static str;
}

/// Schema-constrained generation deserialized into `T`.
pub async fn generate_structured<T>(
    generator: &dyn Generator,
    system: &str,
    user: &str,
    schema_name: &str,
) -> LlmResult<T>
where
    T: DeserializeOwned + JsonSchema,
{
    let schema = OutputSchema::for_type::<T>(schema_name);
    let value = generator.generate_json(system, user, &schema).await?;
    serde_json::from_value(value)
        .map_err(|e| LlmError::InvalidOutput(format!("output does not match {}: {}", schema_name, e)))
}

pub const OFFLINE_TEXT: &str =
    "Offline output from agent. Set OPENAI_API_KEY to get generated results.";

/// Stand-in used when no API key is configured.
///
/// Text calls return [`OFFLINE_TEXT`]. Structured calls fail with
/// [`LlmError::Unavailable`] so callers can choose their own fallback.
#[derive(Debug, Clone, Default)]
pub struct OfflineGenerator;

#[async_trait]
impl Generator for OfflineGenerator {
    async fn generate(&self, _system: &str, _user: &str) -> LlmResult<String> {
        Ok(OFFLINE_TEXT.to_string())
    }

    async fn generate_json(
        &self,
        _system: &str,
        _user: &str,
        schema: &OutputSchema,
    ) -> LlmResult<Value> {
        Err(LlmError::Unavailable(format!(
            "no API key configured for structured output '{}'",
            schema.name
        )))
    }

    fn name(&self) -> &'static str {
        "offline"
    }
}
