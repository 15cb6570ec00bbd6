//! User settings
//!
//! Credentials and preferences. Synced as the `settings` domain; the server
//! stores it encrypted because it carries provider API keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{Domain, DomainState};

const DEFAULT_IMPROVER_PROMPT: &str = "You are a prompt engineering expert. Turn the user's initial \
request, the current prompt version and the reviewer feedback into a complete, structured prompt. \
Use role assignment, clear sections (Role, Task, Context, Constraints, Output Format), step-by-step \
reasoning and examples where they help. Address every reviewer suggestion. Output only the new prompt.";

const DEFAULT_CRITIC_PROMPT: &str = "You are a meticulous reviewer of prompts. Score the prompt from \
0 to 100 on clarity, specificity, completeness, robustness and intent adherence, compute a weighted \
overall score (intent adherence 40%, the others 15% each), and reply with strict JSON: \
{\"scores\": {...}, \"overall_score\": int, \"feedback_summary\": string, \
\"actionable_suggestions\": [string]}.";

/// LLM providers that take an API key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiProvider {
    Gemini,
    Deepseek,
}

impl FromStr for ApiProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(ApiProvider::Gemini),
            "deepseek" => Ok(ApiProvider::Deepseek),
            other => Err(format!("unknown provider '{}' (expected gemini or deepseek)", other)),
        }
    }
}

impl fmt::Display for ApiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiProvider::Gemini => f.write_str("gemini"),
            ApiProvider::Deepseek => f.write_str("deepseek"),
        }
    }
}

/// Which system prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Improver,
    Critic,
}

impl FromStr for PromptKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "improver" => Ok(PromptKind::Improver),
            "critic" => Ok(PromptKind::Critic),
            other => Err(format!("unknown prompt '{}' (expected improver or critic)", other)),
        }
    }
}

/// Feature toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    ShowTokenUsage,
    EnableGeminiCache,
}

impl FromStr for Feature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "show-token-usage" | "showTokenUsage" => Ok(Feature::ShowTokenUsage),
            "enable-gemini-cache" | "enableGeminiCache" => Ok(Feature::EnableGeminiCache),
            other => Err(format!(
                "unknown feature '{}' (expected show-token-usage or enable-gemini-cache)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub gemini: String,
    pub deepseek: String,
}

impl ApiKeys {
    pub fn get(&self, provider: ApiProvider) -> &str {
        match provider {
            ApiProvider::Gemini => &self.gemini,
            ApiProvider::Deepseek => &self.deepseek,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelSettings {
    pub temperature: f64,
    pub default_provider: ApiProvider,
    pub default_model: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            default_provider: ApiProvider::Gemini,
            default_model: "gemini-2.5-flash".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemPrompts {
    pub improver: String,
    pub critic: String,
}

impl Default for SystemPrompts {
    fn default() -> Self {
        Self {
            improver: DEFAULT_IMPROVER_PROMPT.to_string(),
            critic: DEFAULT_CRITIC_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Features {
    pub show_token_usage: bool,
    pub enable_gemini_cache: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            show_token_usage: true,
            enable_gemini_cache: true,
        }
    }
}

/// All user settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub api_keys: ApiKeys,
    pub model_settings: ModelSettings,
    pub system_prompts: SystemPrompts,
    pub features: Features,
}

impl Settings {
    pub fn set_api_key(&mut self, provider: ApiProvider, key: impl Into<String>) {
        let key = key.into();
        match provider {
            ApiProvider::Gemini => self.api_keys.gemini = key,
            ApiProvider::Deepseek => self.api_keys.deepseek = key,
        }
    }

    /// Set the sampling temperature, clamped to the 0.0..=2.0 range providers accept
    pub fn set_temperature(&mut self, temperature: f64) {
        self.model_settings.temperature = temperature.clamp(0.0, 2.0);
    }

    pub fn set_default_provider(&mut self, provider: ApiProvider) {
        self.model_settings.default_provider = provider;
    }

    pub fn set_default_model(&mut self, model: impl Into<String>) {
        self.model_settings.default_model = model.into();
    }

    pub fn set_system_prompt(&mut self, kind: PromptKind, prompt: impl Into<String>) {
        let prompt = prompt.into();
        match kind {
            PromptKind::Improver => self.system_prompts.improver = prompt,
            PromptKind::Critic => self.system_prompts.critic = prompt,
        }
    }

    pub fn set_feature(&mut self, feature: Feature, enabled: bool) {
        match feature {
            Feature::ShowTokenUsage => self.features.show_token_usage = enabled,
            Feature::EnableGeminiCache => self.features.enable_gemini_cache = enabled,
        }
    }

    pub fn reset_to_defaults(&mut self) {
        *self = Settings::default();
    }

    /// Drop API keys, keeping preferences
    pub fn clear_sensitive_data(&mut self) {
        self.api_keys = ApiKeys::default();
    }

    /// Whether a key is configured for the provider
    pub fn has_api_key(&self, provider: ApiProvider) -> bool {
        !self.api_keys.get(provider).is_empty()
    }
}

impl DomainState for Settings {
    const DOMAIN: Domain = Domain::Settings;

    fn scrub(&mut self) {
        self.clear_sensitive_data();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.model_settings.temperature, 0.3);
        assert_eq!(settings.model_settings.default_provider, ApiProvider::Gemini);
        assert_eq!(settings.model_settings.default_model, "gemini-2.5-flash");
        assert!(settings.features.show_token_usage);
        assert!(!settings.has_api_key(ApiProvider::Gemini));
    }

    #[test]
    fn test_serialized_field_names() {
        let mut settings = Settings::default();
        settings.set_api_key(ApiProvider::Deepseek, "sk-1");

        let value = serde_json::to_value(&settings).unwrap();
        assert_eq!(value["apiKeys"]["deepseek"], "sk-1");
        assert_eq!(value["modelSettings"]["defaultProvider"], "gemini");
        assert_eq!(value["features"]["enableGeminiCache"], true);
    }

    #[test]
    fn test_partial_payload_fills_defaults() {
        let value = serde_json::json!({ "apiKeys": { "gemini": "g-key" } });
        let settings: Settings = serde_json::from_value(value).unwrap();

        assert_eq!(settings.api_keys.gemini, "g-key");
        assert_eq!(settings.api_keys.deepseek, "");
        assert_eq!(settings.model_settings, ModelSettings::default());
    }

    #[test]
    fn test_scrub_keeps_preferences() {
        let mut settings = Settings::default();
        settings.set_api_key(ApiProvider::Gemini, "g-key");
        settings.set_feature(Feature::ShowTokenUsage, false);
        settings.set_default_model("deepseek-chat");

        settings.scrub();

        assert!(!settings.has_api_key(ApiProvider::Gemini));
        assert!(!settings.features.show_token_usage);
        assert_eq!(settings.model_settings.default_model, "deepseek-chat");
    }

    #[test]
    fn test_temperature_clamped() {
        let mut settings = Settings::default();
        settings.set_temperature(5.0);
        assert_eq!(settings.model_settings.temperature, 2.0);
        settings.set_temperature(-1.0);
        assert_eq!(settings.model_settings.temperature, 0.0);
    }

    #[test]
    fn test_system_prompts_and_reset() {
        let mut settings = Settings::default();
        settings.set_system_prompt(PromptKind::Critic, "be harsh");
        assert_eq!(settings.system_prompts.critic, "be harsh");

        settings.reset_to_defaults();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("Gemini".parse::<ApiProvider>().unwrap(), ApiProvider::Gemini);
        assert_eq!("critic".parse::<PromptKind>().unwrap(), PromptKind::Critic);
        assert_eq!(
            "show-token-usage".parse::<Feature>().unwrap(),
            Feature::ShowTokenUsage
        );
        assert!("openai".parse::<ApiProvider>().is_err());
    }
}
