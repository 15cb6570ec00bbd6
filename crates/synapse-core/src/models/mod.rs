//! Data models for Synapse
//!
//! The two synced state objects. Both are opaque JSON to the sync layer.

mod app_state;
mod settings;

pub use app_state::{
    AppState, BestResult, ChatMessage, ChatState, OptimizerRound, OptimizerState, Review, Role,
    Tab, TabKind, NEW_CHAT_TITLE, OPTIMIZER_TITLE,
};
pub use settings::{
    ApiKeys, ApiProvider, Feature, Features, ModelSettings, PromptKind, Settings, SystemPrompts,
};
