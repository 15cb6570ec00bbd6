//! Application state
//!
//! Open tabs and their chat / prompt-optimizer contents. Synced as the
//! `app-state` domain.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Domain, DomainState};

/// Title given to new chat tabs until the first user message arrives
pub const NEW_CHAT_TITLE: &str = "New Chat";

/// Title given to new optimizer tabs
pub const OPTIMIZER_TITLE: &str = "Prompt Optimizer";

const TITLE_MAX_CHARS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabKind {
    Chat,
    Optimizer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TabKind,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatState {
    pub tab_id: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Reviewer verdict for one optimizer round
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(default)]
    pub scores: BTreeMap<String, u32>,
    pub total: u32,
    #[serde(default)]
    pub feedback: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerRound {
    pub round: u32,
    pub improved: String,
    pub review: Review,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestResult {
    pub prompt: String,
    pub score: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerState {
    pub tab_id: String,
    #[serde(default)]
    pub initial_prompt: String,
    #[serde(default)]
    pub rounds: Vec<OptimizerRound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_result: Option<BestResult>,
}

/// Tabs and their contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppState {
    pub tabs: Vec<Tab>,
    pub active_tab: Option<String>,
    pub chat_states: BTreeMap<String, ChatState>,
    pub optimizer_states: BTreeMap<String, OptimizerState>,
}

impl AppState {
    /// Open a chat tab and make it active; returns its id
    pub fn create_chat_tab(&mut self) -> String {
        let tab_id = self.open_tab(TabKind::Chat, NEW_CHAT_TITLE);
        self.chat_states.insert(
            tab_id.clone(),
            ChatState {
                tab_id: tab_id.clone(),
                messages: Vec::new(),
            },
        );
        tab_id
    }

    /// Open an optimizer tab and make it active; returns its id
    pub fn create_optimizer_tab(&mut self) -> String {
        let tab_id = self.open_tab(TabKind::Optimizer, OPTIMIZER_TITLE);
        self.optimizer_states.insert(
            tab_id.clone(),
            OptimizerState {
                tab_id: tab_id.clone(),
                ..OptimizerState::default()
            },
        );
        tab_id
    }

    fn open_tab(&mut self, kind: TabKind, title: &str) -> String {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        self.tabs.push(Tab {
            id: id.clone(),
            kind,
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        });
        self.active_tab = Some(id.clone());
        id
    }

    /// Close a tab and drop its contents
    ///
    /// Closing the active tab activates the first remaining tab.
    pub fn close_tab(&mut self, tab_id: &str) {
        self.tabs.retain(|tab| tab.id != tab_id);
        if self.active_tab.as_deref() == Some(tab_id) {
            self.active_tab = self.tabs.first().map(|tab| tab.id.clone());
        }
        self.chat_states.remove(tab_id);
        self.optimizer_states.remove(tab_id);
    }

    pub fn set_active_tab(&mut self, tab_id: impl Into<String>) {
        self.active_tab = Some(tab_id.into());
    }

    pub fn update_tab_title(&mut self, tab_id: &str, title: impl Into<String>) {
        if let Some(tab) = self.tabs.iter_mut().find(|tab| tab.id == tab_id) {
            tab.title = title.into();
            tab.updated_at = Utc::now();
        }
    }

    pub fn tab(&self, tab_id: &str) -> Option<&Tab> {
        self.tabs.iter().find(|tab| tab.id == tab_id)
    }

    /// Find a tab by full id or unique prefix
    pub fn find_tab(&self, prefix: &str) -> Option<&Tab> {
        let mut matches = self.tabs.iter().filter(|tab| tab.id.starts_with(prefix));
        let first = matches.next()?;
        matches.next().is_none().then_some(first)
    }

    /// Append a message to a chat tab; returns the message id
    ///
    /// The first user message renames a "New Chat" tab after its first line.
    pub fn add_chat_message(
        &mut self,
        tab_id: &str,
        role: Role,
        content: impl Into<String>,
    ) -> String {
        let content = content.into();
        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.clone(),
            timestamp: Utc::now(),
        };
        let id = message.id.clone();

        self.chat_states
            .entry(tab_id.to_string())
            .or_insert_with(|| ChatState {
                tab_id: tab_id.to_string(),
                messages: Vec::new(),
            })
            .messages
            .push(message);

        if role == Role::User && !content.is_empty() {
            let is_untitled = self
                .tab(tab_id)
                .is_some_and(|tab| tab.title == NEW_CHAT_TITLE);
            if is_untitled {
                self.update_tab_title(tab_id, title_from_message(&content));
            }
        }

        id
    }

    pub fn update_chat_message(&mut self, tab_id: &str, message_id: &str, content: impl Into<String>) {
        let message = self
            .chat_states
            .get_mut(tab_id)
            .and_then(|chat| chat.messages.iter_mut().find(|m| m.id == message_id));
        if let Some(message) = message {
            message.content = content.into();
        }
    }

    fn optimizer_mut(&mut self, tab_id: &str) -> &mut OptimizerState {
        self.optimizer_states
            .entry(tab_id.to_string())
            .or_insert_with(|| OptimizerState {
                tab_id: tab_id.to_string(),
                ..OptimizerState::default()
            })
    }

    pub fn set_optimizer_initial_prompt(&mut self, tab_id: &str, prompt: impl Into<String>) {
        self.optimizer_mut(tab_id).initial_prompt = prompt.into();
    }

    pub fn add_optimizer_round(&mut self, tab_id: &str, round: OptimizerRound) {
        self.optimizer_mut(tab_id).rounds.push(round);
    }

    pub fn set_optimizer_best_result(&mut self, tab_id: &str, result: Option<BestResult>) {
        self.optimizer_mut(tab_id).best_result = result;
    }

    /// Drop all tabs and contents
    pub fn reset(&mut self) {
        *self = AppState::default();
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty() && self.chat_states.is_empty() && self.optimizer_states.is_empty()
    }
}

impl DomainState for AppState {
    const DOMAIN: Domain = Domain::AppState;

    fn scrub(&mut self) {
        self.reset();
    }
}

fn title_from_message(content: &str) -> String {
    let first_line = content.lines().next().unwrap_or_default();
    if first_line.chars().count() > TITLE_MAX_CHARS {
        let truncated: String = first_line.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", truncated)
    } else {
        first_line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tabs_sets_active() {
        let mut state = AppState::default();
        let chat = state.create_chat_tab();
        assert_eq!(state.active_tab.as_deref(), Some(chat.as_str()));
        assert!(state.chat_states.contains_key(&chat));

        let optimizer = state.create_optimizer_tab();
        assert_eq!(state.active_tab.as_deref(), Some(optimizer.as_str()));
        assert_eq!(state.tab(&optimizer).unwrap().title, OPTIMIZER_TITLE);
        assert_eq!(state.tabs.len(), 2);
    }

    #[test]
    fn test_close_active_tab_moves_to_first() {
        let mut state = AppState::default();
        let first = state.create_chat_tab();
        let second = state.create_optimizer_tab();

        state.close_tab(&second);
        assert_eq!(state.active_tab.as_deref(), Some(first.as_str()));
        assert!(!state.optimizer_states.contains_key(&second));

        state.close_tab(&first);
        assert!(state.active_tab.is_none());
        assert!(state.is_empty());
    }

    #[test]
    fn test_close_inactive_tab_keeps_active() {
        let mut state = AppState::default();
        let first = state.create_chat_tab();
        let second = state.create_chat_tab();

        state.close_tab(&first);
        assert_eq!(state.active_tab.as_deref(), Some(second.as_str()));
    }

    #[test]
    fn test_first_user_message_titles_tab() {
        let mut state = AppState::default();
        let tab = state.create_chat_tab();

        state.add_chat_message(&tab, Role::System, "setup");
        assert_eq!(state.tab(&tab).unwrap().title, NEW_CHAT_TITLE);

        state.add_chat_message(
            &tab,
            Role::User,
            "Summarize the quarterly report for the board meeting\nplease",
        );
        assert_eq!(
            state.tab(&tab).unwrap().title,
            "Summarize the quarterly report..."
        );

        // Later messages leave the title alone
        state.add_chat_message(&tab, Role::User, "Another question");
        assert_eq!(
            state.tab(&tab).unwrap().title,
            "Summarize the quarterly report..."
        );
        assert_eq!(state.chat_states[&tab].messages.len(), 3);
    }

    #[test]
    fn test_short_title_not_truncated() {
        assert_eq!(title_from_message("Hello there"), "Hello there");
        assert_eq!(title_from_message(""), "");
    }

    #[test]
    fn test_update_chat_message() {
        let mut state = AppState::default();
        let tab = state.create_chat_tab();
        let id = state.add_chat_message(&tab, Role::Assistant, "");

        state.update_chat_message(&tab, &id, "streamed answer");
        assert_eq!(state.chat_states[&tab].messages[0].content, "streamed answer");

        // Unknown ids are ignored
        state.update_chat_message(&tab, "missing", "x");
        state.update_chat_message("missing", &id, "x");
        assert_eq!(state.chat_states[&tab].messages[0].content, "streamed answer");
    }

    #[test]
    fn test_optimizer_rounds() {
        let mut state = AppState::default();
        let tab = state.create_optimizer_tab();

        state.set_optimizer_initial_prompt(&tab, "write a haiku");
        state.add_optimizer_round(
            &tab,
            OptimizerRound {
                round: 1,
                improved: "You are a poet...".to_string(),
                review: Review {
                    total: 82,
                    ..Review::default()
                },
            },
        );
        state.set_optimizer_best_result(
            &tab,
            Some(BestResult {
                prompt: "You are a poet...".to_string(),
                score: 82,
            }),
        );

        let optimizer = &state.optimizer_states[&tab];
        assert_eq!(optimizer.initial_prompt, "write a haiku");
        assert_eq!(optimizer.rounds.len(), 1);
        assert_eq!(optimizer.best_result.as_ref().unwrap().score, 82);
    }

    #[test]
    fn test_find_tab_by_prefix() {
        let mut state = AppState::default();
        let tab = state.create_chat_tab();

        assert_eq!(state.find_tab(&tab[..8]).unwrap().id, tab);
        assert!(state.find_tab("zzzz").is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let mut state = AppState::default();
        let tab = state.create_chat_tab();

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["activeTab"], tab.as_str());
        assert_eq!(value["tabs"][0]["type"], "chat");
        assert!(value["chatStates"][tab.as_str()]["messages"].is_array());

        let decoded: AppState = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_scrub_resets_everything() {
        let mut state = AppState::default();
        state.create_chat_tab();
        state.scrub();
        assert_eq!(state, AppState::default());
    }
}
