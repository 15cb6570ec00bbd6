//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;
use serde_json::json;

use synapse_core::models::{ApiProvider, AppState, Settings, Tab, TabKind};
use synapse_core::sync::DomainStatus;
use synapse_core::StatusReport;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print any serializable value as pretty JSON
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to encode output: {}", e),
        }
    }

    /// Print the sync position of both domains
    pub fn print_status(&self, report: &StatusReport, tab_count: usize) {
        match self.format {
            OutputFormat::Human => {
                println!("Settings:");
                print_domain_status(&report.settings);
                println!();
                println!("App state:");
                print_domain_status(&report.app_state);
                println!("  Tabs:      {}", tab_count);
            }
            OutputFormat::Json => self.json(report),
            OutputFormat::Quiet => println!("{}", report.overall()),
        }
    }

    /// Print settings with API keys masked
    pub fn print_settings(&self, settings: &Settings) {
        match self.format {
            OutputFormat::Human => {
                println!("API keys:");
                for provider in [ApiProvider::Gemini, ApiProvider::Deepseek] {
                    println!(
                        "  {:<10} {}",
                        provider.to_string(),
                        mask_key(settings.api_keys.get(provider))
                    );
                }
                println!();
                println!("Model:");
                let model = &settings.model_settings;
                println!("  Provider:    {}", model.default_provider);
                println!("  Model:       {}", model.default_model);
                println!("  Temperature: {}", model.temperature);
                println!();
                println!("System prompts:");
                println!("  improver: {}", truncate_line(&settings.system_prompts.improver, 60));
                println!("  critic:   {}", truncate_line(&settings.system_prompts.critic, 60));
                println!();
                println!("Features:");
                println!("  show-token-usage:    {}", settings.features.show_token_usage);
                println!("  enable-gemini-cache: {}", settings.features.enable_gemini_cache);
            }
            OutputFormat::Json => {
                self.json(&json!({
                    "apiKeys": {
                        "gemini": mask_key(&settings.api_keys.gemini),
                        "deepseek": mask_key(&settings.api_keys.deepseek),
                    },
                    "modelSettings": settings.model_settings,
                    "systemPrompts": settings.system_prompts,
                    "features": settings.features,
                }));
            }
            OutputFormat::Quiet => println!("{}", settings.model_settings.default_model),
        }
    }

    /// Print the open tabs, marking the active one
    pub fn print_tabs(&self, state: &AppState) {
        match self.format {
            OutputFormat::Human => {
                if state.tabs.is_empty() {
                    println!("No tabs open.");
                    return;
                }
                for tab in &state.tabs {
                    let marker = if state.active_tab.as_deref() == Some(tab.id.as_str()) {
                        "*"
                    } else {
                        " "
                    };
                    println!(
                        "{} {} | {:<9} | {} | {}",
                        marker,
                        short_id(&tab.id),
                        tab_kind(tab),
                        truncate(&tab.title, 35),
                        tab_summary(state, tab)
                    );
                }
                println!("\n{} tab(s)", state.tabs.len());
            }
            OutputFormat::Json => self.json(&state.tabs),
            OutputFormat::Quiet => {
                for tab in &state.tabs {
                    println!("{}", tab.id);
                }
            }
        }
    }

    /// Print one tab with its contents
    pub fn print_tab(&self, state: &AppState, tab: &Tab) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:      {}", tab.id);
                println!("Type:    {}", tab_kind(tab));
                println!("Title:   {}", tab.title);
                println!("Created: {}", tab.created_at.format("%Y-%m-%d %H:%M"));
                println!("Updated: {}", tab.updated_at.format("%Y-%m-%d %H:%M"));

                if let Some(chat) = state.chat_states.get(&tab.id) {
                    println!();
                    println!("── Messages ({}) ──", chat.messages.len());
                    for message in &chat.messages {
                        println!(
                            "[{}] {:?}: {}",
                            message.timestamp.format("%H:%M"),
                            message.role,
                            truncate_line(&message.content, 60)
                        );
                    }
                }

                if let Some(optimizer) = state.optimizer_states.get(&tab.id) {
                    println!();
                    println!("Initial prompt: {}", truncate_line(&optimizer.initial_prompt, 60));
                    println!("Rounds:         {}", optimizer.rounds.len());
                    if let Some(ref best) = optimizer.best_result {
                        println!("Best score:     {}", best.score);
                    }
                }
            }
            OutputFormat::Json => {
                self.json(&json!({
                    "tab": tab,
                    "chat": state.chat_states.get(&tab.id),
                    "optimizer": state.optimizer_states.get(&tab.id),
                }));
            }
            OutputFormat::Quiet => println!("{}", tab.id),
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!("{}", json!({"status": "success", "message": message}));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a warning to stderr (suppressed in quiet mode)
    pub fn warn(&self, message: &str) {
        if !self.is_quiet() {
            eprintln!("⚠ {}", message);
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_domain_status(status: &DomainStatus) {
    println!("  Status:    {}", status.status);
    println!("  Version:   {}", status.local_version);
    println!(
        "  Last sync: {}",
        status
            .last_sync_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string())
    );
    if status.pending_push {
        println!("  Pending:   push scheduled");
    }
}

fn tab_kind(tab: &Tab) -> &'static str {
    match tab.kind {
        TabKind::Chat => "chat",
        TabKind::Optimizer => "optimizer",
    }
}

fn tab_summary(state: &AppState, tab: &Tab) -> String {
    if let Some(chat) = state.chat_states.get(&tab.id) {
        format!("{} message(s)", chat.messages.len())
    } else if let Some(optimizer) = state.optimizer_states.get(&tab.id) {
        format!("{} round(s)", optimizer.rounds.len())
    } else {
        String::new()
    }
}

/// Show only the tail of a key
fn mask_key(key: &str) -> String {
    let len = key.chars().count();
    if len == 0 {
        "(not set)".to_string()
    } else if len <= 8 {
        "****".to_string()
    } else {
        let tail: String = key.chars().skip(len - 4).collect();
        format!("****{}", tail)
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("ééééééééééé", 5), "éé...");
    }

    #[test]
    fn test_truncate_line() {
        assert_eq!(truncate_line("line one\nline two", 20), "line one");
        assert_eq!(truncate_line("", 20), "");
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key(""), "(not set)");
        assert_eq!(mask_key("short"), "****");
        assert_eq!(mask_key("sk-1234567890abcd"), "****abcd");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }
}
