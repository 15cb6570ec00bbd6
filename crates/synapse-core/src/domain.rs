//! Sync domains
//!
//! State is synced in two independent buckets. Each has its own server
//! record, version counter, scheduler and coordinator.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// One of the independently synced state buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
    /// Credentials and preferences
    Settings,
    /// Tabs and conversation content
    AppState,
}

impl Domain {
    /// Both domains, in bootstrap order
    pub const ALL: [Domain; 2] = [Domain::Settings, Domain::AppState];

    /// Path segment and storage key (`settings`, `app-state`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Settings => "settings",
            Domain::AppState => "app-state",
        }
    }

    /// Name of the JSON field carrying the payload on the wire
    pub fn payload_field(&self) -> &'static str {
        match self {
            Domain::Settings => "settings",
            Domain::AppState => "state",
        }
    }

    /// Human-readable label used in messages
    pub fn label(&self) -> &'static str {
        match self {
            Domain::Settings => "Settings",
            Domain::AppState => "App state",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "settings" => Ok(Domain::Settings),
            "app-state" => Ok(Domain::AppState),
            other => Err(format!("unknown sync domain '{}'", other)),
        }
    }
}

/// A client-side state object that is synced as one opaque payload
pub trait DomainState:
    Serialize + DeserializeOwned + Clone + Default + Send + Sync + 'static
{
    /// The domain this state belongs to
    const DOMAIN: Domain;

    /// Remove everything that must not outlive a session
    fn scrub(&mut self);
}
