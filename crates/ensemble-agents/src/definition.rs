use serde::{Deserialize, Serialize};

/// How an agent answers invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Simulated; answers come from the invoker itself
    Mock,
    /// Backed by a live integration (not wired up yet)
    Real,
}

/// A delegated worker the planner may target.
///
/// Field names follow the profile wire format, which is camelCase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Planner-facing guidance on when this agent applies
    pub when_to_use: String,
    #[serde(rename = "type")]
    pub kind: AgentKind,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Optional canned output for the simulated invoker, as JSON text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_behavior: Option<String>,
    /// System agents carry executor-level protocols and are never
    /// dispatched to the invoker
    #[serde(default, skip_serializing_if = "is_false")]
    pub system: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl AgentDefinition {
    /// An enabled mock agent; the icon defaults to the agent id
    pub fn mock(id: &str, name: &str, description: &str, when_to_use: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            when_to_use: when_to_use.to_string(),
            kind: AgentKind::Mock,
            enabled: true,
            icon: Some(id.to_string()),
            mock_behavior: None,
            system: false,
        }
    }

    /// Mark as a system agent
    pub fn into_system(mut self) -> Self {
        self.system = true;
        self
    }

    /// Disable without removing from the profile
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Attach a canned simulated output (JSON text)
    pub fn with_mock_behavior(mut self, behavior: impl Into<String>) -> Self {
        self.mock_behavior = Some(behavior.into());
        self
    }
}
