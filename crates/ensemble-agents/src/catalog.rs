use std::collections::HashSet;

use thiserror::Error;

use crate::definition::AgentDefinition;
use crate::profile::AgentProfile;

/// Catalog and profile errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid profile: {0}")]
    InvalidProfile(String),
    #[error(
        "Unknown agent(s): {}. Choose from: {} or import the correct profile.",
        missing.join(", "),
        enabled.join(", ")
    )]
    MissingAgents {
        missing: Vec<String>,
        enabled: Vec<String>,
    },
}

/// Id-keyed agent registry, preserving profile declaration order.
#[derive(Debug, Clone)]
pub struct AgentCatalog {
    agents: Vec<AgentDefinition>,
}

impl AgentCatalog {
    pub fn new(agents: Vec<AgentDefinition>) -> Self {
        Self { agents }
    }

    /// Catalog with the default contract-assistant roster
    pub fn with_default_agents() -> Self {
        Self::new(default_agents())
    }

    pub fn from_profile(profile: &AgentProfile) -> Self {
        Self::new(profile.agents.clone())
    }

    pub fn get(&self, id: &str) -> Option<&AgentDefinition> {
        self.agents.iter().find(|agent| agent.id == id)
    }

    pub fn agents(&self) -> &[AgentDefinition] {
        &self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Ids of enabled agents, in declaration order
    pub fn enabled_ids(&self) -> Vec<String> {
        self.agents
            .iter()
            .filter(|agent| agent.enabled)
            .map(|agent| agent.id.clone())
            .collect()
    }

    /// Verify every required id names an enabled agent.
    pub fn ensure_required<S: AsRef<str>>(&self, required: &[S]) -> Result<(), CatalogError> {
        let enabled: HashSet<&str> = self
            .agents
            .iter()
            .filter(|agent| agent.enabled)
            .map(|agent| agent.id.as_str())
            .collect();
        let missing: Vec<String> = required
            .iter()
            .map(|id| id.as_ref())
            .filter(|id| !enabled.contains(id))
            .map(|id| id.to_string())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(CatalogError::MissingAgents {
            missing,
            enabled: self.enabled_ids(),
        })
    }
}

impl Default for AgentCatalog {
    fn default() -> Self {
        Self::with_default_agents()
    }
}

/// The default contract-assistant roster: thirteen domain workers plus
/// the two system agents the executor treats as protocols.
pub fn default_agents() -> Vec<AgentDefinition> {
    vec![
        AgentDefinition::mock(
            "talk_to_corpus",
            "Talk To Corpus",
            "Search across a full contract repository.",
            "Repository-wide queries and analytics.",
        ),
        AgentDefinition::mock(
            "talk_to_document",
            "Talk To Document",
            "Ask detailed questions about a single contract.",
            "Single-document Q&A.",
        ),
        AgentDefinition::mock(
            "obligation_frequency_setup_recommender",
            "Obligation Recommender",
            "Structures recurring obligation schedules.",
            "When deriving recurring obligation schedules from clause text.",
        ),
        AgentDefinition::mock(
            "service_level_fulfillment_agent",
            "SLA Fulfillment Agent",
            "Evaluates if SLA commitments are met.",
            "When checking SLA compliance across documents.",
        ),
        AgentDefinition::mock(
            "template_harmonization",
            "Template Harmonization",
            "Creates standardized templates from multiple agreements.",
            "When homogenizing multiple contract templates.",
        ),
        AgentDefinition::mock(
            "convo_create",
            "ConvoCreate",
            "Guides users through interactive contract drafting.",
            "When assisting interactive drafting.",
        ),
        AgentDefinition::mock(
            "cross_reference_check",
            "Cross-Reference Check",
            "Detects and fixes broken clause references.",
            "When validating cross-references.",
        ),
        AgentDefinition::mock(
            "numbering_check",
            "Numbering Check",
            "Validates and auto-fixes document numbering.",
            "When validating numbering consistency.",
        ),
        AgentDefinition::mock(
            "definitions_check",
            "Definitions Check",
            "Flags undefined or inconsistent defined terms.",
            "When checking defined term usage.",
        ),
        AgentDefinition::mock(
            "teams_integration",
            "Teams Integration",
            "Connects with MS Teams for updates and workflows. This is for ONE-WAY notifications only; it cannot receive replies.",
            "When sending one-way notifications to MS Teams.",
        ),
        AgentDefinition::mock(
            "ask_tim",
            "AskTim",
            "Legal research assistant for interpretation and guidance.",
            "When asking for legal interpretation.",
        ),
        AgentDefinition::mock(
            "playbook_generator_builder",
            "Playbook Builder",
            "Builds redlining playbooks from past contracts.",
            "When generating playbooks.",
        ),
        AgentDefinition::mock(
            "supplier_onboarding_copilot",
            "Supplier Onboarding Copilot",
            "Automates supplier onboarding workflows.",
            "When orchestrating onboarding workflows.",
        ),
        AgentDefinition::mock(
            "human_assistant",
            "Human Assistant",
            "Asks the user for clarification.",
            "Mandatory when request is ambiguous or needs human input.",
        )
        .into_system(),
        AgentDefinition::mock(
            "branch_orchestrator",
            "Branch Orchestrator",
            "Pauses execution to decide on the next steps based on data.",
            "End of Phase 1 for conditional plans.",
        )
        .into_system(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roster_shape() {
        let catalog = AgentCatalog::with_default_agents();
        assert_eq!(catalog.len(), 15);
        for id in ["human_assistant", "branch_orchestrator"] {
            let agent = catalog.get(id).unwrap();
            assert!(agent.system, "{id} must be a system agent");
            assert!(agent.enabled);
        }
        assert_eq!(catalog.get("talk_to_corpus").unwrap().name, "Talk To Corpus");
        assert!(catalog.get("nonexistent").is_none());
    }

    #[test]
    fn test_enabled_ids_skip_disabled() {
        let catalog = AgentCatalog::new(vec![
            AgentDefinition::mock("a", "A", "first", "always"),
            AgentDefinition::mock("b", "B", "second", "never").disabled(),
            AgentDefinition::mock("c", "C", "third", "always"),
        ]);
        assert_eq!(catalog.enabled_ids(), vec!["a", "c"]);
    }

    #[test]
    fn test_ensure_required_accepts_enabled() {
        let catalog = AgentCatalog::with_default_agents();
        assert!(catalog
            .ensure_required(&["talk_to_document", "human_assistant"])
            .is_ok());
    }

    #[test]
    fn test_ensure_required_reports_missing() {
        let catalog = AgentCatalog::new(vec![
            AgentDefinition::mock("a", "A", "first", "always"),
            AgentDefinition::mock("b", "B", "second", "never").disabled(),
        ]);
        let error = catalog.ensure_required(&["a", "b", "z"]).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Unknown agent(s): b, z. Choose from: a or import the correct profile."
        );
    }
}
