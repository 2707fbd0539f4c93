use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::{default_agents, CatalogError};
use crate::definition::AgentDefinition;

/// Named, versioned collection of agent definitions, stored as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    pub version: u32,
    pub agents: Vec<AgentDefinition>,
}

impl AgentProfile {
    pub fn new(name: impl Into<String>, agents: Vec<AgentDefinition>) -> Self {
        Self {
            name: name.into(),
            version: 1,
            agents,
        }
    }

    /// The built-in default profile
    pub fn default_profile() -> Self {
        Self::new("Default", default_agents())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path)?;
        let profile: Self = serde_json::from_str(&content)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CatalogError> {
        self.validate()?;
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.agents.is_empty() {
            return Err(CatalogError::InvalidProfile(
                "agents list is empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.id.trim().is_empty() {
                return Err(CatalogError::InvalidProfile(
                    "agent id must not be empty".to_string(),
                ));
            }
            if !seen.insert(agent.id.as_str()) {
                return Err(CatalogError::InvalidProfile(format!(
                    "duplicate agent id: {}",
                    agent.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");

        let profile = AgentProfile::default_profile();
        profile.save(&path).unwrap();
        let loaded = AgentProfile::load(&path).unwrap();

        assert_eq!(loaded.name, "Default");
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.agents.len(), profile.agents.len());
        assert!(loaded.agents.iter().any(|agent| agent.id == "ask_tim"));
    }

    #[test]
    fn test_load_rejects_empty_agent_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        fs::write(&path, r#"{"name": "Empty", "version": 1, "agents": []}"#).unwrap();

        match AgentProfile::load(&path) {
            Err(CatalogError::InvalidProfile(reason)) => {
                assert!(reason.contains("empty"));
            }
            other => panic!("expected InvalidProfile, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let profile = AgentProfile::new(
            "Broken",
            vec![
                AgentDefinition::mock("twin", "Twin A", "first", "always"),
                AgentDefinition::mock("twin", "Twin B", "second", "always"),
            ],
        );
        match profile.validate() {
            Err(CatalogError::InvalidProfile(reason)) => {
                assert!(reason.contains("duplicate agent id: twin"));
            }
            other => panic!("expected InvalidProfile, got {other:?}"),
        }
    }
}
