use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// A named persona: who answers, how it greets, and how it behaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceAgentProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Spoken when the call connects. Empty means a time-aware greeting is
    /// picked from the built-in pool.
    #[serde(default)]
    pub greeting: String,
    /// System instructions: persona plus behavioral constraints.
    pub instructions: String,
    /// Preferred synthesis voice; empty means the provider default.
    #[serde(default)]
    pub voice: String,
    /// Inbound number this persona answers, E.164.
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("cannot delete the last remaining agent profile")]
    LastProfile,
    #[error("no agent profile with id {0}")]
    NotFound(String),
    #[error("agent profile {0} already exists")]
    DuplicateId(String),
    #[error("failed to persist agent profiles: {0}")]
    Persist(String),
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct AgentsFile {
    #[serde(default)]
    agents: Vec<VoiceAgentProfile>,
}

/// Registry of agent personas, mirrored to a TOML file so administrative
/// edits survive restarts. Mutations write the file first and only then
/// update the in-memory view, under one write lock (read-your-writes).
pub struct AgentRegistry {
    profiles: RwLock<Vec<VoiceAgentProfile>>,
    path: PathBuf,
}

impl AgentRegistry {
    /// Load profiles from disk, seeding the default persona when the file is
    /// missing or empty. The registry is never empty after this.
    pub fn load_or_seed(path: PathBuf) -> Result<Self, RegistryError> {
        let mut agents = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let file: AgentsFile = toml::from_str(&contents)
                    .map_err(|e| RegistryError::Persist(e.to_string()))?;
                file.agents
            }
            Err(_) => Vec::new(),
        };

        if agents.is_empty() {
            agents.push(default_profile());
            write_file(&path, &agents)?;
            tracing::info!(path = %path.display(), "Seeded default agent profile");
        }

        tracing::info!(count = agents.len(), "Loaded agent profiles");
        Ok(Self {
            profiles: RwLock::new(agents),
            path,
        })
    }

    #[cfg(test)]
    pub fn in_memory(agents: Vec<VoiceAgentProfile>) -> Self {
        let agents = if agents.is_empty() {
            vec![default_profile()]
        } else {
            agents
        };
        Self {
            profiles: RwLock::new(agents),
            path: PathBuf::from("/dev/null"),
        }
    }

    pub async fn list(&self) -> Vec<VoiceAgentProfile> {
        self.profiles.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<VoiceAgentProfile> {
        self.profiles.read().await.iter().find(|p| p.id == id).cloned()
    }

    /// Which persona answers the given number.
    ///
    /// Priority: exact bound-number match, then the configured default id,
    /// then the first profile. The registry is never empty, so this always
    /// resolves.
    pub async fn resolve_by_number(
        &self,
        called_number: &str,
        default_id: &str,
    ) -> VoiceAgentProfile {
        let profiles = self.profiles.read().await;

        if let Some(profile) = profiles
            .iter()
            .filter(|p| p.active)
            .find(|p| p.phone_number.as_deref() == Some(called_number))
        {
            return profile.clone();
        }

        if let Some(profile) = profiles.iter().find(|p| p.id == default_id) {
            return profile.clone();
        }

        tracing::warn!(
            called_number,
            default_id,
            "No bound or default persona, using first profile"
        );
        profiles[0].clone()
    }

    pub async fn create(&self, profile: VoiceAgentProfile) -> Result<(), RegistryError> {
        let mut profiles = self.profiles.write().await;
        if profiles.iter().any(|p| p.id == profile.id) {
            return Err(RegistryError::DuplicateId(profile.id));
        }
        let mut next = profiles.clone();
        next.push(profile);
        self.persist(&next)?;
        *profiles = next;
        Ok(())
    }

    pub async fn update(&self, profile: VoiceAgentProfile) -> Result<(), RegistryError> {
        let mut profiles = self.profiles.write().await;
        let Some(idx) = profiles.iter().position(|p| p.id == profile.id) else {
            return Err(RegistryError::NotFound(profile.id));
        };
        let mut next = profiles.clone();
        next[idx] = profile;
        self.persist(&next)?;
        *profiles = next;
        Ok(())
    }

    /// Deleting the last remaining profile is rejected: resolution must
    /// always have something to fall back to.
    pub async fn delete(&self, id: &str) -> Result<(), RegistryError> {
        let mut profiles = self.profiles.write().await;
        if !profiles.iter().any(|p| p.id == id) {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        if profiles.len() == 1 {
            return Err(RegistryError::LastProfile);
        }
        let next: Vec<_> = profiles.iter().filter(|p| p.id != id).cloned().collect();
        self.persist(&next)?;
        *profiles = next;
        Ok(())
    }

    fn persist(&self, agents: &[VoiceAgentProfile]) -> Result<(), RegistryError> {
        if self.path == Path::new("/dev/null") {
            return Ok(());
        }
        write_file(&self.path, agents)
    }
}

fn write_file(path: &Path, agents: &[VoiceAgentProfile]) -> Result<(), RegistryError> {
    let file = AgentsFile {
        agents: agents.to_vec(),
    };
    let contents =
        toml::to_string_pretty(&file).map_err(|e| RegistryError::Persist(e.to_string()))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| RegistryError::Persist(e.to_string()))?;
    }
    std::fs::write(path, contents).map_err(|e| RegistryError::Persist(e.to_string()))
}

/// Seeded at startup so resolution never comes up empty.
fn default_profile() -> VoiceAgentProfile {
    VoiceAgentProfile {
        id: "sales".to_string(),
        name: "Sales Assistant".to_string(),
        description: "Answers product and pricing questions for prospective clients".to_string(),
        greeting: String::new(),
        instructions: "You are a friendly sales assistant on a phone call. \
            Answer questions about our financial products clearly and briefly. \
            Keep replies under three sentences, use plain spoken language, and \
            never read out URLs, code, or markup. If you don't know something, \
            say so and offer to have a specialist follow up."
            .to_string(),
        voice: String::new(),
        phone_number: None,
        active: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str, number: Option<&str>) -> VoiceAgentProfile {
        VoiceAgentProfile {
            id: id.to_string(),
            name: format!("Agent {id}"),
            description: String::new(),
            greeting: String::new(),
            instructions: "test persona".to_string(),
            voice: String::new(),
            phone_number: number.map(String::from),
            active: true,
        }
    }

    #[tokio::test]
    async fn resolves_exact_bound_number_first() {
        let registry = AgentRegistry::in_memory(vec![
            profile("support", None),
            profile("billing", Some("+15550002222")),
        ]);

        let resolved = registry.resolve_by_number("+15550002222", "support").await;
        assert_eq!(resolved.id, "billing");
    }

    #[tokio::test]
    async fn falls_back_to_configured_default_then_first() {
        let registry =
            AgentRegistry::in_memory(vec![profile("first", None), profile("support", None)]);

        let resolved = registry.resolve_by_number("+15559999999", "support").await;
        assert_eq!(resolved.id, "support");

        let resolved = registry.resolve_by_number("+15559999999", "missing").await;
        assert_eq!(resolved.id, "first");
    }

    #[tokio::test]
    async fn inactive_profiles_do_not_answer_bound_numbers() {
        let mut bound = profile("paused", Some("+15550002222"));
        bound.active = false;
        let registry = AgentRegistry::in_memory(vec![profile("live", None), bound]);

        let resolved = registry.resolve_by_number("+15550002222", "live").await;
        assert_eq!(resolved.id, "live");
    }

    #[tokio::test]
    async fn empty_seed_yields_default_profile() {
        let registry = AgentRegistry::in_memory(Vec::new());
        let resolved = registry.resolve_by_number("+15550000000", "sales").await;
        assert_eq!(resolved.id, "sales");
        assert!(!resolved.instructions.is_empty());
    }

    #[tokio::test]
    async fn deleting_last_profile_is_rejected() {
        let registry = AgentRegistry::in_memory(vec![profile("only", None)]);
        let err = registry.delete("only").await.unwrap_err();
        assert!(matches!(err, RegistryError::LastProfile));
        // Registry unchanged afterwards
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn create_update_delete_round_trip() {
        let registry = AgentRegistry::in_memory(vec![profile("a", None)]);
        registry.create(profile("b", None)).await.unwrap();
        assert!(matches!(
            registry.create(profile("b", None)).await,
            Err(RegistryError::DuplicateId(_))
        ));

        let mut updated = profile("b", Some("+15553334444"));
        updated.name = "Renamed".to_string();
        registry.update(updated).await.unwrap();
        assert_eq!(registry.get("b").await.unwrap().name, "Renamed");

        registry.delete("b").await.unwrap();
        assert!(registry.get("b").await.is_none());
        assert!(matches!(
            registry.delete("b").await,
            Err(RegistryError::NotFound(_))
        ));
    }
}
