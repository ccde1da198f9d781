use crate::domain::model::Profile;
use crate::domain::ports::ProfileStore;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::fs;
use std::path::PathBuf;

/// File-backed profile store: one JSON document holding the profiles of all
/// clinics, filtered per clinic on listing.
#[derive(Debug, Clone)]
pub struct JsonProfileStore {
    path: PathBuf,
}

impl JsonProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<Vec<Profile>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read(&self.path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    fn save(&self, profiles: &[Profile]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let data = serde_json::to_vec_pretty(profiles)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for JsonProfileStore {
    async fn list(&self, clinic_id: &str) -> Result<Vec<Profile>> {
        let mut profiles = self.load()?;
        profiles.retain(|p| p.clinic_id == clinic_id);
        Ok(profiles)
    }

    async fn get(&self, profile_id: &str) -> Result<Option<Profile>> {
        Ok(self.load()?.into_iter().find(|p| p.id == profile_id))
    }

    async fn upsert(&self, profile: Profile) -> Result<()> {
        let mut profiles = self.load()?;
        match profiles.iter_mut().find(|p| p.id == profile.id) {
            Some(existing) => *existing = profile,
            None => profiles.push(profile),
        }
        self.save(&profiles)
    }

    async fn remove(&self, profile_id: &str) -> Result<bool> {
        let mut profiles = self.load()?;
        let before = profiles.len();
        profiles.retain(|p| p.id != profile_id);
        if profiles.len() == before {
            return Ok(false);
        }
        self.save(&profiles)?;
        Ok(true)
    }
}
