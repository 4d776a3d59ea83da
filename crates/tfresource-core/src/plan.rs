use crate::CoreError;
use chrono::{DateTime, Utc};
use tfresource_store::{StateKeys, StateStore};
use tracing::debug;

/// The persisted, not yet applied plan of one environment.
pub struct PlanArtifact<'a> {
    store: &'a dyn StateStore,
    env_name: &'a str,
    key: &'a str,
}

impl<'a> PlanArtifact<'a> {
    pub fn new(store: &'a dyn StateStore, keys: &'a StateKeys) -> Self {
        Self {
            store,
            env_name: &keys.env_name,
            key: &keys.plan,
        }
    }

    pub fn key(&self) -> &str {
        self.key
    }

    pub fn exists(&self) -> Result<bool, CoreError> {
        let exists = self.store.object_exists(self.key)?;
        debug!("plan artifact {} exists: {exists}", self.key);
        Ok(exists)
    }

    /// Fail with [`CoreError::MissingPlan`] unless the artifact is present.
    pub fn ensure_exists(&self) -> Result<(), CoreError> {
        if self.exists()? {
            Ok(())
        } else {
            Err(CoreError::MissingPlan {
                env_name: self.env_name.to_owned(),
                key: self.key.to_owned(),
            })
        }
    }

    /// Remove the artifact. Succeeds when it is already gone.
    pub fn delete(&self) -> Result<(), CoreError> {
        debug!("deleting plan artifact {}", self.key);
        self.store.delete_object(self.key)?;
        Ok(())
    }

    pub fn last_modified(&self) -> Result<DateTime<Utc>, CoreError> {
        Ok(self.store.last_modified(self.key)?)
    }
}
