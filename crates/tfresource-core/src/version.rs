use crate::{CoreError, LifecycleAction, PlanArtifact};
use tfresource_schema::Version;
use tfresource_store::{StateKeys, StateStore};
use tracing::{debug, info};

/// Derive the reported version from the store's view after `action` ran.
///
/// Plan-only versions carry the plan artifact's last-modified time, so two
/// plans of the same environment are reported as distinct versions whenever
/// the artifact was rewritten.
pub fn build_version(
    action: LifecycleAction,
    store: &dyn StateStore,
    keys: &StateKeys,
) -> Result<Version, CoreError> {
    let mut version = Version {
        env_name: keys.env_name.clone(),
        ..Version::default()
    };
    match action {
        LifecycleAction::PlanOnly => {
            let modified = PlanArtifact::new(store, keys).last_modified()?;
            version.plan_only = "true".to_owned();
            version.last_modified = Some(modified.to_rfc3339());
        }
        LifecycleAction::Destroy => {
            if store.object_exists(&keys.main)? {
                info!("state for {} emptied; key {} kept", keys.env_name, keys.main);
            } else {
                info!("state for {} removed", keys.env_name);
            }
        }
        LifecycleAction::PlanRun | LifecycleAction::CreateDirect => {}
    }
    debug!("version: {version:?}");
    Ok(version)
}
