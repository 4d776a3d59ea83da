use crate::CoreError;
use tfresource_schema::{Action, OutParams};
use tfresource_store::StateTarget;

/// The effective lifecycle mode of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Plan and persist the plan artifact; change nothing.
    PlanOnly,
    /// Apply a previously persisted plan artifact.
    PlanRun,
    /// Plan and apply in one step.
    CreateDirect,
    Destroy,
}

impl LifecycleAction {
    /// Backend object the engine is initialized against.
    pub fn init_target(self) -> StateTarget {
        match self {
            LifecycleAction::PlanOnly => StateTarget::Plan,
            LifecycleAction::PlanRun | LifecycleAction::CreateDirect | LifecycleAction::Destroy => {
                StateTarget::Main
            }
        }
    }

    pub fn reports_plan_only(self) -> bool {
        self == LifecycleAction::PlanOnly
    }
}

impl std::fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleAction::PlanOnly => write!(f, "plan-only"),
            LifecycleAction::PlanRun => write!(f, "plan-run"),
            LifecycleAction::CreateDirect => write!(f, "create"),
            LifecycleAction::Destroy => write!(f, "destroy"),
        }
    }
}

/// Map request parameters to exactly one lifecycle action.
pub fn resolve_action(params: &OutParams) -> Result<LifecycleAction, CoreError> {
    let tf = &params.terraform;
    if params.action == Action::Destroy {
        return Ok(LifecycleAction::Destroy);
    }
    match (tf.plan_only, tf.plan_run) {
        (true, true) => Err(CoreError::InvalidRequest(
            "plan_only and plan_run cannot both be set".to_owned(),
        )),
        (true, false) => Ok(LifecycleAction::PlanOnly),
        (false, true) => Ok(LifecycleAction::PlanRun),
        (false, false) => Ok(LifecycleAction::CreateDirect),
    }
}
