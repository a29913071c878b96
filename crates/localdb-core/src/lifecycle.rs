use crate::CoreError;
use serde::{Deserialize, Serialize};

/// Externally observed state of a resource's provisioning or deployment attempt.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResourceState {
    #[default]
    NotStarted,
    Starting,
    Running,
    FailedToStart,
    Stopping,
    Stopped,
}

impl ResourceState {
    /// A finished attempt: nothing moves the resource on except a new attempt.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Running | Self::FailedToStart | Self::Stopped)
    }
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceState::NotStarted => write!(f, "NotStarted"),
            ResourceState::Starting => write!(f, "Starting"),
            ResourceState::Running => write!(f, "Running"),
            ResourceState::FailedToStart => write!(f, "FailedToStart"),
            ResourceState::Stopping => write!(f, "Stopping"),
            ResourceState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Check a state change against the lifecycle.
///
/// `Starting` must be followed by exactly one of `Running` or `FailedToStart`.
/// A new attempt (provisioning or redeploy) may begin from any settled state.
pub fn validate_transition(from: ResourceState, to: ResourceState) -> Result<(), CoreError> {
    use ResourceState::{FailedToStart, NotStarted, Running, Starting, Stopped, Stopping};

    let valid = matches!(
        (from, to),
        (NotStarted | Running | FailedToStart | Stopped, Starting)
            | (Starting, Running | FailedToStart)
            | (NotStarted, Running)
            | (Running | FailedToStart, Stopping)
            | (Stopping, Stopped)
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ResourceState::*;

    #[test]
    fn valid_transitions() {
        assert!(validate_transition(NotStarted, Starting).is_ok());
        assert!(validate_transition(Starting, Running).is_ok());
        assert!(validate_transition(Starting, FailedToStart).is_ok());
        assert!(validate_transition(Running, Starting).is_ok()); // redeploy
        assert!(validate_transition(FailedToStart, Starting).is_ok()); // explicit re-run
        assert!(validate_transition(NotStarted, Running).is_ok()); // database without package
        assert!(validate_transition(Running, Stopping).is_ok());
        assert!(validate_transition(Stopping, Stopped).is_ok());
        assert!(validate_transition(Stopped, Starting).is_ok());
    }

    #[test]
    fn invalid_transitions() {
        assert!(validate_transition(Starting, Starting).is_err());
        assert!(validate_transition(Starting, Stopped).is_err());
        assert!(validate_transition(Starting, NotStarted).is_err());
        assert!(validate_transition(Running, FailedToStart).is_err());
        assert!(validate_transition(FailedToStart, Running).is_err());
        assert!(validate_transition(NotStarted, FailedToStart).is_err());
        assert!(validate_transition(Stopped, Running).is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(Running.is_terminal());
        assert!(FailedToStart.is_terminal());
        assert!(!Starting.is_terminal());
        assert!(!NotStarted.is_terminal());
    }

    #[test]
    fn display_matches_dashboard_names() {
        assert_eq!(FailedToStart.to_string(), "FailedToStart");
        assert_eq!(NotStarted.to_string(), "NotStarted");
    }
}
