//! Notification permission lifecycle of one agent instance.

use super::display::Permission;

/// What a granted agent is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Idle,
    Polling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    /// The runtime cannot show notifications. Terminal.
    Unsupported,
    Unrequested,
    /// A permission prompt is open.
    Requesting,
    Granted(Activity),
    Denied,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("notifications are not supported on this system")]
    Unsupported,

    #[error("notification permission was denied")]
    PermissionDenied,

    #[error("notification permission has not been granted")]
    NotGranted,

    #[error("cannot {action} while {state:?}")]
    InvalidTransition {
        state: PermissionState,
        action: &'static str,
    },

    #[error("permission prompt failed: {0}")]
    Prompt(String),

    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,
}

impl PermissionState {
    /// Starting state from what the runtime reports at construction.
    pub fn initial(supported: bool, reported: Permission) -> Self {
        if !supported {
            return PermissionState::Unsupported;
        }
        match reported {
            Permission::Default => PermissionState::Unrequested,
            Permission::Granted => PermissionState::Granted(Activity::Idle),
            Permission::Denied => PermissionState::Denied,
        }
    }

    pub fn begin_request(&mut self) -> Result<(), AgentError> {
        match *self {
            PermissionState::Unrequested => {
                *self = PermissionState::Requesting;
                Ok(())
            }
            PermissionState::Unsupported => Err(AgentError::Unsupported),
            PermissionState::Denied => Err(AgentError::PermissionDenied),
            state => Err(AgentError::InvalidTransition {
                state,
                action: "request permission",
            }),
        }
    }

    /// Apply the prompt outcome. A dismissed prompt returns to `Unrequested`.
    pub fn resolve_request(&mut self, outcome: Permission) -> Result<(), AgentError> {
        if *self != PermissionState::Requesting {
            return Err(AgentError::InvalidTransition {
                state: *self,
                action: "resolve a permission prompt",
            });
        }
        *self = match outcome {
            Permission::Granted => PermissionState::Granted(Activity::Idle),
            Permission::Denied => PermissionState::Denied,
            Permission::Default => PermissionState::Unrequested,
        };
        Ok(())
    }

    /// A user session was attached. Returns `false` when already polling.
    pub fn attach_session(&mut self) -> Result<bool, AgentError> {
        match *self {
            PermissionState::Granted(Activity::Idle) => {
                *self = PermissionState::Granted(Activity::Polling);
                Ok(true)
            }
            PermissionState::Granted(Activity::Polling) => Ok(false),
            PermissionState::Unsupported => Err(AgentError::Unsupported),
            PermissionState::Denied => Err(AgentError::PermissionDenied),
            PermissionState::Unrequested | PermissionState::Requesting => {
                Err(AgentError::NotGranted)
            }
        }
    }

    /// Logout or explicit stop. Returns whether polling was active.
    pub fn detach_session(&mut self) -> bool {
        if *self == PermissionState::Granted(Activity::Polling) {
            *self = PermissionState::Granted(Activity::Idle);
            true
        } else {
            false
        }
    }

    /// Permission withdrawn by the user. Returns whether it had been granted.
    pub fn revoke(&mut self) -> bool {
        if matches!(self, PermissionState::Granted(_)) {
            *self = PermissionState::Denied;
            true
        } else {
            false
        }
    }

    pub fn is_polling(&self) -> bool {
        *self == PermissionState::Granted(Activity::Polling)
    }
}
