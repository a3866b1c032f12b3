//! Instance records and their lifecycle state machine
//!
//! ```text
//! pending -> launching -> running | failed
//! running -> terminating -> terminated | failed
//! ```
//!
//! `failed` and `terminated` are terminal. Only `running` instances may be
//! terminated.

use std::fmt;

use serde::Serialize;

use onion_common::{Error, ProviderError, Result};

/// Role of an instance within the cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Control plane instance, launched first
    Master,
    /// Worker instance
    Node,
}

impl Role {
    /// Roles in launch order
    pub const ALL: [Role; 2] = [Role::Master, Role::Node];

    /// Lower-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Node => "node",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an instance record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    /// Planned, no provider call issued yet
    Pending,
    /// Create call in flight
    Launching,
    /// Provider acknowledged creation
    Running,
    /// Terminate call in flight
    Terminating,
    /// Provider acknowledged termination
    Terminated,
    /// A create or terminate call failed
    Failed,
}

impl InstanceState {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, InstanceState::Failed | InstanceState::Terminated)
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: InstanceState) -> bool {
        use InstanceState::*;
        matches!(
            (self, next),
            (Pending, Launching)
                | (Launching, Running)
                | (Launching, Failed)
                | (Running, Terminating)
                | (Terminating, Terminated)
                | (Terminating, Failed)
        )
    }

    /// Lower-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Launching => "launching",
            InstanceState::Running => "running",
            InstanceState::Terminating => "terminating",
            InstanceState::Terminated => "terminated",
            InstanceState::Failed => "failed",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One instance a manager planned, launched or terminated
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InstanceRecord {
    /// Provider-assigned id, empty until the create call succeeds
    pub instance_id: String,
    /// Instance name (`<prefix>-<ordinal>`)
    pub name: String,
    /// Role
    pub role: Role,
    /// 1-based ordinal within the role
    pub ordinal: u32,
    state: InstanceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ProviderError>,
}

impl InstanceRecord {
    /// A planned instance in the `pending` state
    pub fn pending(role: Role, ordinal: u32, name: impl Into<String>) -> Self {
        Self {
            instance_id: String::new(),
            name: name.into(),
            role,
            ordinal,
            state: InstanceState::Pending,
            error: None,
        }
    }

    /// Current state
    pub fn state(&self) -> InstanceState {
        self.state
    }

    /// The error that failed this instance, present only in `failed`
    pub fn error(&self) -> Option<&ProviderError> {
        self.error.as_ref()
    }

    /// Whether the instance is running
    pub fn is_running(&self) -> bool {
        self.state == InstanceState::Running
    }

    /// Move to `next`, rejecting illegal transitions
    pub fn transition(&mut self, next: InstanceState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::internal_with_context(
                "instance-state",
                format!("{}: illegal transition {} -> {}", self.name, self.state, next),
            ));
        }
        self.state = next;
        Ok(())
    }

    /// Record a successful create and move to `running`
    pub fn mark_running(&mut self, instance_id: impl Into<String>) -> Result<()> {
        self.transition(InstanceState::Running)?;
        self.instance_id = instance_id.into();
        Ok(())
    }

    /// Record a successful terminate and move to `terminated`
    pub fn mark_terminated(&mut self) -> Result<()> {
        self.transition(InstanceState::Terminated)
    }

    /// Record a failed provider call and move to `failed`
    pub fn mark_failed(&mut self, error: ProviderError) -> Result<()> {
        self.transition(InstanceState::Failed)?;
        self.error = Some(error);
        Ok(())
    }
}
