//! Subscriber fan-out for committed mutations.

use crate::models::{Agent, Approval, Artifact, Mission, Task};

/// Broadcast to every subscriber on a committed mutation. Carries the full snapshot
/// of the entity involved (cheaper than a diff to implement correctly, and the spec
/// leaves the choice to the implementer).
#[derive(Debug, Clone)]
pub enum StateEvent {
    MissionChanged(Box<Mission>),
    TaskChanged(Box<Task>),
    ArtifactChanged(Box<Artifact>),
    AgentChanged(Box<Agent>),
    ApprovalChanged(Box<Approval>),
    ArmedModeChanged(bool),
}
