//! Per-generation lifecycle phases.
//!
//! A generation moves through `Absent → Installing → Installed → Active`,
//! and stale generations move to `Deleting` before disappearing. Only one
//! generation is `Active` at a time; the controller enforces this by deleting
//! every other generation as part of activation.

use serde::Serialize;

/// Lifecycle phase of a cache generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPhase {
    /// Not yet created, or failed to install.
    Absent,
    /// Precache in progress.
    Installing,
    /// Fully precached, waiting to take over.
    Installed,
    /// Serving controlled clients.
    Active,
    /// Being garbage-collected.
    Deleting,
}

impl GenerationPhase {
    /// Whether an install has completed and activation may proceed.
    pub fn activation_eligible(&self) -> bool {
        matches!(self, GenerationPhase::Installed | GenerationPhase::Active)
    }
}

impl std::fmt::Display for GenerationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GenerationPhase::Absent => "absent",
            GenerationPhase::Installing => "installing",
            GenerationPhase::Installed => "installed",
            GenerationPhase::Active => "active",
            GenerationPhase::Deleting => "deleting",
        };
        write!(f, "{name}")
    }
}
