//! Pipeline step catalog
//!
//! The generation pipeline always runs the same eight steps in the same
//! order. The catalog is known statically and is never derived from the
//! event stream.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Number of steps in the pipeline catalog
pub const STEP_COUNT: usize = 8;

/// Identifier of one pipeline step, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StepId {
    B1,
    B2,
    B3,
    B4,
    B5,
    B6,
    B7,
    B8,
}

impl StepId {
    /// The full catalog in pipeline order
    pub const ALL: [StepId; STEP_COUNT] = [
        StepId::B1,
        StepId::B2,
        StepId::B3,
        StepId::B4,
        StepId::B5,
        StepId::B6,
        StepId::B7,
        StepId::B8,
    ];

    /// Position of the step in the catalog (0-based)
    pub fn index(self) -> usize {
        self as usize
    }

    /// Step at a catalog position
    pub fn from_index(index: usize) -> Option<StepId> {
        Self::ALL.get(index).copied()
    }

    /// Short identifier, e.g. `B3`
    pub fn short_name(self) -> &'static str {
        match self {
            StepId::B1 => "B1",
            StepId::B2 => "B2",
            StepId::B3 => "B3",
            StepId::B4 => "B4",
            StepId::B5 => "B5",
            StepId::B6 => "B6",
            StepId::B7 => "B7",
            StepId::B8 => "B8",
        }
    }

    /// Backend step name used by the manual-mode endpoints, e.g. `B3_ksa_matrix`
    pub fn step_name(self) -> &'static str {
        match self {
            StepId::B1 => "B1_validate",
            StepId::B2 => "B2_competencies",
            StepId::B3 => "B3_ksa_matrix",
            StepId::B4 => "B4_learning_units",
            StepId::B5 => "B5_hierarchy",
            StepId::B6 => "B6_problem_formulations",
            StepId::B7 => "B7_schedule",
            StepId::B8 => "B8_validation",
        }
    }

    /// Human-readable description of what the step produces
    pub fn description(self) -> &'static str {
        match self {
            StepId::B1 => "Profile validation and enrichment",
            StepId::B2 => "Competency formulation",
            StepId::B3 => "KSA matrix (knowledge, skills, habits)",
            StepId::B4 => "Learning unit design",
            StepId::B5 => "Hierarchy and levels",
            StepId::B6 => "Problem formulations (PBL)",
            StepId::B7 => "Schedule assembly",
            StepId::B8 => "Track validation",
        }
    }

    /// Summary keys shown in the cross-track comparison table for this step
    pub fn comparison_keys(self) -> &'static [&'static str] {
        match self {
            StepId::B1 => &["effective_level", "estimated_weeks"],
            StepId::B2 => &["competencies_count"],
            StepId::B3 => &["knowledge_count", "skills_count", "habits_count"],
            StepId::B4 => &["units_count", "clusters_count"],
            StepId::B5 => &["total_weeks", "levels"],
            StepId::B6 => &["blueprints_count"],
            StepId::B7 => &["weeks", "checkpoints"],
            StepId::B8 => &["overall_valid", "checks"],
        }
    }

    /// Resolve a wire identifier
    ///
    /// Accepts both the short (`B1`) and the long (`B1_validate`) form,
    /// case-insensitively. Returns `None` for anything outside the catalog.
    pub fn parse(input: &str) -> Option<StepId> {
        let input = input.trim();
        Self::ALL.into_iter().find(|step| {
            step.short_name().eq_ignore_ascii_case(input)
                || step.step_name().eq_ignore_ascii_case(input)
        })
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for StepId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepId::parse(s).ok_or_else(|| format!("unknown pipeline step '{}'", s))
    }
}

/// Observed status of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One step's state within a generation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    pub step: StepId,
    pub status: StepStatus,
    pub description: Option<String>,
    pub duration_seconds: Option<f64>,
    pub tokens_used: Option<u64>,
    /// Step-specific result metrics, display only
    pub summary: Map<String, Value>,
}

impl StepState {
    /// A step that has not been observed yet
    pub fn pending(step: StepId) -> Self {
        Self {
            step,
            status: StepStatus::Pending,
            description: None,
            duration_seconds: None,
            tokens_used: None,
            summary: Map::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }
}

/// Fresh step array for a new job, all steps pending
pub fn pending_steps() -> [StepState; STEP_COUNT] {
    StepId::ALL.map(StepState::pending)
}
