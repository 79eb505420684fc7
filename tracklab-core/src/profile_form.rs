//! Profile form model
//!
//! Editable student profile with client-side validation. Forms that fail
//! validation are never sent to the backend.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Scalar fields that block submission when blank
const CRITICAL_STRING_FIELDS: [&str; 4] = [
    "topic",
    "subject_area",
    "experience_level",
    "diagnostic_result",
];

/// List fields that block submission when empty
const CRITICAL_LIST_FIELDS: [&str; 5] = [
    "desired_outcomes",
    "target_tasks",
    "subtasks",
    "confusing_concepts",
    "success_criteria",
];

pub const EXPERIENCE_LEVELS: [&str; 4] = ["zero", "beginner", "intermediate", "advanced"];
pub const DIAGNOSTIC_RESULTS: [&str; 5] = ["mastery", "partial", "gaps", "misconceptions", "zero"];

/// Errors loading a form from JSON
#[derive(Debug, Error)]
pub enum ProfileFormError {
    #[error("malformed profile JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("profile JSON must be an object")]
    NotAnObject,
}

/// A single blocking problem found by [`ProfileForm::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormTask {
    pub id: String,
    pub description: String,
    pub complexity_rank: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormSubtask {
    pub id: String,
    pub description: String,
    pub parent_task_id: String,
    pub required_knowledge: Vec<String>,
    pub required_skills: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormBarrier {
    pub id: String,
    pub description: String,
    pub related_task_id: String,
    pub barrier_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormConcept {
    pub id: String,
    pub term: String,
    pub confusion_description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormCriterion {
    pub id: String,
    pub description: String,
    pub measurable: bool,
    pub metric: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormScheduleDay {
    pub day_of_week: String,
    pub available_minutes: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormPracticeWindow {
    pub time_of_day: String,
    pub duration_minutes: u32,
    pub device: String,
}

/// Editable student profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileForm {
    pub topic: String,
    pub subject_area: String,
    pub experience_level: String,
    pub novice_mode: bool,
    pub goal_type: String,
    pub desired_outcomes: Vec<String>,
    pub target_tasks: Vec<FormTask>,
    pub task_hierarchy: Vec<FormTask>,
    pub peak_task_id: String,
    pub easiest_task_id: String,
    pub subtasks: Vec<FormSubtask>,
    pub key_barriers: Vec<FormBarrier>,
    pub confusing_concepts: Vec<FormConcept>,
    pub diagnostic_result: String,
    pub weekly_hours: i32,
    pub success_criteria: Vec<FormCriterion>,
    pub schedule: Vec<FormScheduleDay>,
    pub practice_windows: Vec<FormPracticeWindow>,
    pub preferred_formats: Vec<String>,
    pub tech_access: Vec<String>,
    pub motivation_level: Option<String>,
    pub support_available: Vec<String>,
    pub deadline: Option<String>,
    pub age_group: Option<String>,
    pub learning_style: Vec<String>,
    pub prior_attempts: Option<String>,
    pub external_resources: Vec<String>,
    pub notes: Option<String>,

    #[serde(skip)]
    ids: IdAllocator,
}

impl Default for ProfileForm {
    fn default() -> Self {
        Self {
            topic: String::new(),
            subject_area: String::new(),
            experience_level: String::new(),
            novice_mode: false,
            goal_type: String::new(),
            desired_outcomes: Vec::new(),
            target_tasks: Vec::new(),
            task_hierarchy: Vec::new(),
            peak_task_id: String::new(),
            easiest_task_id: String::new(),
            subtasks: Vec::new(),
            key_barriers: Vec::new(),
            confusing_concepts: Vec::new(),
            diagnostic_result: String::new(),
            weekly_hours: 5,
            success_criteria: Vec::new(),
            schedule: Vec::new(),
            practice_windows: Vec::new(),
            preferred_formats: Vec::new(),
            tech_access: Vec::new(),
            motivation_level: None,
            support_available: Vec::new(),
            deadline: None,
            age_group: None,
            learning_style: Vec::new(),
            prior_attempts: None,
            external_resources: Vec::new(),
            notes: None,
            ids: IdAllocator::default(),
        }
    }
}

impl ProfileForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a form from JSON, filling missing fields with defaults
    ///
    /// The id allocator is seeded past every id already present so newly
    /// added entities never collide with loaded ones.
    pub fn from_json(input: &str) -> Result<Self, ProfileFormError> {
        let value: serde_json::Value = serde_json::from_str(input)?;
        if !value.is_object() {
            return Err(ProfileFormError::NotAnObject);
        }
        let mut form: ProfileForm = serde_json::from_value(value)?;
        form.reseed_ids();
        Ok(form)
    }

    /// Pretty JSON export of the current state
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Set the experience level; novice mode follows it
    pub fn set_experience_level(&mut self, level: impl Into<String>) {
        self.experience_level = level.into();
        self.novice_mode = matches!(self.experience_level.as_str(), "zero" | "beginner");
    }

    /// Append a new task and mirror it at the end of the hierarchy
    pub fn add_task(&mut self, description: impl Into<String>) -> String {
        let id = self.ids.next("t");
        let task = FormTask {
            id: id.clone(),
            description: description.into(),
            complexity_rank: 1,
        };
        self.task_hierarchy.push(FormTask {
            complexity_rank: self.task_hierarchy.len() as u32 + 1,
            ..task.clone()
        });
        self.target_tasks.push(task);
        id
    }

    /// Remove a task along with its hierarchy entry and any selections of it
    pub fn remove_task(&mut self, id: &str) -> bool {
        let before = self.target_tasks.len();
        self.target_tasks.retain(|t| t.id != id);
        self.task_hierarchy.retain(|t| t.id != id);
        if self.easiest_task_id == id {
            self.easiest_task_id.clear();
        }
        if self.peak_task_id == id {
            self.peak_task_id.clear();
        }
        before != self.target_tasks.len()
    }

    pub fn add_subtask(&mut self, parent_task_id: &str, description: impl Into<String>) -> String {
        let id = self.ids.next("st");
        self.subtasks.push(FormSubtask {
            id: id.clone(),
            description: description.into(),
            parent_task_id: parent_task_id.to_string(),
            ..Default::default()
        });
        id
    }

    pub fn add_barrier(&mut self, description: impl Into<String>) -> String {
        let id = self.ids.next("b");
        let related_task_id = self
            .target_tasks
            .first()
            .map(|t| t.id.clone())
            .unwrap_or_default();
        self.key_barriers.push(FormBarrier {
            id: id.clone(),
            description: description.into(),
            related_task_id,
            barrier_type: "conceptual".to_string(),
        });
        id
    }

    pub fn add_concept(&mut self, term: impl Into<String>) -> String {
        let id = self.ids.next("c");
        self.confusing_concepts.push(FormConcept {
            id: id.clone(),
            term: term.into(),
            confusion_description: String::new(),
        });
        id
    }

    pub fn add_criterion(&mut self, description: impl Into<String>) -> String {
        let id = self.ids.next("sc");
        self.success_criteria.push(FormCriterion {
            id: id.clone(),
            description: description.into(),
            measurable: true,
            metric: None,
        });
        id
    }

    /// Enumerate every blocking problem
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        for field in CRITICAL_STRING_FIELDS {
            if self.string_field(field).trim().is_empty() {
                errors.push(FieldError::new(field, "field is required"));
            }
        }

        if !self.experience_level.is_empty()
            && !EXPERIENCE_LEVELS.contains(&self.experience_level.as_str())
        {
            errors.push(FieldError::new(
                "experience_level",
                format!("must be one of: {}", EXPERIENCE_LEVELS.join(", ")),
            ));
        }

        if !self.diagnostic_result.is_empty()
            && !DIAGNOSTIC_RESULTS.contains(&self.diagnostic_result.as_str())
        {
            errors.push(FieldError::new(
                "diagnostic_result",
                format!("must be one of: {}", DIAGNOSTIC_RESULTS.join(", ")),
            ));
        }

        for field in CRITICAL_LIST_FIELDS {
            if self.list_len(field) == 0 {
                errors.push(FieldError::new(field, "add at least one item"));
            }
        }

        if !self.target_tasks.is_empty() {
            let known = |id: &str| self.target_tasks.iter().any(|t| t.id == id);

            if self.easiest_task_id.is_empty() {
                errors.push(FieldError::new("easiest_task_id", "select the easiest task"));
            } else if !known(&self.easiest_task_id) {
                errors.push(FieldError::new(
                    "easiest_task_id",
                    "selected task is not in the task list",
                ));
            }

            if self.peak_task_id.is_empty() {
                errors.push(FieldError::new("peak_task_id", "select the peak task"));
            } else if !known(&self.peak_task_id) {
                errors.push(FieldError::new(
                    "peak_task_id",
                    "selected task is not in the task list",
                ));
            }
        }

        if self.weekly_hours <= 0 {
            errors.push(FieldError::new("weekly_hours", "must be greater than 0"));
        }

        errors
    }

    fn string_field(&self, field: &str) -> &str {
        match field {
            "topic" => &self.topic,
            "subject_area" => &self.subject_area,
            "experience_level" => &self.experience_level,
            "diagnostic_result" => &self.diagnostic_result,
            _ => "",
        }
    }

    fn list_len(&self, field: &str) -> usize {
        match field {
            "desired_outcomes" => self.desired_outcomes.len(),
            "target_tasks" => self.target_tasks.len(),
            "subtasks" => self.subtasks.len(),
            "confusing_concepts" => self.confusing_concepts.len(),
            "success_criteria" => self.success_criteria.len(),
            _ => 0,
        }
    }

    fn reseed_ids(&mut self) {
        let existing = self
            .target_tasks
            .iter()
            .map(|t| t.id.as_str())
            .chain(self.subtasks.iter().map(|s| s.id.as_str()))
            .chain(self.key_barriers.iter().map(|b| b.id.as_str()))
            .chain(self.confusing_concepts.iter().map(|c| c.id.as_str()))
            .chain(self.success_criteria.iter().map(|c| c.id.as_str()))
            .map(str::to_string)
            .collect::<Vec<_>>();
        for id in existing {
            self.ids.observe(&id);
        }
    }
}

/// Sequential ids per prefix, owned by a single form
#[derive(Debug, Clone, Default, PartialEq)]
struct IdAllocator {
    next: HashMap<String, u32>,
}

impl IdAllocator {
    fn next(&mut self, prefix: &str) -> String {
        let counter = self.next.entry(prefix.to_string()).or_insert(1);
        let id = format!("{}{}", prefix, counter);
        *counter = counter.saturating_add(1);
        id
    }

    /// Bump the prefix counter past an existing id like `st4`
    fn observe(&mut self, id: &str) {
        let split = id.find(|c: char| c.is_ascii_digit()).unwrap_or(id.len());
        let (prefix, digits) = id.split_at(split);
        if prefix.is_empty() {
            return;
        }
        // an id at u32::MAX leaves the counter alone
        let Some(after) = digits.parse::<u32>().ok().and_then(|n| n.checked_add(1)) else {
            return;
        };
        let counter = self.next.entry(prefix.to_string()).or_insert(1);
        if *counter < after {
            *counter = after;
        }
    }
}
