//! Task interface: one loop stage per request.
//!
//! ```json
//! {"type": "run_tests", "id": "t-42", "cycle": 3, "parameters": {}}
//! ```
//!
//! Every task produces a [`TaskResult`]; failures are reported with
//! `status = "error"` rather than propagated.

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::corpus::Phase;
use crate::domain::{LoopError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    GenerateExamples,
    RunTests,
    ImplementImprovements,
    ValidateImprovements,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub id: String,
    pub cycle: u32,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl TaskDescriptor {
    pub fn new(task_type: TaskType, id: impl Into<String>, cycle: u32) -> Self {
        Self {
            task_type,
            id: id.into(),
            cycle,
            parameters: serde_json::Value::Null,
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LoopError::InvalidTask(e.to_string()))
    }

    /// Decode `parameters`; absent parameters decode to the default.
    pub fn params<T: DeserializeOwned + Default>(&self) -> Result<T> {
        if self.parameters.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.parameters.clone()).map_err(|e| {
            LoopError::InvalidTask(format!("task {}: bad parameters: {}", self.id, e))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub task_type: TaskType,
    pub cycle: u32,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl TaskResult {
    pub fn completed(task: &TaskDescriptor, payload: serde_json::Value) -> Self {
        Self {
            task_id: task.id.clone(),
            task_type: task.task_type,
            cycle: task.cycle,
            status: TaskStatus::Completed,
            message: None,
            payload,
        }
    }

    pub fn error(task: &TaskDescriptor, message: impl Into<String>) -> Self {
        Self {
            task_id: task.id.clone(),
            task_type: task.task_type,
            cycle: task.cycle,
            status: TaskStatus::Error,
            message: Some(message.into()),
            payload: serde_json::Value::Null,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// `generate_examples` parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerateParams {
    /// Force a phase instead of the scheduled one.
    pub phase: Option<Phase>,
}

/// `run_tests` parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunParams {
    pub corpus_path: Option<PathBuf>,
}

/// `implement_improvements` parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImproveParams {
    pub results_path: Option<PathBuf>,
}

/// `validate_improvements` parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidateParams {
    pub corpus_path: Option<PathBuf>,
    /// Overrides the stored baseline.
    pub baseline: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_parses_wire_format() {
        let task = TaskDescriptor::from_json(
            r#"{"type": "validate_improvements", "id": "t-1", "cycle": 4,
                "parameters": {"baseline": 0.8}}"#,
        )
        .unwrap();
        assert_eq!(task.task_type, TaskType::ValidateImprovements);
        let params: ValidateParams = task.params().unwrap();
        assert_eq!(params.baseline, Some(0.8));
        assert_eq!(params.corpus_path, None);
    }

    #[test]
    fn missing_parameters_use_defaults() {
        let task = TaskDescriptor::from_json(r#"{"type": "run_tests", "id": "t-2", "cycle": 1}"#)
            .unwrap();
        assert_eq!(task.params::<RunParams>().unwrap(), RunParams::default());
    }

    #[test]
    fn unknown_parameter_is_invalid() {
        let task = TaskDescriptor::new(TaskType::GenerateExamples, "t-3", 1)
            .with_parameters(serde_json::json!({"phaze": "edge_cases"}));
        assert!(matches!(
            task.params::<GenerateParams>(),
            Err(LoopError::InvalidTask(_))
        ));
    }

    #[test]
    fn unknown_task_type_is_invalid() {
        let err = TaskDescriptor::from_json(r#"{"type": "deploy", "id": "x", "cycle": 1}"#)
            .unwrap_err();
        assert!(matches!(err, LoopError::InvalidTask(_)));
    }

    #[test]
    fn error_result_serializes_status() {
        let task = TaskDescriptor::new(TaskType::RunTests, "t-4", 2);
        let json = serde_json::to_value(TaskResult::error(&task, "boom")).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "boom");
        assert_eq!(json["task_type"], "run_tests");
    }
}
