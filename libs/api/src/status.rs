//! Task status updates.

use std::fmt;
use std::str::FromStr;

use hdfs_mesos_id::TaskId;
use serde::{Deserialize, Serialize};

use crate::descriptor::entries;
use crate::ApiError;

/// Task state tag reported by the master.
///
/// The wire vocabulary is open-ended; unrecognized tags are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Staging,
    Starting,
    Running,
    Finished,
    Failed,
    Killed,
    Lost,
    Error,
    Unknown(String),
}

/// Lifecycle category of a status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// The task is up.
    Started,
    /// The task is gone, or in a state the scheduler cannot trust.
    Stopped,
}

impl TaskState {
    /// Parses a tag, accepting both `running` and `TASK_RUNNING` spellings.
    pub fn from_tag(tag: &str) -> Self {
        let lower = tag.trim().to_ascii_lowercase();
        let name = lower.strip_prefix("task_").unwrap_or(&lower);

        match name {
            "staging" => Self::Staging,
            "starting" => Self::Starting,
            "running" => Self::Running,
            "finished" => Self::Finished,
            "failed" => Self::Failed,
            "killed" => Self::Killed,
            "lost" => Self::Lost,
            "error" => Self::Error,
            _ => Self::Unknown(tag.trim().to_string()),
        }
    }

    /// Classifies the tag. Only `running` counts as started; every other
    /// tag, including unknown ones, is treated as stopped.
    pub fn class(&self) -> StatusClass {
        match self {
            Self::Running => StatusClass::Started,
            _ => StatusClass::Stopped,
        }
    }

    /// Launch progress reports that carry no lifecycle change.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Staging | Self::Starting)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Staging => "staging",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Killed => "killed",
            Self::Lost => "lost",
            Self::Error => "error",
            Self::Unknown(tag) => tag,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status update for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TaskStatus {
    pub fn new(task_id: TaskId, state: TaskState) -> Self {
        Self {
            task_id,
            state,
            message: None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id:{}, state:{}", self.task_id, self.state)?;
        if let Some(message) = &self.message {
            write!(f, ", message:{message}")?;
        }
        Ok(())
    }
}

impl FromStr for TaskStatus {
    type Err = ApiError;

    /// Parses `id:<task>, state:<tag>[, message:<text>]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut task_id = None;
        let mut state = None;
        let mut message = None;

        for (key, value) in entries(s, ',')? {
            match key {
                "id" => task_id = Some(TaskId::parse(value)?),
                "state" => state = Some(TaskState::from_tag(value)),
                "message" => message = Some(value.to_string()),
                other => {
                    return Err(ApiError::UnsupportedKey {
                        kind: "status",
                        key: other.to_string(),
                    })
                }
            }
        }

        Ok(Self {
            task_id: task_id.ok_or(ApiError::MissingField("id"))?,
            state: state.ok_or(ApiError::MissingField("state"))?,
            message,
        })
    }
}
