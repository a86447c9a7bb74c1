//! Edge job definitions

use crate::environment::EnvironmentId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeJobId(pub i32);

impl fmt::Display for EdgeJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a log collection for one environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EdgeJobLogsStatus {
    #[default]
    Idle,
    Pending,
    Collected,
}

/// Per-environment metadata of an edge job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeJobEnvironmentMeta {
    pub logs_status: EdgeJobLogsStatus,
    pub collect_logs: bool,
}

/// A scheduled unit of work delivered to edge agents on their next poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeJob {
    pub id: EdgeJobId,
    pub name: String,
    pub cron_expression: String,
    pub script_path: String,
    pub recurring: bool,
    pub version: u32,
    /// Unix seconds
    pub created: i64,
    #[serde(default)]
    pub environments: HashMap<EnvironmentId, EdgeJobEnvironmentMeta>,
}

impl EdgeJob {
    pub fn new(id: i32, name: impl Into<String>, cron_expression: impl Into<String>) -> Self {
        Self {
            id: EdgeJobId(id),
            name: name.into(),
            cron_expression: cron_expression.into(),
            script_path: String::new(),
            recurring: true,
            version: 1,
            created: chrono::Utc::now().timestamp(),
            environments: HashMap::new(),
        }
    }

    /// Whether logs should be collected from the given environment
    pub fn collects_logs_for(&self, environment_id: EnvironmentId) -> bool {
        self.environments
            .get(&environment_id)
            .is_some_and(|meta| meta.collect_logs)
    }
}

/// What an agent receives for each pending job on check-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeJobSchedule {
    pub id: EdgeJobId,
    pub cron_expression: String,
    pub script_path: String,
    pub collect_logs: bool,
    pub version: u32,
}

impl EdgeJob {
    pub fn schedule_for(&self, environment_id: EnvironmentId) -> EdgeJobSchedule {
        EdgeJobSchedule {
            id: self.id,
            cron_expression: self.cron_expression.clone(),
            script_path: self.script_path.clone(),
            collect_logs: self.collects_logs_for(environment_id),
            version: self.version,
        }
    }
}
