//! Session-scoped state shared by the coordinator and tool implementations.
//!
//! A [`SessionContext`] is created when a conversation starts and passed by
//! reference into every coordinator and tool-executor call. It carries the
//! writing task list and the set of session-wide permission grants.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Ordered phases of a writing project. Ordering matters: skipping ahead
/// triggers the coordinator's advisory note.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WritingPhase {
    Outline,
    Characters,
    Draft,
    Polish,
}

impl WritingPhase {
    pub const ORDERED: [WritingPhase; 4] = [
        WritingPhase::Outline,
        WritingPhase::Characters,
        WritingPhase::Draft,
        WritingPhase::Polish,
    ];

    /// Phases that come before this one.
    pub fn predecessors(self) -> impl Iterator<Item = WritingPhase> {
        Self::ORDERED.into_iter().take_while(move |p| *p < self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskItem {
    pub id: Uuid,
    pub description: String,
    pub phase: WritingPhase,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

/// Shared task list. Cloning shares the underlying list, so the coordinator
/// and tool implementations observe each other's updates.
#[derive(Debug, Clone, Default)]
pub struct TaskList {
    items: Arc<RwLock<Vec<TaskItem>>>,
}

impl TaskList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, description: impl Into<String>, phase: WritingPhase) -> Uuid {
        let item = TaskItem {
            id: Uuid::new_v4(),
            description: description.into(),
            phase,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
        };
        let id = item.id;
        self.items.write().expect("task list lock").push(item);
        id
    }

    pub fn complete(&self, id: Uuid) -> bool {
        let mut items = self.items.write().expect("task list lock");
        match items.iter_mut().find(|t| t.id == id) {
            Some(task) => {
                task.status = TaskStatus::Completed;
                true
            }
            None => false,
        }
    }

    pub fn items(&self) -> Vec<TaskItem> {
        self.items.read().expect("task list lock").clone()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().expect("task list lock").is_empty()
    }

    /// True when the phase has at least one task and all of them completed.
    pub fn phase_completed(&self, phase: WritingPhase) -> bool {
        let items = self.items.read().expect("task list lock");
        let mut seen = false;
        for task in items.iter().filter(|t| t.phase == phase) {
            seen = true;
            if task.status != TaskStatus::Completed {
                return false;
            }
        }
        seen
    }

    /// Earlier phases that have no completed work while this phase is being
    /// started. Empty means no skip occurred.
    pub fn skipped_before(&self, phase: WritingPhase) -> Vec<WritingPhase> {
        phase
            .predecessors()
            .filter(|p| !self.phase_completed(*p))
            .collect()
    }
}

/// Session-wide permission grants, keyed by tool name.
#[derive(Debug, Default)]
pub struct SessionPermissions {
    granted: RwLock<HashSet<String>>,
}

impl SessionPermissions {
    pub fn is_granted(&self, tool_name: &str) -> bool {
        self.granted
            .read()
            .expect("permission lock")
            .contains(tool_name)
    }

    pub fn grant(&self, tool_name: &str) {
        self.granted
            .write()
            .expect("permission lock")
            .insert(tool_name.to_owned());
    }
}

/// Explicit per-session state. Created at session start, dropped at end.
#[derive(Debug)]
pub struct SessionContext {
    pub id: String,
    pub tasks: TaskList,
    pub permissions: SessionPermissions,
    pub created_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tasks: TaskList::new(),
            permissions: SessionPermissions::default(),
            created_at: Utc::now(),
        }
    }
}
