use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Kinds of background work the dispatch queue carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Fulfillment dispatch for an approved request.
    Dispatch,
    /// Second step of music fulfillment, after the artist settle delay.
    MusicAddAlbum,
    /// Delayed re-check that an added album ended up monitored.
    MusicMonitorCheck,
}

impl Display for TaskKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskKind::Dispatch => write!(f, "dispatch"),
            TaskKind::MusicAddAlbum => write!(f, "music_add_album"),
            TaskKind::MusicMonitorCheck => write!(f, "music_monitor_check"),
        }
    }
}

impl FromStr for TaskKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dispatch" => Ok(TaskKind::Dispatch),
            "music_add_album" => Ok(TaskKind::MusicAddAlbum),
            "music_monitor_check" => Ok(TaskKind::MusicMonitorCheck),
            _ => Err(anyhow::anyhow!("Invalid task kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Scheduled => write!(f, "scheduled"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Trait for type-safe task payloads.
pub trait TaskPayload: Serialize + for<'de> Deserialize<'de> {
    fn kind() -> TaskKind;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchPayload {
    pub request_id: Uuid,
}

impl TaskPayload for DispatchPayload {
    fn kind() -> TaskKind {
        TaskKind::Dispatch
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicAddAlbumPayload {
    pub request_id: Uuid,
    pub service_id: i32,
    /// Backend-native artist id returned by the ensure-artist round trip.
    pub artist_id: i64,
}

impl TaskPayload for MusicAddAlbumPayload {
    fn kind() -> TaskKind {
        TaskKind::MusicAddAlbum
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicMonitorCheckPayload {
    pub request_id: Uuid,
    pub service_id: i32,
    pub album_id: i64,
    /// 1-based attempt counter; the dispatcher caps this.
    pub attempt: u32,
}

impl TaskPayload for MusicMonitorCheckPayload {
    fn kind() -> TaskKind {
        TaskKind::MusicMonitorCheck
    }
}

/// Outbox record consumed by the worker queue. State transitions enqueue one
/// of these instead of spawning uncontrolled background work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchTask {
    pub id: Uuid,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub payload: serde_json::Value,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DispatchTask {
    pub fn new<P: TaskPayload>(payload: &P, scheduled_at: DateTime<Utc>, max_retries: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind: P::kind(),
            status: if scheduled_at > now {
                TaskStatus::Scheduled
            } else {
                TaskStatus::Pending
            },
            payload: serde_json::to_value(payload).unwrap_or_default(),
            scheduled_at,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_ready_to_run(&self) -> bool {
        matches!(self.status, TaskStatus::Pending | TaskStatus::Scheduled)
            && self.scheduled_at <= Utc::now()
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Extract the payload as a typed struct, returning an error on failure.
    pub fn try_payload_as<P: TaskPayload>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn task_kind_round_trip() {
        for kind in [
            TaskKind::Dispatch,
            TaskKind::MusicAddAlbum,
            TaskKind::MusicMonitorCheck,
        ] {
            assert_eq!(kind.to_string().parse::<TaskKind>().unwrap(), kind);
        }
        assert!("bogus".parse::<TaskKind>().is_err());
    }

    #[test]
    fn immediate_task_is_pending_and_ready() {
        let task = DispatchTask::new(
            &DispatchPayload {
                request_id: Uuid::new_v4(),
            },
            Utc::now() - Duration::seconds(1),
            3,
        );
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.is_ready_to_run());
    }

    #[test]
    fn future_task_is_scheduled_and_not_ready() {
        let task = DispatchTask::new(
            &MusicMonitorCheckPayload {
                request_id: Uuid::new_v4(),
                service_id: 1,
                album_id: 9,
                attempt: 1,
            },
            Utc::now() + Duration::seconds(300),
            3,
        );
        assert_eq!(task.status, TaskStatus::Scheduled);
        assert!(!task.is_ready_to_run());
    }

    #[test]
    fn payload_round_trip() {
        let request_id = Uuid::new_v4();
        let task = DispatchTask::new(&DispatchPayload { request_id }, Utc::now(), 3);
        let payload: DispatchPayload = task.try_payload_as().unwrap();
        assert_eq!(payload.request_id, request_id);
        assert!(task.try_payload_as::<MusicAddAlbumPayload>().is_err());
    }

    #[test]
    fn retry_counting() {
        let mut task = DispatchTask::new(
            &DispatchPayload {
                request_id: Uuid::new_v4(),
            },
            Utc::now(),
            2,
        );
        assert!(task.can_retry());
        task.retry_count = 2;
        assert!(!task.can_retry());
    }
}
