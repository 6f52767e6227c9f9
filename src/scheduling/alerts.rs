use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::reminder::{ReminderId, ReminderType};

/// Title and message as they were when the reminder fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSnapshot {
    pub title: String,
    pub message: String,
    pub reminder_type: ReminderType,
    pub fired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: ReminderId,
    #[serde(flatten)]
    pub snapshot: AlertSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertEvent {
    Raised(Alert),
    Cleared(ReminderId),
}

/// Fired, unacknowledged alerts in the order they were raised. At most one
/// alert per reminder.
#[derive(Debug, Default)]
pub struct AlertDispatcher {
    active: IndexMap<ReminderId, AlertSnapshot>,
    outbox: Vec<AlertEvent>,
}

impl AlertDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the reminder already has an alert on screen.
    pub fn enqueue(&mut self, id: ReminderId, snapshot: AlertSnapshot) -> bool {
        if self.active.contains_key(&id) {
            return false;
        }

        log::info!(
            "Alert raised [reminder_id = {}, title = {:?}]",
            id,
            snapshot.title
        );
        self.outbox.push(AlertEvent::Raised(Alert {
            id: id.clone(),
            snapshot: snapshot.clone(),
        }));
        self.active.insert(id, snapshot);
        true
    }

    pub fn dismiss(&mut self, id: &ReminderId) -> Option<AlertSnapshot> {
        let snapshot = self.active.shift_remove(id)?;
        log::info!("Alert cleared [reminder_id = {}]", id);
        self.outbox.push(AlertEvent::Cleared(id.clone()));
        Some(snapshot)
    }

    /// Removes the most recently raised alert.
    pub fn dismiss_latest(&mut self) -> Option<Alert> {
        let (id, snapshot) = self.active.pop()?;
        log::info!("Latest alert cleared [reminder_id = {}]", id);
        self.outbox.push(AlertEvent::Cleared(id.clone()));
        Some(Alert { id, snapshot })
    }

    pub fn contains(&self, id: &ReminderId) -> bool {
        self.active.contains_key(id)
    }

    pub fn latest(&self) -> Option<Alert> {
        self.active.last().map(|(id, snapshot)| Alert {
            id: id.clone(),
            snapshot: snapshot.clone(),
        })
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.active
            .iter()
            .map(|(id, snapshot)| Alert {
                id: id.clone(),
                snapshot: snapshot.clone(),
            })
            .collect()
    }

    pub fn ids(&self) -> Vec<ReminderId> {
        self.active.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Drains the events produced since the last call.
    pub fn take_events(&mut self) -> Vec<AlertEvent> {
        std::mem::take(&mut self.outbox)
    }
}
