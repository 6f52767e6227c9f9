use async_trait::async_trait;

use crate::reminder::ReminderId;

use super::alerts::{Alert, AlertEvent};

/// Whatever puts alerts in front of the user: an overlay window, a system
/// notification, a log line.
#[async_trait]
pub trait AlertPresenter: Send + Sync + 'static {
    async fn show_alert(&self, alert: &Alert);
    async fn clear_alert(&self, id: &ReminderId);
}

pub(crate) async fn present(presenter: &dyn AlertPresenter, events: Vec<AlertEvent>) {
    for event in events {
        match event {
            AlertEvent::Raised(alert) => presenter.show_alert(&alert).await,
            AlertEvent::Cleared(id) => presenter.clear_alert(&id).await,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertPresenter;

#[async_trait]
impl AlertPresenter for LogAlertPresenter {
    async fn show_alert(&self, alert: &Alert) {
        log::info!(
            "[ALERT] {} [reminder_id = {}, type = {:?}]\n{}",
            alert.snapshot.title,
            alert.id,
            alert.snapshot.reminder_type,
            alert.snapshot.message
        );
    }

    async fn clear_alert(&self, id: &ReminderId) {
        log::info!("[ALERT] Cleared [reminder_id = {}]", id);
    }
}
