//! Outbound grade events.
//!
//! The host owns delivery (and any deduplication); the relay only hands over
//! one [`GradeEvent`] per successful callback.

use crate::models::GradeEvent;

pub trait GradePublisher: Send + Sync {
    fn publish(&self, event: GradeEvent);
}

/// Publishes grade events as structured log records.
#[derive(Debug, Default)]
pub struct TracingPublisher;

impl GradePublisher for TracingPublisher {
    fn publish(&self, event: GradeEvent) {
        tracing::info!(
            target: "sy_grade_relay::grade",
            block_id = %event.block_id,
            user_id = %event.user_id,
            module_id = %event.module_id,
            value = event.value,
            max_value = event.max_value,
            emitted_at = %event.emitted_at,
            "{}",
            event.event_type
        );
    }
}

/// Keeps every published event in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: std::sync::Mutex<Vec<GradeEvent>>,
}

#[cfg(test)]
impl RecordingPublisher {
    pub fn events(&self) -> Vec<GradeEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl GradePublisher for RecordingPublisher {
    fn publish(&self, event: GradeEvent) {
        self.events.lock().unwrap().push(event);
    }
}
