//! Shared helpers for unit tests.

use crate::bus::EventSink;
use crate::model::{LogLevel, ServerEvent};
use parking_lot::Mutex;

/// Captures published events in memory.
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<ServerEvent>>,
}

impl RecordingSink {
    pub(crate) fn events(&self) -> Vec<ServerEvent> {
        self.events.lock().clone()
    }

    pub(crate) fn logs(&self) -> Vec<(String, LogLevel)> {
        self.events
            .lock()
            .iter()
            .filter_map(|ev| match ev {
                ServerEvent::Log { message, level } => Some((message.clone(), *level)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn has_log(&self, level: LogLevel, needle: &str) -> bool {
        self.logs()
            .iter()
            .any(|(message, l)| *l == level && message.contains(needle))
    }

    pub(crate) fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: ServerEvent) {
        self.events.lock().push(event);
    }
}
