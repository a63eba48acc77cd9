//! Recorder that keeps every event in memory

use std::sync::Mutex;

use ceremony_core::RunRecorder;

/// One call made on a [`MemoryRecorder`]
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedEvent {
    Message(String),
    Point { name: String, value: f64 },
    Failure(String),
    Crash(String),
    Success,
}

/// Captures recorder calls for assertions
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    events: Mutex<Vec<RecordedEvent>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: RecordedEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Value of the first point named `name`
    pub fn point(&self, name: &str) -> Option<f64> {
        self.events().into_iter().find_map(|event| match event {
            RecordedEvent::Point { name: n, value } if n == name => Some(value),
            _ => None,
        })
    }

    pub fn messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                RecordedEvent::Message(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                RecordedEvent::Failure(error) => Some(error),
                _ => None,
            })
            .collect()
    }

    pub fn crashes(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                RecordedEvent::Crash(error) => Some(error),
                _ => None,
            })
            .collect()
    }

    /// Number of terminal outcomes (success or failure) recorded
    pub fn outcomes(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, RecordedEvent::Success | RecordedEvent::Failure(_)))
            .count()
    }

    pub fn succeeded(&self) -> bool {
        self.events().contains(&RecordedEvent::Success)
    }
}

impl RunRecorder for MemoryRecorder {
    fn record_message(&self, message: &str) {
        self.push(RecordedEvent::Message(message.to_string()));
    }

    fn record_point(&self, name: &str, value: f64) {
        self.push(RecordedEvent::Point {
            name: name.to_string(),
            value,
        });
    }

    fn record_failure(&self, error: &str) {
        self.push(RecordedEvent::Failure(error.to_string()));
    }

    fn record_crash(&self, error: &str) {
        self.push(RecordedEvent::Crash(error.to_string()));
    }

    fn record_success(&self) {
        self.push(RecordedEvent::Success);
    }
}
