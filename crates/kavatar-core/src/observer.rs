//! Notification interface for presentation layers.
//!
//! The engine publishes every `GameEvent` to its subscribers after the
//! operation that produced it has fully applied. Subscribers never see a
//! half-applied state and cannot call back into the engine.

use crate::actions::GameEvent;
use std::sync::{Arc, Mutex};

/// Something that wants to hear about engine events
pub trait GameObserver: Send + Sync {
    fn notify(&mut self, event: &GameEvent);
}

impl<F> GameObserver for F
where
    F: FnMut(&GameEvent) + Send + Sync,
{
    fn notify(&mut self, event: &GameEvent) {
        self(event)
    }
}

/// Observer that records events into a shared buffer
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<GameEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every event recorded so far
    pub fn drain(&self) -> Vec<GameEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl GameObserver for EventLog {
    fn notify(&mut self, event: &GameEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_log_shares_buffer() {
        let log = EventLog::new();
        let mut subscriber = log.clone();

        subscriber.notify(&GameEvent::SetupCompleted);
        subscriber.notify(&GameEvent::PauseChanged { paused: true });

        assert_eq!(log.drain().len(), 2);
        assert!(log.drain().is_empty());
    }

    #[test]
    fn test_closure_observer() {
        let mut seen = 0;
        {
            let mut observer = |_: &GameEvent| seen += 1;
            observer.notify(&GameEvent::GameLoaded);
        }
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_manager_can_be_shared_between_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<crate::game::GameManager>();
        assert_send_sync::<EventLog>();
    }
}
