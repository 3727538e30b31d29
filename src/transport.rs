//! Outward event queue shared by the client and the server.
//!
//! Worker threads push events in; the application thread drains them with a
//! non-blocking poll at whatever cadence suits it (once or many times per
//! tick). A growing backlog is reported through a rate-limited warning and
//! never dropped.

use crate::config::TransportConfig;
use crate::event::Event;
use crate::runtime::{QueueWatch, SafeQueue};

pub struct Transport {
    events: SafeQueue<Event>,
    watch: QueueWatch,
}

impl Transport {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            events: SafeQueue::new(),
            watch: QueueWatch::new(
                "events",
                config.queue_warning_threshold,
                config.queue_warning_interval(),
            ),
        }
    }

    /// Queue an event for the polling caller.
    pub fn emit(&self, event: Event) {
        self.events.enqueue(event);
        self.watch.check(self.events.len());
    }

    /// Pop the oldest event, if any. Never blocks.
    pub fn next_event(&self) -> Option<Event> {
        self.events.try_dequeue()
    }

    /// Drop events left over from a previous session.
    pub fn clear(&self) {
        self.events.clear();
    }

    pub fn pending(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_events_in_arrival_order() {
        let transport = Transport::new(&TransportConfig::default());
        transport.emit(Event::Connected(1));
        transport.emit(Event::Data(1, Bytes::from_static(b"a")));
        transport.emit(Event::Disconnected(1));
        assert_eq!(transport.pending(), 3);

        assert!(matches!(transport.next_event(), Some(Event::Connected(1))));
        assert!(matches!(transport.next_event(), Some(Event::Data(1, _))));
        assert!(matches!(transport.next_event(), Some(Event::Disconnected(1))));
        assert!(transport.next_event().is_none());
    }

    #[test]
    fn test_backlog_is_kept_past_threshold() {
        let config = TransportConfig {
            queue_warning_threshold: 2,
            ..TransportConfig::default()
        };
        let transport = Transport::new(&config);
        for id in 0..10 {
            transport.emit(Event::Connected(id));
        }
        assert_eq!(transport.pending(), 10);
    }

    #[test]
    fn test_clear() {
        let transport = Transport::new(&TransportConfig::default());
        transport.emit(Event::Connected(0));
        transport.clear();
        assert_eq!(transport.pending(), 0);
        assert!(transport.next_event().is_none());
    }
}
