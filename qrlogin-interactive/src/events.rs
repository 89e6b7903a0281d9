//! Typed event stream for observers of a [`LoginOrchestrator`](crate::LoginOrchestrator).

use std::fmt;

use tokio::sync::broadcast;

use crate::state::ProtocolState;

/// Identifies one login attempt. A reset starts a new one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(u64);

impl AttemptId {
    pub(crate) fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum LoginEvent {
    /// The orchestrator moved to `state` while running `attempt`.
    StateChanged {
        attempt: AttemptId,
        state: ProtocolState,
    },

    /// A result arrived for an attempt that was reset in the meantime and was dropped.
    AttemptDiscarded { attempt: AttemptId },
}

/// Fan-out of [`LoginEvent`]s to every subscribed observer.
///
/// Slow observers lag and lose the oldest events; the orchestrator never waits
/// on them.
pub struct EventBus {
    sender: broadcast::Sender<LoginEvent>,
}

impl EventBus {
    /// `capacity` events are buffered per observer, at least one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn emit(&self, event: LoginEvent) {
        // nobody listening
        let _ = self.sender.send(event);
    }

    /// Observe events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LoginEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_subscriber_sees_events() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.emit(LoginEvent::StateChanged {
            attempt: AttemptId::default().next(),
            state: ProtocolState::Scanning,
        });

        for receiver in [&mut first, &mut second] {
            match receiver.recv().await.unwrap() {
                LoginEvent::StateChanged { attempt, state } => {
                    assert_eq!(attempt.value(), 1);
                    assert_eq!(state.name(), "scanning");
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::default();
        bus.emit(LoginEvent::AttemptDiscarded {
            attempt: AttemptId::default(),
        });
    }

    #[tokio::test]
    async fn test_lagging_subscriber_drops_events() {
        let bus = EventBus::new(1);
        let mut receiver = bus.subscribe();
        for _ in 0..3 {
            bus.emit(LoginEvent::AttemptDiscarded {
                attempt: AttemptId::default(),
            });
        }
        assert!(matches!(
            receiver.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }
}
