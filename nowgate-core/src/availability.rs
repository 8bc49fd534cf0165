//! Broker availability: `Disconnected -> Connecting -> Available`, polled at a fixed interval.

use crate::config::TransportKind;

/// Broker reachability as seen by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Disconnected,
    Connecting,
    Available,
}

/// What the host reports on each availability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStatus {
    /// Underlying transport (wireless association or wired carrier) is up.
    pub link_up: bool,
    /// The MQTT client reports an established session.
    pub client_connected: bool,
}

/// Outcome of one availability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// Nothing to do this tick.
    Idle,
    /// Start a (bounded, fail-fast) broker connect attempt.
    Connect,
    /// The broker session was found gone; `reconnect` is set when the link is up
    /// and a new attempt should start right away.
    Lost { reconnect: bool },
}

/// Availability state machine. Owned by the dispatcher; the only writer of broker availability.
#[derive(Debug, Clone)]
pub struct Availability {
    transport: TransportKind,
    state: State,
}

impl Availability {
    pub fn new(transport: TransportKind) -> Self {
        Self {
            transport,
            state: State::Disconnected,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_available(&self) -> bool {
        self.state == State::Available
    }

    /// Periodic check. Loss of an available session is detected lazily here.
    pub fn on_check(&mut self, status: LinkStatus) -> Check {
        if !self.transport.has_broker_link() {
            return Check::Idle;
        }
        match self.state {
            State::Available if status.link_up && status.client_connected => Check::Idle,
            State::Available => {
                if status.link_up {
                    self.state = State::Connecting;
                    Check::Lost { reconnect: true }
                } else {
                    self.state = State::Disconnected;
                    Check::Lost { reconnect: false }
                }
            }
            // An attempt is in flight; the host reports its result.
            State::Connecting if status.link_up => Check::Idle,
            State::Connecting => {
                self.state = State::Disconnected;
                Check::Idle
            }
            State::Disconnected if status.link_up => {
                self.state = State::Connecting;
                Check::Connect
            }
            State::Disconnected => Check::Idle,
        }
    }

    /// Broker handshake succeeded. True when this made the broker newly available.
    pub fn on_connected(&mut self) -> bool {
        if !self.transport.has_broker_link() || self.state == State::Available {
            return false;
        }
        self.state = State::Available;
        true
    }

    /// Connect attempt failed or the session dropped. True when the broker was available.
    pub fn on_disconnected(&mut self) -> bool {
        let was_available = self.state == State::Available;
        self.state = State::Disconnected;
        was_available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UP: LinkStatus = LinkStatus {
        link_up: true,
        client_connected: false,
    };
    const CONNECTED: LinkStatus = LinkStatus {
        link_up: true,
        client_connected: true,
    };
    const DOWN: LinkStatus = LinkStatus {
        link_up: false,
        client_connected: false,
    };

    #[test]
    fn connects_when_link_up() {
        let mut a = Availability::new(TransportKind::Wireless);
        assert_eq!(a.on_check(DOWN), Check::Idle);
        assert_eq!(a.state(), State::Disconnected);
        assert_eq!(a.on_check(UP), Check::Connect);
        assert_eq!(a.state(), State::Connecting);
        assert_eq!(a.on_check(UP), Check::Idle);
        assert!(a.on_connected());
        assert!(a.is_available());
        assert!(!a.on_connected());
        assert_eq!(a.on_check(CONNECTED), Check::Idle);
    }

    #[test]
    fn loss_detected_lazily_on_check() {
        let mut a = Availability::new(TransportKind::Wired);
        a.on_check(UP);
        a.on_connected();
        assert_eq!(a.on_check(UP), Check::Lost { reconnect: true });
        assert_eq!(a.state(), State::Connecting);

        a.on_connected();
        assert_eq!(a.on_check(DOWN), Check::Lost { reconnect: false });
        assert_eq!(a.state(), State::Disconnected);
    }

    #[test]
    fn failed_attempt_retries_next_tick() {
        let mut a = Availability::new(TransportKind::Wired);
        assert_eq!(a.on_check(UP), Check::Connect);
        assert!(!a.on_disconnected());
        assert_eq!(a.on_check(UP), Check::Connect);
    }

    #[test]
    fn connecting_falls_back_when_link_drops() {
        let mut a = Availability::new(TransportKind::Wireless);
        a.on_check(UP);
        assert_eq!(a.on_check(DOWN), Check::Idle);
        assert_eq!(a.state(), State::Disconnected);
    }

    #[test]
    fn disconnect_reports_previous_availability() {
        let mut a = Availability::new(TransportKind::Wireless);
        a.on_check(UP);
        a.on_connected();
        assert!(a.on_disconnected());
        assert!(!a.on_disconnected());
    }

    #[test]
    fn radio_only_never_connects() {
        let mut a = Availability::new(TransportKind::RadioOnly);
        assert_eq!(a.on_check(CONNECTED), Check::Idle);
        assert!(!a.on_connected());
        assert!(!a.is_available());
    }
}
