//! Reconnect policy of the beat-sync client
//!
//! The client thread asks [`Connection::poll`] what to do next and reports back with
//! [`Connection::opened`] and [`Connection::closed`].  Only `poll` ever starts an
//! attempt and only while disconnected, so there is never more than one attempt in
//! flight.  After a close the next attempt is scheduled a fixed interval later.
use std::time;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected { retry_at: time::Instant },
    Connecting,
    Connected,
}

/// What the client should do after a [`poll`](Connection::poll)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Open a connection now
    Connect,
    /// Nothing to do until the retry timer fires
    Wait(time::Duration),
    /// Connecting or connected, keep going
    Idle,
}

#[derive(Debug, Clone)]
pub struct Connection {
    state: ConnectionState,
    retry: time::Duration,
}

impl Connection {
    /// Start disconnected with the first attempt due immediately
    pub fn new(retry: time::Duration, now: time::Instant) -> Connection {
        Connection {
            state: ConnectionState::Disconnected { retry_at: now },
            retry,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn poll(&mut self, now: time::Instant) -> Action {
        match self.state {
            ConnectionState::Disconnected { retry_at } if now >= retry_at => {
                self.state = ConnectionState::Connecting;
                Action::Connect
            }
            ConnectionState::Disconnected { retry_at } => Action::Wait(retry_at - now),
            ConnectionState::Connecting | ConnectionState::Connected => Action::Idle,
        }
    }

    /// The pending attempt succeeded
    pub fn opened(&mut self) {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Connected;
        } else {
            log::warn!("Connection opened while {:?}", self.state);
        }
    }

    /// The connection was lost or the attempt failed
    pub fn closed(&mut self, now: time::Instant) {
        if let ConnectionState::Disconnected { .. } = self.state {
            return;
        }
        self.state = ConnectionState::Disconnected {
            retry_at: now + self.retry,
        };
    }
}
