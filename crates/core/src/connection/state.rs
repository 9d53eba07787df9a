/// Health of the supervised connection.
///
/// `generation` counts successful connections. It starts at 0 before the
/// first connect and is bumped on every reconnect, so an event can be matched
/// against the physical connection it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connected { generation: u64 },
    Disconnected { generation: u64 },
}

/// Something that happened to a physical connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Transport-level error (refused, reset, I/O failure).
    Error { generation: u64, reason: String },
    /// The connection was closed.
    End { generation: u64 },
}

impl ConnectionEvent {
    /// Generation of the connection the event was observed on.
    pub fn generation(&self) -> u64 {
        match self {
            ConnectionEvent::Error { generation, .. } | ConnectionEvent::End { generation } => {
                *generation
            }
        }
    }
}

/// What the supervisor should do in response to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Drop the current connection and start a reconnect cycle.
    Reconnect,
    /// The event refers to a connection that is already gone.
    Ignore,
}

impl ConnectionState {
    /// State before the first connection attempt.
    pub fn initial() -> Self {
        ConnectionState::Disconnected { generation: 0 }
    }

    pub fn generation(&self) -> u64 {
        match self {
            ConnectionState::Connected { generation }
            | ConnectionState::Disconnected { generation } => *generation,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }

    /// Decides how to react to `event`.
    ///
    /// Only an event from the live connection triggers a reconnect. Many
    /// in-flight requests failing on the same dead connection therefore
    /// produce a single reconnect cycle.
    pub fn on_event(&self, event: &ConnectionEvent) -> Transition {
        match self {
            ConnectionState::Connected { generation } if *generation == event.generation() => {
                Transition::Reconnect
            }
            _ => Transition::Ignore,
        }
    }

    /// The state after losing the current connection.
    pub fn disconnected(self) -> Self {
        ConnectionState::Disconnected {
            generation: self.generation(),
        }
    }

    /// The state after a successful (re)connect.
    pub fn reconnected(self) -> Self {
        ConnectionState::Connected {
            generation: self.generation() + 1,
        }
    }
}
