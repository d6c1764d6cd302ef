//! WebSocket close codes used by the server.

/// Why the server closed a socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// Client asked to terminate the connection.
    GoingAway,
    /// A frame was not valid text.
    InvalidPayload,
    /// The client broke the protocol.
    PolicyViolation,
}

impl CloseCode {
    /// Numeric code sent in the close frame.
    pub fn code(self) -> u16 {
        match self {
            Self::GoingAway => 1001,
            Self::InvalidPayload => 1007,
            Self::PolicyViolation => 1008,
        }
    }

    /// Default close reason.
    pub fn reason(self) -> &'static str {
        match self {
            Self::GoingAway => "Connection terminated",
            Self::InvalidPayload => "Invalid message payload",
            Self::PolicyViolation => "Protocol violation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_codes() {
        assert_eq!(CloseCode::GoingAway.code(), 1001);
        assert_eq!(CloseCode::InvalidPayload.code(), 1007);
        assert_eq!(CloseCode::PolicyViolation.code(), 1008);
    }

    #[test]
    fn reasons_are_nonempty() {
        for code in [
            CloseCode::GoingAway,
            CloseCode::InvalidPayload,
            CloseCode::PolicyViolation,
        ] {
            assert!(!code.reason().is_empty());
        }
    }
}
