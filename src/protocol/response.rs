use std::fmt;
use thiserror::Error;

/// Numeric codes of user-facing protocol errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProtocolErrorCode {
    NotLoggedIn = 1,
    UnknownBallotBox = 2,
    InvalidCommand = 3,
    VerificationMismatch = 4,
    NoVoterSelected = 5,
    VoterNotFound = 6,
    NotEligible = 7,
    AlreadyVoted = 8,
    VotingNotFound = 9,
    SessionTerminated = 10,
    NotPermittedNow = 11,
    VoterAlreadyQueued = 12,
    VoterNotQueued = 13,
}

impl ProtocolErrorCode {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        let code = match code {
            1 => Self::NotLoggedIn,
            2 => Self::UnknownBallotBox,
            3 => Self::InvalidCommand,
            4 => Self::VerificationMismatch,
            5 => Self::NoVoterSelected,
            6 => Self::VoterNotFound,
            7 => Self::NotEligible,
            8 => Self::AlreadyVoted,
            9 => Self::VotingNotFound,
            10 => Self::SessionTerminated,
            11 => Self::NotPermittedNow,
            12 => Self::VoterAlreadyQueued,
            13 => Self::VoterNotQueued,
            _ => return None,
        };
        Some(code)
    }

    pub fn default_message(self) -> &'static str {
        match self {
            Self::NotLoggedIn => "ballot box not logged in",
            Self::UnknownBallotBox => "unknown ballot box",
            Self::InvalidCommand => "invalid command",
            Self::VerificationMismatch => "verification letters don't match",
            Self::NoVoterSelected => "no voter selected",
            Self::VoterNotFound => "voter not found",
            Self::NotEligible => "voter may not participate in this voting",
            Self::AlreadyVoted => "vote already cast",
            Self::VotingNotFound => "voting not found",
            Self::SessionTerminated => "session terminated by a newer connection",
            Self::NotPermittedNow => "ballot box not permitted to vote now",
            Self::VoterAlreadyQueued => "voter already queued",
            Self::VoterNotQueued => "voter not queued",
        }
    }
}

impl fmt::Display for ProtocolErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A recoverable, voter-facing error answered with an `ERR` line
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code} {message}")]
pub struct ProtocolError {
    pub code: ProtocolErrorCode,
    pub message: String,
}

impl ProtocolError {
    pub fn new(code: ProtocolErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
        }
    }

    pub fn with_message(code: ProtocolErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<ProtocolErrorCode> for ProtocolError {
    fn from(code: ProtocolErrorCode) -> Self {
        Self::new(code)
    }
}

/// A single response line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok(String),
    Error(ProtocolError),
}

impl Response {
    pub fn ok(message: impl Into<String>) -> Self {
        Self::Ok(message.into())
    }

    /// `OK <message>` or `ERR <code> <message>`
    pub fn to_line(&self) -> String {
        match self {
            Self::Ok(message) => format!("OK {message}"),
            Self::Error(error) => format!("ERR {} {}", error.code.code(), error.message),
        }
    }

    /// Numeric code, 0 for success
    pub fn code(&self) -> u8 {
        match self {
            Self::Ok(_) => 0,
            Self::Error(error) => error.code.code(),
        }
    }

    /// Parse a response line, as a terminal client would
    pub fn parse(line: &str) -> Option<Self> {
        if let Some(message) = line.strip_prefix("OK ") {
            return Some(Self::ok(message));
        }
        let rest = line.strip_prefix("ERR ")?;
        let (code, message) = rest.split_once(' ').unwrap_or((rest, ""));
        let code = ProtocolErrorCode::from_code(code.parse().ok()?)?;
        Some(Self::Error(ProtocolError::with_message(code, message)))
    }
}

impl From<ProtocolError> for Response {
    fn from(error: ProtocolError) -> Self {
        Self::Error(error)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_lines() {
        assert_eq!(Response::ok("committed 2").to_line(), "OK committed 2");
        assert_eq!(
            Response::from(ProtocolError::new(ProtocolErrorCode::VoterNotQueued)).to_line(),
            "ERR 13 voter not queued"
        );
    }

    #[test]
    fn test_parse_response_line() {
        let response = Response::parse("ERR 8 vote already cast").unwrap();
        assert_eq!(response.code(), 8);
        assert_eq!(Response::parse("OK fine"), Some(Response::ok("fine")));
        assert!(Response::parse("ERR 99 nope").is_none());
        assert!(Response::parse("hello").is_none());
    }

    #[test]
    fn test_codes_round_trip_through_from_code() {
        for code in 1..=13 {
            assert_eq!(ProtocolErrorCode::from_code(code).unwrap().code(), code);
        }
        assert!(ProtocolErrorCode::from_code(0).is_none());
    }
}
