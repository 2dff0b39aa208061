//! Error types for the video-on-demand server.

use std::fmt;

/// Errors that can occur in the streaming server.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Protocol**: [`Parse`](Self::Parse) for malformed control requests,
///   [`MalformedPacket`](Self::MalformedPacket) for truncated data packets.
/// - **Transport**: [`Io`](Self::Io) for socket and file failures.
/// - **Media**: [`SourceNotFound`](Self::SourceNotFound).
/// - **Streaming**: [`StreamPanicked`](Self::StreamPanicked).
/// - **Server**: [`NotStarted`](Self::NotStarted),
///   [`AlreadyRunning`](Self::AlreadyRunning).
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a control-channel request.
    #[error("request parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// A data-channel packet was shorter than the fixed header.
    #[error("malformed packet: {len} bytes, header needs {needed}")]
    MalformedPacket { len: usize, needed: usize },

    /// No media source with the given name is registered.
    #[error("media source not found: {0}")]
    SourceNotFound(String),

    /// The streaming thread panicked and its frame source was lost.
    #[error("streaming task panicked for session {0}")]
    StreamPanicked(u32),

    /// [`Server::local_addr`](crate::Server::local_addr) was queried before
    /// [`Server::start`](crate::Server::start).
    #[error("server not started")]
    NotStarted,

    /// [`Server::start`](crate::Server::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,
}

/// Specific kind of request parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Input was empty (no command line).
    EmptyRequest,
    /// The command word is not one the server understands.
    UnknownCommand,
    /// The sequence-number line is missing.
    MissingSequence,
    /// The sequence-number line is not a decimal number.
    InvalidSequence,
    /// SETUP arrived without its transport line.
    MissingTransport,
    /// The transport line does not end in a valid UDP port.
    InvalidTransport,
    /// SWITCH arrived without a target name.
    MissingTarget,
    /// The command line carries more than a command and a target.
    UnexpectedToken,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRequest => write!(f, "empty request"),
            Self::UnknownCommand => write!(f, "unknown command"),
            Self::MissingSequence => write!(f, "missing sequence number"),
            Self::InvalidSequence => write!(f, "invalid sequence number"),
            Self::MissingTransport => write!(f, "missing transport line"),
            Self::InvalidTransport => write!(f, "invalid transport line"),
            Self::MissingTarget => write!(f, "missing target name"),
            Self::UnexpectedToken => write!(f, "unexpected token on command line"),
        }
    }
}

impl From<ParseErrorKind> for RtspError {
    fn from(kind: ParseErrorKind) -> Self {
        RtspError::Parse { kind }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;
