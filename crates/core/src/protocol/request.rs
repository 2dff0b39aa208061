use crate::error::{ParseErrorKind, Result};

/// Control-channel command, validated at the parse boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Bind a media source and register the client's data port.
    Setup { client_port: u16 },
    Play,
    Pause,
    Teardown,
    /// List registered media source names.
    List,
    /// Rebind the session to another source; always carries a target.
    Switch,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Setup { .. } => "SETUP",
            Self::Play => "PLAY",
            Self::Pause => "PAUSE",
            Self::Teardown => "TEARDOWN",
            Self::List => "LIST",
            Self::Switch => "SWITCH",
        }
    }
}

/// A parsed control request.
///
/// Wire format, one field per line:
///
/// ```text
/// <COMMAND> [<target-name>]
/// <sequence-number>
/// [RTSP/1.0 RTP/UDP <client-data-port>]    (SETUP only)
/// ```
///
/// Lines may end in `\n` or `\r\n`, and the final line needs no terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    /// Media name from the command line. On anything but SETUP (and on
    /// SETUP once a session is bound) it asks for a source switch.
    pub target: Option<String>,
    /// Client-chosen sequence number, echoed back as `CSeq`.
    pub cseq: u32,
}

impl Request {
    /// Tokenize one request message.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut lines = raw.lines().map(str::trim).skip_while(|l| l.is_empty());

        let command_line = lines.next().ok_or(ParseErrorKind::EmptyRequest)?;
        let mut tokens = command_line.split_whitespace();
        let word = tokens.next().ok_or(ParseErrorKind::EmptyRequest)?;
        let target = tokens.next().map(str::to_string);
        if tokens.next().is_some() {
            return Err(ParseErrorKind::UnexpectedToken.into());
        }

        let cseq = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or(ParseErrorKind::MissingSequence)?
            .parse::<u32>()
            .map_err(|_| ParseErrorKind::InvalidSequence)?;

        let command = match word {
            "SETUP" => {
                let transport = lines
                    .next()
                    .filter(|l| !l.is_empty())
                    .ok_or(ParseErrorKind::MissingTransport)?;
                Command::Setup {
                    client_port: parse_client_port(transport)?,
                }
            }
            "PLAY" => Command::Play,
            "PAUSE" => Command::Pause,
            "TEARDOWN" => Command::Teardown,
            "LIST" => Command::List,
            "SWITCH" => {
                if target.is_none() {
                    return Err(ParseErrorKind::MissingTarget.into());
                }
                Command::Switch
            }
            _ => return Err(ParseErrorKind::UnknownCommand.into()),
        };

        Ok(Request {
            command,
            target,
            cseq,
        })
    }
}

/// Extract the client data port from `RTSP/1.0 RTP/UDP <port>`.
///
/// Only the trailing token matters; the protocol names in front of it are
/// informational.
fn parse_client_port(line: &str) -> Result<u16> {
    line.split_whitespace()
        .last()
        .and_then(|port| port.parse::<u16>().ok())
        .filter(|port| *port != 0)
        .ok_or_else(|| ParseErrorKind::InvalidTransport.into())
}
