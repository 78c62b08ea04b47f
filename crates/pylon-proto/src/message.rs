//! Inbound line classification.
//!
//! The relay engine routes every server line into one of three categories:
//! keep-alives are answered or forwarded immediately, control traffic
//! (notices, mode changes, numeric replies) goes to the server log, and
//! everything else is conversational chat awaiting delivery to a client.
//!
//! Classification looks at no more than the first two whitespace-delimited
//! fields. An IRC line is either `COMMAND args...` or
//! `:prefix COMMAND args...`, so the command of a prefixed line is always the
//! second field.

/// Category tag carried by a classified line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Liveness traffic (PING probe or PONG acknowledgment).
    KeepAlive,
    /// Server notices, mode changes, and numeric replies.
    Control,
    /// Conversational traffic awaiting delivery.
    Chat,
}

/// The first three whitespace-delimited fields of a line.
///
/// `rest` is everything after the second field, unsplit, so trailing
/// parameters keep their internal spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fields<'a> {
    /// Prefix or command.
    pub first: &'a str,
    /// Command (for prefixed lines) or first parameter.
    pub second: Option<&'a str>,
    /// Remainder of the line, unsplit.
    pub rest: Option<&'a str>,
}

/// Split a line into at most three whitespace-delimited fields.
pub fn split_fields(line: &str) -> Fields<'_> {
    let mut parts = line.splitn(3, ' ');
    Fields {
        first: parts.next().unwrap_or(""),
        second: parts.next(),
        rest: parts.next(),
    }
}

/// Classification outcome for one inbound line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// Server liveness probe; must be answered with `PONG <token>` within
    /// the same processing step, never queued.
    Probe {
        /// The probe argument to echo back, if the server sent one.
        token: Option<&'a str>,
    },
    /// Keep-alive acknowledgment; forwarded to attached clients immediately,
    /// bypassing the chat queue.
    Ack {
        /// Everything after the PONG command.
        rest: Option<&'a str>,
    },
    /// Control-log line (notice, mode change, or numeric reply).
    Control,
    /// Chat line for the replay queue.
    Chat,
}

impl LineKind<'_> {
    /// The buffer category this line belongs to.
    pub fn category(&self) -> Category {
        match self {
            Self::Probe { .. } | Self::Ack { .. } => Category::KeepAlive,
            Self::Control => Category::Control,
            Self::Chat => Category::Chat,
        }
    }
}

/// Classify one complete inbound line.
///
/// A line with fewer than two fields has no recognizable command; it falls
/// back to [`LineKind::Control`] rather than failing the whole read.
pub fn classify(line: &str) -> LineKind<'_> {
    let fields = split_fields(line);

    if fields.first == "PING" {
        return LineKind::Probe { token: fields.second };
    }

    let Some(command) = fields.second else {
        return LineKind::Control;
    };

    match command {
        "PONG" => LineKind::Ack { rest: fields.rest },
        "NOTICE" | "MODE" => LineKind::Control,
        // Numeric-reply convention: covers informational numerics (001)
        // and list-style numerics (353, 366) alike.
        _ if is_numeric(command) => LineKind::Control,
        _ => LineKind::Chat,
    }
}

/// True when the field consists entirely of ASCII digits.
fn is_numeric(field: &str) -> bool {
    !field.is_empty() && field.bytes().all(|b| b.is_ascii_digit())
}
