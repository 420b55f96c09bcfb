//! Status-coded reply lines sent to clients.
//!
//! Every outbound line starts with a single status digit. Plain notices are the
//! digit immediately followed by text (`0Password: `); the structured private
//! chat lines separate their fields with single spaces
//! (`2 alice bob 10.0.0.7 5000`).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// Informational text, command mode continues
    Info,
    /// Terminal notice, the connection is about to close
    Terminal,
    /// Private chat accepted: `<caller> <callee> <host> <port>`
    PrivateAccepted,
    /// Yes/no question; the next line is routed as an answer
    Question,
    /// Open a listening socket and answer with its port
    PortRequest,
    /// A private side-channel was closed by `<username>`
    PrivateClosed,
}

impl StatusCode {
    pub fn digit(self) -> char {
        match self {
            StatusCode::Info => '0',
            StatusCode::Terminal => '1',
            StatusCode::PrivateAccepted => '2',
            StatusCode::Question => '3',
            StatusCode::PortRequest => '4',
            StatusCode::PrivateClosed => '5',
        }
    }

    pub fn from_digit(c: char) -> Option<Self> {
        match c {
            '0' => Some(StatusCode::Info),
            '1' => Some(StatusCode::Terminal),
            '2' => Some(StatusCode::PrivateAccepted),
            '3' => Some(StatusCode::Question),
            '4' => Some(StatusCode::PortRequest),
            '5' => Some(StatusCode::PrivateClosed),
            _ => None,
        }
    }

    /// Codes whose body is a list of space separated fields
    fn is_structured(self) -> bool {
        matches!(
            self,
            StatusCode::PrivateAccepted | StatusCode::PortRequest | StatusCode::PrivateClosed
        )
    }
}

/// One reply line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: StatusCode,
    pub body: String,
}

impl Reply {
    pub fn new(code: StatusCode, body: impl Into<String>) -> Self {
        Reply { code, body: body.into() }
    }

    pub fn info(body: impl Into<String>) -> Self {
        Reply::new(StatusCode::Info, body)
    }

    pub fn terminal(body: impl Into<String>) -> Self {
        Reply::new(StatusCode::Terminal, body)
    }

    pub fn question(body: impl Into<String>) -> Self {
        Reply::new(StatusCode::Question, body)
    }

    /// Ask `callee` to open a listener for a private chat with `caller`
    pub fn port_request(callee: &str, caller: &str) -> Self {
        Reply::new(StatusCode::PortRequest, format!("{} {}", callee, caller))
    }

    pub fn private_accepted(caller: &str, callee: &str, host: &str, port: u16) -> Self {
        Reply::new(
            StatusCode::PrivateAccepted,
            format!("{} {} {} {}", caller, callee, host, port),
        )
    }

    pub fn private_closed(username: &str) -> Self {
        Reply::new(StatusCode::PrivateClosed, username)
    }

    pub fn is_terminal(&self) -> bool {
        self.code == StatusCode::Terminal
    }

    /// Render the reply as a single wire line (no trailing newline).
    ///
    /// Embedded line breaks are folded into spaces so a reply never spans
    /// more than one frame.
    pub fn encode(&self) -> String {
        let body = self.body.replace(['\r', '\n'], " ");
        if self.code.is_structured() {
            format!("{} {}", self.code.digit(), body)
        } else {
            format!("{}{}", self.code.digit(), body)
        }
    }

    /// Parse a wire line back into a reply. Used by clients and tests.
    pub fn parse(line: &str) -> Option<Reply> {
        let mut chars = line.chars();
        let code = StatusCode::from_digit(chars.next()?)?;
        let rest = chars.as_str();
        let body = if code.is_structured() { rest.strip_prefix(' ').unwrap_or(rest) } else { rest };
        Some(Reply::new(code, body))
    }

    /// Space separated fields of a structured reply
    pub fn fields(&self) -> Vec<&str> {
        self.body.split_whitespace().collect()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
