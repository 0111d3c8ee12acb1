use std::error::Error;
use std::fmt;
use std::io;

// Where in connect -> send -> receive an exchange stopped
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Connect,
    Send,
    Receive,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Connect => write!(f, "connect"),
            Phase::Send    => write!(f, "send"),
            Phase::Receive => write!(f, "receive"),
        }
    }
}

#[derive(Debug)]
pub enum ClientError {
    Connect { addr: String, source: io::Error },
    Send(io::Error),
    Receive(io::Error),
    EmptyResponse,
    Timeout(Phase),
    ZeroTimeout,
}

impl ClientError {

    pub fn connect(host: &str, port: u16, source: io::Error) -> ClientError {
        if is_timeout(&source) {
            return ClientError::Timeout(Phase::Connect);
        }
        ClientError::Connect { addr: format!("{}:{}", host, port), source }
    }

    pub fn send(source: io::Error) -> ClientError {
        if is_timeout(&source) {
            return ClientError::Timeout(Phase::Send);
        }
        ClientError::Send(source)
    }

    // read timeouts come back as WouldBlock on unix, TimedOut on windows
    pub fn receive(source: io::Error) -> ClientError {
        if is_timeout(&source) {
            return ClientError::Timeout(Phase::Receive);
        }
        ClientError::Receive(source)
    }

    pub fn phase(&self) -> Phase {
        match self {
            ClientError::Connect { .. }  => Phase::Connect,
            ClientError::Send(_)         => Phase::Send,
            ClientError::Receive(_)      => Phase::Receive,
            ClientError::EmptyResponse   => Phase::Receive,
            ClientError::Timeout(phase)  => *phase,
            ClientError::ZeroTimeout     => Phase::Connect,
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Connect { addr, source } => write!(f, "failed to connect to {} : {}", addr, source),
            ClientError::Send(e)                  => write!(f, "failed to send the command : {}", e),
            ClientError::Receive(e)               => write!(f, "failed to read the response : {}", e),
            ClientError::EmptyResponse            => write!(f, "empty response, listener closed without replying"),
            ClientError::Timeout(phase)           => write!(f, "timed out during {}", phase),
            ClientError::ZeroTimeout              => write!(f, "a zero timeout is not allowed, use None to wait forever"),
        }
    }
}

impl Error for ClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ClientError::Connect { source, .. } => Some(source),
            ClientError::Send(e) | ClientError::Receive(e) => Some(e),
            _ => None,
        }
    }
}
