use std::io;
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

// log macro, works same as eprintln macro
// will print only in debug mode
// will not show output in release mode
// goes to stderr, stdout carries the response
#[macro_export]
macro_rules! log {
    ($($arg:tt)*) => {
        if cfg!(debug_assertions) {
            eprintln!($($arg)*);
        }
    };
}

pub const DEFAULT_HOST    : &str   = "localhost";
pub const DEFAULT_PORT    : u16    = 4242;
pub const DEFAULT_COMMAND : &[u8]  = b"?\n";   // ask the engine for its command list
pub const BUFFER_SIZE     : usize  = 80;
pub const READ_SIZE       : usize  = 1;

// Commands understood by the sql state engine, one ASCII char per line
#[derive(FromPrimitive, Copy, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Help      = 0x3F,  // '?'
    Exit      = 0x30,  // '0'
    ShowState = 0x31,  // '1'
    ShowLog   = 0x32,  // '2'
    Update    = 0x33,  // '3'
    Rollback  = 0x34,  // '4'
}

impl Command {

    // Decodes a command line such as b"3\n"
    // Anything other than a single known char (line ending ignored) is None
    pub fn from_line(line: &[u8]) -> Option<Command> {
        let mut end = line.len();
        while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
            end -= 1;
        }

        match &line[..end] {
            [byte] => FromPrimitive::from_u8(*byte),
            _      => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

pub struct Utility;

impl Utility {

    // Connects to a socket server
    // With a timeout every resolved address is tried in turn,
    // the last failure is the one reported
    pub fn connect_to_server(host: &str, port: u16, timeout: Option<Duration>) -> io::Result<TcpStream> {
        let timeout = match timeout {
            Some(timeout) => timeout,
            None => return TcpStream::connect((host, port)),
        };

        let mut last_err = io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{}:{} did not resolve to any address", host, port),
        );

        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    log!("Connecting to {} failed : {}", addr, e);
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }

    // create a socket server, port 0 lets the OS pick one
    pub fn create_server(host: &str, port: u16) -> io::Result<(TcpListener, u16)> {
        let listener = TcpListener::bind((host, port))?;
        let port_num = listener.local_addr()?.port();

        Ok((listener, port_num))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_commands() {
        assert_eq!(Command::from_line(b"?\n"), Some(Command::Help));
        assert_eq!(Command::from_line(b"0\n"), Some(Command::Exit));
        assert_eq!(Command::from_line(b"3\r\n"), Some(Command::Update));
        assert_eq!(Command::from_line(b"4"), Some(Command::Rollback));
    }

    #[test]
    fn rejects_unknown_or_long_lines() {
        assert_eq!(Command::from_line(b""), None);
        assert_eq!(Command::from_line(b"\n"), None);
        assert_eq!(Command::from_line(b"9\n"), None);
        assert_eq!(Command::from_line(b"33\n"), None);
    }

    #[test]
    fn default_command_is_help() {
        assert_eq!(Command::from_line(DEFAULT_COMMAND), Some(Command::Help));
        assert_eq!(Command::Help.as_byte(), b'?');
    }

    #[test]
    fn server_and_client_meet() {
        let (listener, port) = Utility::create_server("127.0.0.1", 0)
            .expect("Failed to bind");
        assert_ne!(port, 0);

        let stream = Utility::connect_to_server("127.0.0.1", port, Some(Duration::from_secs(2)))
            .expect("Failed to connect");
        let (accepted, _) = listener.accept().expect("Failed to accept");

        assert_eq!(stream.local_addr().unwrap(), accepted.peer_addr().unwrap());
    }
}
