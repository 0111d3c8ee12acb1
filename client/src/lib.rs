// Client side of the sql_state listener
// One exchange : connect, send a command line, read the acknowledgment, close.
// The stream lives only inside send_command, so it is closed on every return path.

use std::io::{self, Read, Write};
use std::time::Duration;

use utility::{log, Command, Utility, BUFFER_SIZE};

mod config;
mod error;

pub use config::ClientConfig;
pub use error::{ClientError, Phase};

pub fn send_command(config: &ClientConfig) -> Result<Vec<u8>, ClientError> {

    // std refuses a zero socket timeout, catch it before opening anything
    if config.timeout == Some(Duration::ZERO) {
        return Err(ClientError::ZeroTimeout);
    }

    let mut stream = Utility::connect_to_server(&config.host, config.port, config.timeout)
        .map_err(|e| ClientError::connect(&config.host, config.port, e))?;

    log!("Connected to {}:{}", config.host, config.port);

    match Command::from_line(&config.command) {
        Some(cmd) => log!("Sending {:?} : {:?}", cmd, config.command),
        None      => log!("Sending raw : {:?}", config.command),
    }

    stream.write_all(&config.command).map_err(ClientError::send)?;

    if config.timeout.is_some() {
        stream.set_read_timeout(config.timeout).map_err(ClientError::receive)?;
    }

    // Buffer holds BUFFER_SIZE but only read_size is asked for, in one read
    let mut buffer = [0u8; BUFFER_SIZE];
    let read_size = config.effective_read_size();

    loop {
        match stream.read(&mut buffer[..read_size]) {
            Ok(0) => return Err(ClientError::EmptyResponse),

            Ok(bytes_read) => {
                log!("Received [{}] : {:?}", bytes_read, &buffer[..bytes_read]);
                return Ok(buffer[..bytes_read].to_vec());
            }

            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ClientError::receive(e)),
        }
    }
}

// Renders bytes the way a byte string literal reads : b'A', b'\n', b'\x00'
pub fn format_response(bytes: &[u8]) -> String {
    let mut out = String::from("b'");
    for &byte in bytes {
        match byte {
            b'"' => out.push('"'),
            _    => out.extend(std::ascii::escape_default(byte).map(char::from)),
        }
    }
    out.push('\'');
    out
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printable_bytes_stay_as_is() {
        assert_eq!(format_response(b"A"), "b'A'");
        assert_eq!(format_response(b"OK"), "b'OK'");
        assert_eq!(format_response(b"\"q\""), "b'\"q\"'");
    }

    #[test]
    fn other_bytes_are_escaped() {
        assert_eq!(format_response(b"\n"), "b'\\n'");
        assert_eq!(format_response(&[0x00]), "b'\\x00'");
        assert_eq!(format_response(&[0xff]), "b'\\xff'");
        assert_eq!(format_response(b"'"), "b'\\''");
        assert_eq!(format_response(b""), "b''");
    }
}
