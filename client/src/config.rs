use std::time::Duration;

use utility::{BUFFER_SIZE, DEFAULT_COMMAND, DEFAULT_HOST, DEFAULT_PORT, READ_SIZE};

// Everything one exchange needs, defaults match the stock sql_state listener
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub host      : String,
    pub port      : u16,
    pub command   : Vec<u8>,
    pub read_size : usize,             // bytes requested by the single read
    pub timeout   : Option<Duration>,  // applies to connect and read, zero is rejected
}

impl Default for ClientConfig {
    fn default() -> ClientConfig {
        ClientConfig {
            host      : DEFAULT_HOST.to_string(),
            port      : DEFAULT_PORT,
            command   : DEFAULT_COMMAND.to_vec(),
            read_size : READ_SIZE,
            timeout   : None,
        }
    }
}

impl ClientConfig {

    // Takes a command as typed by a user ("3") and makes it a line ("3\n")
    pub fn with_command_line(mut self, command: &str) -> ClientConfig {
        let mut bytes = command.as_bytes().to_vec();
        if bytes.last() != Some(&b'\n') {
            bytes.push(b'\n');
        }
        self.command = bytes;
        self
    }

    // Never zero, never past the receive buffer
    pub fn effective_read_size(&self) -> usize {
        self.read_size.clamp(1, BUFFER_SIZE)
    }
}
