use std::time::Duration;

use clap::Parser;

use client::{format_response, send_command, ClientConfig};
use utility::{BUFFER_SIZE, DEFAULT_HOST, DEFAULT_PORT, READ_SIZE};

#[derive(Parser)]
#[command(version,
    about = "sql_state client",
    long_about = "Connects to a sql_state listener, sends one command line and\n\
                  prints the single byte acknowledgment it gets back.\n",
)]
struct Args {

    #[arg(long,
        env = "SQL_STATE_HOST",
        default_value_t = DEFAULT_HOST.to_string(),
        help = "Host name or IP of the listener",
    )]
    host: String,

    #[arg(short, long,
        env = "SQL_STATE_PORT",
        default_value_t = DEFAULT_PORT,
        value_parser = clap::value_parser!(u16).range(1..),
        help = "Port the listener is on",
    )]
    port: u16,

    #[arg(short, long,
        env = "SQL_STATE_COMMAND",
        default_value_t = String::from("?"),
        help = "Command to send, a newline is added if missing :  \n\
                \t ? list the commands         \n\
                \t 0 exit                     \n\
                \t 1 show state of database   \n\
                \t 2 show transaction log     \n\
                \t 3 update the database      \n\
                \t 4 roll database back",
    )]
    command: String,

    #[arg(short, long,
        env = "SQL_STATE_READ_SIZE",
        default_value_t = READ_SIZE as u64,
        value_parser = clap::value_parser!(u64).range(1..=BUFFER_SIZE as u64),
        help = "Bytes to ask for in the single read",
    )]
    read_size: u64,

    #[arg(short, long,
        env = "SQL_STATE_TIMEOUT_MS",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Give up on connect or read after this many milliseconds (default : wait forever)",
    )]
    timeout_ms: Option<u64>,
}

impl Args {
    fn into_config(self) -> ClientConfig {
        let mut config = ClientConfig::default().with_command_line(&self.command);
        config.host      = self.host;
        config.port      = self.port;
        config.read_size = self.read_size as usize;
        config.timeout   = self.timeout_ms.map(Duration::from_millis);
        config
    }
}

fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config();

    let response = send_command(&config).map_err(|e| {
        let phase = e.phase();
        anyhow::Error::new(e)
            .context(format!("{} phase failed talking to {}:{}", phase, config.host, config.port))
    })?;

    println!("{}", format_response(&response));
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_onto_config() {
        let config = Args::try_parse_from([
            "client", "--host", "127.0.0.1", "--port", "5000",
            "--command", "3", "--read-size", "4", "--timeout-ms", "250",
        ]).expect("Failed to parse").into_config();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 5000);
        assert_eq!(config.command, b"3\n".to_vec());
        assert_eq!(config.read_size, 4);
        assert_eq!(config.timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn bad_flags_are_rejected() {
        assert!(Args::try_parse_from(["client", "--port", "0"]).is_err());
        assert!(Args::try_parse_from(["client", "--read-size", "81"]).is_err());
        assert!(Args::try_parse_from(["client", "--timeout-ms", "0"]).is_err());
    }
}
