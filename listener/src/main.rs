// sql_state listener
// Accepts connections one after another. Each connection is a session with
// the state engine : one command per line, one reply per command, until the
// client sends `0` or hangs up. With --reply it instead answers every
// connection with fixed bytes and closes, which is handy to poke the client.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use utility::{log, Command, Utility, BUFFER_SIZE, DEFAULT_PORT};

mod engine;

use engine::{Engine, Request, STATE_PROMPT, VERSION};

#[derive(Parser)]
#[command(version,
    about = "sql_state listener",
    long_about = "Serves the sql_state engine over TCP : a one value SQLite\n\
                  database with an append-only transaction log that can be\n\
                  rolled back to any earlier state.\n",
)]
struct Args {

    #[arg(short, long,
        default_value_t = String::from("127.0.0.1"),
        help = "Address to bind",
    )]
    bind: String,

    #[arg(short, long,
        default_value_t = DEFAULT_PORT,
        help = "Port to listen on (0 lets the OS pick)",
    )]
    port: u16,

    #[arg(short, long,
        help = "Directory for data.sqlite and transaction.log.\n\
                Without it the engine lives in memory",
    )]
    data_dir: Option<PathBuf>,

    #[arg(short, long,
        help = "Skip the engine, write these bytes for every connection and close.\n\
                Empty closes the connection without a reply",
    )]
    reply: Option<String>,

    #[arg(short, long, help = "Stop after the first connection")]
    once: bool,
}

enum Responder {
    Fixed(Vec<u8>),
    Engine(Engine),
}

// Reads until a newline, the buffer fills up or the client hangs up
fn read_command(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut buffer = [0u8; BUFFER_SIZE];
    let mut filled = 0;

    while filled < BUFFER_SIZE {
        match stream.read(&mut buffer[filled..])? {
            0 => break,
            bytes_read => {
                filled += bytes_read;
                if buffer[..filled].contains(&b'\n') {
                    break;
                }
            }
        }
    }

    Ok(buffer[..filled].to_vec())
}

fn reply_fixed(mut stream: TcpStream, reply: &[u8]) -> io::Result<()> {
    let command = read_command(&mut stream)?;

    match Command::from_line(&command) {
        Some(cmd) => log!("Received {:?} : {:?}", cmd, command),
        None      => log!("Received unknown command : {:?}", command),
    }

    if !reply.is_empty() {
        stream.write_all(reply)?;
    }

    Ok(())
}

// 0 once the client is gone. A reset counts as gone too : clients that
// read a single byte and close leave the rest of the reply unread.
fn read_line(reader: &mut impl BufRead, line: &mut String) -> io::Result<usize> {
    line.clear();
    match reader.read_line(line) {
        Err(e) if e.kind() == io::ErrorKind::ConnectionReset => Ok(0),
        other => other,
    }
}

fn run_session(stream: &TcpStream, engine: &mut Engine) -> io::Result<()> {
    let mut reader = BufReader::new(stream);
    let mut writer = stream;
    let mut line = String::new();

    while read_line(&mut reader, &mut line)? != 0 {

        let mut request = match Request::parse(line.as_bytes()) {
            Some(request) => request,
            None => {
                log!("Received unknown command : {:?}", line);
                writer.write_all(b"unknown command, ? lists them\n")?;
                continue;
            }
        };

        log!("Received {:?}", request);

        // `4` alone : prompt, the state number comes on the next line
        if request == Request::Rollback(None) {
            writer.write_all(STATE_PROMPT.as_bytes())?;
            if read_line(&mut reader, &mut line)? == 0 {
                break;
            }
            match line.trim().parse() {
                Ok(state) => request = Request::Rollback(Some(state)),
                Err(_) => {
                    writer.write_all(b"invalid state number\n")?;
                    continue;
                }
            }
        }

        let reply = match engine.handle(request) {
            Ok(reply) => reply,
            Err(e) => {
                eprintln!("=> Engine failed on {:?} : {}", request, e);
                format!("error : {}\n", e)
            }
        };
        writer.write_all(reply.as_bytes())?;

        if request == Request::Exit {
            break;
        }
    }

    Ok(())
}

fn handle_client(stream: TcpStream, responder: &mut Responder) -> io::Result<()> {
    match responder {
        Responder::Fixed(reply)   => reply_fixed(stream, reply),
        Responder::Engine(engine) => run_session(&stream, engine),
    }
}

fn serve(listener: TcpListener, responder: &mut Responder, once: bool) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let peer = stream.peer_addr().map(|a| a.to_string())
                    .unwrap_or_else(|_| String::from("unknown peer"));

                match handle_client(stream, responder) {
                    Ok(()) => println!("=> Handled {}", peer),
                    Err(e) => eprintln!("=> Failed to serve {} : {}", peer, e),
                }

                if once {
                    break;
                }
            },
            Err(e) => log!("Incoming Connection failed: {}", e),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut responder = match (args.reply, &args.data_dir) {
        (Some(reply), _) => Responder::Fixed(reply.into_bytes()),
        (None, Some(dir)) => Responder::Engine(Engine::open(dir)
            .with_context(|| format!("Failed to open the engine in {}", dir.display()))?),
        (None, None) => Responder::Engine(Engine::in_memory()
            .context("Failed to start the in-memory engine")?),
    };

    let (listener, port) = Utility::create_server(&args.bind, args.port)
        .with_context(|| format!("Failed to bind {}:{}", args.bind, args.port))?;

    println!("sql_state_engine, version {}", VERSION);
    if let Responder::Engine(engine) = &responder {
        println!("=> State {} after {} logged transactions",
                 engine.state().context("Failed to read the state")?, engine.log().len());
    }
    println!("=> Listener running on {}:{}", args.bind, port);

    serve(listener, &mut responder, args.once);
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn engine_listener() -> (u16, thread::JoinHandle<()>) {
        let (listener, port) = Utility::create_server("127.0.0.1", 0).expect("Failed to bind");
        let server = thread::spawn(move || {
            let engine = Engine::in_memory().expect("Failed to start engine");
            serve(listener, &mut Responder::Engine(engine), true);
        });
        (port, server)
    }

    fn session(port: u16, input: &[u8]) -> String {
        let mut stream = Utility::connect_to_server("127.0.0.1", port, None).expect("Failed to connect");
        stream.write_all(input).expect("Failed to send");

        let mut reply = String::new();
        stream.read_to_string(&mut reply).expect("Failed to read");
        reply
    }

    #[test]
    fn acknowledges_one_client() {
        let (listener, port) = Utility::create_server("127.0.0.1", 0).expect("Failed to bind");
        let server = thread::spawn(move || serve(listener, &mut Responder::Fixed(b"A".to_vec()), true));

        assert_eq!(session(port, b"3\n"), "A");
        server.join().expect("Server panicked");
    }

    #[test]
    fn empty_reply_just_hangs_up() {
        let (listener, port) = Utility::create_server("127.0.0.1", 0).expect("Failed to bind");
        let server = thread::spawn(move || serve(listener, &mut Responder::Fixed(Vec::new()), true));

        assert!(session(port, b"?\n").is_empty());
        server.join().expect("Server panicked");
    }

    #[test]
    fn command_read_stops_at_newline() {
        let (listener, port) = Utility::create_server("127.0.0.1", 0).expect("Failed to bind");
        let reader = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("Failed to accept");
            read_command(&mut stream).expect("Failed to read")
        });

        let mut stream = Utility::connect_to_server("127.0.0.1", port, None).expect("Failed to connect");
        stream.write_all(b"4\n").expect("Failed to send");

        assert_eq!(reader.join().expect("Reader panicked"), b"4\n".to_vec());
    }

    #[test]
    fn session_updates_then_shows_state() {
        let (port, server) = engine_listener();

        let reply = session(port, b"3\n3\n1\n0\n");
        assert_eq!(reply, "database updated successfully\n\
                           database updated successfully\n\
                           value = 2\n\
                           bye\n");
        server.join().expect("Server panicked");
    }

    #[test]
    fn session_rolls_back_with_prompt() {
        let (port, server) = engine_listener();

        let reply = session(port, b"3\n3\n3\n4\n1\n1\n2\n0\n");
        let lines: Vec<&str> = reply.lines().collect();

        assert_eq!(lines[3], "Enter State Number: database successfully rebuilt");
        assert_eq!(lines[4], "value = 1");
        // the log still holds all three updates
        assert!(lines[5].starts_with("1,UPDATE"));
        assert!(lines[7].starts_with("3,UPDATE"));
        assert_eq!(lines[8], "bye");
        server.join().expect("Server panicked");
    }

    #[test]
    fn session_answers_unknown_and_bad_input() {
        let (port, server) = engine_listener();

        let reply = session(port, b"9\n4\nlots\n4 0\n1\n0\n");
        assert_eq!(reply, "unknown command, ? lists them\n\
                           Enter State Number: invalid state number\n\
                           database successfully rebuilt\n\
                           value = 0\n\
                           bye\n");
        server.join().expect("Server panicked");
    }

    #[test]
    fn session_ends_when_client_hangs_up() {
        let (port, server) = engine_listener();

        // reads one byte of the help text and leaves, like the client does
        let mut stream = Utility::connect_to_server("127.0.0.1", port, None).expect("Failed to connect");
        stream.write_all(b"?\n").expect("Failed to send");
        let mut first = [0u8; 1];
        stream.read_exact(&mut first).expect("Failed to read");
        assert_eq!(&first, b"c");
        drop(stream);

        server.join().expect("Server panicked");
    }

    #[test]
    fn flags_have_stock_defaults() {
        let args = Args::try_parse_from(["listener"]).expect("Failed to parse");
        assert_eq!(args.bind, "127.0.0.1");
        assert_eq!(args.port, 4242);
        assert_eq!(args.reply, None);
        assert_eq!(args.data_dir, None);
        assert!(!args.once);
    }
}
