// State engine behind the listener
// A one row SQLite table is the state, every change also goes to an
// append-only transaction log so any earlier state can be rebuilt by
// replaying the first n entries.

use std::error::Error;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use utility::{log, Command};

pub const VERSION          : &str = "1.1";
pub const DATABASE_NAME    : &str = "data.sqlite";
pub const TRANSACTION_FILE : &str = "transaction.log";

const SCHEMA     : &str = "CREATE TABLE IF NOT EXISTS data (value INTEGER);";
const SEED       : &str = "INSERT INTO data (value) VALUES (0);";
const UPDATE_SQL : &str = "UPDATE data SET value = value + 1";

pub const HELP : &str = "commands:\n\
                         \x20? [enter] show this list \n\
                         \x200 [enter] exit \n\
                         \x201 [enter] show state of database \n\
                         \x202 [enter] print readonly transaction log \n\
                         \x203 [enter] update the database \n\
                         \x204 [enter] roll database back to state n \n";

pub const STATE_PROMPT : &str = "Enter State Number: ";

#[derive(Debug)]
pub enum EngineError {
    Sql(rusqlite::Error),
    Log(io::Error),
    CorruptLog { line: usize },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Sql(e)             => write!(f, "SQL error : {}", e),
            EngineError::Log(e)             => write!(f, "transaction log error : {}", e),
            EngineError::CorruptLog { line } => write!(f, "transaction log line {} has no ',' separator", line),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EngineError::Sql(e) => Some(e),
            EngineError::Log(e) => Some(e),
            EngineError::CorruptLog { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> EngineError {
        EngineError::Sql(e)
    }
}

impl From<io::Error> for EngineError {
    fn from(e: io::Error) -> EngineError {
        EngineError::Log(e)
    }
}

// What a client line asks for. Rollback may come without its state number,
// the session then prompts for it on the next line.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Help,
    Exit,
    ShowState,
    ShowLog,
    Update,
    Rollback(Option<usize>),
}

impl Request {

    // "3\n", "4 2\n", "4\n" ...
    pub fn parse(line: &[u8]) -> Option<Request> {
        let text = std::str::from_utf8(line).ok()?;
        let mut parts = text.split_whitespace();

        let command = Command::from_line(parts.next()?.as_bytes())?;
        let arg = parts.next();
        if parts.next().is_some() {
            return None;
        }

        match (command, arg) {
            (Command::Rollback, Some(n)) => n.parse().ok().map(|n| Request::Rollback(Some(n))),
            (Command::Rollback, None)    => Some(Request::Rollback(None)),
            (_, Some(_))                 => None,
            (Command::Help, None)        => Some(Request::Help),
            (Command::Exit, None)        => Some(Request::Exit),
            (Command::ShowState, None)   => Some(Request::ShowState),
            (Command::ShowLog, None)     => Some(Request::ShowLog),
            (Command::Update, None)      => Some(Request::Update),
        }
    }
}

// Lines are "n,statement", n counts from 1
// Kept in memory only when there is no file behind it
#[derive(Debug)]
pub struct TransactionLog {
    path    : Option<PathBuf>,
    entries : Vec<String>,
}

impl TransactionLog {

    pub fn open(path: Option<&Path>) -> Result<TransactionLog, EngineError> {
        let mut entries = Vec::new();

        if let Some(path) = path.filter(|path| path.exists()) {
            for (i, line) in fs::read_to_string(path)?.lines().enumerate() {
                match line.split_once(',') {
                    Some((_, sql)) => entries.push(sql.to_string()),
                    None => return Err(EngineError::CorruptLog { line: i + 1 }),
                }
            }
        }

        Ok(TransactionLog { path: path.map(Path::to_path_buf), entries })
    }

    // One write per transaction, returns its number
    pub fn append(&mut self, sql: &str) -> Result<usize, EngineError> {
        let number = self.entries.len() + 1;

        if let Some(path) = &self.path {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{},{}", number, sql)?;
        }

        self.entries.push(sql.to_string());
        Ok(number)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn dump(&self) -> String {
        self.entries.iter()
            .enumerate()
            .map(|(i, sql)| format!("{},{}\n", i + 1, sql))
            .collect()
    }
}

pub struct Engine {
    db  : Connection,
    log : TransactionLog,
}

impl Engine {

    // Nothing touches the disk, state is lost with the process
    pub fn in_memory() -> Result<Engine, EngineError> {
        Self::with_parts(Connection::open_in_memory()?, TransactionLog::open(None)?)
    }

    // data.sqlite and transaction.log inside `dir`, created on first use
    pub fn open(dir: &Path) -> Result<Engine, EngineError> {
        fs::create_dir_all(dir)?;
        let db = Connection::open(dir.join(DATABASE_NAME))?;
        let log = TransactionLog::open(Some(dir.join(TRANSACTION_FILE).as_path()))?;
        Self::with_parts(db, log)
    }

    fn with_parts(db: Connection, log: TransactionLog) -> Result<Engine, EngineError> {
        let engine = Engine { db, log };
        engine.apply_schema()?;
        Ok(engine)
    }

    fn apply_schema(&self) -> Result<(), EngineError> {
        self.db.execute_batch(SCHEMA)?;
        let rows: i64 = self.db.query_row("SELECT COUNT(*) FROM data", [], |row| row.get(0))?;
        if rows == 0 {
            log!("Creating database for initial use");
            self.db.execute_batch(SEED)?;
        }
        Ok(())
    }

    pub fn state(&self) -> Result<i64, EngineError> {
        Ok(self.db.query_row("SELECT value FROM data", [], |row| row.get(0))?)
    }

    pub fn log(&self) -> &TransactionLog {
        &self.log
    }

    // Logged before it is applied
    pub fn update(&mut self) -> Result<usize, EngineError> {
        let number = self.log.append(UPDATE_SQL)?;
        self.db.execute_batch(UPDATE_SQL)?;
        Ok(number)
    }

    // Rebuilds the table from the first `state` log entries.
    // The log itself is left as is, later updates keep appending to it.
    pub fn rollback(&mut self, state: usize) -> Result<usize, EngineError> {
        self.db.execute_batch("DROP TABLE IF EXISTS data;")?;
        self.apply_schema()?;

        let replay = state.min(self.log.len());
        for sql in &self.log.entries()[..replay] {
            self.db.execute_batch(sql)?;
        }

        log!("Rebuilt database from {} of {} log entries", replay, self.log.len());
        Ok(replay)
    }

    // Text sent back for a request, never empty
    pub fn handle(&mut self, request: Request) -> Result<String, EngineError> {
        match request {
            Request::Help      => Ok(HELP.to_string()),
            Request::Exit      => Ok(String::from("bye\n")),
            Request::ShowState => Ok(format!("value = {}\n", self.state()?)),

            Request::ShowLog if self.log.is_empty() => Ok(String::from("transaction log is empty\n")),
            Request::ShowLog   => Ok(self.log.dump()),

            Request::Update => {
                self.update()?;
                Ok(String::from("database updated successfully\n"))
            },

            Request::Rollback(Some(state)) => {
                self.rollback(state)?;
                Ok(String::from("database successfully rebuilt\n"))
            },

            Request::Rollback(None) => Ok(STATE_PROMPT.to_string()),
        }
    }
}
