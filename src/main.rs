//! `qtest`: runs a line-oriented command script against a single queue handle.

use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{debug, warn};

use string_queue::queue::handle::{
    queue_free, queue_insert_head, queue_insert_tail, queue_new, queue_remove_head, queue_reverse,
    queue_size,
};
use string_queue::{Inserted, StringQueue};

const HELP: &str = "\
commands:
  new                  free the current queue and create an empty one
  free                 free the current queue
  ih <str> [n]         insert <str> at head, n times
  it <str> [n]         insert <str> at tail, n times
  rh [expected]        remove head, optionally checking its value
  size [expected]      print size, optionally checking it
  reverse              reverse the queue in place
  show                 print size, head and tail
  help                 print this message
  quit                 stop reading commands";

#[derive(Debug, Parser)]
#[command(name = "qtest", about = "Drive a string queue from a command script")]
struct Cli {
    /// Read commands from this file instead of stdin
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Capacity of the buffer removed values are copied into
    #[arg(long, default_value_t = 1024)]
    buf_size: usize,

    /// Echo each command before its result
    #[arg(long)]
    echo: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    New,
    Free,
    InsertHead { value: String, count: usize },
    InsertTail { value: String, count: usize },
    RemoveHead { expected: Option<String> },
    Size { expected: Option<usize> },
    Reverse,
    Show,
    Help,
    Quit,
}

fn parse_number(word: &str) -> Result<usize> {
    word.parse()
        .with_context(|| format!("expected a number, got '{}'", word))
}

/// Parses one script line. Blank lines and comments yield `None`.
fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.split('#').next().unwrap_or("");
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let cmd = match (name, args.as_slice()) {
        ("new", []) => Command::New,
        ("free", []) => Command::Free,
        ("ih", [value]) => Command::InsertHead {
            value: value.to_string(),
            count: 1,
        },
        ("ih", [value, n]) => Command::InsertHead {
            value: value.to_string(),
            count: parse_number(n)?,
        },
        ("it", [value]) => Command::InsertTail {
            value: value.to_string(),
            count: 1,
        },
        ("it", [value, n]) => Command::InsertTail {
            value: value.to_string(),
            count: parse_number(n)?,
        },
        ("rh", []) => Command::RemoveHead { expected: None },
        ("rh", [expected]) => Command::RemoveHead {
            expected: Some(expected.to_string()),
        },
        ("size", []) => Command::Size { expected: None },
        ("size", [n]) => Command::Size {
            expected: Some(parse_number(n)?),
        },
        ("reverse", []) => Command::Reverse,
        ("show", []) => Command::Show,
        ("help", []) => Command::Help,
        ("quit", []) => Command::Quit,
        (name, _) => bail!("unknown command or wrong arguments: '{}'", name),
    };
    Ok(Some(cmd))
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

type InsertFn = fn(Option<&mut StringQueue>, &str) -> string_queue::queue::Result<Inserted>;

struct Driver {
    queue: Option<Box<StringQueue>>,
    buf: Vec<u8>,
    failures: usize,
}

impl Driver {
    fn new(buf_size: usize) -> Self {
        Self {
            queue: None,
            buf: vec![0; buf_size],
            failures: 0,
        }
    }

    fn fail(&mut self, out: &mut impl Write, cmd: &str, reason: impl Display) -> io::Result<()> {
        self.failures += 1;
        writeln!(out, "{} failed: {}", cmd, reason)
    }

    fn show(&self, out: &mut impl Write) -> io::Result<()> {
        match self.queue.as_deref() {
            None => writeln!(out, "q = NULL"),
            Some(q) => writeln!(
                out,
                "q = [size {}, head {:?}, tail {:?}]",
                q.size(),
                q.peek_head(),
                q.peek_tail()
            ),
        }
    }

    fn insert(
        &mut self,
        out: &mut impl Write,
        cmd: &str,
        value: &str,
        count: usize,
        op: InsertFn,
    ) -> io::Result<()> {
        for _ in 0..count {
            match op(self.queue.as_deref_mut(), value) {
                Ok(Inserted::Counted) => {}
                Ok(Inserted::CountOverflow) => {
                    writeln!(out, "{}: size overflow, count not incremented", cmd)?
                }
                Err(e) => return self.fail(out, cmd, e),
            }
        }
        self.show(out)
    }

    fn execute(&mut self, cmd: Command, out: &mut impl Write) -> Result<Flow> {
        debug!(?cmd, "executing");
        match cmd {
            Command::New => {
                queue_free(self.queue.take());
                self.queue = queue_new();
                match self.queue {
                    Some(_) => self.show(out)?,
                    None => self.fail(out, "new", "queue allocation failed")?,
                }
            }
            Command::Free => {
                queue_free(self.queue.take());
                self.show(out)?;
            }
            Command::InsertHead { value, count } => {
                self.insert(out, "ih", &value, count, queue_insert_head)?
            }
            Command::InsertTail { value, count } => {
                self.insert(out, "it", &value, count, queue_insert_tail)?
            }
            Command::RemoveHead { expected } => {
                match queue_remove_head(self.queue.as_deref_mut(), Some(&mut self.buf[..])) {
                    Ok(()) => {
                        let end = self.buf.iter().position(|&b| b == 0).unwrap_or(0);
                        let removed = String::from_utf8_lossy(&self.buf[..end]).into_owned();
                        writeln!(out, "removed {:?}", removed)?;
                        if let Some(expected) = expected {
                            if expected != removed {
                                let reason = format!("expected {:?}, removed {:?}", expected, removed);
                                self.fail(out, "rh", reason)?;
                            }
                        }
                    }
                    Err(e) => self.fail(out, "rh", e)?,
                }
            }
            Command::Size { expected } => {
                let size = queue_size(self.queue.as_deref());
                writeln!(out, "size = {}", size)?;
                if let Some(expected) = expected {
                    if expected != size {
                        self.fail(out, "size", format!("expected {}, got {}", expected, size))?;
                    }
                }
            }
            Command::Reverse => {
                queue_reverse(self.queue.as_deref_mut());
                self.show(out)?;
            }
            Command::Show => self.show(out)?,
            Command::Help => writeln!(out, "{}", HELP)?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Runs every command in `input`, returning the number of failures.
    fn run_script(
        &mut self,
        input: impl BufRead,
        out: &mut impl Write,
        echo: bool,
    ) -> Result<usize> {
        for (lineno, line) in input.lines().enumerate() {
            let line = line.context("failed to read command")?;
            if echo {
                writeln!(out, "cmd> {}", line.trim())?;
            }
            let cmd = match parse_command(&line) {
                Ok(Some(cmd)) => cmd,
                Ok(None) => continue,
                Err(e) => {
                    self.fail(out, &format!("line {}", lineno + 1), format!("{:#}", e))?;
                    continue;
                }
            };
            if self.execute(cmd, out)? == Flow::Quit {
                break;
            }
        }
        queue_free(self.queue.take());
        Ok(self.failures)
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

fn run(cli: &Cli) -> Result<usize> {
    let input: Box<dyn BufRead> = match &cli.file {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(io::stdin().lock()),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    Driver::new(cli.buf_size).run_script(input, &mut out, cli.echo)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failures) => {
            warn!(failures, "some commands failed");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
