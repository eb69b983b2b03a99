//! Operator console: line commands on stdin that inject inputs and inspect
//! tags while the scan loop runs.

use crate::output::render_table;
use ladder_core::io::IoStatus;
use ladder_core::loader::validate_tag_name;
use ladder_core::tags::{is_system_tag, CYCLE_COUNT, ERROR, RUNNING, SCAN_TIME};
use ladder_core::{SimulationHandle, TagStore};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;

pub const HELP: &str = "\
commands:
  set <TAG> <0|1>   set an input (or any non-_SYSTEM tag when none is bound)
  toggle <TAG>      flip a simulated input
  get <TAG>         show one tag
  tags              show every tag
  status            show runtime and I/O status
  quit              stop the runtime";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Set { tag: String, value: bool },
    Toggle(String),
    Get(String),
    Tags,
    Status,
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let command = match words.as_slice() {
            [] => return Ok(None),
            ["set", tag, value] => Command::Set {
                tag: tag.to_string(),
                value: parse_bool(value)?,
            },
            ["toggle", tag] => Command::Toggle(tag.to_string()),
            ["get", tag] => Command::Get(tag.to_string()),
            ["tags"] => Command::Tags,
            ["status"] => Command::Status,
            ["help"] | ["?"] => Command::Help,
            ["quit"] | ["exit"] => Command::Quit,
            [verb, ..] => return Err(format!("unrecognized command '{verb}'; try 'help'")),
        };
        Ok(Some(command))
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" => Ok(false),
        _ => Err(format!("expected 0 or 1, got '{value}'")),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Reply(String),
    Quit,
}

/// Stimulus actor. Shares the tag store and simulation handle with the
/// running scheduler.
pub struct Console {
    store: TagStore,
    simulation: Option<SimulationHandle>,
    io_status: Option<IoStatus>,
}

impl Console {
    pub fn new(
        store: TagStore,
        simulation: Option<SimulationHandle>,
        io_status: Option<IoStatus>,
    ) -> Self {
        Self {
            store,
            simulation,
            io_status,
        }
    }

    fn simulated_input(&self, tag: &str) -> Option<&SimulationHandle> {
        self.simulation
            .as_ref()
            .filter(|sim| sim.inputs().contains_key(tag))
    }

    pub fn execute(&self, command: Command) -> Outcome {
        let reply = match command {
            Command::Set { tag, value } => self.set(&tag, value),
            Command::Toggle(tag) => match self
                .simulation
                .as_ref()
                .and_then(|s| s.toggle_input(&tag))
            {
                Some(value) => format!("{tag} <- {value} (latched next scan)"),
                None => format!("'{tag}' is not a simulated input"),
            },
            Command::Get(tag) => match self.store.snapshot().get(&tag) {
                Some(value) => format!("{tag} = {value}"),
                None => format!("{tag} is not set"),
            },
            Command::Tags => {
                let rows: Vec<Vec<String>> = self
                    .store
                    .snapshot()
                    .into_iter()
                    .map(|(name, value)| vec![name, value.to_string()])
                    .collect();
                render_table(&["TAG", "VALUE"], &rows).trim_end().to_string()
            }
            Command::Status => self.status(),
            Command::Help => HELP.to_string(),
            Command::Quit => return Outcome::Quit,
        };
        Outcome::Reply(reply)
    }

    fn set(&self, tag: &str, value: bool) -> String {
        if let Some(sim) = self.simulated_input(tag) {
            sim.set_input(tag, value);
            return format!("{tag} <- {value} (latched next scan)");
        }
        if let Err(e) = validate_tag_name(tag) {
            return e.to_string();
        }
        if is_system_tag(tag) {
            return format!("'{tag}' is owned by the runtime and cannot be set");
        }
        self.store.set(tag, value);
        format!("{tag} = {value}")
    }

    fn status(&self) -> String {
        let mut lines = vec![
            format!("running:    {}", self.store.get_bool(RUNNING, false)),
            format!("error:      {}", self.store.get_bool(ERROR, false)),
            format!("cycles:     {}", self.store.get_int(CYCLE_COUNT, 0)),
            format!("scan time:  {:.2} ms", self.store.get_real(SCAN_TIME, 0.0)),
        ];
        match &self.io_status {
            Some(io) => {
                lines.push(format!("I/O mode:   {}", io.mode));
                for point in &io.inputs {
                    lines.push(format!("  in  {:<16} pin {}", point.tag, point.pin));
                }
                for point in &io.outputs {
                    lines.push(format!("  out {:<16} pin {}", point.tag, point.pin));
                }
            }
            None => lines.push("I/O mode:   none".to_string()),
        }
        lines.join("\n")
    }

    /// Read commands until `quit` or end of input, then request shutdown.
    pub async fn run<R>(self, reader: R, shutdown: watch::Sender<bool>)
    where
        R: AsyncBufRead + Unpin,
    {
        println!("{HELP}");
        let mut lines = reader.lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    tracing::error!(error = %err, "console read failed");
                    break;
                }
            };
            match Command::parse(&line) {
                Ok(None) => continue,
                Ok(Some(command)) => match self.execute(command) {
                    Outcome::Reply(text) => println!("{text}"),
                    Outcome::Quit => break,
                },
                Err(msg) => println!("{msg}"),
            }
        }
        tracing::info!("console closed; stopping");
        let _ = shutdown.send(true);
    }
}
