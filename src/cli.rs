//! CLI interface for mailprint.
//!
//! Each subcommand is non-interactive: arguments in, text or JSON out on
//! stdout, diagnostics on stderr.
//!
//! - `mailprint monitor` / `check`: run the mailbox loop continuously or once.
//! - `mailprint list|show|complete|cancel|print`: work with stored missions.
//! - `mailprint status|test-printer`: inspect the setup.
//!
//! Mission ids are matched case-insensitively (`mi-1a2b3c4d` works).

mod format;
mod mission;
mod monitor;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::Config;
use crate::model::MissionStatus;
use crate::storage::Storage;

/// mailprint: turn actionable email into printed mission briefings.
#[derive(Debug, Parser)]
#[command(name = "mailprint", version, after_long_help = WORKFLOW_HELP)]
pub struct Cli {
    /// Config file (default: $MAILPRINT_HOME/config.toml or ~/.mailprint/config.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level. `RUST_LOG` takes precedence.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

const WORKFLOW_HELP: &str = r"Workflow:
  1. mailprint check              # one pass over the mailbox
  2. mailprint list               # what came out of it
  3. mailprint show MI-1A2B3C4D   # full briefing details
  4. mailprint complete MI-1A2B3C4D

Run continuously:
  mailprint monitor --interval 5
  mailprint monitor --check-once  # one cycle, for cron";

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show last check time, printer setup, and statistics.
    Status,

    /// Run one monitor cycle and report what it did.
    Check,

    /// List missions, newest first.
    List {
        /// Only missions with this status.
        #[arg(long, value_enum)]
        status: Option<StatusArg>,

        /// Maximum number of missions to show.
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show one mission in full.
    Show {
        /// Mission id, e.g. `MI-1A2B3C4D`.
        id: String,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Mark a printed mission completed.
    Complete {
        /// Mission id.
        id: String,
    },

    /// Cancel a mission that is not yet closed.
    Cancel {
        /// Mission id.
        id: String,
    },

    /// Print a mission again. A NEW mission becomes PRINTED.
    Print {
        /// Mission id.
        id: String,
    },

    /// Print a sample briefing. The store is not touched.
    TestPrinter,

    /// Watch the mailbox continuously.
    Monitor {
        /// Minutes between checks (overrides the config file).
        #[arg(long, conflicts_with = "check_once")]
        interval: Option<u64>,

        /// Run a single cycle and exit, like `check`.
        #[arg(long)]
        check_once: bool,
    },
}

/// CLI-facing status, mapped to the domain `MissionStatus`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusArg {
    New,
    Printed,
    Completed,
    Cancelled,
}

impl StatusArg {
    fn to_domain(self) -> MissionStatus {
        match self {
            Self::New => MissionStatus::New,
            Self::Printed => MissionStatus::Printed,
            Self::Completed => MissionStatus::Completed,
            Self::Cancelled => MissionStatus::Cancelled,
        }
    }
}

/// Run a parsed command, returning an error message on failure.
pub fn run(command: Command, config: &Config, storage: &Storage) -> Result<(), String> {
    match command {
        Command::Status => monitor::cmd_status(config, storage),
        Command::Check => monitor::cmd_check(config, storage),
        Command::List {
            status,
            limit,
            json,
        } => mission::cmd_list(storage, status.map(StatusArg::to_domain), limit, json),
        Command::Show { id, json } => mission::cmd_show(storage, &id, json),
        Command::Complete { id } => {
            mission::cmd_transition(storage, &id, MissionStatus::Completed)
        }
        Command::Cancel { id } => mission::cmd_transition(storage, &id, MissionStatus::Cancelled),
        Command::Print { id } => mission::cmd_print(config, storage, &id),
        Command::TestPrinter => monitor::cmd_test_printer(config),
        Command::Monitor {
            check_once: true, ..
        } => monitor::cmd_check(config, storage),
        Command::Monitor { interval, .. } => monitor::cmd_monitor(config, storage, interval),
    }
}
