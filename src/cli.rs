use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use simple_logger::SimpleLogger;

use crate::tftp::consts;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Options {
	#[arg(value_enum, short = 'v', long = "debug",
		default_value_t = DebugLevel::Warn,
		help = "Log verbosity", global = true
	)]
	pub debug: DebugLevel,

	#[arg(short = 'r', long = "root", global = true,
		help = "Working directory local file paths are resolved against"
	)]
	pub root_dir: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Option<Command>,

	/// Server to connect to when no subcommand is given; launches the
	/// interactive shell.
	pub server: Option<String>,

	#[arg(short = 'p', long = "port", default_value_t = consts::TFTP_LISTEN_PORT)]
	pub port: u16,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum DebugLevel {
	Off,
	Error,
	#[default]
	Warn,
	Info,
	Debug,
	Trace,
}
impl From<DebugLevel> for log::LevelFilter {
	fn from(value: DebugLevel) -> Self {
		match value {
			DebugLevel::Off => Self::Off,
			DebugLevel::Error => Self::Error,
			DebugLevel::Warn => Self::Warn,
			DebugLevel::Info => Self::Info,
			DebugLevel::Debug => Self::Debug,
			DebugLevel::Trace => Self::Trace,
		}
	}
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// One-shot download.
	Get {
		#[command(flatten)]
		opts: TransferArgs,
	},
	/// One-shot upload.
	Put {
		#[command(flatten)]
		opts: TransferArgs,
	},
}

#[derive(Debug, Args)]
pub struct TransferArgs {
	#[arg(help = "The remote server to connect to (IP or hostname).")]
	pub server: String,

	#[arg(help = "Source file.")]
	pub source_file: PathBuf,

	#[arg(help = "Destination filename (defaults to the source filename).")]
	pub dest_file: Option<PathBuf>,

	#[arg(short = 'p', long = "port", default_value_t = consts::TFTP_LISTEN_PORT)]
	pub port: u16,

	#[arg(long, default_value_t = consts::DEFAULT_TIMEOUT_SECS,
		help = "Inactivity timeout per reply wait, in seconds"
	)]
	pub timeout: u64,

	#[arg(long, default_value_t = consts::DEFAULT_MAX_RETRIES,
		help = "Retransmission budget per wait"
	)]
	pub retries: u8,
}

pub fn init_logger(debug_level: DebugLevel) {
	SimpleLogger::new().with_level(debug_level.into()).env().init().unwrap();
}
