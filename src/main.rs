use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use clap::Parser;
use log::{debug, error, info};

use tftp_client::{cli, client, shell};

static WORKING_DIR: OnceLock<PathBuf> = OnceLock::new();

/**
 * Shortcut used to get working dir without needing to check or unwrap everytime.
 * This OnceLock will be initialized in early main, if init fails then we stop the program.
 * Thus, it's safe to just unwrap it.
 */
fn working_dir<'a>() -> &'a PathBuf {
	WORKING_DIR.get().unwrap()
}

fn main() -> ExitCode {
	let options = cli::Options::parse();

	/* Initialize logging facility; can unwrap here because it has a default value */
	cli::init_logger(options.debug);

	/* Handle the global args here */
	if let Some(root_dir) = options.root_dir {
		match root_dir.try_exists() {
			Ok(true) => WORKING_DIR.set(root_dir.clone()).unwrap_or(()),
			_ => {
				error!("Cannot find/access specified root path!");
				return ExitCode::FAILURE;
			}
		}
	} else {
		match std::env::current_dir() {
			Ok(cwd) => WORKING_DIR.set(cwd).unwrap_or(()),
			Err(e) => {
				error!("Cannot access current working dir: {e}!");
				return ExitCode::FAILURE;
			}
		}
	}

	/* From here on its safe to read + unwrap all globals, they are either initialised or we weren't here */
	debug!("working dir '{}'", working_dir().display());

	let cancelled = Arc::new(AtomicBool::new(false));
	let sigint_flag = cancelled.clone();

	/* Let's handle SIGINT on our own so a blocking receive can be interrupted promptly */
	if let Err(e) = ctrlc::set_handler(move || {
		info!("Received SIGINT");
		sigint_flag.store(true, Ordering::Relaxed);
	}) {
		error!("Failed to install SIGINT handler: {e}");
		return ExitCode::FAILURE;
	}

	let res = match options.command {
		Some(cli::Command::Get { opts }) => client::run_get(opts, working_dir(), cancelled),
		Some(cli::Command::Put { opts }) => client::run_put(opts, working_dir(), cancelled),
		None => match options.server {
			Some(server) => shell::run(&server, options.port, working_dir(), cancelled),
			None => {
				error!("No server given; usage: tftp-client [-p PORT] <server> or tftp-client get|put ...");
				return ExitCode::FAILURE;
			}
		},
	};

	if let Err(e) = res {
		eprintln!("Error: {e}");
		error!("{e}");
		return ExitCode::FAILURE;
	}

	ExitCode::SUCCESS
}
