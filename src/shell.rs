use std::io::{self, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use log::error;

use crate::tftp::{self, consts, TftpClientError, TransferOpts};

/// Runs the interactive shell against `server`, resolved once up front.
/// Every command error is caught and printed; only `quit`/`exit`/`bye` or
/// end-of-input end the loop.
pub fn run(server: &str, port: u16, root_dir: &Path, cancelled: Arc<AtomicBool>) -> Result<(), TftpClientError> {
	let addr = resolve(server, port)?;

	println!("tftp-client shell -- connected to {addr}");
	println!("type 'help' for a list of commands");

	let stdin = io::stdin();
	loop {
		print!("tftp> ");
		io::stdout().flush().map_err(TftpClientError::LocalIo)?;

		let mut line = String::new();
		if stdin.read_line(&mut line).map_err(TftpClientError::LocalIo)? == 0 {
			println!();
			return Ok(());
		}
		let line = line.trim();
		if line.is_empty() {
			continue;
		}

		let mut words = line.split_whitespace();
		let Some(cmd) = words.next() else { continue };
		let rest: Vec<&str> = words.collect();

		match cmd {
			"quit" | "exit" | "bye" => return Ok(()),
			"help" => print_help(),
			"get" => run_get(addr, &rest, root_dir, &cancelled),
			"put" => run_put(addr, &rest, root_dir, &cancelled),
			other => println!("unknown command '{other}', type 'help' for a list of commands"),
		}
	}
}

fn resolve(server: &str, port: u16) -> Result<SocketAddr, TftpClientError> {
	(server, port)
		.to_socket_addrs()
		.map_err(TftpClientError::LocalIo)?
		.next()
		.ok_or_else(|| TftpClientError::LocalIo(io::Error::new(io::ErrorKind::NotFound, "no address found for host")))
}

fn print_help() {
	println!("commands:");
	println!("  get <remote> [<local>]   download a file from the server");
	println!("  put <local> [<remote>]   upload a file to the server");
	println!("  help                     show this message");
	println!("  quit | exit | bye        leave the shell");
}

fn run_get(server: SocketAddr, args: &[&str], root_dir: &Path, cancelled: &Arc<AtomicBool>) {
	let Some(&remote) = args.first() else {
		println!("usage: get <remote> [<local>]");
		return;
	};
	let local = args.get(1).map(expand_path).unwrap_or_else(|| PathBuf::from(remote));
	let local = if local.is_absolute() { local } else { root_dir.join(local) };

	match tftp::get_file(server, remote, &local, default_opts(), cancelled.clone()) {
		Ok(outcome) => println!("received {} bytes in {} blocks", outcome.bytes_transferred, outcome.blocks),
		Err(e) => print_error(&e),
	}
}

fn run_put(server: SocketAddr, args: &[&str], root_dir: &Path, cancelled: &Arc<AtomicBool>) {
	let Some(&local) = args.first() else {
		println!("usage: put <local> [<remote>]");
		return;
	};
	let local_path = expand_path(&local);
	let local_path = if local_path.is_absolute() { local_path } else { root_dir.join(local_path) };
	let remote = args.get(1).copied().unwrap_or(&local).to_string();

	match tftp::put_file(server, &local_path, &remote, default_opts(), cancelled.clone()) {
		Ok(outcome) => println!("sent {} bytes in {} blocks", outcome.bytes_transferred, outcome.blocks),
		Err(e) => print_error(&e),
	}
}

fn expand_path(raw: &&str) -> PathBuf {
	PathBuf::from(shellexpand::tilde(raw).into_owned())
}

fn default_opts() -> TransferOpts {
	TransferOpts { timeout: Duration::from_secs(consts::DEFAULT_TIMEOUT_SECS), max_retries: consts::DEFAULT_MAX_RETRIES }
}

fn print_error(e: &TftpClientError) {
	println!("Error: {e}");
	error!("{e}");
}
