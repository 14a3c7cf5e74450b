use std::net::ToSocketAddrs;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::cli::TransferArgs;
use crate::tftp::{self, TftpClientError, TransferOpts};

fn resolve(server: &str, port: u16) -> Result<std::net::SocketAddr, TftpClientError> {
	(server, port)
		.to_socket_addrs()
		.map_err(TftpClientError::LocalIo)?
		.next()
		.ok_or_else(|| TftpClientError::LocalIo(std::io::Error::new(std::io::ErrorKind::NotFound, "no address found for host")))
}

fn opts(args: &TransferArgs) -> TransferOpts {
	TransferOpts { timeout: std::time::Duration::from_secs(args.timeout), max_retries: args.retries }
}

/// Runs a single `get` and reports the outcome to the log. Errors are
/// logged, not propagated, so a one-shot CLI invocation exits cleanly with
/// a nonzero status via `main`'s own error handling.
pub fn run_get(args: TransferArgs, root_dir: &std::path::Path, cancelled: Arc<AtomicBool>) -> Result<(), TftpClientError> {
	let server = resolve(&args.server, args.port)?;
	let source = args.source_file.to_string_lossy().into_owned();
	let dest = dest_path(root_dir, args.dest_file.as_deref(), &args.source_file);

	let outcome = tftp::get_file(server, &source, &dest, opts(&args), cancelled)?;
	println!("received {} bytes in {} blocks", outcome.bytes_transferred, outcome.blocks);
	Ok(())
}

/// Runs a single `put`. See `run_get` for error-handling conventions.
pub fn run_put(args: TransferArgs, root_dir: &std::path::Path, cancelled: Arc<AtomicBool>) -> Result<(), TftpClientError> {
	let server = resolve(&args.server, args.port)?;
	let source = resolve_local(root_dir, &args.source_file);
	let dest = args.dest_file.unwrap_or_else(|| args.source_file.clone());
	let dest = dest.to_string_lossy().into_owned();

	let outcome = tftp::put_file(server, &source, &dest, opts(&args), cancelled)?;
	println!("sent {} bytes in {} blocks", outcome.bytes_transferred, outcome.blocks);
	Ok(())
}

fn resolve_local(root_dir: &std::path::Path, path: &std::path::Path) -> PathBuf {
	if path.is_absolute() {
		path.to_path_buf()
	} else {
		root_dir.join(path)
	}
}

fn dest_path(root_dir: &std::path::Path, dest: Option<&std::path::Path>, source: &std::path::Path) -> PathBuf {
	let name = dest.unwrap_or(source);
	resolve_local(root_dir, name)
}
