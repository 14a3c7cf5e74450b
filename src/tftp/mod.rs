//! The TFTP (RFC 1350) protocol engine: wire codec, transport session, and
//! the Reader/Writer transfer state machines. Everything in this module and
//! its children is synchronous and drives exactly one transfer at a time;
//! concurrency (if any) belongs to the caller, not to this engine.

pub mod consts {
	pub const TFTP_LISTEN_PORT: u16 = 69;
	pub const DEFAULT_BLOCK_SIZE: usize = 512;
	/// Inactivity timeout per reply wait, in seconds.
	pub const DEFAULT_TIMEOUT_SECS: u64 = 25;
	/// Retry budget per wait before a transfer fails.
	pub const DEFAULT_MAX_RETRIES: u8 = 5;
}

pub mod error;
pub mod packet;
pub mod session;
pub mod reader;
pub mod writer;

use std::fmt::Display;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub use error::TftpClientError;
pub use session::TransferOpts;

/// Transfer mode requested on the wire. `netascii` and `mail` are accepted
/// on decode (so a server that insists on them is at least recognisable)
/// but the client only ever originates `octet` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
	NetAscii,
	Octet,
	Mail,
}
impl Mode {
	pub fn parse(input: &str) -> Option<Self> {
		match input.to_ascii_lowercase().as_str() {
			"netascii" => Some(Self::NetAscii),
			"octet" => Some(Self::Octet),
			"mail" => Some(Self::Mail),
			_ => None,
		}
	}
	pub fn as_str(self) -> &'static str {
		match self {
			Self::NetAscii => "netascii",
			Self::Octet => "octet",
			Self::Mail => "mail",
		}
	}
}
impl Display for Mode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// Outcome of a successful transfer, reported back to the CLI/shell layer.
#[derive(Debug, Clone, Copy)]
pub struct TransferOutcome {
	pub bytes_transferred: u64,
	pub blocks: u32,
}

/// Block-number successor/predecessor helpers: once a transfer has passed
/// block 65535 the next block number wraps to 0 rather than overflowing.
/// Equality comparisons on plain `u16` values are already modulo-2^16, so
/// Reader/Writer only need these two helpers to move the cursor without
/// panicking on overflow.
pub(crate) fn next_block(n: u16) -> u16 {
	n.wrapping_add(1)
}
pub(crate) fn prev_block(n: u16) -> u16 {
	n.wrapping_sub(1)
}

/// Downloads `remote_filename` from `server`, writing it to `local_path`.
/// `cancelled` is checked between receive polls so a caller can interrupt
/// an in-flight transfer, e.g. from a SIGINT handler.
pub fn get_file(
	server: SocketAddr,
	remote_filename: &str,
	local_path: &Path,
	opts: TransferOpts,
	cancelled: Arc<AtomicBool>,
) -> Result<TransferOutcome, TftpClientError> {
	reader::run(server, remote_filename, local_path, opts, cancelled)
}

/// Uploads `local_path` to `server`, naming it `remote_filename`. See
/// `get_file` for the meaning of `cancelled`.
pub fn put_file(
	server: SocketAddr,
	local_path: &Path,
	remote_filename: &str,
	opts: TransferOpts,
	cancelled: Arc<AtomicBool>,
) -> Result<TransferOutcome, TftpClientError> {
	writer::run(server, local_path, remote_filename, opts, cancelled)
}
