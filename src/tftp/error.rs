//! Error taxonomy for the TFTP client. Each layer gets its own variant set;
//! `TftpClientError` is the single type CLI and shell code actually match on.

use std::fmt::Display;
use std::io;

/// Default human-readable message for each of the eight standard TFTP error
/// codes (RFC 1350 §5). Used to render a `ServerError` when the server sent
/// an empty message, and to fill in a message when the client originates an
/// `ERROR` packet of its own.
pub const ERROR_MESSAGES: [&str; 8] = [
	"Not defined, see error message (if any).",
	"File not found.",
	"Access violation.",
	"Disk full or allocation exceeded.",
	"Illegal TFTP operation.",
	"Unknown transfer ID.",
	"File already exists.",
	"No such user.",
];

/// Looks up the default message for a standard error code; codes outside
/// `0..=7` (non-standard) fall back to the `NotDefined` message.
pub fn default_message(code: u16) -> &'static str {
	ERROR_MESSAGES
		.get(code as usize)
		.copied()
		.unwrap_or(ERROR_MESSAGES[0])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
	NotDefined = 0,
	FileNotFound = 1,
	AccessViolation = 2,
	DiskFull = 3,
	IllegalOperation = 4,
	UnknownTid = 5,
	FileExists = 6,
	NoSuchUser = 7,
}
impl ErrorCode {
	pub fn message(self) -> &'static str {
		default_message(self as u16)
	}
}
impl Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", *self as u16)
	}
}

/// Errors raised by the packet codec. Pure, no I/O involved.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
	#[error("malformed packet: {0}")]
	Malformed(&'static str),

	#[error("invalid field: {0}")]
	InvalidField(&'static str),
}

/// Errors raised by the transport session.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
	#[error("timed out waiting for a reply")]
	Timeout,

	#[error("socket error: {0}")]
	Io(#[from] io::Error),
}

/// Errors raised while driving the Reader/Writer state machines.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
	#[error("unexpected block number (expected {expected}, got {got})")]
	UnexpectedBlock { expected: u16, got: u16 },

	#[error("unexpected opcode in this context")]
	InvalidOpcode,
}

/// An `ERROR` packet received from the server, surfaced verbatim.
#[derive(Debug, thiserror::Error)]
#[error("server error {code}: {message}")]
pub struct ServerError {
	pub code: u16,
	pub message: String,
}

/// The single error type CLI and shell code match on; every lower-layer
/// error converts into this via `?`.
#[derive(Debug, thiserror::Error)]
pub enum TftpClientError {
	#[error(transparent)]
	Codec(#[from] CodecError),

	#[error(transparent)]
	Transport(#[from] TransportError),

	#[error(transparent)]
	Protocol(#[from] ProtocolError),

	#[error(transparent)]
	Server(#[from] ServerError),

	#[error("local file error: {0}")]
	LocalIo(io::Error),

	#[error("transfer cancelled")]
	Cancelled,
}
