//! Writer state machine: drives a WRQ-initiated upload.
//!
//! States: `AwaitingAck(0)` -> `AwaitingAck(1)` -> ... -> `Done` | `Failed`.

use std::fs::File;
use std::io::Read;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::tftp::error::{ErrorCode, ProtocolError, ServerError, TftpClientError, TransportError};
use crate::tftp::packet::{self, Packet, MAX_DATA_LEN};
use crate::tftp::session::{ReceiveError, ReceiveOutcome, TftpSession, TransferOpts};
use crate::tftp::{next_block, Mode, TransferOutcome};

pub fn run(
	server: SocketAddr,
	local_path: &Path,
	remote_filename: &str,
	opts: TransferOpts,
	cancelled: Arc<AtomicBool>,
) -> Result<TransferOutcome, TftpClientError> {
	let request = Packet::Wrq { filename: remote_filename.to_string(), mode: Mode::Octet };
	// Validate the caller-supplied filename before touching the network or
	// the filesystem: an invalid filename is a `CodecError::InvalidField`
	// returned straight to the caller, not a reason to send anything.
	packet::encode(&request)?;

	let mut session = TftpSession::open(server, cancelled)?;
	let mut file = File::open(local_path).map_err(TftpClientError::LocalIo)?;

	session.send(&request)?;
	info!("PUT {remote_filename} to {server}");

	// Step 2: wait for ACK{0} and lock the peer TID to whichever port the
	// server replies from.
	let mut retries: u8 = 0;
	loop {
		match session.receive(opts.timeout) {
			Ok(ReceiveOutcome::Packet(Packet::Ack { block: 0 }, from)) => {
				session.lock_peer_tid(from);
				break;
			}
			Ok(ReceiveOutcome::Packet(Packet::Error { code, message }, _)) => {
				return Err(ServerError { code, message }.into());
			}
			Ok(ReceiveOutcome::Packet(_, _)) => {
				session.send(&illegal_op())?;
				return Err(ProtocolError::InvalidOpcode.into());
			}
			Err(ReceiveError::Codec(e)) => {
				session.send(&illegal_op())?;
				return Err(e.into());
			}
			Err(ReceiveError::Transport(TransportError::Timeout)) => {
				retries += 1;
				if retries > opts.max_retries {
					return Err(TransportError::Timeout.into());
				}
				warn!("timeout waiting for ACK 0, retransmitting WRQ (attempt {retries})");
				session.retransmit()?;
			}
			Err(ReceiveError::Transport(e)) => return Err(e.into()),
			Err(ReceiveError::Cancelled) => {
				session.cancel();
				return Err(TftpClientError::Cancelled);
			}
		}
	}

	let mut block: u16 = 1;
	let mut retries: u8 = 0;
	let mut bytes_transferred: u64 = 0;
	let mut blocks: u32 = 0;

	loop {
		let mut payload = vec![0u8; MAX_DATA_LEN];
		let n = read_full_or_eof(&mut file, &mut payload).map_err(TftpClientError::LocalIo)?;
		payload.truncate(n);
		let is_final = n < MAX_DATA_LEN;

		session.send(&Packet::Data { block, payload })?;
		debug!("block {block} ({n} bytes)");

		retries = 0;
		loop {
			match session.receive(opts.timeout) {
				Ok(ReceiveOutcome::Packet(Packet::Ack { block: m }, _)) if m == block => {
					bytes_transferred += n as u64;
					blocks += 1;
					break;
				}
				Ok(ReceiveOutcome::Packet(Packet::Ack { block: m }, _)) if older_ack(block, m) => {
					// Stale duplicate ACK: discard and keep waiting without
					// resetting the retry counter.
					debug!("stale ACK {m}, still waiting for {block}");
					continue;
				}
				Ok(ReceiveOutcome::Packet(Packet::Ack { block: m }, _)) => {
					session.send(&illegal_op())?;
					return Err(ProtocolError::UnexpectedBlock { expected: block, got: m }.into());
				}
				Ok(ReceiveOutcome::Packet(Packet::Error { code, message }, _)) => {
					return Err(ServerError { code, message }.into());
				}
				Ok(ReceiveOutcome::Packet(_, _)) => {
					session.send(&illegal_op())?;
					return Err(ProtocolError::InvalidOpcode.into());
				}
				Err(ReceiveError::Codec(e)) => {
					session.send(&illegal_op())?;
					return Err(e.into());
				}
				Err(ReceiveError::Transport(TransportError::Timeout)) => {
					retries += 1;
					if retries > opts.max_retries {
						return Err(TransportError::Timeout.into());
					}
					warn!("timeout waiting for ACK {block}, retransmitting (attempt {retries})");
					session.retransmit()?;
				}
				Err(ReceiveError::Transport(e)) => return Err(e.into()),
				Err(ReceiveError::Cancelled) => {
					session.cancel();
					return Err(TftpClientError::Cancelled);
				}
			}
		}

		if is_final {
			info!("done: {bytes_transferred} bytes in {blocks} blocks");
			return Ok(TransferOutcome { bytes_transferred, blocks });
		}
		block = next_block(block);
	}
}

fn illegal_op() -> Packet {
	Packet::Error { code: ErrorCode::IllegalOperation as u16, message: ErrorCode::IllegalOperation.message().to_string() }
}

/// `m` is strictly older than `block`, accounting for 16-bit wrap-around:
/// everything between `block - 65535` and `block` (exclusive) going
/// backwards counts as "older" except `block` itself, which the caller
/// already handled.
fn older_ack(block: u16, m: u16) -> bool {
	m != block && block.wrapping_sub(m) < u16::MAX / 2
}

/// Fills `buf` by repeated `read` calls until it is full or EOF is hit,
/// returning the number of bytes actually read. A plain `Read::read` may
/// return short reads before EOF; TFTP blocks must be exactly 512 bytes
/// except for the final one.
fn read_full_or_eof(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
	let mut total = 0;
	while total < buf.len() {
		match file.read(&mut buf[total..])? {
			0 => break,
			n => total += n,
		}
	}
	Ok(total)
}
