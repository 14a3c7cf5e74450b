//! Transport session: a UDP socket bound to an ephemeral local port for the
//! lifetime of one transfer, enforcing the single-TID invariant once the
//! peer has been locked.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::tftp::error::{CodecError, ErrorCode, TransportError};
use crate::tftp::packet::{self, Packet};

/// Local tunables that never affect wire bytes. Distinct from RFC 2347 OACK
/// options, which this client never negotiates.
#[derive(Debug, Clone, Copy)]
pub struct TransferOpts {
	pub timeout: Duration,
	pub max_retries: u8,
}
impl Default for TransferOpts {
	fn default() -> Self {
		Self {
			timeout: Duration::from_secs(super::consts::DEFAULT_TIMEOUT_SECS),
			max_retries: super::consts::DEFAULT_MAX_RETRIES,
		}
	}
}

/// How long a single blocking `recv_from` call is allowed to run before
/// `receive` re-checks the cancellation flag and the remaining budget. This
/// is purely an implementation detail of how the timeout in `receive` is
/// realized; callers never see it.
const POLL_QUANTUM: Duration = Duration::from_millis(250);

/// Outcome of waiting for a datagram.
pub enum ReceiveOutcome {
	Packet(Packet, SocketAddr),
}

/// Everything `receive` can fail with: a timed-out wait, a socket-level
/// failure, or a syntactically malformed datagram. Kept distinct from a
/// plain `TransportError` so the engine can react differently to each
/// (malformed input gets an `ERROR{4}` back, a timeout triggers
/// retransmission).
#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
	#[error(transparent)]
	Transport(#[from] TransportError),

	#[error(transparent)]
	Codec(#[from] CodecError),

	#[error("transfer cancelled")]
	Cancelled,
}

pub struct TftpSession {
	socket: UdpSocket,
	peer: SocketAddr,
	peer_locked: bool,
	last_sent: Vec<u8>,
	cancelled: Arc<AtomicBool>,
}

impl TftpSession {
	/// Binds an ephemeral UDP port and records `(server_ip, server_port)` as
	/// the initial, not-yet-locked peer.
	pub fn open(server: SocketAddr, cancelled: Arc<AtomicBool>) -> Result<Self, TransportError> {
		let bind_addr: SocketAddr = match server {
			SocketAddr::V4(_) => "0.0.0.0:0".parse().unwrap(),
			SocketAddr::V6(_) => "[::]:0".parse().unwrap(),
		};
		let socket = UdpSocket::bind(bind_addr)?;
		socket.set_read_timeout(Some(POLL_QUANTUM))?;
		Ok(Self { socket, peer: server, peer_locked: false, last_sent: Vec::new(), cancelled })
	}

	pub fn peer(&self) -> SocketAddr {
		self.peer
	}

	/// After the first reply, overwrites the peer with the server's chosen
	/// TID; all later `receive` calls enforce this address.
	pub fn lock_peer_tid(&mut self, peer: SocketAddr) {
		self.peer = peer;
		self.peer_locked = true;
	}

	fn cancelled(&self) -> bool {
		self.cancelled.load(Ordering::Relaxed)
	}

	/// Encodes and transmits `packet` to the current peer, remembering the
	/// bytes for retransmission.
	pub fn send(&mut self, packet: &Packet) -> Result<(), TransportError> {
		let bytes = packet::encode(packet).expect("engine must only ever send well-formed packets");
		self.socket.send_to(&bytes, self.peer)?;
		self.last_sent = bytes;
		Ok(())
	}

	/// Re-sends whatever was sent last, unchanged.
	pub fn retransmit(&self) -> Result<(), TransportError> {
		self.socket.send_to(&self.last_sent, self.peer)?;
		Ok(())
	}

	fn send_error_to(&self, dest: SocketAddr, code: ErrorCode, message: &str) {
		if let Ok(bytes) = packet::encode(&Packet::Error { code: code as u16, message: message.to_string() }) {
			let _ = self.socket.send_to(&bytes, dest);
		}
	}

	/// Waits up to `timeout` for a datagram. Polls in short slices so the
	/// shared cancellation flag can interrupt a long wait. Before the peer
	/// TID is locked, only the source IP is checked against the server's IP
	/// (the port is free to vary, since the server picks its own TID on the
	/// first reply); once locked, the full address (IP and port) must
	/// match. Anything that fails this check is a stray datagram: discarded
	/// and answered with `ERROR{5}` without ending the wait.
	pub fn receive(&mut self, timeout: Duration) -> Result<ReceiveOutcome, ReceiveError> {
		let deadline = Instant::now() + timeout;
		let mut buf = [0u8; 4 + super::consts::DEFAULT_BLOCK_SIZE];

		loop {
			if self.cancelled() {
				return Err(ReceiveError::Cancelled);
			}
			if Instant::now() >= deadline {
				return Err(TransportError::Timeout.into());
			}

			match self.socket.recv_from(&mut buf) {
				Ok((len, from)) => {
					let from_known_peer =
						if self.peer_locked { from == self.peer } else { from.ip() == self.peer.ip() };
					if !from_known_peer {
						self.send_error_to(from, ErrorCode::UnknownTid, ErrorCode::UnknownTid.message());
						continue;
					}
					let packet = packet::decode(&buf[..len])?;
					return Ok(ReceiveOutcome::Packet(packet, from));
				}
				Err(e) => match e.kind() {
					std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => continue,
					_ => return Err(TransportError::Io(e).into()),
				},
			}
		}
	}

	/// Sends `ERROR{0, "Cancelled"}` to the locked peer before the socket is
	/// dropped.
	pub fn cancel(&self) {
		self.send_error_to(self.peer, ErrorCode::NotDefined, "Cancelled");
	}
}
