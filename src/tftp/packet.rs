//! Wire-format codec for the five TFTP message types (RFC 1350 §5).
//!
//! Pure functions only: no I/O, no state. `encode`/`decode` are a total
//! bijection over the valid subset of `Packet`; `decode` never panics on
//! malformed input, it always returns a `CodecError`.

use crate::tftp::error::CodecError;
use crate::tftp::Mode;

pub const MAX_DATA_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Opcode {
	Rrq = 1,
	Wrq = 2,
	Data = 3,
	Ack = 4,
	Error = 5,
}
impl Opcode {
	fn from_u16(value: u16) -> Option<Self> {
		match value {
			1 => Some(Self::Rrq),
			2 => Some(Self::Wrq),
			3 => Some(Self::Data),
			4 => Some(Self::Ack),
			5 => Some(Self::Error),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
	Rrq { filename: String, mode: Mode },
	Wrq { filename: String, mode: Mode },
	Data { block: u16, payload: Vec<u8> },
	Ack { block: u16 },
	Error { code: u16, message: String },
}

impl Packet {
	pub fn opcode(&self) -> Opcode {
		match self {
			Self::Rrq { .. } => Opcode::Rrq,
			Self::Wrq { .. } => Opcode::Wrq,
			Self::Data { .. } => Opcode::Data,
			Self::Ack { .. } => Opcode::Ack,
			Self::Error { .. } => Opcode::Error,
		}
	}
}

/// Decodes only the first two bytes of a datagram, for early dispatch
/// without committing to parsing the rest of the packet.
pub fn peek_opcode(buf: &[u8]) -> Result<Opcode, CodecError> {
	if buf.len() < 2 {
		return Err(CodecError::Malformed("packet shorter than 2 bytes"));
	}
	Opcode::from_u16(u16::from_be_bytes([buf[0], buf[1]]))
		.ok_or(CodecError::Malformed("opcode not in 1..=5"))
}

fn is_ascii_printable(s: &str) -> bool {
	s.bytes().all(|b| (0x20..=0x7e).contains(&b))
}

pub fn encode(packet: &Packet) -> Result<Vec<u8>, CodecError> {
	match packet {
		Packet::Rrq { filename, mode } | Packet::Wrq { filename, mode } => {
			if filename.is_empty() || !is_ascii_printable(filename) {
				return Err(CodecError::InvalidField("filename must be non-empty ASCII-printable"));
			}
			let mut buf = Vec::with_capacity(4 + filename.len() + mode.as_str().len());
			buf.extend_from_slice(&(packet.opcode() as u16).to_be_bytes());
			buf.extend_from_slice(filename.as_bytes());
			buf.push(0);
			buf.extend_from_slice(mode.as_str().as_bytes());
			buf.push(0);
			Ok(buf)
		}
		Packet::Data { block, payload } => {
			if payload.len() > MAX_DATA_LEN {
				return Err(CodecError::InvalidField("DATA payload exceeds 512 bytes"));
			}
			let mut buf = Vec::with_capacity(4 + payload.len());
			buf.extend_from_slice(&(Opcode::Data as u16).to_be_bytes());
			buf.extend_from_slice(&block.to_be_bytes());
			buf.extend_from_slice(payload);
			Ok(buf)
		}
		Packet::Ack { block } => {
			let mut buf = Vec::with_capacity(4);
			buf.extend_from_slice(&(Opcode::Ack as u16).to_be_bytes());
			buf.extend_from_slice(&block.to_be_bytes());
			Ok(buf)
		}
		Packet::Error { code, message } => {
			if *code > 7 {
				return Err(CodecError::InvalidField("error code outside 0..=7"));
			}
			if message.contains('\0') {
				return Err(CodecError::InvalidField("error message contains embedded NUL"));
			}
			let mut buf = Vec::with_capacity(5 + message.len());
			buf.extend_from_slice(&(Opcode::Error as u16).to_be_bytes());
			buf.extend_from_slice(&code.to_be_bytes());
			buf.extend_from_slice(message.as_bytes());
			buf.push(0);
			Ok(buf)
		}
	}
}

/// Splits off the first NUL-terminated field from `buf`, returning
/// `(field_without_nul, rest_after_nul)`.
fn split_nul_terminated(buf: &[u8]) -> Result<(&[u8], &[u8]), CodecError> {
	let pos = buf
		.iter()
		.position(|&b| b == 0)
		.ok_or(CodecError::Malformed("missing NUL terminator"))?;
	Ok((&buf[..pos], &buf[pos + 1..]))
}

fn decode_request(buf: &[u8]) -> Result<(String, Mode), CodecError> {
	let (filename_bytes, rest) = split_nul_terminated(&buf[2..])?;
	let (mode_bytes, _) = split_nul_terminated(rest)?;

	let filename = std::str::from_utf8(filename_bytes)
		.map_err(|_| CodecError::Malformed("filename is not valid ASCII"))?
		.to_string();
	if filename.is_empty() {
		return Err(CodecError::Malformed("empty filename"));
	}

	let mode_str = std::str::from_utf8(mode_bytes)
		.map_err(|_| CodecError::Malformed("mode is not valid ASCII"))?;
	let mode = Mode::parse(mode_str).ok_or(CodecError::Malformed("unknown transfer mode"))?;

	Ok((filename, mode))
}

pub fn decode(buf: &[u8]) -> Result<Packet, CodecError> {
	let opcode = peek_opcode(buf)?;
	match opcode {
		Opcode::Rrq | Opcode::Wrq => {
			let (filename, mode) = decode_request(buf)?;
			Ok(if opcode == Opcode::Rrq {
				Packet::Rrq { filename, mode }
			} else {
				Packet::Wrq { filename, mode }
			})
		}
		Opcode::Data => {
			if buf.len() < 4 {
				return Err(CodecError::Malformed("DATA shorter than 4 bytes"));
			}
			let block = u16::from_be_bytes([buf[2], buf[3]]);
			Ok(Packet::Data { block, payload: buf[4..].to_vec() })
		}
		Opcode::Ack => {
			if buf.len() != 4 {
				return Err(CodecError::Malformed("ACK must be exactly 4 bytes"));
			}
			let block = u16::from_be_bytes([buf[2], buf[3]]);
			Ok(Packet::Ack { block })
		}
		Opcode::Error => {
			if buf.len() < 5 {
				return Err(CodecError::Malformed("ERROR shorter than 5 bytes"));
			}
			let code = u16::from_be_bytes([buf[2], buf[3]]);
			let (message_bytes, _) = split_nul_terminated(&buf[4..])?;
			let message = String::from_utf8_lossy(message_bytes).into_owned();
			Ok(Packet::Error { code, message })
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trip_rrq() {
		let pkt = Packet::Rrq { filename: "hello.txt".into(), mode: Mode::Octet };
		assert_eq!(decode(&encode(&pkt).unwrap()).unwrap(), pkt);
	}

	#[test]
	fn round_trip_wrq() {
		let pkt = Packet::Wrq { filename: "dir/report.bin".into(), mode: Mode::Octet };
		assert_eq!(decode(&encode(&pkt).unwrap()).unwrap(), pkt);
	}

	#[test]
	fn round_trip_data_full_block() {
		let pkt = Packet::Data { block: 1, payload: vec![0xAB; 512] };
		assert_eq!(decode(&encode(&pkt).unwrap()).unwrap(), pkt);
	}

	#[test]
	fn round_trip_data_empty_payload() {
		let pkt = Packet::Data { block: 65535, payload: vec![] };
		assert_eq!(decode(&encode(&pkt).unwrap()).unwrap(), pkt);
	}

	#[test]
	fn round_trip_ack() {
		let pkt = Packet::Ack { block: 0 };
		assert_eq!(decode(&encode(&pkt).unwrap()).unwrap(), pkt);
	}

	#[test]
	fn round_trip_error() {
		let pkt = Packet::Error { code: 1, message: "File not found.".into() };
		assert_eq!(decode(&encode(&pkt).unwrap()).unwrap(), pkt);
	}

	#[test]
	fn scenario_hello_txt_request_bytes() {
		let pkt = Packet::Rrq { filename: "hello.txt".into(), mode: Mode::Octet };
		let bytes = encode(&pkt).unwrap();
		assert_eq!(
			bytes,
			vec![
				0x00, 0x01, 0x68, 0x65, 0x6C, 0x6C, 0x6F, 0x2E, 0x74, 0x78, 0x74, 0x00, 0x6F, 0x63,
				0x74, 0x65, 0x74, 0x00,
			]
		);
	}

	#[test]
	fn encode_rejects_oversized_data_payload() {
		let pkt = Packet::Data { block: 1, payload: vec![0u8; 513] };
		assert!(matches!(encode(&pkt), Err(CodecError::InvalidField(_))));
	}

	#[test]
	fn encode_rejects_error_code_out_of_range() {
		let pkt = Packet::Error { code: 8, message: "oops".into() };
		assert!(matches!(encode(&pkt), Err(CodecError::InvalidField(_))));
	}

	#[test]
	fn encode_rejects_non_ascii_filename() {
		let pkt = Packet::Rrq { filename: "café.txt".into(), mode: Mode::Octet };
		assert!(matches!(encode(&pkt), Err(CodecError::InvalidField(_))));
	}

	#[test]
	fn decode_rejects_too_short_packet() {
		assert!(matches!(decode(&[0x00]), Err(CodecError::Malformed(_))));
	}

	#[test]
	fn decode_rejects_unknown_opcode() {
		assert!(matches!(decode(&[0x00, 0x09, 0x00, 0x00]), Err(CodecError::Malformed(_))));
	}

	#[test]
	fn decode_rejects_ack_with_wrong_length() {
		assert!(matches!(decode(&[0x00, 0x04, 0x00, 0x01, 0x02]), Err(CodecError::Malformed(_))));
	}

	#[test]
	fn decode_rejects_data_shorter_than_four_bytes() {
		assert!(matches!(decode(&[0x00, 0x03, 0x00]), Err(CodecError::Malformed(_))));
	}

	#[test]
	fn decode_rejects_error_without_terminating_nul() {
		let mut bytes = vec![0x00, 0x05, 0x00, 0x01];
		bytes.extend_from_slice(b"no terminator");
		assert!(matches!(decode(&bytes), Err(CodecError::Malformed(_))));
	}

	#[test]
	fn decode_rejects_request_missing_mode_field() {
		let mut bytes = vec![0x00, 0x01];
		bytes.extend_from_slice(b"onlyname\0");
		assert!(matches!(decode(&bytes), Err(CodecError::Malformed(_))));
	}

	#[test]
	fn peek_opcode_reads_first_two_bytes_only() {
		let bytes = vec![0x00, 0x04, 0xFF];
		assert_eq!(peek_opcode(&bytes).unwrap(), Opcode::Ack);
	}
}
