//! Framing Codec: a length-prefixed, CRC-protected, COBS-stuffed binary
//! packet over a byte-oriented serial link.
//!
//! Wire layout (all multi-byte fields little-endian), stuffed with COBS and
//! terminated by a single `0x00` delimiter:
//!
//! ```text
//! version:u8 | msg_type:u8 | seq:u16 | payload_len:u16 | payload[..] | crc16:u16
//! ```
//!
//! `crc16` is CRC-16/CCITT-FALSE computed over every byte from `version`
//! through the end of `payload` (i.e. everything except the CRC field
//! itself). This module owns encode/decode and the stream resync; it knows
//! nothing about what a `msg_type` means — that's `messages.rs`/`dispatch.rs`.
//!
//! Grounded on the teacher's `protocol.rs` (fixed-capacity `heapless::Vec`
//! stream buffer, resync-by-scanning decoder, one frame per call), retargeted
//! at this crate's header layout and COBS stuffing instead of the teacher's
//! unstuffed STX-resync scheme.

use heapless::Vec;

/// Only version this firmware speaks.
pub const VERSION: u8 = 1;

/// `version + msg_type + seq(2) + payload_len(2)`.
const HEADER_LEN: usize = 6;
/// Trailing `crc16`.
const CRC_LEN: usize = 2;

/// Unstuffed outbound packet scratch capacity (spec recommends >= 512).
pub const PACKET_CAP: usize = 512;
/// Largest payload this crate will ever *encode* (outbound telemetry, the
/// largest of which is `EVT_TARGETS` with 8 target entries).
pub const MAX_OUTBOUND_PAYLOAD: usize = PACKET_CAP - HEADER_LEN - CRC_LEN;
/// Stuffed outbound buffer capacity, including the trailing delimiter
/// (spec recommends >= 640).
pub const OUTBOUND_STUFFED_CAP: usize = 640;
/// Inbound accumulator capacity for the stuffed byte stream (spec
/// recommends >= 384). Host commands are tiny, so this is generous.
pub const INBOUND_STUFFED_CAP: usize = 384;
/// Largest payload this crate will ever *decode* (inbound host commands).
pub const MAX_INBOUND_PAYLOAD: usize = 32;

const DELIMITER: u8 = 0x00;

/// Why a candidate frame (or a lone delimiter) was rejected.
#[derive(Clone, Copy, Debug, Eq, PartialEq, defmt::Format)]
pub enum ErrCode {
    UnknownCmd = 1,
    BadLen = 2,
    BadValue = 3,
    CrcFail = 4,
    UnsupportedVersion = 5,
}

/// What `Decoder::push_byte` produced after consuming one input byte.
#[derive(Debug)]
pub enum DecodeEvent {
    /// A structurally valid, CRC-checked packet.
    Packet {
        msg_type: u8,
        seq: u16,
        payload: Vec<u8, MAX_INBOUND_PAYLOAD>,
    },
    /// A framing-level rejection; `cmd_id` is `0` when the frame could not
    /// even be parsed far enough to learn its `msg_type`.
    Error { cmd_id: u8, err: ErrCode },
}

/// Stateless-per-call encoder; owns only the outbound sequence counter.
pub struct Encoder {
    tx_seq: u16,
}

impl Encoder {
    pub const fn new() -> Self {
        Self { tx_seq: 0 }
    }

    /// Encode one frame, consuming the next `tx_seq` value (wraps at
    /// `u16::MAX`; the host uses it only for loss detection).
    pub fn encode(
        &mut self,
        msg_type: u8,
        payload: &[u8],
    ) -> Result<Vec<u8, OUTBOUND_STUFFED_CAP>, EncodeError> {
        let seq = self.tx_seq;
        self.tx_seq = self.tx_seq.wrapping_add(1);
        encode_with_seq(msg_type, seq, payload)
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, defmt::Format)]
pub enum EncodeError {
    PayloadTooLarge,
    BufferOverflow,
}

/// Build and COBS-stuff one frame with an explicit `seq` (split out of
/// `Encoder::encode` so tests can pin `seq` without advancing the counter).
fn encode_with_seq(
    msg_type: u8,
    seq: u16,
    payload: &[u8],
) -> Result<Vec<u8, OUTBOUND_STUFFED_CAP>, EncodeError> {
    if payload.len() > MAX_OUTBOUND_PAYLOAD {
        return Err(EncodeError::PayloadTooLarge);
    }

    let mut unstuffed = Vec::<u8, PACKET_CAP>::new();
    unstuffed.push(VERSION).map_err(|_| EncodeError::BufferOverflow)?;
    unstuffed.push(msg_type).map_err(|_| EncodeError::BufferOverflow)?;
    unstuffed
        .extend_from_slice(&seq.to_le_bytes())
        .map_err(|_| EncodeError::BufferOverflow)?;
    unstuffed
        .extend_from_slice(&(payload.len() as u16).to_le_bytes())
        .map_err(|_| EncodeError::BufferOverflow)?;
    unstuffed
        .extend_from_slice(payload)
        .map_err(|_| EncodeError::BufferOverflow)?;

    let crc = crc16(&unstuffed);
    unstuffed
        .extend_from_slice(&crc.to_le_bytes())
        .map_err(|_| EncodeError::BufferOverflow)?;

    let mut stuffed = Vec::<u8, OUTBOUND_STUFFED_CAP>::new();
    stuffed
        .resize_default(OUTBOUND_STUFFED_CAP)
        .map_err(|_| EncodeError::BufferOverflow)?;
    let n = cobs_encode(&unstuffed, &mut stuffed).ok_or(EncodeError::BufferOverflow)?;
    stuffed.truncate(n);
    stuffed.push(DELIMITER).map_err(|_| EncodeError::BufferOverflow)?;
    Ok(stuffed)
}

/// Stateful byte feeder: accumulates stuffed bytes until a `0x00`
/// delimiter, then COBS-decodes, validates and yields a `DecodeEvent`.
pub struct Decoder {
    acc: Vec<u8, INBOUND_STUFFED_CAP>,
    overflowed: bool,
}

impl Decoder {
    pub const fn new() -> Self {
        Self {
            acc: Vec::new(),
            overflowed: false,
        }
    }

    /// Feed one byte from the serial line. Returns `Some` exactly when a
    /// delimiter completes a candidate (successfully or not); `None`
    /// otherwise, including for interior bytes of a frame still in flight
    /// and for spurious/back-to-back delimiters.
    pub fn push_byte(&mut self, b: u8) -> Option<DecodeEvent> {
        if b != DELIMITER {
            if self.overflowed {
                return None;
            }
            if self.acc.push(b).is_err() {
                self.overflowed = true;
                self.acc.clear();
            }
            return None;
        }

        if self.overflowed {
            self.overflowed = false;
            self.acc.clear();
            return Some(DecodeEvent::Error {
                cmd_id: 0,
                err: ErrCode::BadLen,
            });
        }

        if self.acc.is_empty() {
            return None;
        }

        let event = decode_candidate(&self.acc);
        self.acc.clear();
        Some(event)
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_candidate(stuffed: &[u8]) -> DecodeEvent {
    let mut work = [0u8; INBOUND_STUFFED_CAP];
    let n = match cobs_decode(stuffed, &mut work) {
        Some(n) => n,
        None => {
            return DecodeEvent::Error {
                cmd_id: 0,
                err: ErrCode::BadLen,
            };
        }
    };

    if n < HEADER_LEN + CRC_LEN {
        return DecodeEvent::Error {
            cmd_id: 0,
            err: ErrCode::BadLen,
        };
    }

    let version = work[0];
    let msg_type = work[1];
    let seq = u16::from_le_bytes([work[2], work[3]]);
    let payload_len = u16::from_le_bytes([work[4], work[5]]) as usize;
    let expected_total = HEADER_LEN + payload_len + CRC_LEN;

    if n != expected_total {
        return DecodeEvent::Error {
            cmd_id: msg_type,
            err: ErrCode::BadLen,
        };
    }
    if version != VERSION {
        return DecodeEvent::Error {
            cmd_id: msg_type,
            err: ErrCode::UnsupportedVersion,
        };
    }

    let computed = crc16(&work[..HEADER_LEN + payload_len]);
    let got = u16::from_le_bytes([work[n - 2], work[n - 1]]);
    if computed != got {
        return DecodeEvent::Error {
            cmd_id: msg_type,
            err: ErrCode::CrcFail,
        };
    }

    if payload_len > MAX_INBOUND_PAYLOAD {
        return DecodeEvent::Error {
            cmd_id: msg_type,
            err: ErrCode::BadLen,
        };
    }

    let mut payload = Vec::<u8, MAX_INBOUND_PAYLOAD>::new();
    let _ = payload.extend_from_slice(&work[HEADER_LEN..HEADER_LEN + payload_len]);

    DecodeEvent::Packet {
        msg_type,
        seq,
        payload,
    }
}

/// CRC-16/CCITT-FALSE: poly `0x1021`, init `0xFFFF`, no reflection, xor-out
/// `0x0000`. The `crc` crate's `CRC_16_IBM_3740` catalogue entry is exactly
/// this parameterisation.
fn crc16(data: &[u8]) -> u16 {
    const ALGO: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_IBM_3740);
    ALGO.checksum(data)
}

/// COBS-encode `input` into `output`, returning the number of bytes written
/// (not including any frame delimiter — callers append that separately).
fn cobs_encode(input: &[u8], output: &mut [u8]) -> Option<usize> {
    if output.is_empty() {
        return None;
    }

    let mut out_idx = 1usize;
    let mut code_idx = 0usize;
    let mut code: u8 = 1;

    for &b in input {
        if b == 0 {
            output[code_idx] = code;
            code_idx = out_idx;
            if out_idx >= output.len() {
                return None;
            }
            out_idx += 1;
            code = 1;
        } else {
            if out_idx >= output.len() {
                return None;
            }
            output[out_idx] = b;
            out_idx += 1;
            code += 1;
            if code == 0xFF {
                output[code_idx] = code;
                code_idx = out_idx;
                if out_idx >= output.len() {
                    return None;
                }
                out_idx += 1;
                code = 1;
            }
        }
    }
    output[code_idx] = code;
    Some(out_idx)
}

/// COBS-decode `input` (a stuffed frame, without its trailing delimiter)
/// into `output`. Returns `None` on any structural inconsistency (a code
/// byte of `0`, or one that overruns the input) rather than panicking —
/// untrusted serial input must never crash the decoder.
fn cobs_decode(input: &[u8], output: &mut [u8]) -> Option<usize> {
    let mut in_idx = 0usize;
    let mut out_idx = 0usize;

    while in_idx < input.len() {
        let code = input[in_idx] as usize;
        if code == 0 || in_idx + code > input.len() + 1 {
            return None;
        }
        in_idx += 1;

        for _ in 1..code {
            if in_idx >= input.len() || out_idx >= output.len() {
                return None;
            }
            output[out_idx] = input[in_idx];
            out_idx += 1;
            in_idx += 1;
        }

        if code != 0xFF && in_idx < input.len() {
            if out_idx >= output.len() {
                return None;
            }
            output[out_idx] = 0;
            out_idx += 1;
        }
    }

    Some(out_idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cobs_roundtrip_no_zeros() {
        let input = [1u8, 2, 3, 4, 250];
        let mut enc = [0u8; 16];
        let n = cobs_encode(&input, &mut enc).unwrap();
        assert!(!enc[..n].contains(&0));
        let mut dec = [0u8; 16];
        let m = cobs_decode(&enc[..n], &mut dec).unwrap();
        assert_eq!(&dec[..m], &input);
    }

    #[test]
    fn cobs_roundtrip_with_zeros() {
        let input = [0u8, 1, 0, 0, 5, 0];
        let mut enc = [0u8; 16];
        let n = cobs_encode(&input, &mut enc).unwrap();
        assert!(!enc[..n].contains(&0));
        let mut dec = [0u8; 16];
        let m = cobs_decode(&enc[..n], &mut dec).unwrap();
        assert_eq!(&dec[..m], &input);
    }

    #[test]
    fn cobs_roundtrip_long_run_over_254() {
        let input: heapless::Vec<u8, 300> = (0..300u16).map(|i| (i % 251 + 1) as u8).collect();
        let mut enc = [0u8; 400];
        let n = cobs_encode(&input, &mut enc).unwrap();
        assert!(!enc[..n].contains(&0));
        let mut dec = [0u8; 400];
        let m = cobs_decode(&enc[..n], &mut dec).unwrap();
        assert_eq!(&dec[..m], input.as_slice());
    }

    #[test]
    fn frame_round_trip() {
        let mut enc = Encoder::new();
        let payload = [9u8, 8, 7, 6, 5];
        let stuffed = enc.encode(0x42, &payload).unwrap();
        assert!(!stuffed[..stuffed.len() - 1].contains(&DELIMITER));
        assert_eq!(*stuffed.last().unwrap(), DELIMITER);

        let mut dec = Decoder::new();
        let mut last = None;
        for &b in stuffed.iter() {
            if let Some(ev) = dec.push_byte(b) {
                last = Some(ev);
            }
        }
        match last.unwrap() {
            DecodeEvent::Packet {
                msg_type,
                payload: p,
                ..
            } => {
                assert_eq!(msg_type, 0x42);
                assert_eq!(p.as_slice(), &payload);
            }
            DecodeEvent::Error { .. } => panic!("expected a packet"),
        }
    }

    #[test]
    fn monotonic_seq() {
        let mut enc = Encoder::new();
        let mut dec = Decoder::new();
        let mut seqs = heapless::Vec::<u16, 8>::new();
        for _ in 0..5 {
            let stuffed = enc.encode(0x01, &[]).unwrap();
            for &b in stuffed.iter() {
                if let Some(DecodeEvent::Packet { seq, .. }) = dec.push_byte(b) {
                    seqs.push(seq).unwrap();
                }
            }
        }
        for w in seqs.windows(2) {
            assert!(w[1] > w[0]);
        }
    }

    #[test]
    fn crc_sensitivity_flips_reject() {
        let mut enc = Encoder::new();
        let stuffed = enc.encode(0x05, &[1, 2, 3]).unwrap();
        let body_len = stuffed.len() - 1; // exclude trailing delimiter
        for bit in 0..(body_len * 8) {
            let mut tampered = stuffed.clone();
            let byte_idx = bit / 8;
            tampered[byte_idx] ^= 1 << (bit % 8);
            // A flipped bit might itself create/destroy a stray 0x00 and
            // resync differently; the only hard requirement is that a
            // corrupted frame is never silently accepted as the original.
            let mut dec = Decoder::new();
            let mut saw_valid_match = false;
            let mut saw_error = false;
            for &b in tampered.iter() {
                match dec.push_byte(b) {
                    Some(DecodeEvent::Packet { msg_type, payload, .. }) => {
                        if msg_type == 0x05 && payload.as_slice() == [1, 2, 3] {
                            saw_valid_match = true;
                        }
                    }
                    Some(DecodeEvent::Error { .. }) => saw_error = true,
                    None => {}
                }
            }
            assert!(
                saw_error || !saw_valid_match,
                "bit {bit} flip silently produced the original frame"
            );
        }
    }

    #[test]
    fn overflow_then_delimiter_emits_bad_len() {
        let mut dec = Decoder::new();
        for _ in 0..(INBOUND_STUFFED_CAP + 10) {
            assert!(dec.push_byte(0x01).is_none());
        }
        match dec.push_byte(DELIMITER) {
            Some(DecodeEvent::Error { cmd_id, err }) => {
                assert_eq!(cmd_id, 0);
                assert_eq!(err, ErrCode::BadLen);
            }
            other => panic!("expected overflow BadLen, got {other:?}"),
        }
    }

    #[test]
    fn spurious_delimiter_is_ignored() {
        let mut dec = Decoder::new();
        assert!(dec.push_byte(DELIMITER).is_none());
    }
}
