//  _____       ______   ____
// |_   _|     |  ____|/ ____|  Institute of Embedded Systems
//   | |  _ __ | |__  | (___    Zurich University of Applied Sciences
//   | | | '_ \|  __|  \___ \   8401 Winterthur, Switzerland
//  _| |_| | | | |____ ____) |
// |_____|_| |_|______|_____/
//
// Copyright 2025 Institute of Embedded Systems at Zurich University of Applied Sciences.
// All rights reserved.
// SPDX-License-Identifier: MIT

//! Wire Codec (spec.md §4.1, §6.1).
//!
//! Frame layout, all integers big-endian:
//!
//! | Offset | Size | Field       |
//! |-------:|-----:|-------------|
//! |      0 |    2 | destination |
//! |      2 |    2 | source      |
//! |      4 |    1 | function    |
//! |      5 |    1 | length      |
//! |      6 |    2 | wakeup (optional, present iff length > 6)   |
//! |      8 |   0+ | payload (optional, begins iff length > 8)   |
//!
//! `wakeup` is only ever present on frames we *decode* (sent by the
//! bridge); frames we *encode* never carry it, so their payload starts
//! directly at offset 6. [`encode_frame`] models the general,
//! wakeup-capable layout (used by tests and the simulator's scripted
//! bridge); [`encode`] is the thin node-facing wrapper the rest of this
//! crate calls, which always omits `wakeup`.

use galvanize_api::{NodeAddress, MAX_FRAME_LEN};
use heapless::Vec;

/// Function codes (spec.md §4.1). Canonical values, preserved bit-exactly
/// for interop with the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    IncludeReq,
    SIncludeReq,
    IncludeGrant,
    Reinclude,
    Config,
    SendBattery,
    WokenUp,
    Ack,
    Alert,
    Beacon,
    /// Implementer-assigned; the node only ever sends this, it never
    /// arrives inbound from the bridge (spec.md §4.1).
    BatteryStatus,
}

impl Function {
    pub(crate) const fn code(self) -> u8 {
        match self {
            Function::IncludeReq => 0x00,
            Function::SIncludeReq => 0x01,
            Function::IncludeGrant => 0x02,
            Function::Reinclude => 0x04,
            Function::Config => 0x05,
            Function::SendBattery => 0x06,
            Function::WokenUp => 0x07,
            Function::Ack => 0x08,
            Function::Alert => 0x09,
            Function::Beacon => 0x0A,
            Function::BatteryStatus => 0x0B,
        }
    }

    pub(crate) const fn from_code(code: u8) -> Option<Function> {
        match code {
            0x00 => Some(Function::IncludeReq),
            0x01 => Some(Function::SIncludeReq),
            0x02 => Some(Function::IncludeGrant),
            0x04 => Some(Function::Reinclude),
            0x05 => Some(Function::Config),
            0x06 => Some(Function::SendBattery),
            0x07 => Some(Function::WokenUp),
            0x08 => Some(Function::Ack),
            0x09 => Some(Function::Alert),
            0x0A => Some(Function::Beacon),
            0x0B => Some(Function::BatteryStatus),
            _ => None,
        }
    }
}

/// Decode failure (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    InvalidLength,
    UnknownFunction,
}

/// A decoded (or about-to-be-encoded) frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub destination: NodeAddress,
    pub source: NodeAddress,
    pub function: Function,
    /// Next wake interval in seconds, present iff the frame's header said
    /// so (spec.md §4.1).
    pub wakeup: Option<u16>,
    pub payload: Vec<u8, MAX_FRAME_LEN>,
}

/// Encode a frame exactly the way the node sends uplinks: header plus
/// payload directly at offset 6, `wakeup` never present.
pub fn encode(
    dst: NodeAddress,
    src: NodeAddress,
    function: Function,
    payload: &[u8],
) -> Vec<u8, MAX_FRAME_LEN> {
    encode_frame(dst, src, function, None, payload)
}

/// General encoder covering the full wire format, including the
/// bridge-only `wakeup` field. Inverse of [`decode`] (spec.md P4).
pub fn encode_frame(
    dst: NodeAddress,
    src: NodeAddress,
    function: Function,
    wakeup: Option<u16>,
    payload: &[u8],
) -> Vec<u8, MAX_FRAME_LEN> {
    let header_len = if wakeup.is_some() { 8 } else { 6 };
    let length = header_len + payload.len();
    let mut out = Vec::new();
    out.extend_from_slice(&dst.to_be_bytes()).unwrap();
    out.extend_from_slice(&src.to_be_bytes()).unwrap();
    out.push(function.code()).unwrap();
    out.push(length as u8).unwrap();
    if let Some(w) = wakeup {
        out.extend_from_slice(&w.to_be_bytes()).unwrap();
    }
    out.extend_from_slice(payload).unwrap();
    out
}

/// Decode a frame received from the bridge.
pub fn decode(bytes: &[u8]) -> Result<Frame, DecodeError> {
    if bytes.len() < 6 {
        return Err(DecodeError::InvalidLength);
    }
    let destination = u16::from_be_bytes([bytes[0], bytes[1]]);
    let source = u16::from_be_bytes([bytes[2], bytes[3]]);
    let function = Function::from_code(bytes[4]).ok_or(DecodeError::UnknownFunction)?;
    let length = bytes[5] as usize;
    if length < 6 || length != bytes.len() {
        return Err(DecodeError::InvalidLength);
    }

    let wakeup = if length > 6 {
        if length < 8 {
            return Err(DecodeError::InvalidLength);
        }
        Some(u16::from_be_bytes([bytes[6], bytes[7]]))
    } else {
        None
    };

    let payload_start = if length > 8 { 8 } else { length };
    let mut payload = Vec::new();
    payload
        .extend_from_slice(&bytes[payload_start..length])
        .map_err(|_| DecodeError::InvalidLength)?;

    Ok(Frame {
        destination,
        source,
        function,
        wakeup,
        payload,
    })
}

/// Encode the payload of an `include_grant` frame: 4-byte opaque `addr`
/// followed by the 2-byte assigned `nodeAddress`, big-endian.
pub fn encode_include_grant_payload(addr: u32, node_address: NodeAddress) -> [u8; 6] {
    let mut out = [0u8; 6];
    out[0..4].copy_from_slice(&addr.to_be_bytes());
    out[4..6].copy_from_slice(&node_address.to_be_bytes());
    out
}

/// Decode the payload of an `include_grant` frame.
pub fn decode_include_grant_payload(payload: &[u8]) -> Option<(u32, NodeAddress)> {
    if payload.len() < 6 {
        return None;
    }
    let addr = u32::from_be_bytes(payload[0..4].try_into().ok()?);
    let node_address = u16::from_be_bytes(payload[4..6].try_into().ok()?);
    Some((addr, node_address))
}

/// Encode the payload of an `include_req` frame: the 4-byte `NODE_ID`,
/// big-endian (spec.md §9: the source's native-endian pack is a bug,
/// resolved in favor of big-endian here for protocol consistency).
pub fn encode_include_req_payload(node_id: u32) -> [u8; 4] {
    node_id.to_be_bytes()
}

/// Alert codes carried in an `alert` frame's 2-byte payload (spec.md
/// §4.1, §9: `0x0200` is adopted as `service_cleared`, distinct from the
/// dedicated `battery_status` function).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertCode {
    Pressed,
    UserCleared,
    ServiceCleared,
}

impl AlertCode {
    const fn code(self) -> u16 {
        match self {
            AlertCode::Pressed => 0x0000,
            AlertCode::UserCleared => 0x0100,
            AlertCode::ServiceCleared => 0x0200,
        }
    }

    pub fn encode_payload(self) -> [u8; 2] {
        self.code().to_be_bytes()
    }
}

/// Encode a `battery_status` payload: 2-byte percentage (0..=100).
pub fn encode_battery_status_payload(percent: u16) -> [u8; 2] {
    percent.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_no_payload() {
        let bytes = encode_frame(BEACON_TEST_ADDR, 0x1234, Function::Beacon, None, &[]);
        assert_eq!(bytes.len(), 6);
        let frame = decode(&bytes).unwrap();
        assert_eq!(frame.destination, BEACON_TEST_ADDR);
        assert_eq!(frame.source, 0x1234);
        assert_eq!(frame.function, Function::Beacon);
        assert_eq!(frame.wakeup, None);
        assert!(frame.payload.is_empty());
    }

    const BEACON_TEST_ADDR: NodeAddress = 0xBBBB;

    #[test]
    fn round_trip_with_wakeup_and_payload() {
        let payload = encode_include_grant_payload(0xDEADBEEF, 0x0025);
        let bytes = encode_frame(0xBB00, 0x1234, Function::IncludeGrant, Some(10), &payload);
        assert_eq!(bytes.len(), 14);
        let frame = decode(&bytes).unwrap();
        assert_eq!(frame.wakeup, Some(10));
        let (addr, node_address) = decode_include_grant_payload(&frame.payload).unwrap();
        assert_eq!(addr, 0xDEADBEEF);
        assert_eq!(node_address, 0x0025);
    }

    #[test]
    fn node_encode_has_no_wakeup_gap() {
        // Scenario 1 of spec.md §8: include_req uplink has length 10,
        // payload directly after the 6-byte header.
        let payload = encode_include_req_payload(47);
        let bytes = encode(0x1234, 0xFFFF, Function::IncludeReq, &payload);
        assert_eq!(bytes.len(), 10);
        assert_eq!(bytes[5], 10);
        assert_eq!(&bytes[6..10], &47u32.to_be_bytes());
    }

    #[test]
    fn decode_rejects_short_buffer() {
        assert_eq!(decode(&[0, 1, 2]), Err(DecodeError::InvalidLength));
    }

    #[test]
    fn decode_rejects_unknown_function() {
        let bytes = [0xBB, 0xBB, 0x12, 0x34, 0x7F, 0x06];
        assert_eq!(decode(&bytes), Err(DecodeError::UnknownFunction));
    }

    #[test]
    fn decode_rejects_length_mismatch() {
        let bytes = [0xBB, 0xBB, 0x12, 0x34, 0x0A, 0x08];
        assert_eq!(decode(&bytes), Err(DecodeError::InvalidLength));
    }

    #[test]
    fn alert_codes() {
        assert_eq!(AlertCode::Pressed.encode_payload(), [0x00, 0x00]);
        assert_eq!(AlertCode::UserCleared.encode_payload(), [0x01, 0x00]);
        assert_eq!(AlertCode::ServiceCleared.encode_payload(), [0x02, 0x00]);
    }
}
