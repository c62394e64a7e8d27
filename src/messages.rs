//! The device<->host message catalogue: `msg_type` ids and the manual
//! little-endian byte packing for every payload this firmware ever sends or
//! receives. Deliberately hand-packed (`heapless::Vec` pushes), matching the
//! teacher's `build_frame`/`build_ack`/`build_data` style in `protocol.rs`,
//! rather than pulling in a serialization crate for a small, fixed message
//! set (see DESIGN.md).

use heapless::Vec;

use crate::focus::{FocusTarget, Target};
use crate::fusion::{PersonState, PoseGuess};

// Host -> device commands.
pub const CMD_SET_HM: u8 = 0x01;
pub const CMD_SET_FOCUS: u8 = 0x02;
pub const CMD_SET_BIO_MS: u8 = 0x03;
pub const CMD_SET_TARGETS_MS: u8 = 0x04;
pub const CMD_PING: u8 = 0x05;
/// Supplemented: ambient-light cadence, mirrors `CMD_SET_BIO_MS`'s contract.
pub const CMD_SET_LIGHT_MS: u8 = 0x06;

// Device -> host events.
pub const EVT_ACK: u8 = 0x81;
pub const EVT_ERR: u8 = 0x82;
pub const EVT_PONG: u8 = 0x83;
pub const EVT_HELLO: u8 = 0x90;
pub const EVT_STATE: u8 = 0x91;
pub const EVT_TARGETS: u8 = 0x92;
pub const EVT_BIO: u8 = 0x93;
/// Supplemented: independent ambient-light passthrough lane (SPEC_FULL.md §6.1).
pub const EVT_LIGHT: u8 = 0x94;

pub const ACK_OK: u8 = 0;
pub const ACK_CLAMPED: u8 = 1;
#[allow(dead_code)] // reserved by spec.md §4.2, never produced today
pub const ACK_IGNORED: u8 = 2;

pub const PROTO_VERSION: u8 = 1;

const SENTINEL_U16: u16 = 0xFFFF;

fn sentinel_u16(v: Option<u16>) -> u16 {
    v.unwrap_or(SENTINEL_U16)
}

/// Round a scaled `f32` to the nearest representable `u16`, sentinel on
/// non-finite input (spec.md §6: "non-finite values become the defined
/// sentinel [for] unsigned fields").
fn scale_u16(v: f32) -> u16 {
    if !v.is_finite() {
        return SENTINEL_U16;
    }
    let rounded = libm::roundf(v);
    if rounded <= 0.0 {
        0
    } else if rounded >= u16::MAX as f32 {
        u16::MAX - 1 // reserve SENTINEL_U16 for "missing"
    } else {
        rounded as u16
    }
}

/// Round a scaled `f32` to the nearest representable `i16`, saturating at
/// the signed range; non-finite becomes `0` (spec.md §6: "non-finite
/// values become ... zero [for] signed focus fields, with
/// `FLAG_FOCUS_VALID` cleared").
fn scale_i16(v: f32) -> i16 {
    if !v.is_finite() {
        return 0;
    }
    let rounded = libm::roundf(v);
    if rounded <= i16::MIN as f32 {
        i16::MIN
    } else if rounded >= i16::MAX as f32 {
        i16::MAX
    } else {
        rounded as i16
    }
}

pub fn ack_payload(cmd_id: u8, status: u8, value: i32) -> Vec<u8, 6> {
    let mut v = Vec::new();
    let _ = v.push(cmd_id);
    let _ = v.push(status);
    let _ = v.extend_from_slice(&value.to_le_bytes());
    v
}

pub fn err_payload(cmd_id: u8, err_code: u8) -> Vec<u8, 2> {
    let mut v = Vec::new();
    let _ = v.push(cmd_id);
    let _ = v.push(err_code);
    v
}

pub fn pong_payload(t_ms: u32) -> Vec<u8, 4> {
    let mut v = Vec::new();
    let _ = v.extend_from_slice(&t_ms.to_le_bytes());
    v
}

pub fn hello_payload() -> Vec<u8, 3> {
    let mut v = Vec::new();
    let _ = v.push(PROTO_VERSION);
    let _ = v.extend_from_slice(&0u16.to_le_bytes()); // feature_bits = 0
    v
}

#[allow(clippy::too_many_arguments)]
pub fn state_payload(
    t_ms: u32,
    state: PersonState,
    pose: PoseGuess,
    head_moving: bool,
    human: bool,
    n_targets: u8,
    dist_cm: Option<f32>,
) -> Vec<u8, 13> {
    let mut v = Vec::new();
    let _ = v.extend_from_slice(&t_ms.to_le_bytes());
    let _ = v.push(state as u8);
    let _ = v.push(pose as u8);
    let _ = v.push(head_moving as u8);
    let _ = v.push(human as u8);
    let _ = v.push(n_targets);
    let dist_mm = dist_cm.filter(|d| d.is_finite() && *d > 0.0).map(|d| d * 10.0);
    let _ = v.push(dist_mm.is_some() as u8);
    let _ = v.extend_from_slice(&sentinel_u16(dist_mm.map(scale_u16)).to_le_bytes());
    v
}

#[allow(clippy::too_many_arguments)]
pub fn targets_payload(
    t_ms: u32,
    forced_focus_cluster: i16,
    focus: Option<&FocusTarget>,
    truncated: bool,
    targets: &[Target],
) -> Vec<u8, { crate::protocol::MAX_OUTBOUND_PAYLOAD }> {
    const FLAG_FOCUS_VALID: u8 = 1 << 0;
    const FLAG_TRUNCATED: u8 = 1 << 1;
    const MAX_WIRE_TARGETS: usize = 8;

    let mut v = Vec::new();
    let _ = v.extend_from_slice(&t_ms.to_le_bytes());
    let _ = v.extend_from_slice(&forced_focus_cluster.to_le_bytes());

    let mut flags = 0u8;
    if truncated {
        flags |= FLAG_TRUNCATED;
    }
    if let Some(f) = focus {
        flags |= FLAG_FOCUS_VALID;
        let _ = v.extend_from_slice(&f.target.cluster_id.to_le_bytes());
        let _ = v.extend_from_slice(&scale_i16(f.target.x * 1000.0).to_le_bytes());
        let _ = v.extend_from_slice(&scale_i16(f.target.y * 1000.0).to_le_bytes());
        let _ = v.extend_from_slice(&scale_u16(f.target.r() * 1000.0).to_le_bytes());
        let _ = v.extend_from_slice(&scale_i16(f.target.bearing_deg() * 100.0).to_le_bytes());
        let _ = v.extend_from_slice(&scale_i16(f.target.speed_cm_s(crate::fusion::RANGE_STEP) * 10.0).to_le_bytes());
    } else {
        let _ = v.extend_from_slice(&(-1i16).to_le_bytes()); // focus_cluster
        let _ = v.extend_from_slice(&0i16.to_le_bytes()); // focus_x_mm
        let _ = v.extend_from_slice(&0i16.to_le_bytes()); // focus_y_mm
        let _ = v.extend_from_slice(&0u16.to_le_bytes()); // focus_r_mm
        let _ = v.extend_from_slice(&0i16.to_le_bytes()); // focus_bearing_cdeg
        let _ = v.extend_from_slice(&0i16.to_le_bytes()); // focus_v_cms_x10
    }
    let _ = v.push(flags);

    let n_wire = targets.len().min(MAX_WIRE_TARGETS) as u8;
    let _ = v.push(n_wire);

    for t in targets.iter().take(MAX_WIRE_TARGETS) {
        let _ = v.extend_from_slice(&t.cluster_id.to_le_bytes());
        let _ = v.extend_from_slice(&scale_i16(t.x * 1000.0).to_le_bytes());
        let _ = v.extend_from_slice(&scale_i16(t.y * 1000.0).to_le_bytes());
        let _ = v.extend_from_slice(&scale_u16(t.r() * 1000.0).to_le_bytes());
        let _ = v.extend_from_slice(&scale_i16(t.bearing_deg() * 100.0).to_le_bytes());
        let _ = v.extend_from_slice(
            &scale_i16(t.speed_cm_s(crate::fusion::RANGE_STEP) * 10.0).to_le_bytes(),
        );
    }
    v
}

pub fn bio_payload(
    t_ms: u32,
    allowed: bool,
    valid: bool,
    br_new: bool,
    hr_new: bool,
    br_bpm: Option<f32>,
    hr_bpm: Option<f32>,
) -> Vec<u8, 12> {
    let mut v = Vec::new();
    let _ = v.extend_from_slice(&t_ms.to_le_bytes());
    let _ = v.push(allowed as u8);
    let _ = v.push(valid as u8);
    let _ = v.push(br_new as u8);
    let _ = v.push(hr_new as u8);
    let br_centi = br_bpm.filter(|b| b.is_finite() && *b > 0.0).map(|b| b * 100.0);
    let hr_centi = hr_bpm.filter(|h| h.is_finite() && *h > 0.0).map(|h| h * 100.0);
    let _ = v.extend_from_slice(&sentinel_u16(br_centi.map(scale_u16)).to_le_bytes());
    let _ = v.extend_from_slice(&sentinel_u16(hr_centi.map(scale_u16)).to_le_bytes());
    v
}

pub fn light_payload(t_ms: u32, valid: bool, lux: Option<u16>) -> Vec<u8, 7> {
    let mut v = Vec::new();
    let _ = v.extend_from_slice(&t_ms.to_le_bytes());
    let _ = v.push(valid as u8);
    let _ = v.extend_from_slice(&sentinel_u16(lux).to_le_bytes());
    v
}
