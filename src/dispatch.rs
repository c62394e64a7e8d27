//! Command Dispatcher (spec.md §4.2, §6, §7): validates decoded inbound
//! packets, mutates `Configuration`, and produces the ack/error/event to
//! send back. Deterministic and host-testable; the main loop owns the
//! actual encode+write.

use crate::config::{clamp_period_ms, Configuration};
use crate::messages::{
    CMD_PING, CMD_SET_BIO_MS, CMD_SET_FOCUS, CMD_SET_HM, CMD_SET_LIGHT_MS, CMD_SET_TARGETS_MS,
    ACK_CLAMPED, ACK_OK,
};
use crate::protocol::ErrCode;

/// What to send back for one dispatched command.
#[derive(Debug)]
pub enum DispatchOutcome {
    Ack { cmd_id: u8, status: u8, value: i32 },
    Error { cmd_id: u8, err: ErrCode },
    Pong { t_ms: u32 },
}

/// Validate and apply one decoded `(msg_type, payload)` against
/// `config`. Validation order per spec.md §4.2: length exact, then value
/// range, then apply.
pub fn dispatch(config: &mut Configuration, msg_type: u8, payload: &[u8], now_ms: u32) -> DispatchOutcome {
    match msg_type {
        CMD_SET_HM => {
            if payload.len() != 1 {
                return bad_len(msg_type);
            }
            let hm = payload[0];
            if hm > 1 {
                return bad_value(msg_type);
            }
            config.head_moving = hm == 1;
            DispatchOutcome::Ack {
                cmd_id: msg_type,
                status: ACK_OK,
                value: hm as i32,
            }
        }
        CMD_SET_FOCUS => {
            if payload.len() != 2 {
                return bad_len(msg_type);
            }
            let cluster = i16::from_le_bytes([payload[0], payload[1]]);
            config.forced_focus_cluster = cluster;
            DispatchOutcome::Ack {
                cmd_id: msg_type,
                status: ACK_OK,
                value: cluster as i32,
            }
        }
        CMD_SET_BIO_MS => {
            if payload.len() != 2 {
                return bad_len(msg_type);
            }
            let requested = u16::from_le_bytes([payload[0], payload[1]]);
            let (applied, clamped) = clamp_period_ms(requested);
            config.bio_period_ms = applied;
            DispatchOutcome::Ack {
                cmd_id: msg_type,
                status: if clamped { ACK_CLAMPED } else { ACK_OK },
                value: applied as i32,
            }
        }
        CMD_SET_TARGETS_MS => {
            if payload.len() != 2 {
                return bad_len(msg_type);
            }
            let requested = u16::from_le_bytes([payload[0], payload[1]]);
            let (applied, clamped) = clamp_period_ms(requested);
            config.targets_period_ms = applied;
            DispatchOutcome::Ack {
                cmd_id: msg_type,
                status: if clamped { ACK_CLAMPED } else { ACK_OK },
                value: applied as i32,
            }
        }
        CMD_SET_LIGHT_MS => {
            if payload.len() != 2 {
                return bad_len(msg_type);
            }
            let requested = u16::from_le_bytes([payload[0], payload[1]]);
            let (applied, clamped) = clamp_period_ms(requested);
            config.light_period_ms = applied;
            DispatchOutcome::Ack {
                cmd_id: msg_type,
                status: if clamped { ACK_CLAMPED } else { ACK_OK },
                value: applied as i32,
            }
        }
        CMD_PING => {
            if !payload.is_empty() {
                return bad_len(msg_type);
            }
            DispatchOutcome::Pong { t_ms: now_ms }
        }
        _ => DispatchOutcome::Error {
            cmd_id: msg_type,
            err: ErrCode::UnknownCmd,
        },
    }
}

fn bad_len(cmd_id: u8) -> DispatchOutcome {
    DispatchOutcome::Error {
        cmd_id,
        err: ErrCode::BadLen,
    }
}

fn bad_value(cmd_id: u8) -> DispatchOutcome {
    DispatchOutcome::Error {
        cmd_id,
        err: ErrCode::BadValue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_hm_applies_and_acks() {
        let mut cfg = Configuration::default();
        let out = dispatch(&mut cfg, CMD_SET_HM, &[1], 0);
        assert!(cfg.head_moving);
        match out {
            DispatchOutcome::Ack { status, value, .. } => {
                assert_eq!(status, ACK_OK);
                assert_eq!(value, 1);
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn set_hm_out_of_range_is_bad_value_and_config_unchanged() {
        let mut cfg = Configuration::default();
        let out = dispatch(&mut cfg, CMD_SET_HM, &[2], 0);
        assert!(!cfg.head_moving);
        match out {
            DispatchOutcome::Error { err, .. } => assert_eq!(err, ErrCode::BadValue),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn set_bio_ms_clamps_below_floor() {
        let mut cfg = Configuration::default();
        let out = dispatch(&mut cfg, CMD_SET_BIO_MS, &10u16.to_le_bytes(), 0);
        assert_eq!(cfg.bio_period_ms, 50);
        match out {
            DispatchOutcome::Ack { status, value, .. } => {
                assert_eq!(status, ACK_CLAMPED);
                assert_eq!(value, 50);
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn wrong_length_is_bad_len() {
        let mut cfg = Configuration::default();
        let out = dispatch(&mut cfg, CMD_SET_BIO_MS, &[1], 0);
        match out {
            DispatchOutcome::Error { err, cmd_id } => {
                assert_eq!(err, ErrCode::BadLen);
                assert_eq!(cmd_id, CMD_SET_BIO_MS);
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn unknown_msg_type_is_unknown_cmd() {
        let mut cfg = Configuration::default();
        let out = dispatch(&mut cfg, 0x7F, &[], 0);
        match out {
            DispatchOutcome::Error { err, cmd_id } => {
                assert_eq!(err, ErrCode::UnknownCmd);
                assert_eq!(cmd_id, 0x7F);
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn ping_pongs_with_timestamp() {
        let mut cfg = Configuration::default();
        let out = dispatch(&mut cfg, CMD_PING, &[], 12_345);
        match out {
            DispatchOutcome::Pong { t_ms } => assert_eq!(t_ms, 12_345),
            other => panic!("{other:?}"),
        }
    }
}
