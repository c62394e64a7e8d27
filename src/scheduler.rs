//! Telemetry Scheduler (spec.md §4.5): decides, once per main-loop
//! iteration, which of {targets, state, bio, light} frames to emit. Each
//! lane owns its own `last_emit_ms` so a late tick never triggers a
//! catch-up burst — every check is a single `now - last_emit_ms` compare,
//! never a loop.

use heapless::Vec;

use crate::config::Configuration;
use crate::fusion::{FrameOutputs, PersonState, PoseGuess};
use crate::messages::{self, EVT_BIO, EVT_LIGHT, EVT_STATE, EVT_TARGETS};
use crate::protocol::MAX_OUTBOUND_PAYLOAD;

/// State lane re-emits on a timeout even with no material change.
const STATE_HEARTBEAT_MS: u64 = 1000;

/// One frame the caller should encode and write out.
pub struct PendingFrame {
    pub msg_type: u8,
    pub payload: Vec<u8, MAX_OUTBOUND_PAYLOAD>,
}

fn pending<const N: usize>(msg_type: u8, payload: Vec<u8, N>) -> PendingFrame {
    let mut out = Vec::new();
    // Infallible: every concrete payload is far smaller than MAX_OUTBOUND_PAYLOAD.
    let _ = out.extend_from_slice(&payload);
    PendingFrame {
        msg_type,
        payload: out,
    }
}

/// What one `Scheduler::tick` decided to emit, in spec.md §4.5's order.
#[derive(Default)]
pub struct SchedulerTick {
    pub targets: Option<PendingFrame>,
    pub state: Option<PendingFrame>,
    pub bio: Option<PendingFrame>,
    pub light: Option<PendingFrame>,
}

#[derive(Clone, Copy, PartialEq)]
struct StateSnapshot {
    state: PersonState,
    pose: PoseGuess,
    head_moving: bool,
    n_targets: u8,
}

pub struct Scheduler {
    last_targets_ms: u64,
    last_state_ms: u64,
    last_bio_ms: u64,
    last_light_ms: u64,
    prev: Option<StateSnapshot>,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            last_targets_ms: 0,
            last_state_ms: 0,
            last_bio_ms: 0,
            last_light_ms: 0,
            prev: None,
        }
    }

    /// Run one scheduling pass, in spec.md §4.5's emission order (targets,
    /// state, bio, then the supplemented light lane). `targets` is this
    /// frame's raw target list (`FrameOutputs` only retains the focus
    /// pick, not the full list); `light_reading` is `Some((lux, valid))`
    /// when the ambient-light driver produced something this tick (it is
    /// polled independently of the radar cadence by the main loop).
    pub fn tick(
        &mut self,
        now_ms: u64,
        config: &Configuration,
        out: &FrameOutputs,
        targets: &[crate::focus::Target],
        light_reading: Option<(u16, bool)>,
    ) -> SchedulerTick {
        let mut tick = SchedulerTick::default();

        if out.n_targets > 0
            && now_ms.saturating_sub(self.last_targets_ms) >= config.targets_period_ms as u64
        {
            const MAX_WIRE_TARGETS: usize = 8;
            let truncated = targets.len() > MAX_WIRE_TARGETS;
            let payload = messages::targets_payload(
                now_ms as u32,
                config.forced_focus_cluster,
                out.focus.as_ref(),
                truncated,
                targets,
            );
            tick.targets = Some(pending(EVT_TARGETS, payload));
            self.last_targets_ms = now_ms;
        }

        let snapshot = StateSnapshot {
            state: out.state,
            pose: out.pose,
            head_moving: config.head_moving,
            n_targets: out.n_targets,
        };
        if self.prev != Some(snapshot) || now_ms.saturating_sub(self.last_state_ms) > STATE_HEARTBEAT_MS {
            let payload = messages::state_payload(
                now_ms as u32,
                out.state,
                out.pose,
                config.head_moving,
                out.human,
                out.n_targets,
                out.dist_cm,
            );
            tick.state = Some(pending(EVT_STATE, payload));
            self.last_state_ms = now_ms;
            self.prev = Some(snapshot);
        }

        if now_ms.saturating_sub(self.last_bio_ms) >= config.bio_period_ms as u64 {
            let payload = messages::bio_payload(
                now_ms as u32,
                out.vitals_allowed,
                out.vitals_valid,
                out.br_bpm.is_some(),
                out.hr_bpm.is_some(),
                out.br_bpm,
                out.hr_bpm,
            );
            tick.bio = Some(pending(EVT_BIO, payload));
            self.last_bio_ms = now_ms;
        }

        if let Some((lux, valid)) = light_reading {
            if now_ms.saturating_sub(self.last_light_ms) >= config.light_period_ms as u64 {
                let payload =
                    messages::light_payload(now_ms as u32, valid, valid.then_some(lux));
                tick.light = Some(pending(EVT_LIGHT, payload));
                self.last_light_ms = now_ms;
            }
        }

        tick
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::EngineState;

    fn one_target(cluster_id: i16) -> crate::focus::Target {
        crate::focus::Target {
            cluster_id,
            x: 0.0,
            y: 0.8,
            doppler_index: 0,
        }
    }

    #[test]
    fn bio_emits_on_period_not_before() {
        let cfg = Configuration::default();
        let mut engine = EngineState::new();
        let mut sched = Scheduler::new();
        let out = engine.update(
            &cfg,
            0,
            &[],
            crate::fusion::VitalsSample {
                human: false,
                dist_ok: false,
                dist_cm: 0.0,
                br_ok: false,
                br_bpm: 0.0,
                hr_ok: false,
                hr_bpm: 0.0,
            },
        );
        let t0 = sched.tick(0, &cfg, &out, &[], None);
        assert!(t0.bio.is_none()); // period hasn't elapsed since boot yet
        let t1 = sched.tick(10, &cfg, &out, &[], None);
        assert!(t1.bio.is_none());
        let t2 = sched.tick(cfg.bio_period_ms as u64, &cfg, &out, &[], None);
        assert!(t2.bio.is_some());
    }

    #[test]
    fn targets_lane_requires_at_least_one_target() {
        let cfg = Configuration::default();
        let mut engine = EngineState::new();
        let mut sched = Scheduler::new();
        let targets = [one_target(1)];
        let out = engine.update(
            &cfg,
            0,
            &targets,
            crate::fusion::VitalsSample {
                human: true,
                dist_ok: true,
                dist_cm: 80.0,
                br_ok: false,
                br_bpm: 0.0,
                hr_ok: false,
                hr_bpm: 0.0,
            },
        );
        let due = cfg.targets_period_ms as u64;
        let tick = sched.tick(due, &cfg, &out, &targets, None);
        assert!(tick.targets.is_some());

        let out_empty = engine.update(
            &cfg,
            due + 1,
            &[],
            crate::fusion::VitalsSample {
                human: false,
                dist_ok: false,
                dist_cm: 0.0,
                br_ok: false,
                br_bpm: 0.0,
                hr_ok: false,
                hr_bpm: 0.0,
            },
        );
        let tick2 = sched.tick(due + 1, &cfg, &out_empty, &[], None);
        assert!(tick2.targets.is_none());
    }

    #[test]
    fn bio_frame_carries_valid_zero_while_head_moving() {
        let mut cfg = Configuration::default();
        cfg.head_moving = true;
        let mut engine = EngineState::new();
        let mut sched = Scheduler::new();
        let targets = [one_target(1)];
        let out = engine.update(
            &cfg,
            0,
            &targets,
            crate::fusion::VitalsSample {
                human: true,
                dist_ok: true,
                dist_cm: 80.0,
                br_ok: true,
                br_bpm: 14.0,
                hr_ok: true,
                hr_bpm: 72.0,
            },
        );
        assert!(!out.vitals_valid);
        let due = cfg.bio_period_ms as u64;
        let tick = sched.tick(due, &cfg, &out, &targets, None);
        let frame = tick.bio.expect("bio lane is unconditional on its own cadence");
        assert_eq!(frame.payload[4], 0); // `allowed` byte
        assert_eq!(frame.payload[5], 0); // `valid` byte
    }

    #[test]
    fn state_lane_emits_on_material_change() {
        let cfg = Configuration::default();
        let mut engine = EngineState::new();
        let mut sched = Scheduler::new();
        let empty_sample = crate::fusion::VitalsSample {
            human: false,
            dist_ok: false,
            dist_cm: 0.0,
            br_ok: false,
            br_bpm: 0.0,
            hr_ok: false,
            hr_bpm: 0.0,
        };
        let out0 = engine.update(&cfg, 0, &[], empty_sample);
        let t0 = sched.tick(0, &cfg, &out0, &[], None);
        assert!(t0.state.is_some());
        let t1 = sched.tick(1, &cfg, &out0, &[], None);
        assert!(t1.state.is_none());
    }
}
