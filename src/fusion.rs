//! Fusion & State Engine (spec.md §3, §4.4, §8). Owns all hysteresis
//! counters and last-good values; this is the largest module by line share
//! and the one place in this crate where getting the cascade order wrong
//! silently breaks a property test rather than failing to compile.
//!
//! `EngineState::update` is a single, deterministic, host-testable function
//! over the previous state, the current `Configuration`, and one radar
//! sample. It never logs and never touches the wire — the main loop logs
//! `Diagnostics` and hands the resulting `PersonState`/`PoseGuess` to the
//! Telemetry Scheduler.

use crate::config::Configuration;
use crate::focus::{pick_focus, FocusTarget, Target};

// --- Tuning constants (spec.md §4.4) ---------------------------------

pub const NEAR_MIN_DIST_CM: f32 = 35.0;
pub const NEAR_MAX_DIST_CM: f32 = 150.0;
pub const SIT_STAND_THRESHOLD_CM: f32 = 55.0;

pub const MOVING_CM_S: f32 = 8.0;

pub const BR_MIN: f32 = 4.0;
pub const BR_MAX: f32 = 30.0;
pub const HR_MIN: f32 = 35.0;
pub const HR_MAX: f32 = 200.0;

pub const ABSENT_HOLD_MS: u64 = 1200;
pub const ABSENT_CONFIRM: u8 = 8;

pub const VITALS_CONFIRM: u8 = 5;
pub const HUMAN_STABLE_FALLBACK_CONFIRM: u8 = 3;
pub const TARGET_LOSS_GRACE_MS: u64 = 1200;

/// Doppler-to-cm/s scale factor; driver-specific, per spec.md §9's Open
/// Questions (kept as a compile-time constant, calibrated for this board's
/// radar module).
pub const RANGE_STEP: f32 = 1.0;

#[derive(Clone, Copy, Debug, Eq, PartialEq, defmt::Format)]
#[repr(u8)]
pub enum PersonState {
    NoTarget = 0,
    MultiTarget = 1,
    PresentFar = 2,
    Moving = 3,
    StillNear = 4,
    RestingVitals = 5,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, defmt::Format)]
#[repr(u8)]
pub enum PoseGuess {
    Unknown = 0,
    Sitting = 1,
    Standing = 2,
}

/// Raw per-frame radar outputs Fusion consumes, already split out of
/// `RadarFrame` (which also carries the target list passed separately so
/// the focus picker can borrow it without cloning).
#[derive(Clone, Copy, Debug, defmt::Format)]
pub struct VitalsSample {
    pub human: bool,
    pub dist_ok: bool,
    pub dist_cm: f32,
    pub br_ok: bool,
    pub br_bpm: f32,
    pub hr_ok: bool,
    pub hr_bpm: f32,
}

/// Intermediate booleans/counters from one `update()` call, bundled for
/// `defmt::debug!` logging at the call site (SPEC_FULL.md's Fusion
/// supplement). Not part of the wire protocol.
#[derive(Clone, Copy, Debug, defmt::Format)]
pub struct Diagnostics {
    pub n_targets: u8,
    pub present_now: bool,
    pub presence_recent: bool,
    pub absent_streak: u8,
    pub moving: bool,
    pub near: bool,
    pub single_target: bool,
    pub fallback_target_lock: bool,
    pub human_stable_streak: u8,
    pub vitals_allowed: bool,
    pub br_valid: bool,
    pub hr_valid: bool,
    pub vitals_valid: bool,
    pub vitals_streak: u8,
}

/// Result of one `EngineState::update` call: everything the Telemetry
/// Scheduler and message encoders need, already derived.
pub struct FrameOutputs {
    pub state: PersonState,
    pub pose: PoseGuess,
    pub focus: Option<FocusTarget>,
    pub human: bool,
    pub n_targets: u8,
    pub dist_cm: Option<f32>,
    pub br_bpm: Option<f32>,
    pub hr_bpm: Option<f32>,
    pub vitals_allowed: bool,
    pub vitals_valid: bool,
    pub diagnostics: Diagnostics,
}

/// Process-wide engine state (spec.md §3), mutated only by `update()`.
#[derive(Clone, Copy, Debug, defmt::Format)]
pub struct EngineState {
    last_dist_cm: Option<f32>,
    last_br_bpm: Option<f32>,
    last_hr_bpm: Option<f32>,
    last_presence_ms: u64,
    /// Whether any presence signal has ever been observed. Until it has,
    /// `last_presence_ms` has no meaningful value, so `presence_recent` must
    /// read `false` regardless of `now_ms` (spec.md §3: "Initial state is
    /// `NO_TARGET`").
    any_presence_seen: bool,
    absent_streak: u8,
    vitals_streak: u8,
    human_stable_streak: u8,
    last_single_target_ms: u64,
    seen_single_target: bool,
}

impl EngineState {
    pub const fn new() -> Self {
        Self {
            last_dist_cm: None,
            last_br_bpm: None,
            last_hr_bpm: None,
            last_presence_ms: 0,
            any_presence_seen: false,
            // Boot as "absent until first presence": rule 1 of the step-10
            // cascade must already be able to fire on the very first frame.
            absent_streak: ABSENT_CONFIRM,
            vitals_streak: 0,
            human_stable_streak: 0,
            last_single_target_ms: 0,
            seen_single_target: false,
        }
    }

    /// Run one per-frame update (spec.md §4.4 steps 1-11).
    pub fn update(
        &mut self,
        config: &Configuration,
        now_ms: u64,
        targets: &[Target],
        sample: VitalsSample,
    ) -> FrameOutputs {
        // Step 1: per-frame counts, already split by the caller; step 2: focus.
        let n_targets = targets.len();
        let focus = pick_focus(targets, config.forced_focus_cluster);

        // Step 3: last-good readings. A missing reading reuses the stored
        // value for every downstream check; a fresh finite-positive one
        // overwrites it. Never stored as NaN/zero/negative (spec.md §3).
        let dist_cm = update_last_good(&mut self.last_dist_cm, sample.dist_ok, sample.dist_cm);
        let br_bpm = update_last_good(&mut self.last_br_bpm, sample.br_ok, sample.br_bpm);
        let hr_bpm = update_last_good(&mut self.last_hr_bpm, sample.hr_ok, sample.hr_bpm);

        // Step 4/5: presence hysteresis. Each term tests *this frame's*
        // fresh reading, not the sticky last-good value returned by step 3
        // — the last-good values never clear once set, so gating on them
        // would make `present_now` permanently true after first contact and
        // `absent_streak` would never grow.
        let present_now = sample.human
            || n_targets > 0
            || finite_positive(Some(sample.dist_cm).filter(|_| sample.dist_ok))
            || finite_positive(Some(sample.br_bpm).filter(|_| sample.br_ok))
            || finite_positive(Some(sample.hr_bpm).filter(|_| sample.hr_ok));
        if present_now {
            self.last_presence_ms = now_ms;
            self.any_presence_seen = true;
            self.absent_streak = 0;
        } else {
            self.absent_streak = self.absent_streak.saturating_add(1);
        }
        let presence_recent =
            self.any_presence_seen && now_ms.saturating_sub(self.last_presence_ms) < ABSENT_HOLD_MS;

        // Step 6: movement.
        let target_moving = focus
            .map(|f| libm::fabsf(f.target.speed_cm_s(RANGE_STEP)) >= MOVING_CM_S)
            .unwrap_or(false);
        let moving = config.head_moving || target_moving;

        // Step 7: near-field distance gate.
        let near = dist_cm
            .map(|d| (NEAR_MIN_DIST_CM..=NEAR_MAX_DIST_CM).contains(&d))
            .unwrap_or(false);

        // Step 8: single-target tracking + fallback window.
        let single_target = n_targets == 1;
        if single_target {
            self.seen_single_target = true;
            self.last_single_target_ms = now_ms;
        }
        self.human_stable_streak = if sample.human && !config.head_moving {
            self.human_stable_streak.saturating_add(1)
        } else {
            0
        };
        let single_target_recent = self.seen_single_target
            && now_ms.saturating_sub(self.last_single_target_ms) <= TARGET_LOSS_GRACE_MS;
        let fallback_target_lock = !single_target
            && n_targets == 0
            && single_target_recent
            && self.human_stable_streak >= HUMAN_STABLE_FALLBACK_CONFIRM;

        // Step 9: vitals gating.
        let br_valid = sample.br_ok
            && br_bpm.map(|b| (BR_MIN..=BR_MAX).contains(&b)).unwrap_or(false);
        let hr_valid = sample.hr_ok
            && hr_bpm.map(|h| (HR_MIN..=HR_MAX).contains(&h)).unwrap_or(false);
        let vitals_allowed = !config.head_moving && (single_target || fallback_target_lock);
        let vitals_valid = vitals_allowed && br_valid && hr_valid;
        self.vitals_streak = if vitals_valid {
            self.vitals_streak.saturating_add(1)
        } else {
            0
        };

        // Step 10: state cascade, first match wins. `n_targets > 1` and
        // `head_moving` (folded into `moving`) already force `vitals_valid`
        // false above, so `vitals_streak` is already 0 in those frames; the
        // explicit resets below just make the invariant visible at the
        // decision site too.
        let state = if !presence_recent && self.absent_streak >= ABSENT_CONFIRM {
            self.vitals_streak = 0;
            PersonState::NoTarget
        } else if n_targets > 1 {
            self.vitals_streak = 0;
            PersonState::MultiTarget
        } else if moving {
            self.vitals_streak = 0;
            PersonState::Moving
        } else if near && self.vitals_streak >= VITALS_CONFIRM {
            PersonState::RestingVitals
        } else if near {
            PersonState::StillNear
        } else {
            PersonState::PresentFar
        };

        // Step 11: pose.
        let pose = match dist_cm {
            Some(d) if !matches!(state, PersonState::NoTarget) && finite_positive(Some(d)) => {
                if d < SIT_STAND_THRESHOLD_CM {
                    PoseGuess::Sitting
                } else {
                    PoseGuess::Standing
                }
            }
            _ => PoseGuess::Unknown,
        };

        let n_targets_u8 = n_targets.min(u8::MAX as usize) as u8;

        FrameOutputs {
            state,
            pose,
            focus,
            human: sample.human,
            n_targets: n_targets_u8,
            dist_cm,
            br_bpm,
            hr_bpm,
            vitals_allowed,
            vitals_valid,
            diagnostics: Diagnostics {
                n_targets: n_targets_u8,
                present_now,
                presence_recent,
                absent_streak: self.absent_streak,
                moving,
                near,
                single_target,
                fallback_target_lock,
                human_stable_streak: self.human_stable_streak,
                vitals_allowed,
                br_valid,
                hr_valid,
                vitals_valid,
                vitals_streak: self.vitals_streak,
            },
        }
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

fn finite_positive(v: Option<f32>) -> bool {
    v.map(|v| v.is_finite() && v > 0.0).unwrap_or(false)
}

/// Update `stored` with `value` iff `ok` and `value` is finite-positive;
/// otherwise leave `stored` untouched. Returns the value downstream checks
/// should use either way.
fn update_last_good(stored: &mut Option<f32>, ok: bool, value: f32) -> Option<f32> {
    if ok && value.is_finite() && value > 0.0 {
        *stored = Some(value);
    }
    *stored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(human: bool, dist: Option<f32>, br: Option<f32>, hr: Option<f32>) -> VitalsSample {
        VitalsSample {
            human,
            dist_ok: dist.is_some(),
            dist_cm: dist.unwrap_or(f32::NAN),
            br_ok: br.is_some(),
            br_bpm: br.unwrap_or(f32::NAN),
            hr_ok: hr.is_some(),
            hr_bpm: hr.unwrap_or(f32::NAN),
        }
    }

    fn one_target(cluster_id: i16) -> Target {
        Target {
            cluster_id,
            x: 0.0,
            y: 0.8,
            doppler_index: 0,
        }
    }

    #[test]
    fn initial_state_is_no_target_when_nothing_ever_seen() {
        let mut engine = EngineState::new();
        let cfg = Configuration::default();
        // A run of empty frames long enough to confirm absence.
        let mut out = None;
        for i in 0..20u64 {
            out = Some(engine.update(&cfg, i * 200, &[], sample(false, None, None, None)));
        }
        assert_eq!(out.unwrap().state, PersonState::NoTarget);
    }

    #[test]
    fn boot_reports_no_target_on_the_very_first_frame() {
        // spec.md §3: "Initial state is NO_TARGET." `last_presence_ms`
        // defaulting to 0 must not make `presence_recent` true just because
        // `now_ms` also starts near 0 at boot.
        let mut engine = EngineState::new();
        let cfg = Configuration::default();
        let out = engine.update(&cfg, 0, &[], sample(false, None, None, None));
        assert_eq!(out.state, PersonState::NoTarget);
    }

    #[test]
    fn presence_then_departure_eventually_returns_to_no_target() {
        let mut engine = EngineState::new();
        let cfg = Configuration::default();
        let targets = [one_target(1)];

        // Settle into presence first.
        for i in 0..5u64 {
            let out = engine.update(&cfg, i * 100, &targets, sample(true, Some(80.0), None, None));
            assert_ne!(out.state, PersonState::NoTarget);
        }

        // Person leaves: no human, no targets, no fresh sensor readings.
        // ABSENT_HOLD_MS must elapse and ABSENT_CONFIRM frames must pass
        // with no presence signal before NO_TARGET reappears.
        let mut out = None;
        let mut now = 400u64;
        for _ in 0..20u64 {
            now += 200;
            out = Some(engine.update(&cfg, now, &[], sample(false, None, None, None)));
        }
        assert_eq!(out.unwrap().state, PersonState::NoTarget);
    }

    #[test]
    fn reaches_resting_vitals_on_fifth_confirming_frame() {
        let mut engine = EngineState::new();
        let cfg = Configuration::default();
        let targets = [one_target(1)];
        let mut states = heapless::Vec::<PersonState, 8>::new();
        for i in 0..6u64 {
            let out = engine.update(
                &cfg,
                1000 + i * 100,
                &targets,
                sample(true, Some(80.0), Some(14.0), Some(72.0)),
            );
            states.push(out.state).unwrap();
        }
        assert_eq!(states[3], PersonState::StillNear);
        assert_eq!(states[4], PersonState::RestingVitals);
        assert_eq!(states[5], PersonState::RestingVitals);
    }

    #[test]
    fn multi_target_resets_vitals_streak_and_cannot_immediately_rest() {
        let mut engine = EngineState::new();
        let cfg = Configuration::default();
        let targets = [one_target(1)];
        for i in 0..6u64 {
            engine.update(
                &cfg,
                1000 + i * 100,
                &targets,
                sample(true, Some(80.0), Some(14.0), Some(72.0)),
            );
        }
        let two = [one_target(1), one_target(2)];
        let out = engine.update(&cfg, 2000, &two, sample(true, Some(80.0), Some(14.0), Some(72.0)));
        assert_eq!(out.state, PersonState::MultiTarget);

        let back_to_one = engine.update(
            &cfg,
            2100,
            &targets,
            sample(true, Some(80.0), Some(14.0), Some(72.0)),
        );
        assert_ne!(back_to_one.state, PersonState::RestingVitals);
    }

    #[test]
    fn fallback_lock_keeps_vitals_allowed_after_brief_target_loss() {
        let mut engine = EngineState::new();
        let cfg = Configuration::default();
        let targets = [one_target(1)];
        for i in 0..10u64 {
            engine.update(&cfg, i * 100, &targets, sample(true, Some(80.0), None, None));
        }
        let out = engine.update(&cfg, 1050, &[], sample(true, Some(80.0), Some(12.0), Some(70.0)));
        assert!(out.vitals_allowed);
    }

    #[test]
    fn head_moving_blocks_vitals_allowed() {
        let mut engine = EngineState::new();
        let mut cfg = Configuration::default();
        cfg.head_moving = true;
        let targets = [one_target(1)];
        let out = engine.update(&cfg, 0, &targets, sample(true, Some(80.0), Some(14.0), Some(72.0)));
        assert!(!out.vitals_allowed);
        assert!(!out.vitals_valid);
    }

    #[test]
    fn head_moving_kills_resting_vitals_next_frame() {
        let mut engine = EngineState::new();
        let mut cfg = Configuration::default();
        let targets = [one_target(1)];
        for i in 0..6u64 {
            engine.update(
                &cfg,
                i * 100,
                &targets,
                sample(true, Some(80.0), Some(14.0), Some(72.0)),
            );
        }
        cfg.head_moving = true;
        let out = engine.update(
            &cfg,
            700,
            &targets,
            sample(true, Some(80.0), Some(14.0), Some(72.0)),
        );
        assert_ne!(out.state, PersonState::RestingVitals);
        assert!(!out.vitals_allowed);
        assert_eq!(out.diagnostics.vitals_streak, 0);
    }

    #[test]
    fn last_good_distance_survives_a_missed_reading() {
        let mut engine = EngineState::new();
        let cfg = Configuration::default();
        let targets = [one_target(1)];
        let first = engine.update(&cfg, 0, &targets, sample(true, Some(80.0), None, None));
        assert_eq!(first.dist_cm, Some(80.0));
        let second = engine.update(&cfg, 100, &targets, sample(true, None, None, None));
        assert_eq!(second.dist_cm, Some(80.0));
    }

    #[test]
    fn pose_is_unknown_without_a_finite_positive_distance() {
        let mut engine = EngineState::new();
        let cfg = Configuration::default();
        let out = engine.update(&cfg, 0, &[], sample(false, None, None, None));
        assert_eq!(out.pose, PoseGuess::Unknown);
    }
}
