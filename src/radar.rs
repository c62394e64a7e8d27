//! Radar driver contract (spec.md §1: "out of scope ... assumed to
//! expose"). Fusion and the main loop are written against this trait so
//! they're host-testable without real radar hardware, the same way
//! `embedded-hal` traits decouple driver logic from a specific chip — this
//! crate already depends on `embedded-hal` for that reason.

use heapless::Vec;

use crate::focus::Target;

/// Hard cap on the number of clustered targets a single radar frame can
/// carry in this crate's fixed buffers. The wire protocol caps *emitted*
/// targets at 8 (spec.md §4.5/§6) with a truncation flag; the radar driver
/// itself may cluster a handful more before the Telemetry Scheduler trims
/// the list, so this is sized a little above the wire cap.
pub const MAX_RADAR_TARGETS: usize = 16;

/// One radar driver sample. Readings the driver could not produce this
/// frame are represented by their `*_ok` flag being `false`; the paired
/// value is then don't-care (Fusion never reads it when `*_ok` is false).
// Not `defmt::Format`: `heapless::Vec` only implements it behind a feature
// this crate doesn't enable (see `protocol.rs`'s `DecodeEvent`, which makes
// the same call for the same reason). Nothing logs a whole `RadarFrame`;
// the main loop logs individual `Diagnostics`/`PersonState` fields instead.
#[derive(Clone, Debug, PartialEq)]
pub struct RadarFrame {
    pub human: bool,
    pub targets: Vec<Target, MAX_RADAR_TARGETS>,
    pub dist_ok: bool,
    pub dist_cm: f32,
    pub br_ok: bool,
    pub br_bpm: f32,
    pub hr_ok: bool,
    pub hr_bpm: f32,
}

impl RadarFrame {
    pub fn empty() -> Self {
        Self {
            human: false,
            targets: Vec::new(),
            dist_ok: false,
            dist_cm: 0.0,
            br_ok: false,
            br_bpm: 0.0,
            hr_ok: false,
            hr_bpm: 0.0,
        }
    }
}

impl Default for RadarFrame {
    fn default() -> Self {
        Self::empty()
    }
}

/// A radar module that yields one `RadarFrame` per call, or times out.
/// The main loop bounds this wait to ~100 ms (spec.md §4.6) so that inbound
/// command pumping still runs at least once per iteration regardless of
/// sensor availability.
pub trait RadarSource {
    /// Block (cooperatively) until the next frame is ready, or return
    /// `None` if none arrived. A driver timeout is a no-op, not an error
    /// (spec.md §4.4: "A frame with no radar update ... is a no-op").
    async fn next_frame(&mut self) -> Option<RadarFrame>;
}
