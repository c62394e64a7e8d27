//! Ambient-light passthrough (SPEC_FULL.md §6.1). External collaborator,
//! same shape as the radar driver contract in `radar.rs`: modeled as a
//! trait so the Telemetry Scheduler's light lane is host-testable without
//! real hardware. Never reads or writes Fusion/Engine state.

/// A sensor that yields `(lux, valid)` without blocking the main loop.
/// `valid == false` (or `None` from `try_read`) means "no fresh reading
/// this tick" — silent, not an error (spec.md §7's sensor-missing policy,
/// generalized to this optional peripheral per SPEC_FULL.md §6.1).
pub trait LightSensor {
    fn try_read(&mut self) -> Option<(u16, bool)>;
}

/// Stand-in for boards with no physical light sensor wired up: always
/// reports "nothing new".
pub struct NoLightSensor;

impl LightSensor for NoLightSensor {
    fn try_read(&mut self) -> Option<(u16, bool)> {
        None
    }
}
