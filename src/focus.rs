//! `Target` derived fields and the Focus Picker (spec.md §3, §4.3).
//!
//! Pure: no state, no I/O. `Target` carries exactly the per-frame fields the
//! radar driver is assumed to expose (spec.md §1) plus the three derived
//! values (`r`, `bearing_deg`, `speed_cm_s`) computed on demand rather than
//! cached, since they're cheap and the frame's target list never outlives
//! one Fusion pass.

/// One clustered target as reported by the radar driver for the current
/// frame. `doppler_index` is the driver's raw radial-velocity estimate;
/// `speed_cm_s` scales it by the caller-supplied `RANGE_STEP`.
#[derive(Clone, Copy, Debug, PartialEq, defmt::Format)]
pub struct Target {
    pub cluster_id: i16,
    pub x: f32,
    pub y: f32,
    pub doppler_index: i32,
}

impl Target {
    /// Radial distance from the sensor, in meters.
    pub fn r(&self) -> f32 {
        libm::sqrtf(self.x * self.x + self.y * self.y)
    }

    /// Bearing off boresight, in degrees. `atan2` isn't a `core` intrinsic
    /// (unlike `sqrt`), so this goes through `libm`.
    pub fn bearing_deg(&self) -> f32 {
        libm::atan2f(self.x, self.y) * (180.0 / core::f32::consts::PI)
    }

    /// Radial speed in cm/s, scaled from the driver's doppler index.
    pub fn speed_cm_s(&self, range_step: f32) -> f32 {
        self.doppler_index as f32 * range_step
    }
}

/// The single target the engine currently treats as "the person", plus its
/// position in the frame's target list (spec.md §3's `FocusTarget`).
#[derive(Clone, Copy, Debug, PartialEq, defmt::Format)]
pub struct FocusTarget {
    pub target: Target,
    pub index: usize,
}

/// Select at most one target from `targets` (spec.md §4.3).
///
/// - `forced_focus_cluster >= 0`: the first target with matching
///   `cluster_id`; if none match this frame, falls back to nearest.
/// - Otherwise: the target with the smallest finite `r`, ties broken by
///   first-in-list.
/// - Empty list: no focus.
pub fn pick_focus(targets: &[Target], forced_focus_cluster: i16) -> Option<FocusTarget> {
    if targets.is_empty() {
        return None;
    }

    if forced_focus_cluster >= 0 {
        if let Some((index, &target)) = targets
            .iter()
            .enumerate()
            .find(|(_, t)| t.cluster_id == forced_focus_cluster)
        {
            return Some(FocusTarget { target, index });
        }
    }

    nearest(targets)
}

fn nearest(targets: &[Target]) -> Option<FocusTarget> {
    let mut best: Option<(usize, Target, f32)> = None;
    for (index, &target) in targets.iter().enumerate() {
        let r = target.r();
        if !r.is_finite() {
            continue;
        }
        match best {
            None => best = Some((index, target, r)),
            Some((_, _, best_r)) if r < best_r => best = Some((index, target, r)),
            _ => {}
        }
    }
    best.map(|(index, target, _)| FocusTarget { target, index })
}
