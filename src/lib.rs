//! Pure, host-testable core of the presence/vitals firmware: wire framing,
//! the command dispatcher, the focus picker, the fusion/state engine and
//! the telemetry scheduler. None of this talks to hardware directly; the
//! binary crate (`src/main.rs`) owns the radar/serial/USB glue and drives
//! these modules from an `embassy_executor` task.
#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod dispatch;
pub mod focus;
pub mod fusion;
pub mod light;
pub mod messages;
pub mod protocol;
pub mod radar;
pub mod scheduler;

pub use config::Configuration;
pub use focus::{FocusTarget, Target};
pub use fusion::{Diagnostics, EngineState, PersonState, PoseGuess};
pub use protocol::{DecodeEvent, Decoder, Encoder};
pub use radar::RadarFrame;
pub use scheduler::{Scheduler, SchedulerTick};
