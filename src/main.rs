#![no_std]
#![no_main]

//! Main Loop (spec.md §4.6, §5): boot, send `EVT_HELLO`, then forever pump
//! inbound bytes into the Framing Codec, take a bounded-wait radar sample,
//! run Fusion, run the Telemetry Scheduler. Single `embassy_executor::main`
//! task — single-threaded cooperative scheduling per spec.md §5, the same
//! embassy idiom the teacher already establishes (`cyw43_task`,
//! `serial_usb.rs`'s `usb_task`/`cdc_task`).

mod serial;
mod serial_usb;
mod sys;

use defmt::{debug, info, warn};
use embassy_executor::Spawner;
use embassy_time::{with_timeout, Duration, Instant};
use defmt_rtt as _;

use presence_vitals_fw::config::Configuration;
use presence_vitals_fw::dispatch::{dispatch, DispatchOutcome};
use presence_vitals_fw::fusion::{EngineState, VitalsSample};
use presence_vitals_fw::light::{LightSensor, NoLightSensor};
use presence_vitals_fw::messages;
use presence_vitals_fw::protocol::{DecodeEvent, Decoder, Encoder};
use presence_vitals_fw::radar::{RadarFrame, RadarSource};
use presence_vitals_fw::scheduler::{PendingFrame, Scheduler};

/// Radar driver is an external collaborator, out of scope per spec.md §1
/// ("assumed to expose ..."). This stand-in never produces a frame; a real
/// board swaps it for the concrete driver wired to the radar module's SPI/
/// UART bus.
struct NoRadar;

impl RadarSource for NoRadar {
    async fn next_frame(&mut self) -> Option<RadarFrame> {
        None
    }
}

/// Bounded wait for the next radar sample (spec.md §4.6: "~100 ms").
const RADAR_WAIT: Duration = Duration::from_millis(100);

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    sys::init();
    let p = embassy_rp::init(Default::default());
    let port = serial_usb::init(&spawner, p.USB);

    let mut encoder = Encoder::new();
    let mut decoder = Decoder::new();
    let mut config = Configuration::default();
    let mut engine = EngineState::new();
    let mut scheduler = Scheduler::new();
    let mut radar = NoRadar;
    let mut light = NoLightSensor;

    send(&port, &mut encoder, messages::EVT_HELLO, &messages::hello_payload()).await;
    info!("boot: EVT_HELLO sent");

    loop {
        // Step 1: pump every inbound byte currently queued; never blocks.
        while let Some(chunk) = port.try_read() {
            for &b in chunk.iter() {
                if let Some(event) = decoder.push_byte(b) {
                    handle_decode_event(&port, &mut encoder, &mut config, event).await;
                }
            }
        }

        // Step 2: bounded wait for the next radar frame.
        let frame = match with_timeout(RADAR_WAIT, radar.next_frame()).await {
            Ok(Some(frame)) => frame,
            _ => continue, // timeout or driver miss: no-op, go pump bytes again
        };

        // Step 3: Fusion.
        let now_ms = Instant::now().as_millis();
        let sample = VitalsSample {
            human: frame.human,
            dist_ok: frame.dist_ok,
            dist_cm: frame.dist_cm,
            br_ok: frame.br_ok,
            br_bpm: frame.br_bpm,
            hr_ok: frame.hr_ok,
            hr_bpm: frame.hr_bpm,
        };
        let out = engine.update(&config, now_ms, &frame.targets, sample);
        debug!(
            "fusion: state={} n_targets={} vitals_streak={}",
            out.state, out.diagnostics.n_targets, out.diagnostics.vitals_streak
        );

        // Step 4: Telemetry Scheduler.
        let light_reading = light.try_read();
        let tick = scheduler.tick(now_ms, &config, &out, &frame.targets, light_reading);
        if let Some(f) = tick.targets {
            send_pending(&port, &mut encoder, f).await;
        }
        if let Some(f) = tick.state {
            send_pending(&port, &mut encoder, f).await;
        }
        if let Some(f) = tick.bio {
            send_pending(&port, &mut encoder, f).await;
        }
        if let Some(f) = tick.light {
            send_pending(&port, &mut encoder, f).await;
        }
    }
}

async fn handle_decode_event(
    port: &serial_usb::UsbSerialPort,
    encoder: &mut Encoder,
    config: &mut Configuration,
    event: DecodeEvent,
) {
    match event {
        DecodeEvent::Packet { msg_type, payload, .. } => {
            let now_ms = Instant::now().as_millis() as u32;
            match dispatch(config, msg_type, &payload, now_ms) {
                DispatchOutcome::Ack { cmd_id, status, value } => {
                    info!("dispatch: cmd={:x} status={} value={}", cmd_id, status, value);
                    let payload = messages::ack_payload(cmd_id, status, value);
                    send(port, encoder, messages::EVT_ACK, &payload).await;
                }
                DispatchOutcome::Error { cmd_id, err } => {
                    warn!("dispatch: cmd={:x} rejected ({})", cmd_id, err);
                    let payload = messages::err_payload(cmd_id, err as u8);
                    send(port, encoder, messages::EVT_ERR, &payload).await;
                }
                DispatchOutcome::Pong { t_ms } => {
                    let payload = messages::pong_payload(t_ms);
                    send(port, encoder, messages::EVT_PONG, &payload).await;
                }
            }
        }
        DecodeEvent::Error { cmd_id, err } => {
            warn!("framing error: cmd={:x} ({})", cmd_id, err);
            let payload = messages::err_payload(cmd_id, err as u8);
            send(port, encoder, messages::EVT_ERR, &payload).await;
        }
    }
}

async fn send(port: &serial_usb::UsbSerialPort, encoder: &mut Encoder, msg_type: u8, payload: &[u8]) {
    match encoder.encode(msg_type, payload) {
        Ok(stuffed) => port.write(&stuffed).await,
        Err(e) => warn!("encode failed for msg_type={:x}: {}", msg_type, e),
    }
}

async fn send_pending(port: &serial_usb::UsbSerialPort, encoder: &mut Encoder, frame: PendingFrame) {
    send(port, encoder, frame.msg_type, &frame.payload).await;
}
