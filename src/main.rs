use std::time::Duration;

use ringbuf::traits::Consumer;
use tickmate::{Accent, EngineEvent, PlaybackController};

// How often the demo drains the event ring. Beats arrive every 250ms even
// at 240 BPM, so polling at 50ms never lets the ring back up.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn main() {
    env_logger::init();

    println!("=== Tickmate ===");
    println!("Version 0.1.0\n");

    // Usage: tickmate [tempo] [subdivisions] [seconds]
    let args: Vec<String> = std::env::args().collect();
    let tempo: f32 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(120.0);
    let subdivisions: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(4);
    let seconds: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(8);

    let controller = PlaybackController::new();
    controller.set_tempo(tempo);
    controller.config().set_subdivisions(subdivisions);

    let mut events = match controller.take_events() {
        Some(events) => events,
        None => {
            eprintln!("ERROR: event channel unavailable");
            return;
        }
    };

    println!("Audio output initialisation...");
    if let Err(e) = controller.start() {
        eprintln!("ERROR: {}", e);
        return;
    }
    println!(
        "Playing {} BPM, {} subdivision(s) for {}s\n",
        controller.config().tempo(),
        subdivisions,
        seconds
    );

    let deadline = std::time::Instant::now() + Duration::from_secs(seconds);
    let mut beat_count = 0u64;
    while std::time::Instant::now() < deadline {
        while let Some(event) = events.try_pop() {
            match event {
                EngineEvent::Beat {
                    subdivision,
                    accent,
                    muted,
                    ..
                } => {
                    beat_count += 1;
                    let mark = match accent {
                        Accent::First => "*",
                        Accent::Accent => "+",
                        _ => " ",
                    };
                    let silent = if muted { " (muted)" } else { "" };
                    println!("beat {:>4} {} sub {}{}", beat_count, mark, subdivision, silent);
                }
                EngineEvent::TempoChanged { bpm, source } => {
                    println!("tempo -> {} BPM ({:?})", bpm, source);
                }
                EngineEvent::SilencePhase(on) => {
                    println!("silence phase: {}", if on { "on" } else { "off" });
                }
                EngineEvent::MeasureBoundary { .. } => {}
            }
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    controller.stop();
    println!("\n=== Done ===");
}
