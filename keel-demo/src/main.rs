use anyhow::{Context, Result};
use clap::Parser;
use keel_core::{Event, InitFlags, PlatformContext, Settings, VideoContext};
use keel_io::platform::affinity::pin_thread_to_core;
use keel_io::platform::timer::high_resolution_seconds;
use keel_io::sync::sleep;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod config;
mod tone;

use config::Args;
use tone::Tone;

const FRAME_MS: u32 = 16;

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    info!("Starting Keel demo...");

    let mut settings = match &args.settings {
        Some(path) => Settings::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(rate) = args.sample_rate {
        settings.audio.sample_rate = rate;
    }

    let mut flags = InitFlags::CONSOLE;
    if !args.no_window {
        flags |= InitFlags::WINDOW | InitFlags::VIDEO;
    }
    if !args.no_audio {
        flags |= InitFlags::AUDIO;
    }

    if let Some(core) = args.pin_core {
        pin_thread_to_core(core);
    }

    let mut platform = PlatformContext::with_default_backend();
    platform.initialize(flags, settings.clone()).context("platform bring-up failed")?;

    let topology = platform.topology()?;
    info!(
        "Running on {} ({} cores, {} B pages)",
        topology.processor_name(),
        topology.core_count(),
        topology.page_size()
    );

    // Ctrl-C is delivered like a window close when there is a window.
    let interrupted = Arc::new(AtomicBool::new(false));
    let sink = platform.event_sink().ok();
    let flag = interrupted.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::Release);
        if let Some(sink) = &sink {
            sink.push(Event::WindowClose);
        }
    })
    .context("installing Ctrl-C handler")?;

    if !args.no_audio {
        let audio = &settings.audio;
        let mut tone = Tone::new(args.tone, args.volume, audio.sample_rate, audio.channels, audio.format);
        platform.start_audio(move |buf, frames| tone.fill(buf, frames)).context("starting audio")?;
    }

    let mut input = None;
    if args.simulate_input {
        let sink = platform.event_sink().context("--simulate-input needs a window")?;
        input = Some(platform.spawn_thread("keel-demo-input", move |stop| {
            let mut width = 800;
            while !stop.is_stop_requested() {
                sleep(500);
                width = if width == 800 { 1024 } else { 800 };
                sink.push(Event::WindowResize { width, height: width * 3 / 4 });
                sink.push(Event::Char { ch: 'k' });
            }
        })?);
    }

    if args.no_window {
        run_headless(&args, &interrupted);
    } else {
        run_window_loop(&mut platform, &args)?;
    }

    if let Some(mut input) = input {
        input.request_stop();
        input.join(keel_io::Timeout::INFINITE);
    }

    if let Ok(stats) = platform.audio_stats() {
        let summary = format!(
            "audio: {} frames written, {} played, {} underruns, {} overruns",
            stats.frames_written, stats.frames_played, stats.underruns, stats.overruns
        );
        platform.console()?.write_line(&summary)?;
    }
    if let Ok(dropped) = platform.dropped_events() {
        if dropped > 0 {
            warn!("{} events were dropped by the full queue", dropped);
        }
    }

    platform.shutdown();
    info!("Keel demo finished.");
    Ok(())
}

fn run_window_loop(platform: &mut PlatformContext, args: &Args) -> Result<()> {
    let mut frame = 0u64;
    let start = high_resolution_seconds();

    while platform.update() {
        while let Some(event) = platform.poll_event() {
            match event {
                Event::WindowResize { width, height } => info!("Resized to {}x{}", width, height),
                Event::Key { code, down, .. } => debug!("Key {} {}", code, if down { "down" } else { "up" }),
                Event::Unknown { kind } => debug!("Unmapped native event {}", kind),
                other => debug!("{:?}", other),
            }
        }

        if let Some(bb) = platform.video_mut()?.backbuffer_mut() {
            draw_gradient(bb, frame);
        }
        platform.present().context("presenting frame")?;

        frame += 1;
        if args.frames > 0 && frame >= args.frames {
            platform.request_quit()?;
        }
        sleep(FRAME_MS);
    }

    let elapsed = high_resolution_seconds() - start;
    info!("{} frames in {:.2}s ({:.1} fps)", frame, elapsed, frame as f64 / elapsed.max(f64::EPSILON));
    Ok(())
}

fn run_headless(args: &Args, interrupted: &AtomicBool) {
    let frames = if args.frames == 0 { u64::MAX } else { args.frames };
    for _ in 0..frames {
        if interrupted.load(Ordering::Acquire) {
            break;
        }
        sleep(FRAME_MS);
    }
}

fn draw_gradient(bb: &mut keel_core::BackBuffer, frame: u64) {
    let (w, h) = (bb.width(), bb.height());
    let shift = (frame % 256) as u32;
    for y in 0..h {
        if let Some(row) = bb.row_mut(y) {
            let g = (y * 255 / h.max(1) + shift) & 0xFF;
            for (x, px) in row.iter_mut().enumerate() {
                let r = (x as u32 * 255 / w.max(1)) & 0xFF;
                *px = 0xFF00_0000 | (r << 16) | (g << 8);
            }
        }
    }
}
