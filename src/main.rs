// src/main.rs

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::io::Write;
use std::time::Duration;

use spectral_player::SoundEngine;

fn main() -> Result<(), anyhow::Error> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("usage: player <audio-file> [--info]");
        std::process::exit(2);
    }
    let path = &args[1];
    let info_only = args.iter().any(|a| a == "--info");

    let mut engine = SoundEngine::new(path);
    if !engine.is_loaded() {
        anyhow::bail!("could not load {path}");
    }

    if let Some(info) = engine.info() {
        if info_only {
            println!("{}", serde_json::to_string_pretty(&info)?);
            return Ok(());
        }
        println!(
            "🎧 {}: {} channels, {} Hz, {:.2}s ({} samples, {} blocks of {})",
            path,
            info.channel_count,
            info.sample_rate,
            info.duration_secs,
            info.sample_count,
            info.block_count,
            info.window_size
        );
    }

    engine.prepare_output()?;
    engine.start()?;
    engine.set_heartbeat(true, 500);

    println!("Press [SPACE] Play/Pause | [0] Restart | [H] Hold/release heartbeat | [Q] Quit");

    enable_raw_mode()?;
    let mut feed_heartbeat = true;

    loop {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(ev) = event::read()? {
                if ev.kind == KeyEventKind::Press {
                    if ev.code == KeyCode::Char('c')
                        && ev.modifiers.contains(KeyModifiers::CONTROL)
                    {
                        break;
                    }
                    match ev.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') => break,
                        KeyCode::Char(' ') => {
                            if engine.is_playing() {
                                let _ = engine.stop();
                                println!("\r⏸️ Paused ");
                            } else {
                                let _ = engine.start();
                                println!("\r▶️ Playing ");
                            }
                        }
                        KeyCode::Char('0') => {
                            let _ = engine.start_at(0);
                        }
                        KeyCode::Char('h') | KeyCode::Char('H') => {
                            feed_heartbeat = !feed_heartbeat;
                            if feed_heartbeat {
                                println!("\r💓 Heartbeat flowing; watchdog resumes output ");
                            } else {
                                println!("\r💔 Heartbeat held; watchdog will mute output ");
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        // One liveness signal per UI tick, exactly what the watchdog expects
        // from a healthy host loop.
        if feed_heartbeat {
            engine.heartbeat();
        }

        print!(
            "\r{:>10} / {} samples {}  ",
            engine.position(),
            engine.sample_count(),
            if engine.is_playing() { "▶" } else { " " }
        );
        std::io::stdout().flush()?;
    }

    disable_raw_mode()?;

    let _ = engine.stop();
    let _ = engine.close_output();
    println!("\n🛑 Bye.");
    Ok(())
}
