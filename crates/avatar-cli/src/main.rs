//! `avatar-cli` – headless demo of the tracking and greeting loop.
//!
//! 1. Loads `~/.avatar/config.toml` (writing the defaults on first run) and
//!    applies `AVATAR_*` overrides.
//! 2. Builds a simulated robot scene and a scripted visitor who walks up,
//!    steps close and leaves again every 16 s.
//! 3. Runs the frame loop on tokio until `demo_seconds` elapse or Ctrl-C.
//! 4. Stops the loop, which puts any half-finished wave back on its rest
//!    pose, and prints a summary.

mod config;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use avatar_hal::sim::{SimFrameSource, SimScene};
use avatar_perception::sim::VisitorScript;
use avatar_runtime::{AvatarLoop, FrameTask, init_tracing};
use avatar_types::{TrackingSource, TrackingState};
use colored::Colorize;
use tracing::{error, warn};

fn main() {
    let _guard = init_tracing("avatar");

    print_banner();

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – restoring pose and stopping …".yellow().bold());
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; stop with AVATAR_DEMO_SECONDS instead");
    }

    let mut cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", config::config_path().display().to_string().bold());
            cfg
        }
        Ok(None) => {
            let cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}", e.to_string().red()),
            }
            cfg
        }
        Err(e) => {
            println!("{}", e.to_string().red());
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    config::apply_env_overrides(&mut cfg);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start tokio runtime");
            std::process::exit(1);
        }
    };
    runtime.block_on(run(cfg, shutdown));
}

async fn run(cfg: config::Config, shutdown: Arc<AtomicBool>) {
    let script = VisitorScript::walk_in();
    let clock = script.clock();

    let avatar = AvatarLoop::new(
        cfg.avatar,
        Box::new(SimScene::robot()),
        Box::new(SimFrameSource::new(cfg.camera.clone())),
    )
    .with_face(Ok(Box::new(script.face_inference())))
    .with_body(Ok(Box::new(script.body_inference())))
    .on_change(|state| println!("  {}", describe(state)));

    print_rig(&avatar);

    let period = cfg.avatar.frame_period();
    println!(
        "\n  Running at {} Hz on {}. {}\n",
        cfg.avatar.frame_rate_hz.to_string().bold(),
        cfg.camera.dimmed(),
        match cfg.demo_seconds {
            0 => "Press Ctrl-C to stop.".to_string(),
            s => format!("Stopping after {s} s."),
        }
    );

    let task = FrameTask::spawn_with(avatar, period, move |now| clock.set(now));
    let started = Instant::now();
    let limit = (cfg.demo_seconds > 0).then(|| Duration::from_secs(cfg.demo_seconds));
    while !shutdown.load(Ordering::SeqCst)
        && !limit.is_some_and(|l| started.elapsed() >= l)
        && !task.is_finished()
    {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    match task.stop().await {
        Ok(avatar) => {
            println!();
            println!("  {} Frame loop stopped, rig at rest.", "✓".green().bold());
            println!("  Waves performed: {}", avatar.wave_count().to_string().bold());
            if avatar.is_degraded() {
                println!("  {}", "Ran in degraded mode (a detector was unavailable).".yellow());
            }
        }
        Err(e) => {
            error!(error = %e, "frame loop task failed");
            println!("{}: {}", "Frame loop error".red(), e);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn describe(state: &TrackingState) -> String {
    if !state.presence {
        return format!("{} nobody in view", "○".dimmed());
    }
    let source = match state.source {
        TrackingSource::Face => "face",
        TrackingSource::Body => "body",
        TrackingSource::None => "none",
    };
    let near = if state.proximity { " near".bold().to_string() } else { String::new() };
    format!("{} {source}{near} x={:+.2} y={:+.2}", "●".green(), state.x, state.y)
}

fn print_rig(avatar: &AvatarLoop) {
    let registry = avatar.registry();
    println!("\n  Joints:");
    for (role, name) in registry.found() {
        println!("    • {:<16} {}", role.to_string(), name.bold());
    }
    match registry.capability() {
        Some(quality) => println!("  Wave quality: {}", format!("{quality:?}").cyan()),
        None => println!("  {}", "No arm or hand joints; waving disabled.".yellow()),
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"   ___             __            "#.bold().cyan());
    println!("{}", r#"  / _ |_  _____ _ / /____ _____  "#.bold().cyan());
    println!("{}", r#" / __ | |/ / _ `// __/ _ `/ __/  "#.bold().cyan());
    println!("{}", r#"/_/ |_|___/\_,_/ \__/\_,_/_/     "#.bold().cyan());
    println!();
    println!("  {} {}", "avatar".bold(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Presence tracking and greeting demo");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_covers_every_state() {
        colored::control::set_override(false);
        assert_eq!(describe(&TrackingState::absent()), "○ nobody in view");
        assert_eq!(describe(&TrackingState::body(0.25, -0.5)), "● body x=+0.25 y=-0.50");
        assert_eq!(describe(&TrackingState::face(-0.1, 0.0, true)), "● face near x=-0.10 y=+0.00");
    }
}
