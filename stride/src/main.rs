mod args;

use std::{
    fs::{self, File},
    io::BufWriter,
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
    time::Instant,
};

use anyhow::Context;
use args::Args;
use clap::Parser;
use log::{info, warn};
use serde::Serialize;
use stride_simulator::{diagnostic::DiagnosticLog, AgentSnapshot, Scene, Simulator};

static SIG_INT: AtomicBool = AtomicBool::new(false);

/// Committed agents after a step.
#[derive(Serialize)]
struct Frame {
    step: u64,
    time: f32,
    agents: Vec<AgentSnapshot>,
}

impl Frame {
    fn capture(simulator: &Simulator) -> Self {
        Frame {
            step: simulator.step_count(),
            time: simulator.global_time(),
            agents: simulator.snapshots(),
        }
    }
}

#[derive(Serialize)]
struct RunLog<'a> {
    diagnostic: &'a DiagnosticLog,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    trajectory: Vec<Frame>,
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_module("stride", log::LevelFilter::Info)
        .init();

    if cfg!(debug_assertions) {
        warn!("Debug build");
    }

    let args = Args::parse();

    let source = fs::read_to_string(&args.scene)
        .with_context(|| format!("failed to read scene {}", args.scene.display()))?;
    let scene = Scene::from_toml_str(&source)
        .with_context(|| format!("failed to load scene {}", args.scene.display()))?;

    let mut simulator = Simulator::from_scene(&scene, &args.to_simulator_options())?;
    if args.max_duration.is_some() {
        simulator.set_max_duration(args.max_duration);
    }
    simulator.diagnostic_log.scene = args.scene.display().to_string();

    ctrlc::set_handler(|| SIG_INT.store(true, Ordering::SeqCst))?;

    let report_interval = args.report_interval.max(1);
    let mut trajectory = Vec::new();
    if args.trajectory {
        trajectory.push(Frame::capture(&simulator));
    }

    let start = Instant::now();
    simulator.run_with(&SIG_INT, |simulator| {
        if args.trajectory {
            trajectory.push(Frame::capture(simulator));
        }

        if simulator.step_count() % report_interval == 0 {
            info!(
                "Step: {:6}, Time: {:8.2}, Active agents: {:6}",
                simulator.step_count(),
                simulator.global_time(),
                simulator.active_agent_count()
            );
        }
    });
    if SIG_INT.load(Ordering::SeqCst) {
        info!("Interrupted at step {}", simulator.step_count());
    }
    info!(
        "Simulated {:.2} s in {} steps ({:.2?} elapsed)",
        simulator.global_time(),
        simulator.step_count(),
        start.elapsed()
    );

    let current_time = chrono::Local::now();
    fs::create_dir_all(&args.log_dir)?;
    let log_path: PathBuf = args
        .log_dir
        .join(current_time.format("%Y-%m-%d_%H%M%S_log.json").to_string());
    let log_file = File::create(&log_path)
        .with_context(|| format!("failed to create {}", log_path.display()))?;

    let log = RunLog {
        diagnostic: &simulator.diagnostic_log,
        trajectory,
    };
    serde_json::to_writer(BufWriter::new(log_file), &log)?;
    info!("Exported log file: {}", log_path.display());

    Ok(())
}
