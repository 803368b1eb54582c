use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use perihelion::precession;
use perihelion::trajectory::read_trajectory;
use perihelion::{run_scenario, Outcome, Preset, RelativisticSample, ScenarioConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(about = "Newtonian vs. Schwarzschild trajectories of a test body")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run both engines for a scenario and write their trajectory files.
    Run {
        #[arg(long, value_enum, conflicts_with = "scenario")]
        preset: Option<Preset>,
        /// YAML scenario file.
        #[arg(long)]
        scenario: Option<PathBuf>,
        /// Override the output directory.
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long)]
        progress: bool,
    },
    /// Measure orbit-to-orbit drift in a relativistic trajectory file.
    Precession {
        #[arg(long, default_value = "GR.csv")]
        input: PathBuf,
        /// Reference x coordinate; defaults to the first sample.
        #[arg(long)]
        x0: Option<f64>,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn load_scenario(preset: Option<Preset>, scenario: Option<PathBuf>) -> Result<ScenarioConfig> {
    match (preset, scenario) {
        (_, Some(path)) => ScenarioConfig::load(&path)
            .with_context(|| format!("failed to load scenario {}", path.display())),
        (Some(preset), None) => Ok(preset.scenario()),
        (None, None) => Ok(Preset::BlackHoleFall.scenario()),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.command {
        Command::Run {
            preset,
            scenario,
            out_dir,
            progress,
        } => {
            let mut cfg = load_scenario(preset, scenario)?;
            if let Some(dir) = out_dir {
                cfg.output.dir = dir;
            }
            let (newtonian, relativistic) = run_scenario(&cfg, progress)?;

            println!(
                "newtonian:     {} samples, max relative energy drift {:.3e}",
                newtonian.samples, newtonian.max_relative_drift
            );
            println!(
                "schwarzschild: {} samples, p_phi drift {:.3e}, {} clipped speeds",
                relativistic.samples, relativistic.max_p_phi_drift, relativistic.clamp_count
            );
            if let Outcome::HorizonReached { time, r } = relativistic.outcome {
                println!(
                    "schwarzschild: stopped at the horizon after {:e} s (r = {:.6} Rs)",
                    time,
                    r / relativistic.rs
                );
            }
        }
        Command::Precession { input, x0, json } => {
            let samples: Vec<RelativisticSample> = read_trajectory(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            info!("read {} samples from {}", samples.len(), input.display());

            let report = precession::analyze(&samples, x0)
                .with_context(|| format!("{} holds no samples", input.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            for (n, c) in report.crossings.iter().enumerate() {
                println!("{:>6} {:>12} {:>16.6e} {:>16.6e}", n + 1, c.index, c.time, c.shift);
            }
            match report.mean_shift_per_orbit {
                Some(mean) => println!("mean shift per orbit: {:.6e} m", mean),
                None => println!("no upward y = 0 crossings"),
            }
        }
    }

    Ok(())
}
