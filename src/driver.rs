//! Runs both engines for one scenario, each on its own thread with its own file.

use crate::config::ScenarioConfig;
use crate::geodesic::{GeodesicEngine, GeodesicSummary};
use crate::newtonian::{InverseSquare, NewtonianEngine, NewtonianSummary};
use crate::report::{append_run_record, geodesic_record, newtonian_record};
use crate::trajectory::TrajectoryWriter;
use anyhow::{Context, Result};
use log::info;
use nalgebra::Vector2;

pub fn run_newtonian(cfg: &ScenarioConfig, progress: bool) -> Result<NewtonianSummary> {
    let path = cfg.output.newtonian_path();
    let mut writer = TrajectoryWriter::create(&path, cfg.output.buffer_capacity)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let engine = NewtonianEngine::new(cfg.newtonian_params(), InverseSquare::new(cfg.constants.g))
        .with_progress(progress);

    let summary = engine
        .run(cfg.central.to_body(), cfg.test_body.to_body(), &mut writer)
        .with_context(|| format!("newtonian run of '{}' failed", cfg.name))?;
    writer
        .close()
        .with_context(|| format!("failed to close {}", path.display()))?;
    info!("wrote {} samples to {}", summary.samples, path.display());
    Ok(summary)
}

pub fn run_relativistic(cfg: &ScenarioConfig, progress: bool) -> Result<GeodesicSummary> {
    let path = cfg.output.relativistic_path();
    let mut writer = TrajectoryWriter::create(&path, cfg.output.buffer_capacity)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let engine = GeodesicEngine::new(cfg.geodesic_params()).with_progress(progress);

    let [x, y] = cfg.test_body.position;
    let [vx, vy] = cfg.test_body.velocity;
    let summary = engine
        .run(&cfg.field(), Vector2::new(x, y), Vector2::new(vx, vy), &mut writer)
        .with_context(|| format!("relativistic run of '{}' failed", cfg.name))?;
    writer
        .close()
        .with_context(|| format!("failed to close {}", path.display()))?;
    info!("wrote {} samples to {}", summary.samples, path.display());
    Ok(summary)
}

/// Run both engines concurrently, then append both summaries to the run log.
pub fn run_scenario(cfg: &ScenarioConfig, progress: bool) -> Result<(NewtonianSummary, GeodesicSummary)> {
    std::fs::create_dir_all(&cfg.output.dir)
        .with_context(|| format!("failed to create output dir {}", cfg.output.dir.display()))?;
    info!(
        "scenario '{}': Rs = {:e} m, target time {:e} s",
        cfg.name,
        cfg.schwarzschild_radius(),
        cfg.target_time
    );

    let (newtonian, relativistic) = rayon::join(
        || run_newtonian(cfg, progress),
        || run_relativistic(cfg, progress),
    );
    let newtonian = newtonian?;
    let relativistic = relativistic?;

    if let Some(log_path) = cfg.output.run_log_path() {
        let spacing = cfg.geodesic_params().spacing();
        let records = [
            newtonian_record(&cfg.name, &newtonian, cfg.newtonian.dt, "")?,
            geodesic_record(&cfg.name, &relativistic, spacing, "")?,
        ];
        for record in &records {
            append_run_record(&log_path, record)
                .with_context(|| format!("failed to append to {}", log_path.display()))?;
        }
    }

    Ok((newtonian, relativistic))
}
