use crate::error::ReportError;
use crate::geodesic::GeodesicSummary;
use crate::newtonian::NewtonianSummary;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;

/// One row of the run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub date: String,
    pub scenario: String,
    pub engine: String,
    pub steps: u64,
    pub step_size: f64,
    pub samples: u64,
    pub execution_duration: f64,
    pub diagnostics: String,
    pub notes: String,
}

pub fn newtonian_record(
    scenario: &str,
    summary: &NewtonianSummary,
    dt: f64,
    notes: &str,
) -> Result<RunRecord, ReportError> {
    let thresholds: Vec<(f64, Option<f64>)> = summary
        .energy_thresholds
        .iter()
        .map(|(k, v)| (k.into_inner(), *v))
        .collect();
    let diagnostics = json!({
        "force_law": summary.force_law,
        "initial_energy": summary.initial_energy,
        "final_energy": summary.final_energy,
        "max_relative_drift": summary.max_relative_drift,
        "energy_thresholds": thresholds,
    });
    Ok(RunRecord {
        date: Utc::now().to_rfc3339(),
        scenario: scenario.to_string(),
        engine: "newtonian".to_string(),
        steps: summary.steps,
        step_size: dt,
        samples: summary.samples,
        execution_duration: summary.elapsed_secs,
        diagnostics: serde_json::to_string(&diagnostics)?,
        notes: notes.to_string(),
    })
}

pub fn geodesic_record(
    scenario: &str,
    summary: &GeodesicSummary,
    spacing: f64,
    notes: &str,
) -> Result<RunRecord, ReportError> {
    let diagnostics = json!({
        "rs": summary.rs,
        "outcome": summary.outcome,
        "initial_p_phi": summary.initial_p_phi,
        "max_p_phi_drift": summary.max_p_phi_drift,
        "clamp_count": summary.clamp_count,
        "accepted_steps": summary.solver_stats.accepted_steps,
        "rejected_steps": summary.solver_stats.rejected_steps,
        "fn_evals": summary.solver_stats.fn_evals,
    });
    Ok(RunRecord {
        date: Utc::now().to_rfc3339(),
        scenario: scenario.to_string(),
        engine: "schwarzschild".to_string(),
        steps: summary.points_evaluated,
        step_size: spacing,
        samples: summary.samples,
        execution_duration: summary.elapsed_secs,
        diagnostics: serde_json::to_string(&diagnostics)?,
        notes: notes.to_string(),
    })
}

/// Append `record` to the CSV at `path`, writing the header only when the
/// file is new.
pub fn append_run_record<P: AsRef<Path>>(path: P, record: &RunRecord) -> Result<(), ReportError> {
    let file_exists = path.as_ref().exists();
    let file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path.as_ref())?;

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    wtr.serialize(record)?;
    wtr.flush()?;
    Ok(())
}
