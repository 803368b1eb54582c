use approx::assert_relative_eq;
use nalgebra::Vector2;
use perihelion::trajectory::read_trajectory;
use perihelion::{
    Body, GeodesicEngine, GeodesicParams, GeodesicSummary, InverseSquare, NewtonianEngine, NewtonianError,
    NewtonianParams, NewtonianSample, NullSink, Outcome, Preset, RelativisticSample, TrajectoryWriter,
};
use std::path::PathBuf;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("perihelion-{}-{}", std::process::id(), name))
}

/// Eccentric (e = 0.5) orbit launched from periapsis in units with G = 1.
fn eccentric_pair() -> (Body, Body) {
    let central = Body::new(1.0, Vector2::zeros(), Vector2::zeros());
    let v_peri = (1.5f64 * 1.001).sqrt();
    let light = Body::new(1e-3, Vector2::new(1.0, 0.0), Vector2::new(0.0, v_peri));
    (central, light)
}

fn energy_drift(dt: f64) -> f64 {
    let (a, b) = eccentric_pair();
    let params = NewtonianParams {
        target_time: 20.0,
        dt,
        save_every: 1,
    };
    NewtonianEngine::new(params, InverseSquare::new(1.0))
        .run(a, b, &mut NullSink)
        .unwrap()
        .max_relative_drift
}

#[test]
fn energy_drift_halves_with_step_size() {
    let coarse = energy_drift(1e-3);
    let fine = energy_drift(5e-4);
    let ratio = coarse / fine;
    assert!(coarse < 1e-2, "coarse drift {coarse:e}");
    assert!((1.6..2.4).contains(&ratio), "drift ratio {ratio}");
}

#[test]
fn collision_leaves_header_only_file() {
    let path = temp_path("collision.csv");
    let a = Body::new(1.0, Vector2::new(3.0, -2.0), Vector2::zeros());
    let params = NewtonianParams {
        target_time: 1.0,
        dt: 0.1,
        save_every: 1,
    };
    let mut writer = TrajectoryWriter::create(&path, 16).unwrap();
    let err = NewtonianEngine::new(params, InverseSquare::new(6.6743e-11))
        .run(a, a, &mut writer)
        .unwrap_err();
    writer.close().unwrap();

    assert!(matches!(err, NewtonianError::Collision { step: 1, .. }));
    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(text, "time,x1,y1,x2,y2\n");
}

#[test]
fn samples_before_a_collision_are_flushed() {
    // no gravity, head-on at 1 m/s: the bodies meet exactly after 4 steps
    let path = temp_path("late-collision.csv");
    let a = Body::new(1.0, Vector2::new(-1.0, 0.0), Vector2::new(1.0, 0.0));
    let b = Body::new(1.0, Vector2::new(1.0, 0.0), Vector2::new(-1.0, 0.0));
    let params = NewtonianParams {
        target_time: 2.0,
        dt: 0.25,
        save_every: 1,
    };
    let mut writer = TrajectoryWriter::create(&path, 100).unwrap();
    let err = NewtonianEngine::new(params, InverseSquare::new(0.0))
        .run(a, b, &mut writer)
        .unwrap_err();
    assert!(matches!(err, NewtonianError::Collision { step: 5, .. }));

    // read while the writer is still open: the engine already flushed the batch
    let rows: Vec<NewtonianSample> = read_trajectory(&path).unwrap();
    drop(writer);
    std::fs::remove_file(&path).unwrap();

    assert_eq!(rows.len(), 4);
    assert_eq!(rows[3].x1, rows[3].x2);
    assert_relative_eq!(rows[3].time, 1.0);
}

#[test]
fn weak_field_agrees_with_newton() {
    let cfg = Preset::EarthGeostationary.scenario();
    let target_time = 1e4;

    let newton_params = NewtonianParams {
        target_time,
        dt: 1.0,
        save_every: 100,
    };
    let mut newton: Vec<NewtonianSample> = Vec::new();
    NewtonianEngine::new(newton_params, InverseSquare::new(cfg.constants.g))
        .run(cfg.central.to_body(), cfg.test_body.to_body(), &mut newton)
        .unwrap();

    let mut gr: Vec<RelativisticSample> = Vec::new();
    let body = cfg.test_body.to_body();
    GeodesicEngine::new(GeodesicParams::new(target_time, 10_001, 100))
        .run(&cfg.field(), body.position, body.velocity, &mut gr)
        .unwrap();

    assert_eq!(newton.len(), 100);
    assert_eq!(gr.len(), 100);
    let r0 = body.position.norm();
    // GR sample j sits at t = 100 j, Newtonian sample j - 1 at the same time
    for j in [1usize, 50, 99] {
        let g = &gr[j];
        let n = &newton[j - 1];
        assert_relative_eq!(g.time, n.time, max_relative = 1e-12);
        let dx = g.x - (n.x2 - n.x1);
        let dy = g.y - (n.y2 - n.y1);
        assert!((dx * dx + dy * dy).sqrt() < 1e-3 * r0, "sample {j} differs by {dx}, {dy}");
    }
}

fn black_hole_fall(resolution: u64) -> (Vec<RelativisticSample>, f64, GeodesicSummary) {
    let cfg = Preset::BlackHoleFall.scenario();
    let rs = cfg.schwarzschild_radius();
    let body = cfg.test_body.to_body();
    let path = temp_path(&format!("black-hole-{resolution}.csv"));

    let mut writer = TrajectoryWriter::create(&path, 1_000).unwrap();
    let summary = GeodesicEngine::new(GeodesicParams::new(3e-4, resolution, 100))
        .run(&cfg.field(), body.position, body.velocity, &mut writer)
        .unwrap();
    writer.close().unwrap();

    let rows: Vec<RelativisticSample> = read_trajectory(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    (rows, rs, summary)
}

/// The neutron spirals in and the solver stalls at the horizon well before
/// 3e-4 s; the file must hold exactly the samples written up to there.
fn check_black_hole_fall(rows: &[RelativisticSample], rs: f64, summary: &GeodesicSummary) {
    assert_eq!(rows.len() as u64, summary.samples);
    assert!(summary.samples < summary.points_evaluated);
    assert!(!rows.is_empty());

    assert_eq!(rows[0].time, 0.0);
    assert_relative_eq!(rows[0].x, 2.0 * rs, max_relative = 1e-12);
    assert!(rows[0].y.abs() < 1e-9 * rs);
    // tangential 0.4c at t = 0
    assert_relative_eq!(rows[0].lorentz_factor, 1.0 / (1.0f64 - 0.16).sqrt(), max_relative = 1e-9);
    assert!(rows.windows(2).all(|w| w[1].time > w[0].time));
    assert!(rows.iter().all(|s| s.lorentz_factor >= 1.0));

    let last = rows.last().unwrap().time;
    assert!(last <= 3e-4);
    match summary.outcome {
        Outcome::HorizonReached { time, r } => {
            assert!(r > rs && r < 1.001 * rs, "stalled at r = {} Rs", r / rs);
            assert!(time >= last && time <= 3e-4, "stalled at t = {time:e}");
            assert!(time >= summary.final_time);
        }
        Outcome::Completed => panic!("black hole fall completed without reaching the horizon"),
    }
}

#[test]
fn black_hole_fall_reaches_the_horizon() {
    let (rows, rs, summary) = black_hole_fall(10_000);
    check_black_hole_fall(&rows, rs, &summary);
}

#[test]
#[ignore = "ten million evaluation points; run with --ignored --release"]
fn black_hole_fall_full_resolution() {
    let (rows, rs, summary) = black_hole_fall(10_000_000);
    check_black_hole_fall(&rows, rs, &summary);
    assert!(rows.len() < 100_000);
}
