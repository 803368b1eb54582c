pub mod body;
pub mod config;
pub mod driver;
pub mod error;
pub mod geodesic;
pub mod newtonian;
pub mod precession;
pub mod report;
pub mod rkf78;
pub mod scenario;
pub mod trajectory;

pub use body::Body;
pub use config::{PhysicalConstants, ScenarioConfig};
pub use driver::run_scenario;
pub use error::{ConfigError, GeodesicError, NewtonianError, ReportError, TrajectoryError};
pub use geodesic::{
    schwarzschild_radius, GeodesicEngine, GeodesicParams, GeodesicState, GeodesicSummary, Outcome,
    SchwarzschildField,
};
pub use newtonian::{ForceLaw, InverseSquare, NewtonianEngine, NewtonianParams, NewtonianSummary};
pub use scenario::Preset;
pub use trajectory::{
    NewtonianSample, NullSink, RelativisticSample, SampleSink, TrajectoryRecord, TrajectoryWriter,
};
