#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod chip;
pub mod config;
pub mod engine;
pub mod files;
pub mod metrics;
pub mod probes;
pub mod sex;
pub mod types;

pub use chip::{ChipError, ChipHandle, IntensityTable};
pub use config::GenderConfig;
pub use engine::{EngineError, EngineSummary, run_gender_engine};
pub use sex::{GenderCallError, GenderCaller, SampleResult};
pub use types::{ChromosomeConvention, Gender, ProbeIndex, Thresholds};
