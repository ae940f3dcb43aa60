// src/cycle/mod.rs

pub mod admission;
pub mod def;
pub mod template;

pub use admission::AdmissionController;
pub use def::{
    format_cycle, parse_cycle_timestamp, parse_duration, CronPattern, CycleDefinition,
    FieldPattern,
};
pub use template::TimeTemplate;
