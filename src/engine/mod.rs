pub mod indicators;
pub mod pipeline;
pub mod resample;
pub mod signal;
