//! Timed multiplication quiz: question generation, scoring, the 60-second
//! round state machine, and the score stores it reports to.

pub mod config;
pub mod profile;
pub mod quiz;
pub mod records;
