//! Scheduling disciplines.

pub mod look;
pub mod timeslice;
