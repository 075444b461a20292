//! Core utilities: calendar-aware date arithmetic

pub mod calendar;

pub use calendar::Frequency;
