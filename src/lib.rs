//! `edgelight` turns the desktop into ambient lighting colors.
//!
//! Frames captured from a display go through a reduction pass that yields the predominant
//! color of the whole frame, and optionally through zone sampling that yields one color per
//! screen edge zone. Results are delivered to subscribers at a bounded rate.
//!
//! The [capture::CaptureManager] owns the pipeline. Zones are described by
//! [models::ZoneConfiguration] and laid out by [models::ZoneLayout].

#[macro_use]
extern crate tracing;

pub mod capture;
pub mod color;
pub mod image;
pub mod models;
pub mod sink;
