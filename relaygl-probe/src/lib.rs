//! # relaygl-probe: readback pipeline exerciser
//!
//! Drives simulated application windows through the relaygl surface
//! binding and transport router on the software platform, and reports
//! what happened to every frame.
//!
//! ## Destinations
//!
//! - **Local relay**: frames land in memory blitters drained by an
//!   in-process viewer.
//! - **Network**: frames go over UDP, by default to a loopback receiver
//!   started by the probe itself.
//! - **Thin client**: a loopback channel whose route can start down to
//!   exercise the local fallback.

pub mod config;
pub mod service;
