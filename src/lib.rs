//! Roverhub library.
//!
//! Coordination core for a shared, remotely driven rover: sensor
//! stream decoding, battery supervision, turn arbitration and access
//! control.  Everything under [`app`] and the domain modules is pure
//! logic on virtual time; [`adapters`] and [`net`] hold the I/O.

#![deny(unused_must_use)]

pub mod access;
pub mod adapters;
pub mod app;
pub mod battery;
pub mod config;
pub mod error;
pub mod idle;
pub mod net;
pub mod oi;
pub mod scheduler;
pub mod sensor;
pub mod timer;
