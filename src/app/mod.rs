//! Application core: pure domain logic, zero I/O.
//!
//! This module holds the business rules for the rover hub: decoding,
//! battery supervision, turn arbitration and access control, all
//! orchestrated by [`service::RoverService`].  Interaction with the
//! serial link, clients and side channels goes through the **port
//! traits** in [`ports`], so this layer is testable without hardware.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
