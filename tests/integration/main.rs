//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises one flow of the
//! `RoverService` against mock adapters.  No serial port or sockets
//! are required.

mod battery_flow_tests;
mod mock_hw;
mod sensor_stream_tests;
mod turn_flow_tests;
