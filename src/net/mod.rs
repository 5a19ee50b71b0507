//! Client transport: JSON lines over TCP.
//!
//! The I/O thread ([`io_task`]) owns every socket.  The control loop
//! sees clients only through [`channels`] and the [`hub::ChannelHub`]
//! adapter.

pub mod channels;
pub mod hub;
pub mod io_task;
pub mod lines;
pub mod protocol;
