//! Mock device implementations for testing and development.
//!
//! This module provides a simulated controller board line that can be driven
//! programmatically without requiring physical hardware.

pub mod transport;

pub use transport::{MockTransport, MockTransportHandle};
