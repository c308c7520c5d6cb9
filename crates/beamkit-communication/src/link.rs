//! Byte-stream link abstraction
//!
//! The protocol engine treats the serial connection as a pre-established
//! byte stream behind the [`Link`] trait, so the session logic runs
//! identically against real hardware and in-memory test doubles.
//!
//! Reads use a short timeout rather than blocking indefinitely: the IO loop
//! interleaves reading, writing, and polling on one task, and the shared
//! lock must never be held across a long block so that real-time bytes can
//! always get through.

use beamkit_core::ProtocolError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// A connected byte stream to the device.
pub trait Link: Send {
    /// Read available bytes; `Ok(0)` or a timeout error both mean no data
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all bytes
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush buffered writes to the device
    fn flush(&mut self) -> io::Result<()>;
}

/// A link shared between the IO task and the real-time command path.
pub type SharedLink = Arc<Mutex<Box<dyn Link>>>;

/// Wrap a link for shared use
pub fn shared(link: Box<dyn Link>) -> SharedLink {
    Arc::new(Mutex::new(link))
}

/// Serial connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout in milliseconds; keep short so the IO loop spins
    pub read_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115200,
            read_timeout_ms: 10,
        }
    }
}

/// Serial port link backed by the `serialport` crate.
pub struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialLink {
    /// Open a serial port with the given parameters.
    pub fn open(config: &LinkConfig) -> Result<Self, ProtocolError> {
        let builder = serialport::new(&config.port, config.baud_rate)
            .timeout(Duration::from_millis(config.read_timeout_ms));

        match builder.open() {
            Ok(port) => Ok(Self { port }),
            Err(e) => {
                tracing::warn!("Failed to open serial port {}: {}", config.port, e);
                Err(ProtocolError::Open {
                    port: config.port.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

impl Link for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        io::Write::write_all(&mut self.port, data)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut self.port)
    }
}
