//! GRBL wire protocol: real-time bytes, response classification, and the
//! error/alarm code tables.

pub mod faults;
pub mod realtime;
pub mod response;
