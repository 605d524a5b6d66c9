//! Shared protocol constants for the fget length-prefixed transport

// Transfer header: payload byte length as u32, little-endian
pub const HEADER_LEN: usize = 4;

// Maximum bytes moved per read/write call while streaming a payload
pub const MAX_PACKET_SIZE: usize = 512;

// Upper bound on the newline-terminated request line
pub const MAX_REQUEST_LINE: usize = 4096;

// Workers servicing the connection queue
pub const DEFAULT_WORKERS: usize = 20;

// Centralized timeout constants so daemon and client agree on deadlines
pub mod timeouts {
    use std::time::Duration;

    // Base timeout for reads (ms)
    pub const READ_BASE_MS: u64 = 5_000;

    // Base timeout for writes (ms)
    pub const WRITE_BASE_MS: u64 = 5_000;

    // Additional timeout per MB of payload (ms)
    pub const PER_MB_MS: u64 = 200;

    // Connection establishment timeout (ms)
    pub const CONNECT_MS: u64 = 3_000;

    // Calculate read deadline based on payload size
    pub fn read_deadline(payload_len: u64) -> Duration {
        let mb = (payload_len + 1_048_575) / 1_048_576;
        Duration::from_millis(READ_BASE_MS + mb * PER_MB_MS)
    }

    // Calculate write deadline based on payload size
    pub fn write_deadline(payload_len: u64) -> Duration {
        let mb = (payload_len + 1_048_575) / 1_048_576;
        Duration::from_millis(WRITE_BASE_MS + mb * PER_MB_MS)
    }
}
