use std::time::Duration;

/// Bits in a Chord identifier (SHA-1 digest width). The ring is modulo 2^160.
pub const ID_BITS: usize = 160;

pub const DHT_STABILIZE_INTERVAL: Duration = Duration::from_secs(1);
pub const DHT_FIX_FINGERS_INTERVAL: Duration = Duration::from_millis(500);
pub const DHT_CHECK_PREDECESSOR_INTERVAL: Duration = Duration::from_secs(2);
pub const DHT_CHECK_SUCCESSOR_INTERVAL: Duration = Duration::from_secs(3);

pub const DISCOVER_INTERVAL: Duration = Duration::from_secs(5);
pub const DISCOVER_TIMEOUT: Duration = Duration::from_secs(30);
pub const CHECK_OLD_SERVERS_INTERVAL: Duration = Duration::from_secs(10);

pub const DEFAULT_SERVER_PORT: u16 = 7100;
pub const DEFAULT_DHT_PORT: u16 = 7200;
pub const DEFAULT_CLIENT_PORT: u16 = 7300;

pub const CONNECTION_RETRY_SLEEP_MILLIS: u64 = 100;
pub const CONNECTION_MAX_RETRIES: u32 = 5;

pub static TOMBSTONED_MSG: &str = "tombstoned";
