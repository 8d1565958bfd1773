//! Protocol and service constants
//! Chain values match the Bittensor runtime; service defaults match the
//! public yield API the batch endpoint is compatible with.

/// TAO/RAO conversion factor (1 TAO = 1_000_000_000 RAO)
pub const RAOPERTAO: u128 = 1_000_000_000;

#[allow(dead_code)]
const _: () = assert!(RAOPERTAO == 10u128.pow(9), "RAOPERTAO must equal 10^9");

/// Block time in seconds
pub const BLOCKTIME: u64 = 12;

/// Blocks produced per day at the nominal block time
pub const BLOCKS_PER_DAY: u64 = 24 * 60 * 60 / BLOCKTIME;

/// Blocks produced per (365 day) year at the nominal block time
pub const BLOCKS_PER_YEAR: u64 = BLOCKS_PER_DAY * 365;

/// Network endpoints
pub const FINNEY_ENDPOINT: &str = "wss://entrypoint-finney.opentensor.ai:443";
pub const FINNEY_TEST_ENDPOINT: &str = "wss://test.finney.opentensor.ai:443";
pub const ARCHIVE_ENDPOINT: &str = "wss://archive.chain.opentensor.ai:443";
pub const LOCAL_ENDPOINT: &str = "ws://127.0.0.1:9944";

/// Pallet holding stake, delegate and emission storage
pub const SUBTENSOR_MODULE: &str = "SubtensorModule";

/// Default cache time-to-live in seconds
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Default bound on a single chain snapshot fetch in seconds
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;

/// Default HTTP listen port
pub const DEFAULT_HTTP_PORT: u16 = 8000;

/// Default page size for paginated resources
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Upper bound on a requested page size
pub const MAX_BATCH_SIZE: usize = 1024;

/// Number of hotkey characters used in generated validator names
pub const VALIDATOR_LABEL_PREFIX_LEN: usize = 8;
