//! Constants - Limits and Defaults
//!
//! Every bound in the crate lives here, named `<THING>_<UNIT>_<MAX|DEFAULT>`.

// =============================================================================
// Record Limits
// =============================================================================

/// Maximum application id length in bytes
pub const APPLICATION_ID_BYTES_MAX: usize = 200;

/// Maximum job id length in bytes
pub const JOB_ID_BYTES_MAX: usize = 200;

/// Maximum run id length in bytes
pub const RUN_ID_BYTES_MAX: usize = 50;

/// Maximum host id length in bytes
pub const HOST_ID_BYTES_MAX: usize = 150;

// =============================================================================
// Storage
// =============================================================================

/// Storage table name
pub const JOB_STATUS_TABLE_NAME: &str = "JobStatus";

/// Number of columns in a job status row
pub const JOB_STATUS_COLUMN_COUNT: usize = 7;

/// Default pool size for the Postgres backend
pub const POOL_CONNECTIONS_COUNT_DEFAULT: u32 = 10;

/// Default time to wait for a pooled connection
pub const POOL_ACQUIRE_TIMEOUT_SECS_DEFAULT: u64 = 5;

/// Connection string scheme accepted by the simulation backend
pub const SIM_DSN_SCHEME: &str = "sim://";

// =============================================================================
// Configuration Keys
// =============================================================================

/// Primary environment variable holding the connection target
pub const ENV_DSN: &str = "JOBSTATUS_DSN";

/// Fallback environment variable holding the connection target
pub const ENV_DSN_FALLBACK: &str = "DATABASE_URL";

/// Environment variable overriding the pool size
pub const ENV_MAX_CONNECTIONS: &str = "JOBSTATUS_MAX_CONNECTIONS";

/// Environment variable overriding the pool acquire timeout
pub const ENV_ACQUIRE_TIMEOUT_SECS: &str = "JOBSTATUS_ACQUIRE_TIMEOUT_SECS";

/// Environment variable holding the simulation seed
pub const ENV_DST_SEED: &str = "DST_SEED";
