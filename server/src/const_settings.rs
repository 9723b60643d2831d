// =============================================================================
// const_settings.rs — Single source of truth for all server constants
// =============================================================================
//
// Values that can reasonably vary per deployment (canvas size, ports, pps, ...) live in
// `config.rs` instead. Only true wire/format invariants and hard protocol limits belong here.

// ---------------------------------------------------------------------------
// Cell / canvas wire format
// ---------------------------------------------------------------------------

/// Size in bytes of one on-disk / on-wire cell record: 3 bytes RGB + 4 bytes big-endian
/// timestamp. This is a protocol invariant — backups written by any implementation sharing
/// this layout must round-trip.
pub const CELL_BYTES: usize = 7;

// ---------------------------------------------------------------------------
// TCP line protocol
// ---------------------------------------------------------------------------

/// Maximum length in bytes of one TCP command line, including the trailing newline.
pub const MAX_LINE_BYTES: usize = 1024;

/// Reply line prefix used for every line the TCP frontend sends to a client.
pub const REPLY_PREFIX: &str = "> ";

// ---------------------------------------------------------------------------
// Render tick / write queue
// ---------------------------------------------------------------------------

/// Default render-tick frequency draining the write queue into the pixel store.
pub const DEFAULT_RENDER_TICK_HZ: u64 = 30;

// ---------------------------------------------------------------------------
// HTTP surface
// ---------------------------------------------------------------------------

/// Default number of changed cells a `/canvas/since` response may carry before the server
/// redirects the client to a full `/canvas/` refresh instead. Overridable via
/// `http.delta_redirect_threshold`.
pub const DEFAULT_DELTA_REDIRECT_THRESHOLD: usize = 1000;

// ---------------------------------------------------------------------------
// Snapshot engine
// ---------------------------------------------------------------------------

/// Snapshot filename timestamp format, e.g. `backup_2026_07_28_10_05_30.bin`.
pub const BACKUP_TIME_FORMAT: &str = "backup_%Y_%m_%d_%H_%M_%S";
pub const BACKUP_EXTENSION: &str = "bin";
pub const TIMELAPSE_PREFIX: &str = "timelapse_";
pub const TIMELAPSE_TIME_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";
pub const TIMELAPSE_EXTENSION: &str = "png";

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Default config file path used by the CLI when `-c` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "Config/config.json";

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

/// How often the heartbeat clock samples wall-clock time and republishes the shared timestamp.
pub const HEARTBEAT_INTERVAL_MS: u64 = 1000;
