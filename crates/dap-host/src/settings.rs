//! Runtime settings for the debug adapter host.
//!
//! Settings are layered by `ortho_config`: built-in defaults, then a
//! configuration file, then `DAP_HOST_*` environment variables, then
//! command-line flags. Call `HostSettings::load()` to resolve them, or use
//! [`HostSettings::default`] when embedding the host without a loader.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::framing::{DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_HEADER_BYTES};

/// Default wait for the `disconnect` response before killing the adapter.
pub const DEFAULT_DISCONNECT_TIMEOUT_MS: u64 = 1000;

/// Default size of each read from the adapter's stdout.
pub const DEFAULT_READ_BUFFER_BYTES: usize = 8192;

/// Default interval between exit-status polls.
pub const DEFAULT_EXIT_POLL_INTERVAL_MS: u64 = 50;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Structured JSON suitable for ingestion by logging stacks.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Tunables for framing, supervision, shutdown and logging.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "DAP_HOST")]
pub struct HostSettings {
    /// Milliseconds to wait for the `disconnect` response.
    #[ortho_config(default = 1000)]
    pub disconnect_timeout_ms: u64,
    /// Largest header block accepted before buffered input is discarded.
    #[ortho_config(default = 8192)]
    pub max_header_bytes: usize,
    /// Largest message body accepted; longer bodies are skipped.
    #[ortho_config(default = 16_777_216)]
    pub max_body_bytes: usize,
    /// Size of each read from the adapter's stdout.
    #[ortho_config(default = 8192)]
    pub read_buffer_bytes: usize,
    /// Milliseconds between exit-status polls.
    #[ortho_config(default = 50)]
    pub exit_poll_interval_ms: u64,
    /// `tracing` filter expression.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            disconnect_timeout_ms: DEFAULT_DISCONNECT_TIMEOUT_MS,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            read_buffer_bytes: DEFAULT_READ_BUFFER_BYTES,
            exit_poll_interval_ms: DEFAULT_EXIT_POLL_INTERVAL_MS,
            log_filter: default_log_filter(),
            log_format: LogFormat::default(),
        }
    }
}

impl HostSettings {
    /// Wait applied to the `disconnect` handshake.
    #[must_use]
    pub const fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }

    /// Interval between exit-status polls, never zero.
    #[must_use]
    pub fn exit_poll_interval(&self) -> Duration {
        Duration::from_millis(self.exit_poll_interval_ms.max(1))
    }

    /// Read size for the stdout pump, never zero.
    #[must_use]
    pub fn read_buffer_bytes(&self) -> usize {
        self.read_buffer_bytes.max(1)
    }

    /// Sets the disconnect wait.
    #[must_use]
    pub fn with_disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the header ceiling.
    #[must_use]
    pub const fn with_max_header_bytes(mut self, limit: usize) -> Self {
        self.max_header_bytes = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::str::FromStr;

    use rstest::rstest;

    use super::*;

    #[rstest]
    fn defaults_match_protocol_constants() {
        let settings = HostSettings::default();

        assert_eq!(settings.disconnect_timeout(), Duration::from_millis(1000));
        assert_eq!(settings.max_header_bytes, DEFAULT_MAX_HEADER_BYTES);
        assert_eq!(settings.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert_eq!(settings.log_filter, "info");
        assert_eq!(settings.log_format, LogFormat::Json);
    }

    #[rstest]
    fn zero_intervals_are_clamped() {
        let settings = HostSettings {
            exit_poll_interval_ms: 0,
            read_buffer_bytes: 0,
            ..HostSettings::default()
        };

        assert_eq!(settings.exit_poll_interval(), Duration::from_millis(1));
        assert_eq!(settings.read_buffer_bytes(), 1);
    }

    #[rstest]
    fn builder_overrides_disconnect_timeout() {
        let settings = HostSettings::default().with_disconnect_timeout(Duration::from_millis(250));

        assert_eq!(settings.disconnect_timeout_ms, 250);
    }

    #[rstest]
    #[case("json", LogFormat::Json)]
    #[case("COMPACT", LogFormat::Compact)]
    fn parses_log_formats(#[case] input: &str, #[case] expected: LogFormat) {
        assert_eq!(LogFormat::from_str(input), Ok(expected));
    }

    #[rstest]
    fn deserialises_partial_settings_with_defaults() {
        let settings: HostSettings = serde_json::from_value(serde_json::json!({
            "disconnect_timeout_ms": 10,
            "max_header_bytes": 64,
            "max_body_bytes": 1024,
            "read_buffer_bytes": 512,
            "exit_poll_interval_ms": 5
        }))
        .expect("parse failed");

        assert_eq!(settings.log_filter, "info");
        assert_eq!(settings.log_format, LogFormat::Json);
        assert_eq!(settings.max_header_bytes, 64);
    }

    #[rstest]
    fn command_line_layer_overrides_defaults() {
        let args = [
            OsString::from("dap-host"),
            OsString::from("--disconnect-timeout-ms"),
            OsString::from("250"),
        ];

        let settings = HostSettings::load_from_iter(args).expect("load failed");

        assert_eq!(settings.disconnect_timeout(), Duration::from_millis(250));
        assert_eq!(settings.max_header_bytes, DEFAULT_MAX_HEADER_BYTES);
    }
}
