//! Probe client configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use periscope_core::SessionConfig;

/// Top-level configuration for the probe client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Stream handling.
    pub stream: StreamConfig,
    /// Audio buffering.
    pub audio: AudioConfig,
    /// Input forwarding.
    pub input: InputConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Stream server address. Port defaults to 9876 when omitted.
    pub host: String,
    /// Connect attempts per episode before giving up.
    pub connect_attempts: u32,
    /// Deadline for a single connect attempt, in milliseconds.
    pub connect_timeout_ms: u64,
}

/// Stream handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Silence tolerated before the connection is redialed, in
    /// milliseconds.
    pub stall_timeout_ms: u64,
    /// Largest payload a single frame may declare, in bytes.
    pub max_payload_bytes: usize,
    /// Sample window for the smoothed fps figure.
    pub fps_window: usize,
}

/// Audio buffering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Ceiling on buffered audio bytes before old chunks are dropped.
    pub ceiling_bytes: usize,
    /// Chunks that must accumulate before playback starts.
    pub priming_chunks: usize,
}

/// Input forwarding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Coalescing window for touch-move events, in milliseconds.
    pub touch_flush_ms: u64,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level, overridden by `RUST_LOG` when set.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            stream: StreamConfig::default(),
            audio: AudioConfig::default(),
            input: InputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let engine = SessionConfig::default();
        Self {
            host: "127.0.0.1".into(),
            connect_attempts: engine.connect_attempts,
            connect_timeout_ms: engine.connect_timeout.as_millis() as u64,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        let engine = SessionConfig::default();
        Self {
            stall_timeout_ms: engine.stall_timeout.as_millis() as u64,
            max_payload_bytes: engine.max_payload,
            fps_window: engine.fps_window,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        let engine = SessionConfig::default();
        Self {
            ceiling_bytes: engine.audio_ceiling,
            priming_chunks: engine.audio_priming,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            touch_flush_ms: SessionConfig::default().touch_flush.as_millis() as u64,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Map the file layout onto the engine's [`SessionConfig`]. Tick
    /// intervals the file does not expose keep their engine defaults.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            connect_attempts: self.network.connect_attempts,
            connect_timeout: Duration::from_millis(self.network.connect_timeout_ms),
            max_payload: self.stream.max_payload_bytes,
            stall_timeout: Duration::from_millis(self.stream.stall_timeout_ms),
            audio_ceiling: self.audio.ceiling_bytes,
            audio_priming: self.audio.priming_chunks,
            touch_flush: Duration::from_millis(self.input.touch_flush_ms),
            fps_window: self.stream.fps_window,
            ..SessionConfig::default()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = ClientConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("host"));
        assert!(text.contains("stall_timeout_ms"));
        assert!(text.contains("ceiling_bytes"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = ClientConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ClientConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.network.host, "127.0.0.1");
        assert_eq!(parsed.network.connect_attempts, 3);
        assert_eq!(parsed.audio.ceiling_bytes, 50_000);
        assert_eq!(parsed.input.touch_flush_ms, 16);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let parsed: ClientConfig = toml::from_str(
            r#"
            [network]
            host = "10.0.0.5:4242"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.network.host, "10.0.0.5:4242");
        assert_eq!(parsed.network.connect_attempts, 3);
        assert_eq!(parsed.stream.fps_window, 50);
    }

    #[test]
    fn session_config_maps_durations() {
        let cfg = ClientConfig::default();
        let engine = cfg.session_config();
        assert_eq!(engine.connect_timeout, Duration::from_millis(1000));
        assert_eq!(engine.stall_timeout, Duration::from_secs(5));
        assert_eq!(engine.touch_flush, Duration::from_millis(16));
        // Not exposed in the file; engine defaults apply.
        assert_eq!(engine.audio_poll, Duration::from_millis(1));
        assert_eq!(engine.display_tick, Duration::from_millis(1));
    }
}
