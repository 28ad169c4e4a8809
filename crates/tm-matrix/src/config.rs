use log::warn;

use crate::storage::StorageKind;

/// Default display surface edge length, in pixels.
pub const DEFAULT_DISPLAY_SIZE: u32 = 256;

/// Configuration for a GPU [`Backend`](crate::gpu::Backend).
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    /// Texel storage used by every matrix on this backend.
    pub storage: StorageKind,
    /// Adapter power preference passed to `wgpu`.
    pub power_preference: wgpu::PowerPreference,
    /// Ask `wgpu` for a software adapter.
    pub force_fallback_adapter: bool,
    /// Width of the default display surface.
    pub display_width: u32,
    /// Height of the default display surface.
    pub display_height: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            storage: StorageKind::Encoded,
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            display_width: DEFAULT_DISPLAY_SIZE,
            display_height: DEFAULT_DISPLAY_SIZE,
        }
    }
}

impl BackendConfig {
    /// Build a configuration from `TEXMUL_*` environment variables.
    ///
    /// Reads the following keys:
    /// - `TEXMUL_STORAGE` -> `encoded` | `float`
    /// - `TEXMUL_POWER_PREFERENCE` -> `high` | `low` | `none`
    /// - `TEXMUL_FORCE_FALLBACK_ADAPTER` -> `1` | `true` | `0` | `false`
    /// - `TEXMUL_DISPLAY_SIZE` -> `WIDTHxHEIGHT`
    ///
    /// Missing keys keep their defaults; unrecognized values are logged and
    /// ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("TEXMUL_STORAGE") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "encoded" | "rgba8" | "bytes" => config.storage = StorageKind::Encoded,
                "float" | "f32" | "r32float" => config.storage = StorageKind::NativeFloat,
                _ => warn!(
                    "TEXMUL_STORAGE='{}' not recognized (expected encoded|float); using {:?}",
                    raw, config.storage
                ),
            }
        }

        if let Some(raw) = lookup("TEXMUL_POWER_PREFERENCE") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "high" | "high-performance" => {
                    config.power_preference = wgpu::PowerPreference::HighPerformance
                }
                "low" | "low-power" => config.power_preference = wgpu::PowerPreference::LowPower,
                "none" => config.power_preference = wgpu::PowerPreference::None,
                _ => warn!(
                    "TEXMUL_POWER_PREFERENCE='{}' not recognized (expected high|low|none)",
                    raw
                ),
            }
        }

        if let Some(raw) = lookup("TEXMUL_FORCE_FALLBACK_ADAPTER") {
            match parse_bool(&raw) {
                Some(v) => config.force_fallback_adapter = v,
                None => warn!("TEXMUL_FORCE_FALLBACK_ADAPTER='{}' is not a boolean", raw),
            }
        }

        if let Some(raw) = lookup("TEXMUL_DISPLAY_SIZE") {
            match parse_size(&raw) {
                Some((w, h)) => {
                    config.display_width = w;
                    config.display_height = h;
                }
                None => warn!(
                    "TEXMUL_DISPLAY_SIZE='{}' not recognized (expected WIDTHxHEIGHT)",
                    raw
                ),
            }
        }

        config
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_size(raw: &str) -> Option<(u32, u32)> {
    let (w, h) = raw.trim().split_once(['x', 'X'])?;
    let w = w.trim().parse::<u32>().ok()?;
    let h = h.trim().parse::<u32>().ok()?;
    if w == 0 || h == 0 {
        return None;
    }
    Some((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BackendConfig::from_lookup(|_| None);
        assert_eq!(config, BackendConfig::default());
        assert_eq!(config.storage, StorageKind::Encoded);
        assert_eq!(config.display_width, DEFAULT_DISPLAY_SIZE);
    }

    #[test]
    fn test_all_keys() {
        let config = BackendConfig::from_lookup(lookup(&[
            ("TEXMUL_STORAGE", "float"),
            ("TEXMUL_POWER_PREFERENCE", "low"),
            ("TEXMUL_FORCE_FALLBACK_ADAPTER", "true"),
            ("TEXMUL_DISPLAY_SIZE", "640x480"),
        ]));
        assert_eq!(config.storage, StorageKind::NativeFloat);
        assert_eq!(config.power_preference, wgpu::PowerPreference::LowPower);
        assert!(config.force_fallback_adapter);
        assert_eq!((config.display_width, config.display_height), (640, 480));
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let config = BackendConfig::from_lookup(lookup(&[
            ("TEXMUL_STORAGE", "f16"),
            ("TEXMUL_FORCE_FALLBACK_ADAPTER", "maybe"),
            ("TEXMUL_DISPLAY_SIZE", "0x10"),
        ]));
        assert_eq!(config, BackendConfig::default());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size(" 32X16 "), Some((32, 16)));
        assert_eq!(parse_size("32"), None);
        assert_eq!(parse_size("ax2"), None);
    }
}
