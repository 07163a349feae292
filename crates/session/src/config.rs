use std::time::Duration;

use roisync_core::playback::{BufferConfig, DEFAULT_BUFFER_SECONDS, DEFAULT_SAMPLING_RATE_HZ};
use roisync_core::roi::AreaMode;
use roisync_core::types::{Rect, Size};

/// Errors raised while loading [`SessionConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Session configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Base URL of the detection service, e.g. `http://host:8000/api`.
    pub api_url: String,
    pub video_path: String,
    pub source: Size,
    pub display: Size,
    pub area_mode: AreaMode,
    pub sampling_rate_hz: f64,
    pub poll_interval: Duration,
    pub buffer_seconds: f64,
    /// Literal the trigger area must show. Empty matches any decoded text.
    pub trigger_text: String,
    /// Length of the simulated video driven by the monitor binary.
    pub video_duration_secs: f64,
    /// Display-space area drawn at startup by the monitor binary.
    pub primary_roi: Option<Rect>,
    pub trigger_roi: Option<Rect>,
}

impl SessionConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var               | Default     |
    /// |-----------------------|-------------|
    /// | `DETECTION_API_URL`   | required    |
    /// | `VIDEO_PATH`          | required    |
    /// | `SOURCE_WIDTH`        | `1920`      |
    /// | `SOURCE_HEIGHT`       | `1080`      |
    /// | `DISPLAY_WIDTH`       | `960`       |
    /// | `DISPLAY_HEIGHT`      | `540`       |
    /// | `AREA_MODE`           | `single`    |
    /// | `SAMPLING_RATE_HZ`    | `5`         |
    /// | `POLL_INTERVAL_MS`    | `2000`      |
    /// | `BUFFER_SECONDS`      | `10`        |
    /// | `TRIGGER_TEXT`        | empty       |
    /// | `VIDEO_DURATION_SECS` | `60`        |
    /// | `PRIMARY_ROI`         | unset       |
    /// | `TRIGGER_ROI`         | unset       |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let api_url = required("DETECTION_API_URL")?;
        let video_path = required("VIDEO_PATH")?;

        let source = Size::new(
            positive(&lookup, "SOURCE_WIDTH", 1920.0)?,
            positive(&lookup, "SOURCE_HEIGHT", 1080.0)?,
        );
        let display = Size::new(
            positive(&lookup, "DISPLAY_WIDTH", 960.0)?,
            positive(&lookup, "DISPLAY_HEIGHT", 540.0)?,
        );

        let area_mode = match lookup("AREA_MODE") {
            None => AreaMode::default(),
            Some(value) => parse_area_mode(&value).ok_or(ConfigError::Invalid {
                name: "AREA_MODE",
                value,
                reason: "expected `single` or `dual`",
            })?,
        };

        let sampling_rate_hz = positive(&lookup, "SAMPLING_RATE_HZ", DEFAULT_SAMPLING_RATE_HZ)?;
        let poll_interval_ms = millis(&lookup, "POLL_INTERVAL_MS", 2000)?;
        let buffer_seconds = non_negative(&lookup, "BUFFER_SECONDS", DEFAULT_BUFFER_SECONDS)?;
        let video_duration_secs = positive(&lookup, "VIDEO_DURATION_SECS", 60.0)?;

        let primary_roi = optional_rect(&lookup, "PRIMARY_ROI")?;
        let trigger_roi = optional_rect(&lookup, "TRIGGER_ROI")?;

        Ok(Self {
            api_url,
            video_path,
            source,
            display,
            area_mode,
            sampling_rate_hz,
            poll_interval: Duration::from_millis(poll_interval_ms),
            buffer_seconds,
            trigger_text: lookup("TRIGGER_TEXT").unwrap_or_default(),
            video_duration_secs,
            primary_roi,
            trigger_roi,
        })
    }

    pub fn buffer_config(&self) -> BufferConfig {
        BufferConfig::from_sampling_rate(self.sampling_rate_hz, self.buffer_seconds)
    }
}

// ---- private helpers ----

fn parse_area_mode(value: &str) -> Option<AreaMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "single" => Some(AreaMode::Single),
        "dual" => Some(AreaMode::Dual),
        _ => None,
    }
}

fn number<F>(lookup: &F, name: &'static str, default: f64) -> Result<f64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(name) else {
        return Ok(default);
    };
    match value.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n),
        _ => Err(ConfigError::Invalid {
            name,
            value,
            reason: "expected a number",
        }),
    }
}

fn positive<F>(lookup: &F, name: &'static str, default: f64) -> Result<f64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let n = number(lookup, name, default)?;
    if n <= 0.0 {
        return Err(ConfigError::Invalid {
            name,
            value: n.to_string(),
            reason: "must be greater than zero",
        });
    }
    Ok(n)
}

/// A whole number of milliseconds, at least 1.
fn millis<F>(lookup: &F, name: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(name) else {
        return Ok(default);
    };
    match value.trim().parse::<u64>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(ConfigError::Invalid {
            name,
            value,
            reason: "expected a whole number of milliseconds, at least 1",
        }),
    }
}

fn non_negative<F>(lookup: &F, name: &'static str, default: f64) -> Result<f64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let n = number(lookup, name, default)?;
    if n < 0.0 {
        return Err(ConfigError::Invalid {
            name,
            value: n.to_string(),
            reason: "must not be negative",
        });
    }
    Ok(n)
}

/// Parse `x,y,w,h` in display units.
fn optional_rect<F>(lookup: &F, name: &'static str) -> Result<Option<Rect>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| ConfigError::Invalid {
            name,
            value: value.clone(),
            reason: "expected `x,y,w,h`",
        })?;

    match parts.as_slice() {
        [x, y, w, h] if parts.iter().all(|n| n.is_finite()) => Ok(Some(Rect::new(*x, *y, *w, *h))),
        _ => Err(ConfigError::Invalid {
            name,
            value,
            reason: "expected `x,y,w,h`",
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<SessionConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SessionConfig::from_lookup(|name| vars.get(name).cloned())
    }

    const BASE: [(&str, &str); 2] = [
        ("DETECTION_API_URL", "http://localhost:8000/api"),
        ("VIDEO_PATH", "/videos/line-3.mp4"),
    ];

    #[test]
    fn defaults_apply_when_only_required_vars_set() {
        let config = load(&BASE).unwrap();
        assert_eq!(config.source, Size::new(1920.0, 1080.0));
        assert_eq!(config.display, Size::new(960.0, 540.0));
        assert_eq!(config.area_mode, AreaMode::Single);
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.buffer_seconds, 10.0);
        assert!(config.trigger_text.is_empty());
        assert!(config.primary_roi.is_none());

        let buffer = config.buffer_config();
        assert!((buffer.seconds_per_processed_frame - 0.2).abs() < 1e-9);
    }

    #[test]
    fn missing_api_url_is_reported() {
        assert_matches!(
            load(&[("VIDEO_PATH", "/v.mp4")]),
            Err(ConfigError::Missing("DETECTION_API_URL"))
        );
    }

    #[test]
    fn dual_mode_and_rois_parse() {
        let mut vars = BASE.to_vec();
        vars.extend([
            ("AREA_MODE", "Dual"),
            ("PRIMARY_ROI", "100, 80, 320, 180"),
            ("TRIGGER_ROI", "20,20,60,40"),
            ("TRIGGER_TEXT", "START"),
        ]);
        let config = load(&vars).unwrap();
        assert_eq!(config.area_mode, AreaMode::Dual);
        assert_eq!(config.primary_roi, Some(Rect::new(100.0, 80.0, 320.0, 180.0)));
        assert_eq!(config.trigger_roi, Some(Rect::new(20.0, 20.0, 60.0, 40.0)));
        assert_eq!(config.trigger_text, "START");
    }

    #[test]
    fn malformed_values_are_errors_not_panics() {
        let mut vars = BASE.to_vec();
        vars.push(("SAMPLING_RATE_HZ", "fast"));
        assert_matches!(
            load(&vars),
            Err(ConfigError::Invalid { name: "SAMPLING_RATE_HZ", .. })
        );

        let mut vars = BASE.to_vec();
        vars.push(("DISPLAY_WIDTH", "0"));
        assert_matches!(load(&vars), Err(ConfigError::Invalid { name: "DISPLAY_WIDTH", .. }));

        let mut vars = BASE.to_vec();
        vars.push(("PRIMARY_ROI", "1,2,3"));
        assert_matches!(load(&vars), Err(ConfigError::Invalid { name: "PRIMARY_ROI", .. }));

        let mut vars = BASE.to_vec();
        vars.push(("AREA_MODE", "triple"));
        assert_matches!(load(&vars), Err(ConfigError::Invalid { name: "AREA_MODE", .. }));
    }

    #[test]
    fn poll_interval_must_be_whole_positive_millis() {
        for bad in ["0.5", "0", "-10", "1e3"] {
            let mut vars = BASE.to_vec();
            vars.push(("POLL_INTERVAL_MS", bad));
            assert_matches!(
                load(&vars),
                Err(ConfigError::Invalid { name: "POLL_INTERVAL_MS", .. }),
                "POLL_INTERVAL_MS={}",
                bad
            );
        }

        let mut vars = BASE.to_vec();
        vars.push(("POLL_INTERVAL_MS", "750"));
        assert_eq!(load(&vars).unwrap().poll_interval, Duration::from_millis(750));
    }
}
