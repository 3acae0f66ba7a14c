//! JSON-lines telemetry captures
//!
//! One frame per line. A line is either a bare joint map
//! (`{"HeadYaw": 0.1}`) or an object carrying `joints` and an optional
//! `battery` reading. Blank lines and lines starting with `#` are skipped.

use std::fs;
use std::path::{Path, PathBuf};

use posemirror_core::BatteryReading;
use serde::Deserialize;
use serde_json::Value;

/// Errors of the replay tool
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}: capture holds no frames")]
    Empty(PathBuf),

    #[error(transparent)]
    Core(#[from] posemirror_core::Error),
}

/// One captured telemetry poll
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureFrame {
    pub joints: Value,
    pub battery: Option<BatteryReading>,
}

#[derive(Deserialize)]
struct FramedLine {
    joints: Value,
    #[serde(default)]
    battery: Option<BatteryReading>,
}

impl CaptureFrame {
    fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        if value.get("joints").is_some() {
            let framed: FramedLine = serde_json::from_value(value)?;
            return Ok(Self {
                joints: framed.joints,
                battery: framed.battery,
            });
        }
        Ok(Self {
            joints: value,
            battery: None,
        })
    }
}

/// Parse capture text; `path` is only used in error messages
pub fn parse_capture(text: &str, path: &Path) -> Result<Vec<CaptureFrame>, ReplayError> {
    let mut frames = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parse_err = |source| ReplayError::Parse {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        };
        let value: Value = serde_json::from_str(line).map_err(parse_err)?;
        frames.push(CaptureFrame::from_value(value).map_err(parse_err)?);
    }
    if frames.is_empty() {
        return Err(ReplayError::Empty(path.to_path_buf()));
    }
    Ok(frames)
}

/// Read and parse a capture file
pub fn load_capture(path: &Path) -> Result<Vec<CaptureFrame>, ReplayError> {
    let text = fs::read_to_string(path).map_err(|source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_capture(&text, path)
}

/// Slow sweep of every joint, used when no capture is given
pub fn synthetic_sweep(joints: &[String], frames: usize) -> Vec<CaptureFrame> {
    (0..frames.max(1))
        .map(|i| {
            let phase = i as f64 / frames.max(1) as f64 * std::f64::consts::TAU;
            let map = joints
                .iter()
                .enumerate()
                .map(|(j, name)| {
                    let angle = 0.3 * (phase + j as f64 * 0.4).sin();
                    (name.clone(), Value::from(angle))
                })
                .collect::<serde_json::Map<_, _>>();
            CaptureFrame {
                joints: Value::Object(map),
                battery: Some(BatteryReading {
                    charge: Some(100.0 - i as f64),
                    plugged: false,
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_both_line_forms() {
        let text = r#"
# captured 2024-07-01
{"HeadYaw": 0.1, "HipPitch": {"angle": -0.2}}

{"joints": {"HeadPitch": 0.05}, "battery": {"charge": 57.0, "plugged": true}}
"#;
        let frames = parse_capture(text, Path::new("cap.jsonl")).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].joints, json!({"HeadYaw": 0.1, "HipPitch": {"angle": -0.2}}));
        assert_eq!(frames[0].battery, None);
        assert_eq!(frames[1].joints, json!({"HeadPitch": 0.05}));
        assert_eq!(
            frames[1].battery,
            Some(BatteryReading {
                charge: Some(57.0),
                plugged: true
            })
        );
    }

    #[test]
    fn test_parse_reports_line() {
        let err = parse_capture("{\"HeadYaw\": 0.1}\n{oops", Path::new("cap.jsonl")).unwrap_err();
        match err {
            ReplayError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {other}"),
        }
        assert!(matches!(
            parse_capture("\n# nothing\n", Path::new("empty.jsonl")),
            Err(ReplayError::Empty(_))
        ));
    }

    #[test]
    fn test_sweep_covers_joints() {
        let joints = vec!["HeadYaw".to_string(), "HeadPitch".to_string()];
        let frames = synthetic_sweep(&joints, 8);
        assert_eq!(frames.len(), 8);
        for frame in &frames {
            let angle = frame.joints["HeadPitch"].as_f64().unwrap();
            assert!(angle.abs() <= 0.3);
        }
    }
}
