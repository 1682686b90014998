//! Loader for animation files produced by the show designer export.
//!
//! Each non-empty line is one frame of comma-separated numbers:
//! `[index,] x, y, z [, r, g, b]`. Lines starting with `#` and rows that fail
//! to parse are skipped with a warning.

use super::{AnimationSource, Frame, Rgb};
use crate::config::SharedConfig;
use crate::error::{ClientError, Result};
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Clone)]
enum Location {
    Fixed(PathBuf),
    /// `files_directory/animation_file` from the current snapshot
    Configured(SharedConfig),
}

/// Animation frames read from a text file on every load.
#[derive(Clone)]
pub struct CsvAnimation {
    location: Location,
}

impl CsvAnimation {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::Fixed(path.into()),
        }
    }

    /// Follow the configured animation path across reloads.
    pub fn configured(config: SharedConfig) -> Self {
        Self {
            location: Location::Configured(config),
        }
    }

    pub fn path(&self) -> PathBuf {
        match &self.location {
            Location::Fixed(path) => path.clone(),
            Location::Configured(config) => config.load().files.animation_path(),
        }
    }

    /// Parse animation text into frames.
    pub fn parse(text: &str) -> Vec<Frame> {
        text.lines()
            .enumerate()
            .filter_map(|(line_no, line)| {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    return None;
                }
                let frame = parse_row(line);
                if frame.is_none() {
                    warn!("Skipping malformed animation row {}: {:?}", line_no + 1, line);
                }
                frame
            })
            .collect()
    }
}

fn parse_row(line: &str) -> Option<Frame> {
    let fields: Vec<f64> = line
        .split(',')
        .map(|f| f.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;

    // Rows with 4 or 7 fields carry a leading frame index
    let values = match fields.len() {
        4 | 7 => &fields[1..],
        3 | 6 => &fields[..],
        _ => return None,
    };
    let color = if values.len() == 6 {
        Rgb::new(channel(values[3])?, channel(values[4])?, channel(values[5])?)
    } else {
        Rgb::default()
    };
    Some(Frame {
        x: values[0],
        y: values[1],
        z: values[2],
        color,
    })
}

fn channel(value: f64) -> Option<u8> {
    (0.0..=255.0)
        .contains(&value)
        .then(|| value.round() as u8)
}

impl AnimationSource for CsvAnimation {
    fn load(&self) -> Result<Vec<Frame>> {
        let path = self.path();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Animation file {:?} not found", path);
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(ClientError::Device(format!(
                    "failed to read animation {:?}: {}",
                    path, e
                )));
            }
        };
        let frames = Self::parse(&text);
        debug!("Loaded {} frames from {:?}", frames.len(), path);
        Ok(frames)
    }
}
