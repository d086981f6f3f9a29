//! Capture configuration model
//!
//! Field names match the keys of the settings file so that a settings
//! document written by earlier front-ends loads unchanged. Numeric options
//! are parsed leniently: anything missing, unparsable or negative falls back
//! to the "disabled" sentinel instead of reaching the argument vector.

use crate::utils::error::{CaptureError, CaptureResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::path::PathBuf;

pub const DEFAULT_PREFIX: &str = "tape";
pub const DEFAULT_TOOL: &str = "dvgrab";
pub const DEFAULT_V4L2_INPUT: &str = "/dev/video0";

/// Container format written by dvgrab (`-format`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Raw DIF stream (.dv)
    Raw,
    /// AVI Type 1
    Dv1,
    /// AVI Type 2
    Dv2,
    /// QuickTime
    Qt,
    /// QuickTime (.mov)
    Mov,
    /// Generic AVI container
    Avi,
    /// HDV transport stream (.m2t)
    Mpeg2,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 7] = [
        OutputFormat::Raw,
        OutputFormat::Dv1,
        OutputFormat::Dv2,
        OutputFormat::Qt,
        OutputFormat::Mov,
        OutputFormat::Avi,
        OutputFormat::Mpeg2,
    ];

    /// Token passed after `-format`
    pub fn token(&self) -> &'static str {
        match self {
            OutputFormat::Raw => "raw",
            OutputFormat::Dv1 => "dv1",
            OutputFormat::Dv2 => "dv2",
            OutputFormat::Qt => "qt",
            OutputFormat::Mov => "mov",
            OutputFormat::Avi => "avi",
            OutputFormat::Mpeg2 => "mpeg2",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|format| format.token() == token)
    }

    /// Only AVI Type 2 can grow past 1 GB through OpenDML
    pub fn supports_large_files(&self) -> bool {
        matches!(self, OutputFormat::Dv2)
    }
}

/// How dvgrab names the files it writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilenameScheme {
    /// Recording date and time from the tape
    #[default]
    Timestamp,
    /// SMPTE timecode from the tape
    Timecode,
    /// Host system time
    Timesys,
    /// Plain sequence numbers; also any unknown value
    #[serde(other)]
    None,
}

/// Everything a capture needs, as edited by the front-end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Base directory; every capture gets its own numbered subfolder
    pub output_dir: String,

    /// Subfolder name prefix (`tape` gives `tape1`, `tape2`, ...)
    pub subfolder_prefix: String,

    pub filename_scheme: FilenameScheme,

    /// `None` when the stored value was empty or unknown
    #[serde(
        deserialize_with = "deserialize_format",
        serialize_with = "serialize_format"
    )]
    pub format: Option<OutputFormat>,

    pub showstatus: bool,
    pub rewind: bool,
    /// Disable AV/C device control
    pub noavc: bool,
    pub recordonly: bool,
    /// OpenDML large-file AVI, honored for `dv2` only
    pub opendml: bool,

    /// Maximum file size in MB, 0 = unlimited
    #[serde(deserialize_with = "deserialize_count")]
    pub size_mb: u64,
    /// Collection size in MB, 0 = off
    #[serde(deserialize_with = "deserialize_count")]
    pub csize_mb: u64,
    /// Cut-ahead size for collections in MB, 0 = off
    #[serde(deserialize_with = "deserialize_count")]
    pub cmincutsize_mb: u64,
    /// Frames per output file, 0 = off
    #[serde(deserialize_with = "deserialize_count")]
    pub frames_per_file: u64,
    /// Keep every Nth frame, 1 = all
    #[serde(deserialize_with = "deserialize_decimation")]
    pub every_nth: u64,

    pub autosplit: bool,
    /// Autosplit sensitivity in seconds, 0 = dvgrab's default
    #[serde(deserialize_with = "deserialize_count")]
    pub autosplit_seconds: u64,

    /// FireWire card number, raw text from the front-end
    pub card: String,
    /// Isochronous channel, raw text from the front-end
    pub channel: String,
    /// Device GUID, passed through untouched
    pub guid: String,

    /// Maximum capture duration in SMIL time (`1h`, `30min`, `00:30:00`)
    pub duration: String,

    /// Capture from a V4L2 (USB DV) device instead of FireWire
    pub use_v4l2: bool,
    pub v4l2_input: String,

    /// Executable name or path of dvgrab
    pub dvgrab_path: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir().to_string_lossy().to_string(),
            subfolder_prefix: DEFAULT_PREFIX.to_string(),
            filename_scheme: FilenameScheme::Timestamp,
            format: Some(OutputFormat::Dv2),
            showstatus: true,
            rewind: false,
            noavc: false,
            recordonly: false,
            opendml: true,
            size_mb: 0,
            csize_mb: 0,
            cmincutsize_mb: 0,
            frames_per_file: 0,
            every_nth: 1,
            autosplit: false,
            autosplit_seconds: 0,
            card: String::new(),
            channel: String::new(),
            guid: String::new(),
            duration: String::new(),
            use_v4l2: false,
            v4l2_input: DEFAULT_V4L2_INPUT.to_string(),
            dvgrab_path: DEFAULT_TOOL.to_string(),
        }
    }
}

impl CaptureConfig {
    /// Reject configurations that cannot start a capture
    pub fn validate(&self) -> CaptureResult<()> {
        if self.output_dir.trim().is_empty() {
            return Err(CaptureError::Config(
                "Choose an output directory".to_string(),
            ));
        }
        Ok(())
    }

    /// Output base directory with a leading `~` expanded
    pub fn base_dir(&self) -> PathBuf {
        expand_home(self.output_dir.trim())
    }

    pub fn prefix(&self) -> &str {
        non_empty_or(&self.subfolder_prefix, DEFAULT_PREFIX)
    }

    pub fn tool(&self) -> &str {
        non_empty_or(&self.dvgrab_path, DEFAULT_TOOL)
    }

    /// Decimation with the `>= 1` floor applied
    pub fn decimation(&self) -> u64 {
        self.every_nth.max(1)
    }
}

/// Parse a count typed by the user; garbage and negatives yield `default`
pub fn parse_count(text: &str, default: u64) -> u64 {
    match text.trim().parse::<i64>() {
        Ok(value) if value >= 0 => value as u64,
        _ => default,
    }
}

fn count_from_value(value: Value, default: u64) -> u64 {
    match value {
        Value::Number(number) => match number.as_i64() {
            Some(value) if value < 0 => default,
            Some(value) => value as u64,
            None => number.as_u64().unwrap_or(default),
        },
        Value::String(text) => parse_count(&text, default),
        _ => default,
    }
}

fn deserialize_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(count_from_value(Value::deserialize(deserializer)?, 0))
}

fn deserialize_decimation<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(count_from_value(Value::deserialize(deserializer)?, 1).max(1))
}

fn deserialize_format<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<OutputFormat>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(token) => OutputFormat::from_token(token.trim()),
        _ => None,
    })
}

fn serialize_format<S: Serializer>(
    format: &Option<OutputFormat>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match format {
        Some(format) => serializer.serialize_str(format.token()),
        None => serializer.serialize_str(""),
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback
    } else {
        trimmed
    }
}

fn default_output_dir() -> PathBuf {
    dirs::video_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Videos")))
        .unwrap_or_else(|| PathBuf::from("Videos"))
}

fn expand_home(path: &str) -> PathBuf {
    let home = dirs::home_dir();
    match (path, home) {
        ("~", Some(home)) => home,
        (path, Some(home)) if path.starts_with("~/") => home.join(&path[2..]),
        (path, _) => PathBuf::from(path),
    }
}
