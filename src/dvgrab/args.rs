//! dvgrab argument synthesis
//!
//! The command line is built by a fixed sequence of independent rules, each
//! appending zero or more tokens. dvgrab is sensitive to option order and
//! does not deduplicate, so the table order is part of the contract. The
//! output prefix is always appended last.

use crate::config::model::{CaptureConfig, FilenameScheme};
use std::path::Path;

/// File name stem dvgrab appends its numbering to
pub const CLIP_STEM: &str = "clip-";

/// One step of the command line
pub type ArgRule = fn(&CaptureConfig, &mut Vec<String>);

/// Rules in emission order
pub const RULES: &[ArgRule] = &[
    tool,
    format,
    filename_scheme,
    max_file_size,
    frames_per_file,
    autosplit,
    collection,
    behavior_flags,
    device_routing,
    v4l2_input,
    duration,
    decimation,
];

/// Build the full argument vector, program first
///
/// Pure: no filesystem or environment access.
pub fn build_args(config: &CaptureConfig, target_dir: &Path) -> Vec<String> {
    let mut args = Vec::new();
    for rule in RULES {
        rule(config, &mut args);
    }
    args.push(output_prefix(target_dir));
    args
}

/// `{target_dir}/clip-`
pub fn output_prefix(target_dir: &Path) -> String {
    target_dir.join(CLIP_STEM).to_string_lossy().to_string()
}

fn push(args: &mut Vec<String>, tokens: &[&str]) {
    args.extend(tokens.iter().map(|token| token.to_string()));
}

/// Program name or path, resolved later by the process environment
fn tool(config: &CaptureConfig, args: &mut Vec<String>) {
    args.push(config.tool().to_string());
}

fn format(config: &CaptureConfig, args: &mut Vec<String>) {
    if let Some(format) = config.format {
        push(args, &["-format", format.token()]);
    }
}

fn filename_scheme(config: &CaptureConfig, args: &mut Vec<String>) {
    let flag = match config.filename_scheme {
        FilenameScheme::None => return,
        FilenameScheme::Timestamp => "-timestamp",
        FilenameScheme::Timecode => "-timecode",
        FilenameScheme::Timesys => "-timesys",
    };
    push(args, &[flag]);
}

/// Always emitted, 0 included
fn max_file_size(config: &CaptureConfig, args: &mut Vec<String>) {
    push(args, &["-size", &config.size_mb.to_string()]);
}

fn frames_per_file(config: &CaptureConfig, args: &mut Vec<String>) {
    if config.frames_per_file > 0 {
        push(args, &["-frames", &config.frames_per_file.to_string()]);
    }
}

fn autosplit(config: &CaptureConfig, args: &mut Vec<String>) {
    if !config.autosplit {
        return;
    }
    if config.autosplit_seconds > 0 {
        args.push(format!("-autosplit={}", config.autosplit_seconds));
    } else {
        push(args, &["-autosplit"]);
    }
}

fn collection(config: &CaptureConfig, args: &mut Vec<String>) {
    if config.csize_mb > 0 {
        push(args, &["-csize", &config.csize_mb.to_string()]);
    }
    if config.cmincutsize_mb > 0 {
        push(args, &["-cmincutsize", &config.cmincutsize_mb.to_string()]);
    }
}

fn behavior_flags(config: &CaptureConfig, args: &mut Vec<String>) {
    let opendml = config.opendml
        && config
            .format
            .map(|format| format.supports_large_files())
            .unwrap_or(false);

    let flags = [
        (config.showstatus, "-showstatus"),
        (config.rewind, "-rewind"),
        (config.noavc, "-noavc"),
        (config.recordonly, "-recordonly"),
        (opendml, "-opendml"),
    ];
    for (enabled, flag) in flags {
        if enabled {
            push(args, &[flag]);
        }
    }
}

fn device_routing(config: &CaptureConfig, args: &mut Vec<String>) {
    if let Some(card) = digits(&config.card) {
        push(args, &["-card", card]);
    }
    if let Some(channel) = digits(&config.channel) {
        push(args, &["-channel", channel]);
    }
    let guid = config.guid.trim();
    if !guid.is_empty() {
        push(args, &["-guid", guid]);
    }
}

fn v4l2_input(config: &CaptureConfig, args: &mut Vec<String>) {
    if !config.use_v4l2 {
        return;
    }
    push(args, &["-v4l2"]);
    let input = config.v4l2_input.trim();
    if !input.is_empty() {
        push(args, &["-input", input]);
    }
}

/// SMIL time is not validated here; dvgrab rejects what it cannot parse
fn duration(config: &CaptureConfig, args: &mut Vec<String>) {
    let duration = config.duration.trim();
    if !duration.is_empty() {
        push(args, &["-duration", duration]);
    }
}

fn decimation(config: &CaptureConfig, args: &mut Vec<String>) {
    if config.decimation() > 1 {
        push(args, &["-every", &config.decimation().to_string()]);
    }
}

/// Trimmed text if it is a non-empty run of ASCII digits
fn digits(text: &str) -> Option<&str> {
    let text = text.trim();
    (!text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::OutputFormat;

    fn bare() -> CaptureConfig {
        CaptureConfig {
            format: None,
            filename_scheme: FilenameScheme::None,
            showstatus: false,
            opendml: false,
            ..CaptureConfig::default()
        }
    }

    fn apply(rule: ArgRule, config: &CaptureConfig) -> Vec<String> {
        let mut args = Vec::new();
        rule(config, &mut args);
        args
    }

    #[test]
    fn test_default_command_line() {
        let args = build_args(&CaptureConfig::default(), Path::new("/cap/tape1"));
        assert_eq!(
            args,
            vec![
                "dvgrab",
                "-format",
                "dv2",
                "-timestamp",
                "-size",
                "0",
                "-showstatus",
                "-opendml",
                "/cap/tape1/clip-",
            ]
        );
    }

    #[test]
    fn test_minimal_command_line() {
        let args = build_args(&bare(), Path::new("/cap/tape2"));
        assert_eq!(args, vec!["dvgrab", "-size", "0", "/cap/tape2/clip-"]);
    }

    #[test]
    fn test_everything_enabled_order() {
        let config = CaptureConfig {
            dvgrab_path: "/opt/dvgrab/bin/dvgrab".to_string(),
            format: Some(OutputFormat::Dv2),
            filename_scheme: FilenameScheme::Timecode,
            size_mb: 1024,
            frames_per_file: 250,
            autosplit: true,
            autosplit_seconds: 12,
            csize_mb: 4000,
            cmincutsize_mb: 100,
            showstatus: true,
            rewind: true,
            noavc: true,
            recordonly: true,
            opendml: true,
            card: "0".to_string(),
            channel: "63".to_string(),
            guid: "0x0800460104a1b2c3".to_string(),
            use_v4l2: true,
            v4l2_input: "/dev/video1".to_string(),
            duration: "1h".to_string(),
            every_nth: 5,
            ..CaptureConfig::default()
        };

        let args = build_args(&config, Path::new("/cap/tape9"));
        assert_eq!(
            args,
            vec![
                "/opt/dvgrab/bin/dvgrab",
                "-format",
                "dv2",
                "-timecode",
                "-size",
                "1024",
                "-frames",
                "250",
                "-autosplit=12",
                "-csize",
                "4000",
                "-cmincutsize",
                "100",
                "-showstatus",
                "-rewind",
                "-noavc",
                "-recordonly",
                "-opendml",
                "-card",
                "0",
                "-channel",
                "63",
                "-guid",
                "0x0800460104a1b2c3",
                "-v4l2",
                "-input",
                "/dev/video1",
                "-duration",
                "1h",
                "-every",
                "5",
                "/cap/tape9/clip-",
            ]
        );
    }

    #[test]
    fn test_deterministic_and_prefix_last() {
        let config = CaptureConfig {
            duration: "00:30:00".to_string(),
            ..CaptureConfig::default()
        };
        let target = Path::new("/cap/tape3");

        let first = build_args(&config, target);
        assert_eq!(first, build_args(&config, target));
        assert_eq!(first.last().unwrap(), "/cap/tape3/clip-");
    }

    #[test]
    fn test_size_always_present() {
        assert_eq!(apply(max_file_size, &bare()), vec!["-size", "0"]);
    }

    #[test]
    fn test_autosplit_shapes() {
        let mut config = bare();
        assert!(apply(autosplit, &config).is_empty());

        config.autosplit = true;
        assert_eq!(apply(autosplit, &config), vec!["-autosplit"]);

        config.autosplit_seconds = 12;
        assert_eq!(apply(autosplit, &config), vec!["-autosplit=12"]);
    }

    #[test]
    fn test_collection_options_independent() {
        let mut config = bare();
        config.cmincutsize_mb = 50;
        assert_eq!(apply(collection, &config), vec!["-cmincutsize", "50"]);

        config.cmincutsize_mb = 0;
        config.csize_mb = 700;
        assert_eq!(apply(collection, &config), vec!["-csize", "700"]);
    }

    #[test]
    fn test_opendml_only_for_dv2() {
        let mut config = bare();
        config.opendml = true;
        config.format = Some(OutputFormat::Avi);
        assert!(apply(behavior_flags, &config).is_empty());

        config.format = None;
        assert!(apply(behavior_flags, &config).is_empty());

        config.format = Some(OutputFormat::Dv2);
        assert_eq!(apply(behavior_flags, &config), vec!["-opendml"]);
    }

    #[test]
    fn test_non_digit_routing_omitted() {
        let mut config = bare();
        config.card = "abc".to_string();
        config.channel = "-1".to_string();
        assert!(apply(device_routing, &config).is_empty());

        config.card = " 2 ".to_string();
        config.guid = "  ".to_string();
        assert_eq!(apply(device_routing, &config), vec!["-card", "2"]);
    }

    #[test]
    fn test_v4l2_without_input() {
        let mut config = bare();
        config.use_v4l2 = true;
        config.v4l2_input = String::new();
        assert_eq!(apply(v4l2_input, &config), vec!["-v4l2"]);

        config.use_v4l2 = false;
        config.v4l2_input = "/dev/video0".to_string();
        assert!(apply(v4l2_input, &config).is_empty());
    }

    #[test]
    fn test_duration_passed_verbatim() {
        let mut config = bare();
        config.duration = "not-a-time".to_string();
        assert_eq!(apply(duration, &config), vec!["-duration", "not-a-time"]);
    }

    #[test]
    fn test_decimation_above_one() {
        let mut config = bare();
        assert!(apply(decimation, &config).is_empty());

        config.every_nth = 0;
        assert!(apply(decimation, &config).is_empty());

        config.every_nth = 2;
        assert_eq!(apply(decimation, &config), vec!["-every", "2"]);
    }

    #[test]
    fn test_each_scheme_single_token() {
        let mut config = bare();
        for (scheme, expected) in [
            (FilenameScheme::Timestamp, vec!["-timestamp"]),
            (FilenameScheme::Timecode, vec!["-timecode"]),
            (FilenameScheme::Timesys, vec!["-timesys"]),
            (FilenameScheme::None, vec![]),
        ] {
            config.filename_scheme = scheme;
            assert_eq!(apply(filename_scheme, &config), expected);
        }
    }
}
