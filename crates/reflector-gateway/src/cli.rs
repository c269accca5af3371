//! Command-line surface: `serve` (default), `config validate`/`config show`,
//! and `run` (trigger a single diarization workflow end to end without a
//! server — useful for smoke-testing a deployment).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use reflector_domain::config::Config;

#[derive(Parser, Debug)]
#[command(name = "reflector", version, about = "Reflector transcript pipeline gateway")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to the TOML config file. Falls back to defaults if absent.
    #[arg(long, global = true, default_value = "reflector.toml")]
    pub config: PathBuf,

    /// Directory backing the transcript store and workflow run log.
    #[arg(long, global = true, default_value = "./data")]
    pub state_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the WebSocket fan-out server (default).
    Serve,
    /// Inspect or validate the active configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Trigger a single diarization workflow from local track files, then
    /// print the resulting transcript and exit.
    Run(RunArgs),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate the configuration and exit non-zero on error.
    Validate,
    /// Print the effective configuration as TOML.
    Show,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    #[arg(long)]
    pub transcript_id: String,
    #[arg(long)]
    pub recording_id: String,
    #[arg(long, default_value = "reflector")]
    pub bucket: String,
    #[arg(long)]
    pub room_id: Option<String>,
    #[arg(long)]
    pub meeting_id: Option<String>,
    #[arg(long, default_value_t = 0.0)]
    pub duration: f64,
    /// One per track: `<track_index>:<raw_pcm_file>:<start_offset_secs>`.
    #[arg(long = "track")]
    pub tracks: Vec<String>,
    /// One per participant: `<track_index>:<name>:<language>`.
    #[arg(long = "participant")]
    pub participants: Vec<String>,
}

/// A parsed `--track` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackArg {
    pub track_index: u32,
    pub file: PathBuf,
    pub start_offset: f64,
}

/// A parsed `--participant` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantArg {
    pub track_index: u32,
    pub name: String,
    pub language: String,
}

pub fn parse_track_arg(raw: &str) -> anyhow::Result<TrackArg> {
    let mut parts = raw.splitn(3, ':');
    let index = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("--track missing index: {raw}"))?;
    let file = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("--track missing file: {raw}"))?;
    let offset = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("--track missing start offset: {raw}"))?;
    Ok(TrackArg {
        track_index: index.parse().map_err(|_| anyhow::anyhow!("bad track index: {index}"))?,
        file: PathBuf::from(file),
        start_offset: offset.parse().map_err(|_| anyhow::anyhow!("bad start offset: {offset}"))?,
    })
}

pub fn parse_participant_arg(raw: &str) -> anyhow::Result<ParticipantArg> {
    let mut parts = raw.splitn(3, ':');
    let index = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("--participant missing index: {raw}"))?;
    let name = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("--participant missing name: {raw}"))?;
    let language = parts.next().unwrap_or("en");
    Ok(ParticipantArg {
        track_index: index.parse().map_err(|_| anyhow::anyhow!("bad track index: {index}"))?,
        name: name.to_string(),
        language: language.to_string(),
    })
}

/// Load the config file at `path`, falling back to defaults when it's
/// absent (dev-mode convenience, mirroring the teacher's `load_config`).
pub fn load_config(path: &std::path::Path) -> anyhow::Result<Config> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "no config file found, using defaults");
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&raw)?;
    Ok(config)
}

pub fn validate(config: &Config) -> bool {
    let issues = config.validate();
    for issue in &issues {
        println!("{issue}");
    }
    !issues
        .iter()
        .any(|i| i.severity == reflector_domain::config::ConfigSeverity::Error)
}

pub fn show(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(s) => println!("{s}"),
        Err(err) => eprintln!("failed to serialize config: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_track_arg() {
        let t = parse_track_arg("0:rec1/raw0.pcm:1.5").unwrap();
        assert_eq!(
            t,
            TrackArg { track_index: 0, file: PathBuf::from("rec1/raw0.pcm"), start_offset: 1.5 }
        );
    }

    #[test]
    fn rejects_a_track_arg_missing_fields() {
        assert!(parse_track_arg("0:only_file").is_err());
    }

    #[test]
    fn parses_a_participant_arg_with_default_language() {
        let p = parse_participant_arg("1:Alice").unwrap();
        assert_eq!(p, ParticipantArg { track_index: 1, name: "Alice".into(), language: "en".into() });
    }

    #[test]
    fn parses_a_participant_arg_with_explicit_language() {
        let p = parse_participant_arg("1:Alice:fr").unwrap();
        assert_eq!(p.language, "fr");
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let config = load_config(std::path::Path::new("/nonexistent/reflector.toml")).unwrap();
        assert_eq!(config.server.port, 2710);
    }
}
