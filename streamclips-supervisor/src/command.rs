//! Command line of the clip-capture program

use std::path::PathBuf;
use std::process::Stdio;
use streamclips_config::SupervisorConfig;
use streamclips_storage::entities::{ProcessConfig, Streamer};
use tokio::process::Command;

/// Fully resolved invocation of the clip program for one streamer
#[derive(Debug, Clone, PartialEq)]
pub struct ClipCommand {
    program: String,
    args: Vec<String>,
    output_dir: PathBuf,
}

impl ClipCommand {
    /// `<program> [program_args..] <url> --output-dir <root>/<name> --clip-duration ..`
    pub fn new(config: &SupervisorConfig, streamer: &Streamer, params: &ProcessConfig) -> Self {
        let output_dir = config.output_root.join(&streamer.name);

        let mut args = config.program_args.clone();
        args.push(streamer.url.clone());
        args.extend([
            "--output-dir".to_string(),
            output_dir.display().to_string(),
            "--clip-duration".to_string(),
            format_float(params.clip_duration),
            "--window-timespan".to_string(),
            format_float(params.window_timespan),
            "--sample-interval".to_string(),
            params.sample_interval.to_string(),
            "--baseline-duration".to_string(),
            params.baseline_duration.to_string(),
            "--surge-threshold".to_string(),
            format_float(params.surge_threshold),
        ]);

        if let Some(storage) = &config.storage {
            args.push("--storage-server".to_string());
            args.push(storage.server());
            if let Some(password) = &storage.password {
                args.push("--storage-password".to_string());
                args.push(password.clone());
            }
            if let Some(path) = &storage.path {
                args.push("--storage-path".to_string());
                args.push(path.clone());
            }
        }

        Self {
            program: config.program.clone(),
            args,
            output_dir,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn output_dir(&self) -> &PathBuf {
        &self.output_dir
    }

    /// Command line with the storage password masked, for logs
    pub fn display_redacted(&self) -> String {
        let mut parts = vec![self.program.clone()];
        let mut mask_next = false;
        for arg in &self.args {
            if mask_next {
                parts.push("***".to_string());
                mask_next = false;
            } else {
                mask_next = arg == "--storage-password";
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }

    /// A command detached into its own process group with piped output.
    ///
    /// The child outlives a dropped handle; termination always goes through
    /// an explicit signal.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

/// Floats always carry a decimal point (`30.0`, `1.5`)
fn format_float(value: f64) -> String {
    format!("{:?}", value)
}
