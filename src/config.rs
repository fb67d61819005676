use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

const USAGE: &str =
    "Usage: rhythm-runtime <level.txt> [--fps <n>] [--max-frames <n>] [--diagnostics <n>]";

/// Options for the headless runner.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub level: PathBuf,
    /// Simulated frames per second driving the frame clock.
    pub fps: f64,
    /// Upper bound on simulated frames before giving up.
    pub max_frames: u64,
    /// Number of diagnostic messages kept for the summary.
    pub diagnostics: usize,
}

impl RuntimeConfig {
    pub const DEFAULT_FPS: f64 = 60.0;
    pub const DEFAULT_MAX_FRAMES: u64 = 60 * 60 * 10;
    pub const DEFAULT_DIAGNOSTICS: usize = 64;

    pub fn new(level: impl Into<PathBuf>) -> Self {
        Self {
            level: level.into(),
            fps: Self::DEFAULT_FPS,
            max_frames: Self::DEFAULT_MAX_FRAMES,
            diagnostics: Self::DEFAULT_DIAGNOSTICS,
        }
    }

    /// Parses command-line arguments, excluding the program name.
    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let Some(level) = args.next() else {
            return Err(anyhow!(USAGE));
        };
        if level.starts_with("--") {
            return Err(anyhow!("expected a level file before options\n{USAGE}"));
        }
        let mut config = Self::new(level);
        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| anyhow!("{flag} expects a value\n{USAGE}"))
            };
            match arg.as_str() {
                "--fps" => {
                    let fps: f64 = value("--fps")?.parse().context("invalid --fps")?;
                    if !(fps.is_finite() && fps > 0.0) {
                        return Err(anyhow!("--fps must be positive, got {fps}"));
                    }
                    config.fps = fps;
                }
                "--max-frames" => {
                    config.max_frames = value("--max-frames")?
                        .parse()
                        .context("invalid --max-frames")?;
                }
                "--diagnostics" => {
                    config.diagnostics = value("--diagnostics")?
                        .parse()
                        .context("invalid --diagnostics")?;
                }
                other => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Expected --fps, --max-frames or --diagnostics"
                    ));
                }
            }
        }
        Ok(config)
    }
}
