use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "aoquad",
    author,
    version,
    about = "Renders a compute-shader image to a fullscreen quad for a fixed number of frames"
)]
pub struct Cli {
    /// Run configuration (TOML). Defaults to `aoquad.toml` in the config directory, if present.
    #[arg(long, value_name = "PATH", env = "AOQUAD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Compute kernel to run instead of the configured one.
    #[arg(long, value_name = "PATH")]
    pub kernel: Option<PathBuf>,

    /// Number of frames to render before reporting throughput.
    #[arg(long, value_name = "COUNT")]
    pub frames: Option<u64>,

    /// Size of the image the kernel writes (e.g. `512x512`).
    #[arg(long, value_name = "WIDTHxHEIGHT")]
    pub size: Option<String>,

    /// Present without waiting for vertical blank.
    #[arg(long)]
    pub no_vsync: bool,

    /// Render into an offscreen target instead of opening a window.
    #[arg(long)]
    pub headless: bool,

    /// Also write the run summary as JSON to this file.
    #[arg(long, value_name = "PATH")]
    pub summary_json: Option<PathBuf>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_overrides() {
        let cli = Cli::try_parse_from([
            "aoquad",
            "--kernel",
            "fill.comp",
            "--frames",
            "64",
            "--size",
            "256x128",
            "--no-vsync",
            "--headless",
        ])
        .unwrap();
        assert_eq!(cli.kernel, Some(PathBuf::from("fill.comp")));
        assert_eq!(cli.frames, Some(64));
        assert_eq!(cli.size.as_deref(), Some("256x128"));
        assert!(cli.no_vsync);
        assert!(cli.headless);
        assert!(cli.summary_json.is_none());
    }
}
