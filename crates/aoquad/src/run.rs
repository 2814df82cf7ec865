use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use renderer::{
    DisplaySurface, DriverConfig, FrameDriver, GpuContext, MismatchPolicy, OffscreenSurface,
    PipelineSources, RunSummary, ShaderPaths, WindowOptions, WindowSurface,
};
use runconfig::RunConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::paths::AppPaths;

pub fn run(args: Cli) -> Result<()> {
    initialise_tracing();

    let config = resolve_config(&args)?;
    let driver_config = driver_config(&config);
    let sources = PipelineSources::load(&driver_config.shaders, driver_config.max_source_bytes)
        .context("failed to load shader sources")?;

    let (gpu, mut surface): (GpuContext, Box<dyn DisplaySurface>) = if args.headless {
        let gpu = GpuContext::headless().context("failed to initialise GPU")?;
        let surface = OffscreenSurface::new(&gpu, config.window.width, config.window.height)
            .context("failed to create offscreen target")?;
        (gpu, Box::new(surface))
    } else {
        let options = WindowOptions {
            title: config.window.title.clone(),
            size: (config.window.width, config.window.height),
            vsync: config.vsync,
        };
        let (surface, gpu) = WindowSurface::open(&options).context("failed to open window")?;
        (gpu, Box::new(surface))
    };
    gpu.adapter_profile().log();

    let mut driver = FrameDriver::new(
        gpu,
        driver_config,
        sources,
        surface.format(),
        surface.size(),
    )?;
    let summary = driver.run(surface.as_mut())?;
    report(&summary);

    if let Some(path) = args.summary_json.as_deref() {
        write_summary(path, &summary)?;
    }
    Ok(())
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Loads the config file (explicit or discovered) and applies CLI overrides.
fn resolve_config(args: &Cli) -> Result<RunConfig> {
    let config_path = match &args.config {
        Some(path) => Some(path.clone()),
        None => AppPaths::discover()?.default_config_file(),
    };
    let mut config = match config_path {
        Some(path) => {
            info!(path = %path.display(), "loading run configuration");
            RunConfig::load(&path)
                .with_context(|| format!("failed to load configuration {}", path.display()))?
        }
        None => RunConfig::default(),
    };

    if let Some(kernel) = &args.kernel {
        config.shaders.kernel = kernel.clone();
    }
    if let Some(frames) = args.frames {
        config.frame_budget = frames;
    }
    if let Some(size) = &args.size {
        let (width, height) = runconfig::parse_size(size).context("invalid --size")?;
        config.image.width = width;
        config.image.height = height;
    }
    if args.no_vsync {
        config.vsync = false;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn driver_config(config: &RunConfig) -> DriverConfig {
    DriverConfig {
        image_size: (config.image.width, config.image.height),
        frame_budget: config.frame_budget,
        time_step: config.time_step,
        max_source_bytes: config.shaders.max_source_bytes,
        shaders: ShaderPaths {
            kernel: config.shaders.kernel.clone(),
            vertex: config.shaders.vertex.clone(),
            fragment: config.shaders.fragment.clone(),
        },
        mismatch_policy: match config.mismatch_policy {
            runconfig::MismatchPolicy::Fail => MismatchPolicy::Fail,
            runconfig::MismatchPolicy::SkipInRelease => MismatchPolicy::SkipInRelease,
        },
    }
}

fn report(summary: &RunSummary) {
    println!("Rendered {} frames.", summary.frames);
    println!(
        "Time to render {} frames: {:.6} sec(s)",
        summary.frames,
        summary.elapsed.as_secs_f64()
    );
    if let Some(average) = summary.average_frame_time() {
        println!(
            "Average frame time: {:.3} ms ({:.1} fps)",
            average.as_secs_f64() * 1000.0,
            summary.frames_per_second().unwrap_or_default()
        );
    }
    if summary.reloads > 0 || summary.failed_reloads > 0 {
        println!(
            "Kernel reloads: {} ({} failed)",
            summary.reloads, summary.failed_reloads
        );
    }
    info!(reason = %summary.termination, "run finished");
}

fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("failed to serialise run summary")?;
    fs::write(path, json)
        .with_context(|| format!("failed to write run summary to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use renderer::TerminationReason;

    use super::*;

    fn args(extra: &[&str]) -> Cli {
        use clap::Parser;
        let mut argv = vec!["aoquad"];
        argv.extend_from_slice(extra);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn cli_overrides_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(&path, "frame_budget = 16\n[shaders]\nkernel = \"ao.comp\"\n").unwrap();
        let path_arg = path.to_string_lossy().into_owned();

        let config = resolve_config(&args(&[
            "--config",
            &path_arg,
            "--frames",
            "32",
            "--size",
            "64x32",
            "--no-vsync",
        ]))
        .unwrap();
        assert_eq!(config.frame_budget, 32);
        assert_eq!((config.image.width, config.image.height), (64, 32));
        assert!(!config.vsync);
        assert_eq!(config.shaders.kernel, dir.path().join("ao.comp"));
    }

    #[test]
    fn driver_config_carries_every_setting() {
        let mut config = RunConfig::default();
        config.mismatch_policy = runconfig::MismatchPolicy::SkipInRelease;
        config.shaders.fragment = Some("blit.frag".into());
        let driver = driver_config(&config);
        assert_eq!(driver.image_size, (512, 512));
        assert_eq!(driver.frame_budget, 1024);
        assert_eq!(driver.max_source_bytes, 16384);
        assert_eq!(driver.mismatch_policy, MismatchPolicy::SkipInRelease);
        assert_eq!(driver.shaders.fragment, Some("blit.frag".into()));
    }

    #[test]
    fn summary_json_has_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let summary = RunSummary {
            frames: 1024,
            frame_budget: 1024,
            elapsed: Duration::from_millis(1500),
            reloads: 1,
            failed_reloads: 0,
            termination: TerminationReason::BudgetReached,
        };
        write_summary(&path, &summary).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["frames"], 1024);
        assert_eq!(value["elapsed_seconds"], 1.5);
        assert_eq!(value["termination"], "budget-reached");
    }
}
