use std::env;

use anyhow::{anyhow, Context, Result};
use canvas::{
    DescriptorLocation, DescriptorPipeline, Fetcher, LygiaIncludes, PreparedShader,
    ResolverContext, UniformLayer,
};
use renderer::{CanvasProgram, NoControl, Renderer};
use tracing_subscriber::EnvFilter;

use crate::cli::RunArgs;
use crate::config::{FileConfig, Settings};
use crate::paths::AppPaths;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(args: RunArgs) -> Result<()> {
    let descriptor = args
        .descriptor
        .clone()
        .ok_or_else(|| anyhow!("a shader descriptor (URL or path) is required"))?;

    let file_config = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::load_optional(&AppPaths::discover()?.config_file())?,
    };
    let settings = Settings::resolve(file_config, &args)?;

    let root = match &args.base {
        Some(base) => ResolverContext::parse(base)?,
        None => {
            let cwd = env::current_dir().context("failed to read the current directory")?;
            ResolverContext::from_directory(&cwd)?
        }
    };
    let reference = DescriptorLocation::from_input(&descriptor).reference(&root)?;
    tracing::info!(
        descriptor = %reference,
        base = %root.base(),
        width = settings.renderer.surface_size.0,
        height = settings.renderer.surface_size.1,
        policy = ?settings.renderer.policy,
        "bootstrapping shader canvas"
    );

    let Settings {
        renderer: renderer_config,
        dimensions,
        capture_constraints,
        include_service,
        control,
    } = settings;

    let fetcher = Fetcher::with_defaults().context("failed to build HTTP client")?;
    let mut pipeline = DescriptorPipeline::new(fetcher.clone(), dimensions)
        .with_capture_constraints(capture_constraints);
    match include_service {
        Some(service) => {
            tracing::debug!(service = %service, "include expansion enabled");
            pipeline = pipeline.with_includes(LygiaIncludes::new(fetcher, service));
        }
        None => tracing::debug!("include expansion disabled"),
    }

    let prepared = prepare(&pipeline, &root, &reference, control)?;
    if !prepared.degraded.is_empty() {
        tracing::warn!(features = ?prepared.degraded, "rendering with degraded inputs");
    }

    let program = CanvasProgram {
        fragment_source: prepared.fragment_source,
        uniforms: prepared.uniforms,
    };
    Renderer::new(renderer_config).run(program, NoControl)
}

/// Runs the descriptor pipeline to completion on a single-threaded runtime.
fn prepare(
    pipeline: &DescriptorPipeline,
    root: &ResolverContext,
    reference: &str,
    control: UniformLayer,
) -> Result<PreparedShader> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let prepared = runtime.block_on(pipeline.run(root, reference, control))?;
    Ok(prepared)
}
