use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "shadercanvas",
    author,
    version,
    about = "Render a JSON-described GLSL fragment shader in a window",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Shader descriptor: an absolute URL or a local path to a JSON file.
    #[arg(value_name = "DESCRIPTOR")]
    pub descriptor: Option<String>,

    /// Configuration file (defaults to `<config dir>/shadercanvas/config.toml`).
    #[arg(long, value_name = "FILE", env = "SHADERCANVAS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Base URL relative descriptor references resolve against (defaults to the
    /// current directory).
    #[arg(long, value_name = "URL")]
    pub base: Option<String>,

    /// Canvas layout size in logical pixels (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Target size for image-array frames and camera capture.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub dimensions: Option<(u32, u32)>,

    /// Leave `#include "lygia/..."` lines unexpanded.
    #[arg(long)]
    pub no_includes: bool,

    /// Service include paths are fetched from.
    #[arg(long, value_name = "URL")]
    pub include_service: Option<String>,

    /// Freeze the clock at this many seconds and render a still.
    #[arg(long, value_name = "SECONDS")]
    pub time: Option<f32>,

    /// Optional frame-rate cap (0 = uncapped).
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f32>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the image listing of a directory as a JSON array-index.
    Index(IndexArgs),
}

#[derive(Parser, Debug)]
pub struct IndexArgs {
    /// Directory to list.
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Also write the listing to `DIR/index.json`.
    #[arg(long)]
    pub write: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(spec: &str) -> Result<(u32, u32), String> {
    let (width, height) = spec
        .trim()
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WxH format, e.g. 1920x1080".to_string())?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| "invalid width in size specification".to_string())?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| "invalid height in size specification".to_string())?;

    if width == 0 || height == 0 {
        return Err("dimensions must be greater than zero".to_string());
    }
    Ok((width, height))
}
