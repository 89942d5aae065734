use std::ffi::OsString;
use std::path::PathBuf;
use std::process;

use clap::error::ErrorKind;
use clap::Parser;

use svg_rasterize::{convert_with, ConvertOptions, Runtime, RuntimeOptions, HEIGHT, WIDTH};

/// Render an SVG file to a PNG file.
#[derive(Parser)]
#[command(name = "svg2png", version, about)]
struct Cli {
    /// SVG file to read
    input: PathBuf,

    /// PNG file to write (created or truncated)
    output: PathBuf,

    /// Surface width in pixels
    #[arg(long, default_value_t = WIDTH, value_parser = clap::value_parser!(u32).range(1..))]
    width: u32,

    /// Surface height in pixels
    #[arg(long, default_value_t = HEIGHT, value_parser = clap::value_parser!(u32).range(1..))]
    height: u32,

    /// Additional directories to search for font files
    #[arg(long = "font-dir", value_name = "DIR")]
    font_dirs: Vec<PathBuf>,

    /// Do not load fonts installed on the system
    #[arg(long)]
    no_system_fonts: bool,

    #[arg(hide = true)]
    rest: Vec<OsString>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    process::exit(run());
}

fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
        }
    };
    if !cli.rest.is_empty() {
        log::warn!("ignoring {} extra argument(s)", cli.rest.len());
    }

    let runtime_options = RuntimeOptions {
        system_fonts: !cli.no_system_fonts,
        font_dirs: cli.font_dirs,
    };
    let runtime = match Runtime::initialize(&runtime_options) {
        Ok(runtime) => runtime,
        Err(e) => return fail(&e),
    };

    let options = ConvertOptions {
        width: cli.width,
        height: cli.height,
    };
    match convert_with(&runtime, &cli.input, &cli.output, &options) {
        Ok(()) => 0,
        Err(e) => fail(&e),
    }
}

fn fail(err: &svg_rasterize::GraphicsError) -> i32 {
    println!("{}", err);
    log::error!("conversion failed: {}", err);
    1
}
