use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use std::path::{Path, PathBuf};

use rasterkit::{
    AnimationState, Color, Config, ContentMode, DecodeOptions, Image, ImageFormat, Operation,
    OutputFormat, PngCompression, Size,
};

#[derive(Parser)]
#[command(name = "rasterkit-cli")]
#[command(about = "Decode, transform and re-encode PNG, JPEG and animated GIF images", long_about = None)]
#[command(version)]
struct Args {
    /// Input image file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file (defaults to INPUT.rasterkit.<ext>)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// JSON config file to start from instead of the saved user config
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Save the resulting config as the user config
    #[arg(long, default_value_t)]
    save_config: bool,

    /// Print the detected format and frame information, then exit
    #[arg(long, default_value_t)]
    sniff: bool,

    /// Shrink into bounds, e.g. 320x240
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    resize: Option<Size>,

    /// How --resize fits the image into its bounds
    #[arg(long, value_enum, default_value_t = ContentModeArg::Fit)]
    mode: ContentModeArg,

    /// Corner radius in pixels
    #[arg(long, value_name = "RADIUS")]
    round_corner: Option<f64>,

    /// Blur radius in pixels
    #[arg(long, value_name = "RADIUS")]
    blur: Option<f64>,

    /// Brightness shift (-1.0 to 1.0)
    #[arg(long, value_name = "VALUE", allow_hyphen_values = true)]
    brightness: Option<f32>,

    /// Contrast factor (1.0 keeps contrast)
    #[arg(long, value_name = "VALUE")]
    contrast: Option<f32>,

    /// Saturation factor (0.0 is grayscale)
    #[arg(long, value_name = "VALUE")]
    saturation: Option<f32>,

    /// Exposure in EV stops
    #[arg(long, value_name = "EV", allow_hyphen_values = true)]
    exposure: Option<f32>,

    /// Lay a color over the image, as #RRGGBB or #RRGGBBAA
    #[arg(long, value_name = "COLOR")]
    tint: Option<Color>,

    /// Fill the image's shape with a color, as #RRGGBB or #RRGGBBAA
    #[arg(long, value_name = "COLOR")]
    overlay: Option<Color>,

    /// Opacity of the original image over --overlay (0.0 to 1.0)
    #[arg(long, value_name = "FRACTION", default_value_t = 0.5)]
    fraction: f32,

    /// Output format (defaults to the output file extension)
    #[arg(short, long, value_enum)]
    format: Option<FormatArg>,

    /// JPEG quality (0-100)
    #[arg(long, value_name = "QUALITY", default_value_t = 85)]
    quality: u8,

    /// PNG compression level
    #[arg(long, value_enum, default_value_t = PngCompressionArg::Default)]
    png_compression: PngCompressionArg,

    /// GIF loop count, 0 loops forever
    #[arg(long, value_name = "COUNT", default_value_t)]
    loop_count: u16,

    /// Total GIF animation duration in seconds
    #[arg(long, value_name = "SECONDS")]
    duration: Option<f64>,

    /// Decode animation frames on demand instead of up front
    #[arg(long, default_value_t)]
    lazy: bool,

    /// Display scale factor attached to decoded images
    #[arg(long, value_name = "SCALE")]
    scale: Option<f32>,

    /// Verbose output
    #[arg(short, long, default_value_t)]
    verbose: bool,

    /// Quiet mode (no output)
    #[arg(short, long, default_value_t)]
    quiet: bool,
}

fn parse_size(s: &str) -> Result<Size, String> {
    let (width, height) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{s}`"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid dimension `{v}`: {e}"))
    };
    Ok(Size::new(parse(width)?, parse(height)?))
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ContentModeArg {
    Fit,
    Fill,
    Stretch,
}

impl From<ContentModeArg> for ContentMode {
    fn from(arg: ContentModeArg) -> Self {
        match arg {
            ContentModeArg::Fit => ContentMode::Fit,
            ContentModeArg::Fill => ContentMode::Fill,
            ContentModeArg::Stretch => ContentMode::Stretch,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Png,
    Jpeg,
    Gif,
}

impl FormatArg {
    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(FormatArg::Png),
            "jpg" | "jpeg" => Some(FormatArg::Jpeg),
            "gif" => Some(FormatArg::Gif),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum PngCompressionArg {
    Fast,
    Default,
    Best,
}

impl From<PngCompressionArg> for PngCompression {
    fn from(arg: PngCompressionArg) -> Self {
        match arg {
            PngCompressionArg::Fast => PngCompression::Fast,
            PngCompressionArg::Default => PngCompression::Default,
            PngCompressionArg::Best => PngCompression::Best,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose, args.quiet);

    if !args.input.exists() {
        anyhow::bail!("Input file does not exist: {}", args.input.display());
    }

    let data = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    if args.sniff {
        return sniff(data);
    }

    let config = build_config(&args)?;

    if args.save_config {
        config.save().context("Failed to save config")?;
    }

    let image = Image::from_data(data, &config.decode).context("Failed to decode image")?;
    log::info!(
        "Decoded {} {} image, {} frame(s)",
        image.raster().size(),
        image.format(),
        image.frame_count()
    );

    if !config.operations.is_empty() {
        log::info!("Applying {} operation(s)...", config.operations.len());
    }
    let image =
        rasterkit::process(image, &config.operations).context("Failed to process image")?;

    let bytes = image
        .encode(&config.output)
        .context("Failed to encode image")?;

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input, &config.output));
    std::fs::write(&output_path, bytes).context("Failed to write output file")?;

    log::info!("Done: {}", output_path.display());

    Ok(())
}

fn default_output_path(input: &Path, output: &OutputFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    input.with_file_name(format!("{stem}.rasterkit.{}", output.extension()))
}

fn sniff(data: Vec<u8>) -> Result<()> {
    let format = ImageFormat::classify(&data);
    println!("format: {format}");

    // every frame is scanned for timing, but only the first stays decoded
    let options = DecodeOptions {
        preload_all_frames: false,
        ..DecodeOptions::default()
    };
    let image = Image::from_data(data, &options).context("Failed to decode image")?;
    println!("size: {}", image.raster().size());

    if let AnimationState::Lazy(source) = image.animation() {
        println!("frames: {}", source.frame_count());
        println!("loop count: {}", source.loop_count());
        for i in 0..source.frame_count() {
            if let Some(duration) = source.frame_duration(i) {
                println!("  frame {i}: {duration:.3}s");
            }
        }
        println!("duration: {:.3}s", source.duration());
    }

    Ok(())
}

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn build_config(args: &Args) -> Result<Config> {
    // Validate quality
    if args.quality > 100 {
        anyhow::bail!("Quality must be between 0 and 100");
    }

    // Validate overlay fraction
    if !(0.0..=1.0).contains(&args.fraction) {
        anyhow::bail!("Fraction must be between 0.0 and 1.0");
    }

    if let Some(scale) = args.scale {
        if scale <= 0.0 {
            anyhow::bail!("Scale must be positive");
        }
    }

    let mut config = match &args.config {
        Some(path) => Config::from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().unwrap_or_default(),
    };

    if let Some(scale) = args.scale {
        config.decode.scale = scale;
    }
    if args.lazy {
        config.decode.preload_all_frames = false;
    }

    config.operations.extend(operations(args));

    let format = args
        .format
        .or_else(|| args.output.as_deref().and_then(FormatArg::from_path));
    if let Some(format) = format {
        config.output = match format {
            FormatArg::Png => OutputFormat::Png {
                compression: args.png_compression.into(),
            },
            FormatArg::Jpeg => OutputFormat::Jpeg {
                quality: args.quality,
            },
            FormatArg::Gif => OutputFormat::Gif {
                loop_count: args.loop_count,
                duration: args.duration,
            },
        };
    }

    Ok(config)
}

/// Operations requested on the command line, in a fixed order: geometry
/// first, then filters
fn operations(args: &Args) -> Vec<Operation> {
    let mut operations = Vec::new();

    if let Some(bounds) = args.resize {
        operations.push(Operation::Resize {
            width: bounds.width,
            height: bounds.height,
            mode: args.mode.into(),
        });
    }

    if let Some(radius) = args.round_corner {
        operations.push(Operation::RoundCorner { radius });
    }

    if let Some(radius) = args.blur {
        operations.push(Operation::Blur { radius });
    }

    if args.brightness.is_some()
        || args.contrast.is_some()
        || args.saturation.is_some()
        || args.exposure.is_some()
    {
        operations.push(Operation::Adjust {
            brightness: args.brightness.unwrap_or(0.0),
            contrast: args.contrast.unwrap_or(1.0),
            saturation: args.saturation.unwrap_or(1.0),
            exposure: args.exposure.unwrap_or(0.0),
        });
    }

    if let Some(color) = args.tint {
        operations.push(Operation::Tint { color });
    }

    if let Some(color) = args.overlay {
        operations.push(Operation::Overlay {
            color,
            fraction: args.fraction,
        });
    }

    operations
}
