mod background;
mod capture;
mod compositing;
mod error;
mod output;
mod segmentation;

use anyhow::{Context, Result};
use background::{BackgroundBuilder, BackgroundModel, DEFAULT_BACKGROUND_PATH};
use capture::{CaptureSource, ReplayCapture, WebcamCapture};
use clap::{Args, Parser, Subcommand};
use compositing::{Compositor, MaskRefiner};
use output::{OutputSink, ScreenshotSink, V4L2Output};
use segmentation::{
    ColorRange, ColorRangeSet, HsvThreshold, Preprocessor, SegmentationModel,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture the empty scene and save it as the background
    Background(BackgroundArgs),
    /// Run the live invisibility effect
    Run(RunArgs),
    /// Stream the raw mask of one color range to tune its bounds
    Calibrate(CalibrateArgs),
    /// Apply the effect to a single image file
    Still(StillArgs),
}

#[derive(Args, Debug)]
struct BackgroundArgs {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Where to write the background image
    #[arg(short, long, default_value = DEFAULT_BACKGROUND_PATH)]
    output: PathBuf,

    /// Number of frames to average
    #[arg(long, default_value_t = 30)]
    samples: usize,

    /// Delay between samples in milliseconds
    #[arg(long, default_value_t = 100)]
    interval_ms: u64,

    /// Camera settling time before sampling, in milliseconds
    #[arg(long, default_value_t = 2000)]
    warmup_ms: u64,

    /// Seconds to count down before sampling starts
    #[arg(long, default_value_t = 3)]
    countdown: u64,

    /// Fewest successful samples accepted
    #[arg(long, default_value_t = 1)]
    min_samples: usize,

    /// Keep frames in camera orientation instead of mirroring them
    #[arg(long)]
    no_mirror: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Replay these image files instead of reading a webcam
    #[arg(long = "input-file", value_name = "PATH")]
    input_files: Vec<PathBuf>,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Write every output frame to this directory instead of a v4l2 device
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Output resolution width
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Background image captured with `background`
    #[arg(short, long, default_value = DEFAULT_BACKGROUND_PATH)]
    background: PathBuf,

    /// Marker color range, repeatable; defaults to the two red ranges
    #[arg(long = "range", value_name = "H,S,V-H,S,V")]
    ranges: Vec<ColorRange>,

    /// Target frames per second (0 disables pacing)
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Save a screenshot every N frames
    #[arg(long)]
    screenshot_every: Option<u64>,

    /// Directory for screenshots
    #[arg(long, default_value = ".")]
    screenshot_dir: PathBuf,

    /// Show the blend matte (grayscale) instead of the composite
    #[arg(long)]
    show_matte: bool,

    /// Keep frames in camera orientation instead of mirroring them
    #[arg(long)]
    no_mirror: bool,
}

#[derive(Args, Debug)]
struct CalibrateArgs {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Output resolution width
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Color range to preview
    #[arg(long, default_value = "0,50,50-10,255,255", value_name = "H,S,V-H,S,V")]
    range: ColorRange,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Keep frames in camera orientation instead of mirroring them
    #[arg(long)]
    no_mirror: bool,
}

#[derive(Args, Debug)]
struct StillArgs {
    /// Image containing the marker
    #[arg(short, long)]
    input: PathBuf,

    /// Background image
    #[arg(short, long, default_value = DEFAULT_BACKGROUND_PATH)]
    background: PathBuf,

    /// Where to write the composite
    #[arg(short, long, default_value = "invisible.png")]
    output: PathBuf,

    /// Marker color range, repeatable; defaults to the two red ranges
    #[arg(long = "range", value_name = "H,S,V-H,S,V")]
    ranges: Vec<ColorRange>,

    /// Mirror the input before processing
    #[arg(long)]
    mirror: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match cli.command {
        Command::Background(args) => capture_background(args),
        Command::Run(args) => run(args),
        Command::Calibrate(args) => calibrate(args),
        Command::Still(args) => still(args),
    }
}

fn range_set(ranges: Vec<ColorRange>) -> ColorRangeSet {
    if ranges.is_empty() {
        ColorRangeSet::red()
    } else {
        ColorRangeSet::new(ranges)
    }
}

fn capture_background(args: BackgroundArgs) -> Result<()> {
    tracing::info!("Capturing background ({} samples)", args.samples);

    let mut capture = WebcamCapture::open_first(args.input_device)
        .context("Failed to initialize webcam capture")?;

    tracing::info!("Make sure the marker is out of the frame");
    for remaining in (1..=args.countdown).rev() {
        tracing::info!("{}...", remaining);
        std::thread::sleep(Duration::from_secs(1));
    }

    let builder = BackgroundBuilder::new(
        args.samples,
        Duration::from_millis(args.interval_ms),
        Duration::from_millis(args.warmup_ms),
        !args.no_mirror,
    )
    .with_min_samples(args.min_samples);

    let background = builder
        .build(&mut capture)
        .context("Background capture failed")?;
    background
        .save(&args.output)
        .with_context(|| format!("Failed to save background to {}", args.output.display()))?;

    tracing::info!("Background ready; start the effect with `run`");
    Ok(())
}

fn run(args: RunArgs) -> Result<()> {
    // A missing background aborts before any device is opened
    let background = BackgroundModel::load(&args.background)
        .context("Capture a background with `background` first")?;

    let ranges = range_set(args.ranges);
    for range in ranges.ranges() {
        tracing::info!("Marker range {}", range);
    }

    let compositor = Compositor::new(
        background,
        Preprocessor::new(!args.no_mirror),
        Box::new(HsvThreshold::new(ranges)),
        MaskRefiner::default(),
    );

    let mut capture: Box<dyn CaptureSource> = if args.input_files.is_empty() {
        Box::new(
            WebcamCapture::open_first(args.input_device)
                .context("Failed to initialize webcam capture")?,
        )
    } else {
        Box::new(ReplayCapture::from_files(args.input_files.as_slice())?)
    };

    let mut output: Box<dyn OutputSink> = match &args.output_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            Box::new(ScreenshotSink::new(dir))
        }
        None => Box::new(
            V4L2Output::new(&args.output_device, args.width, args.height)
                .context("Failed to initialize v4l2loopback output")?,
        ),
    };

    let (capture_width, capture_height) = capture.resolution();
    let (output_width, output_height) = output.resolution();
    tracing::info!("Capture: {}x{}", capture_width, capture_height);
    tracing::info!("Output: {}x{}", output_width, output_height);

    let mut screenshots = ScreenshotSink::new(&args.screenshot_dir);
    let options = LoopOptions {
        fps: args.fps,
        max_frames: args.max_frames,
        screenshot_every: args.screenshot_every,
        show_matte: args.show_matte,
    };

    let stats = run_pipeline(
        capture.as_mut(),
        output.as_mut(),
        &compositor,
        &mut screenshots,
        &options,
    )?;

    tracing::info!(
        "Session finished after {} frames ({} screenshots)",
        stats.frames,
        stats.screenshots
    );
    Ok(())
}

fn calibrate(args: CalibrateArgs) -> Result<()> {
    let mut capture = WebcamCapture::open_first(args.input_device)
        .context("Failed to initialize webcam capture")?;
    let mut output = V4L2Output::new(&args.output_device, args.width, args.height)
        .context("Failed to initialize v4l2loopback output")?;

    tracing::info!("Previewing mask for range {}", args.range);
    let frames = run_calibration(
        &mut capture,
        &mut output,
        args.range,
        &Preprocessor::new(!args.no_mirror),
        args.max_frames,
    )?;

    let [lh, ls, lv] = args.range.lower;
    let [uh, us, uv] = args.range.upper;
    tracing::info!("Calibrated over {} frames", frames);
    tracing::info!("Lower: [{}, {}, {}]", lh, ls, lv);
    tracing::info!("Upper: [{}, {}, {}]", uh, us, uv);
    Ok(())
}

fn still(args: StillArgs) -> Result<()> {
    let background = BackgroundModel::load(&args.background)?;
    let frame = image::open(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?
        .to_rgb8();

    let compositor = Compositor::new(
        background,
        Preprocessor::new(args.mirror),
        Box::new(HsvThreshold::new(range_set(args.ranges))),
        MaskRefiner::default(),
    );
    let composite = compositor.process(frame)?;

    composite
        .output
        .save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    tracing::info!("Wrote {}", args.output.display());
    Ok(())
}

struct LoopOptions {
    fps: u32,
    max_frames: Option<u64>,
    screenshot_every: Option<u64>,
    show_matte: bool,
}

#[derive(Debug, Default, PartialEq)]
struct SessionStats {
    frames: u64,
    screenshots: u32,
}

/// Acquire, composite and emit frames until the source fails or the frame
/// limit is reached
///
/// Each frame runs to completion before the next is read; a read failure
/// ends the session without retry.
fn run_pipeline<C, O>(
    capture: &mut C,
    output: &mut O,
    compositor: &Compositor,
    screenshots: &mut ScreenshotSink,
    options: &LoopOptions,
) -> Result<SessionStats>
where
    C: CaptureSource + ?Sized,
    O: OutputSink + ?Sized,
{
    let frame_duration = (options.fps > 0).then(|| Duration::from_secs_f32(1.0 / options.fps as f32));
    let mut stats = SessionStats::default();
    let mut total_capture_time = Duration::ZERO;
    let mut total_process_time = Duration::ZERO;
    let mut total_output_time = Duration::ZERO;

    let (bg_width, bg_height) = compositor.background().dimensions();
    tracing::info!("Starting main pipeline loop (background {}x{})", bg_width, bg_height);

    loop {
        let loop_start = Instant::now();

        // Capture frame
        let capture_start = Instant::now();
        let frame = match capture.capture_frame() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::error!("Could not read frame, stopping: {:#}", err);
                break;
            }
        };
        total_capture_time += capture_start.elapsed();

        // Composite
        let process_start = Instant::now();
        let composite = compositor
            .process(frame)
            .context("Failed to composite frame")?;
        total_process_time += process_start.elapsed();

        let shown = if options.show_matte {
            composite.alpha.matte_to_rgb()
        } else {
            composite.output
        };

        // Output frame
        let output_start = Instant::now();
        output
            .write_frame(&shown)
            .context("Failed to write frame")?;
        total_output_time += output_start.elapsed();

        stats.frames += 1;

        if let Some(every) = options.screenshot_every.filter(|&n| n > 0) {
            if stats.frames % every == 0 {
                screenshots.save(&shown)?;
                stats.screenshots = screenshots.count();
            }
        }

        // Log stats every 30 frames
        if stats.frames % 30 == 0 {
            let frames = stats.frames as f64;
            let avg_capture_ms = total_capture_time.as_secs_f64() * 1000.0 / frames;
            let avg_process_ms = total_process_time.as_secs_f64() * 1000.0 / frames;
            let avg_output_ms = total_output_time.as_secs_f64() * 1000.0 / frames;
            let total_ms = avg_capture_ms + avg_process_ms + avg_output_ms;

            tracing::info!(
                "Frame {}: capture={:.1}ms, process={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1}",
                stats.frames,
                avg_capture_ms,
                avg_process_ms,
                avg_output_ms,
                total_ms,
                1000.0 / total_ms
            );
        }

        if options.max_frames.is_some_and(|max| stats.frames >= max) {
            tracing::info!("Reached frame limit");
            break;
        }

        // Frame rate limiting
        if let Some(frame_duration) = frame_duration {
            let elapsed = loop_start.elapsed();
            if elapsed < frame_duration {
                std::thread::sleep(frame_duration - elapsed);
            }
        }
    }

    Ok(stats)
}

/// Stream the raw mask of a single range until the source fails or the
/// frame limit is reached; returns the number of frames shown
fn run_calibration<C, O>(
    capture: &mut C,
    output: &mut O,
    range: ColorRange,
    preprocessor: &Preprocessor,
    max_frames: Option<u64>,
) -> Result<u64>
where
    C: CaptureSource + ?Sized,
    O: OutputSink + ?Sized,
{
    let segmenter = HsvThreshold::new(ColorRangeSet::new(vec![range]));
    let mut frames = 0u64;

    loop {
        let frame = match capture.capture_frame() {
            Ok(frame) => preprocessor.normalize(frame),
            Err(err) => {
                tracing::error!("Could not read frame, stopping: {:#}", err);
                break;
            }
        };

        let mask = segmenter.segment(&Preprocessor::to_hsv(&frame));
        output.write_frame(&Preprocessor::mask_to_rgb(&mask))?;
        frames += 1;

        if max_frames.is_some_and(|max| frames >= max) {
            break;
        }
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[derive(Default)]
    struct CollectingSink {
        frames: Vec<RgbImage>,
    }

    impl OutputSink for CollectingSink {
        fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
            self.frames.push(frame.clone());
            Ok(())
        }

        fn resolution(&self) -> (u32, u32) {
            self.frames.last().map_or((0, 0), RgbImage::dimensions)
        }
    }

    fn compositor() -> Compositor {
        Compositor::new(
            BackgroundModel::new(RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]))),
            Preprocessor::new(false),
            Box::new(HsvThreshold::new(ColorRangeSet::red())),
            MaskRefiner::default(),
        )
    }

    fn options() -> LoopOptions {
        LoopOptions {
            fps: 0,
            max_frames: None,
            screenshot_every: None,
            show_matte: false,
        }
    }

    fn red_frames(count: usize) -> ReplayCapture {
        let frame = RgbImage::from_pixel(8, 8, Rgb([230, 10, 10]));
        ReplayCapture::new((0..count).map(|_| Ok(frame.clone())))
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cloak-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn session_ends_on_first_read_failure() {
        let frame = RgbImage::from_pixel(8, 8, Rgb([230, 10, 10]));
        let mut capture = ReplayCapture::new(vec![
            Ok(frame.clone()),
            Err(anyhow::anyhow!("unplugged")),
            Ok(frame),
        ]);
        let mut sink = CollectingSink::default();
        let mut screenshots = ScreenshotSink::new(scratch_dir("unused"));

        let stats = run_pipeline(&mut capture, &mut sink, &compositor(), &mut screenshots, &options())
            .unwrap();

        assert_eq!(stats.frames, 1);
        assert_eq!(capture.remaining(), 1);
        assert_eq!(sink.frames.len(), 1);
        assert!(sink.frames[0].pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn frame_limit_is_checked_after_each_frame() {
        let mut capture = red_frames(10);
        let mut sink = CollectingSink::default();
        let mut screenshots = ScreenshotSink::new(scratch_dir("limit"));
        let options = LoopOptions {
            max_frames: Some(4),
            ..options()
        };

        let stats = run_pipeline(&mut capture, &mut sink, &compositor(), &mut screenshots, &options)
            .unwrap();

        assert_eq!(stats.frames, 4);
        assert_eq!(capture.remaining(), 6);
    }

    #[test]
    fn matte_preview_replaces_composite() {
        let mut capture = red_frames(1);
        let mut sink = CollectingSink::default();
        let mut screenshots = ScreenshotSink::new(scratch_dir("matte"));
        let options = LoopOptions {
            show_matte: true,
            ..options()
        };

        run_pipeline(&mut capture, &mut sink, &compositor(), &mut screenshots, &options).unwrap();
        assert!(sink.frames[0].pixels().all(|p| p.0 == [255, 255, 255]));
    }

    #[test]
    fn screenshots_follow_trigger() {
        let dir = scratch_dir("shots");
        let mut capture = red_frames(5);
        let mut sink = CollectingSink::default();
        let mut screenshots = ScreenshotSink::new(&dir);
        let options = LoopOptions {
            screenshot_every: Some(2),
            ..options()
        };

        let stats = run_pipeline(&mut capture, &mut sink, &compositor(), &mut screenshots, &options)
            .unwrap();

        assert_eq!(stats, SessionStats { frames: 5, screenshots: 2 });
        assert!(dir.join("invisibility_screenshot_2.png").exists());
        assert!(!dir.join("invisibility_screenshot_3.png").exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn calibration_streams_raw_mask() {
        let frame = RgbImage::from_fn(4, 1, |x, _| {
            if x < 2 {
                Rgb([230, 10, 10])
            } else {
                Rgb([10, 10, 230])
            }
        });
        let mut capture = ReplayCapture::new(vec![Ok(frame)]);
        let mut sink = CollectingSink::default();

        let frames = run_calibration(
            &mut capture,
            &mut sink,
            ColorRange::RED_LOW,
            &Preprocessor::new(false),
            None,
        )
        .unwrap();

        assert_eq!(frames, 1);
        let row: Vec<u8> = sink.frames[0].pixels().map(|p| p[0]).collect();
        assert_eq!(row, vec![255, 255, 0, 0]);
    }

    #[test]
    fn empty_range_list_falls_back_to_red() {
        assert_eq!(range_set(Vec::new()), ColorRangeSet::red());
        let custom = vec![ColorRange::new([50, 0, 0], [70, 255, 255])];
        assert_eq!(range_set(custom.clone()).ranges(), custom.as_slice());
    }

    #[test]
    fn cli_parses_repeated_ranges() {
        let cli = Cli::try_parse_from([
            "cloak",
            "run",
            "--range",
            "100,50,50-130,255,255",
            "--range",
            "0,0,200-180,30,255",
            "--max-frames",
            "10",
        ])
        .unwrap();

        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.ranges.len(), 2);
                assert_eq!(args.max_frames, Some(10));
                assert_eq!(args.background, PathBuf::from(DEFAULT_BACKGROUND_PATH));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cli_rejects_bad_range() {
        assert!(Cli::try_parse_from(["cloak", "still", "-i", "a.png", "--range", "red"]).is_err());
    }
}
