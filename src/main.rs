use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use echo_adapt::{
    BlockStats, Controls, DEFAULT_FIR_TAPS, EchoCanceller, FilterConfig, StaticFir, Variant,
    linear_to_db,
};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "adaptive-echo", version, about = "Adaptive FIR echo cancellation for WAV files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Remove the echo of a reference recording from a microphone recording.
    Cancel(CancelArgs),
    /// Run the fixed 16-tap FIR filter over a recording.
    Fir(FirArgs),
    /// List filter variants and their default controls.
    Presets,
}

#[derive(Args, Debug)]
struct CancelArgs {
    /// Far-end signal that leaks into the microphone.
    #[arg(long)]
    reference: PathBuf,
    /// Microphone recording containing the echo.
    #[arg(long)]
    mic: PathBuf,
    /// Where to write the residual.
    #[arg(long, short)]
    output: PathBuf,
    #[arg(long, env = "ECHO_VARIANT", default_value = "fast-nlms-ncr")]
    variant: Variant,
    /// Override the longest echo the filter can model.
    #[arg(long)]
    max_echo_ms: Option<f32>,
    #[arg(long, env = "ECHO_LENGTH_MS")]
    echo_ms: Option<f32>,
    #[arg(long)]
    dtd_ms: Option<f32>,
    #[arg(long, allow_hyphen_values = true)]
    dtd_threshold: Option<f32>,
    #[arg(long, env = "ECHO_MU")]
    mu: Option<f32>,
    #[arg(long, allow_hyphen_values = true)]
    set_threshold: Option<f32>,
    /// Samples handed to the canceller per call.
    #[arg(long, default_value_t = 256)]
    block: usize,
}

impl CancelArgs {
    fn controls(&self) -> Controls {
        let defaults = self.variant.default_controls();
        Controls {
            echo_ms: self.echo_ms.unwrap_or(defaults.echo_ms),
            dtd_ms: self.dtd_ms.unwrap_or(defaults.dtd_ms),
            dtd_threshold: self.dtd_threshold.unwrap_or(defaults.dtd_threshold),
            mu: self.mu.unwrap_or(defaults.mu),
            set_threshold: self.set_threshold.unwrap_or(defaults.set_threshold),
        }
    }
}

#[derive(Args, Debug)]
struct FirArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long, short)]
    output: PathBuf,
    /// Comma-separated taps, newest sample first; missing taps are zero.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
    coefs: Vec<f32>,
    #[arg(long, default_value_t = 256)]
    block: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Cancel(args) => cancel(&args),
        Command::Fir(args) => fir(&args),
        Command::Presets => {
            presets();
            Ok(())
        }
    }
}

fn cancel(args: &CancelArgs) -> Result<()> {
    if args.block == 0 {
        bail!("block size must be positive");
    }

    let (reference, ref_rate) = read_mono(&args.reference)?;
    let (mic, mic_rate) = read_mono(&args.mic)?;
    if ref_rate != mic_rate {
        bail!("sample rates differ: reference {ref_rate} Hz, mic {mic_rate} Hz");
    }
    let len = reference.len().min(mic.len());
    if reference.len() != mic.len() {
        warn!(
            reference = reference.len(),
            mic = mic.len(),
            "recordings differ in length, truncating to {len} samples"
        );
    }

    let mut config = FilterConfig::preset(args.variant, ref_rate);
    if let Some(ms) = args.max_echo_ms {
        config = config.with_max_echo_ms(ms);
    }
    let mut canceller = EchoCanceller::new(config).context("failed to build echo canceller")?;
    canceller.activate();

    let controls = args.controls();
    info!(
        variant = %args.variant,
        sample_rate = ref_rate,
        taps = canceller.active_taps(&controls),
        ?controls,
        "cancelling echo"
    );

    let mut residual = vec![0.0f32; len];
    let mut totals = BlockStats::default();
    for ((x, d), e) in reference[..len]
        .chunks(args.block)
        .zip(mic[..len].chunks(args.block))
        .zip(residual.chunks_mut(args.block))
    {
        let stats = canceller.process_block(x, d, e, &controls)?;
        totals.samples += stats.samples;
        totals.adapted += stats.adapted;
        totals.double_talk += stats.double_talk;
    }
    canceller.release();

    info!(
        samples = totals.samples,
        adapted = totals.adapted,
        double_talk = totals.double_talk,
        erle_db = erle_db(&mic[..len], &residual),
        "done"
    );

    write_mono(&args.output, &residual, ref_rate)
}

fn fir(args: &FirArgs) -> Result<()> {
    if args.block == 0 {
        bail!("block size must be positive");
    }
    if args.coefs.len() > DEFAULT_FIR_TAPS {
        bail!("at most {DEFAULT_FIR_TAPS} coefficients, got {}", args.coefs.len());
    }
    let mut coefs = args.coefs.clone();
    coefs.resize(DEFAULT_FIR_TAPS, 0.0);

    let (input, rate) = read_mono(&args.input)?;
    let mut filter = StaticFir::new(DEFAULT_FIR_TAPS)?;
    let mut output = vec![0.0f32; input.len()];
    for (x, y) in input.chunks(args.block).zip(output.chunks_mut(args.block)) {
        filter.process_block(&coefs, x, y)?;
    }

    info!(samples = input.len(), taps = filter.taps(), "filtered");
    write_mono(&args.output, &output, rate)
}

fn presets() {
    for variant in Variant::ALL {
        let config = FilterConfig::preset(variant, 48_000);
        let c = variant.default_controls();
        println!(
            "{:<14} rule={:?} detector={:?} max_echo={}ms mu=[{}, {}] defaults: echo={}ms dtd={}ms dtd_threshold={} mu={} set_threshold={}",
            variant.name(),
            config.rule,
            config.detector,
            config.max_echo_ms,
            config.limits.mu.min,
            config.limits.mu.max,
            c.echo_ms,
            c.dtd_ms,
            c.dtd_threshold,
            c.mu,
            c.set_threshold,
        );
    }
}

/// Echo return loss enhancement of the residual relative to the mic signal.
fn erle_db(mic: &[f32], residual: &[f32]) -> f32 {
    let power = |s: &[f32]| s.iter().map(|v| v * v).sum::<f32>();
    let (pm, pr) = (power(mic), power(residual));
    if pr <= 0.0 {
        return f32::INFINITY;
    }
    linear_to_db((pm / pr).sqrt())
}

fn read_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader =
        WavReader::open(path).with_context(|| format!("open {}", path.display()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));
    if channels > 1 {
        warn!(path = %path.display(), channels, "using the first channel only");
    }

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .with_context(|| format!("read {}", path.display()))?,
        SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .with_context(|| format!("read {}", path.display()))?
        }
    };

    let mono = samples.into_iter().step_by(channels).collect();
    Ok((mono, spec.sample_rate))
}

fn write_mono(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer =
        WavWriter::create(path, spec).with_context(|| format!("create {}", path.display()))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    info!(path = %path.display(), "wrote output");
    Ok(())
}
