use alsa::nix::errno::Errno;
use alsa::pcm::{Access, Format, Frames, HwParams, IO, PCM};
use alsa::{Direction, ValueOr};
use anyhow::{Context, Result};
use clap::Parser;
use echo_adapt::{Controls, EchoCanceller, FilterConfig, Variant};
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

const I16_SCALE: f32 = 32768.0;

/// Plays the microphone back after a delay while cancelling the echo of that
/// playback from the microphone.
#[derive(Parser, Debug)]
#[command(name = "live-canceller")]
struct Args {
    /// Disable echo cancellation (use when monitoring via headphones).
    #[arg(long)]
    disable_echo: bool,
    #[arg(long, default_value = "default")]
    device: String,
    #[arg(long, default_value_t = 48_000)]
    sample_rate: u32,
    /// Frames per ALSA period.
    #[arg(long, default_value_t = 1024)]
    chunk: usize,
    #[arg(long, default_value_t = 150)]
    delay_ms: u32,
    #[arg(long, env = "ECHO_VARIANT", default_value = "fast-nlms-ncr")]
    variant: Variant,
    #[arg(long, default_value_t = 100.0)]
    echo_ms: f32,
    #[arg(long)]
    mu: Option<f32>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let args = Args::parse();
    run(&args)
}

fn run(args: &Args) -> Result<()> {
    let capture = open_pcm(&args.device, Direction::Capture, args.sample_rate, args.chunk)
        .context("failed to open capture PCM")?;
    let playback = open_pcm(&args.device, Direction::Playback, args.sample_rate, args.chunk)
        .context("failed to open playback PCM")?;

    let capture_io = capture.io_i16().context("capture IO handle")?;
    let playback_io = playback.io_i16().context("playback IO handle")?;

    let mut input = vec![0i16; args.chunk];
    let mut output = vec![0i16; args.chunk];
    let mut mic = vec![0.0f32; args.chunk];
    let mut cleaned = vec![0.0f32; args.chunk];
    let mut reference = vec![0.0f32; args.chunk];

    let delay_frames = ((args.sample_rate as u64 * args.delay_ms as u64) / 1000).max(1) as usize;
    let mut delay_line = vec![0.0f32; delay_frames];
    let mut delay_pos = 0usize;

    let controls = Controls {
        echo_ms: args.echo_ms,
        mu: args.mu.unwrap_or(args.variant.default_controls().mu),
        ..args.variant.default_controls()
    };
    let mut canceller = if args.disable_echo {
        None
    } else {
        let config = FilterConfig::preset(args.variant, args.sample_rate)
            .with_max_echo_ms(args.echo_ms.max(1.0));
        let mut canceller = EchoCanceller::new(config).context("failed to build echo canceller")?;
        canceller.activate();
        Some(canceller)
    };

    info!(
        sample_rate = args.sample_rate,
        chunk = args.chunk,
        delay_frames,
        echo_cancellation = canceller.is_some(),
        variant = %args.variant,
        "running"
    );

    let mut periods = 0u64;
    loop {
        read_chunk(&capture_io, &capture, &mut input)?;
        for (m, &s) in mic.iter_mut().zip(&input) {
            *m = f32::from(s) / I16_SCALE;
        }

        if let Some(canceller) = canceller.as_mut() {
            let stats = canceller.process_block(&reference, &mic, &mut cleaned, &controls)?;
            periods += 1;
            if periods % 100 == 0 {
                debug!(adapted = stats.adapted, double_talk = stats.double_talk, "period stats");
            }
        } else {
            cleaned.copy_from_slice(&mic);
        }

        process_delay(&cleaned, &mut reference, &mut delay_line, &mut delay_pos);
        for (o, &r) in output.iter_mut().zip(&reference) {
            *o = (r * I16_SCALE).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        }
        write_chunk(&playback_io, &playback, &output)?;
    }
}

fn open_pcm(device: &str, direction: Direction, sample_rate: u32, chunk: usize) -> Result<PCM> {
    let pcm = PCM::new(device, direction, false)
        .with_context(|| format!("open {:?} PCM on {device}", direction))?;

    {
        let hwp = HwParams::any(&pcm)?;
        hwp.set_access(Access::RWInterleaved)?;
        hwp.set_format(Format::s16())?;
        hwp.set_channels(1)?;
        hwp.set_rate(sample_rate, ValueOr::Nearest)?;
        hwp.set_period_size_near(chunk as Frames, ValueOr::Nearest)?;
        hwp.set_buffer_size_near((chunk * 2) as Frames)?;
        pcm.hw_params(&hwp)?;
    }

    pcm.prepare()?;
    Ok(pcm)
}

fn read_chunk(io: &IO<i16>, pcm: &PCM, buffer: &mut [i16]) -> Result<()> {
    let mut offset = 0;
    while offset < buffer.len() {
        match io.readi(&mut buffer[offset..]) {
            Ok(frames) => offset += frames,
            Err(err) if err.errno() == Errno::EPIPE => {
                debug!("capture overrun");
                pcm.prepare()?;
            }
            Err(err) if err.errno() == Errno::EAGAIN => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn write_chunk(io: &IO<i16>, pcm: &PCM, buffer: &[i16]) -> Result<()> {
    let mut offset = 0;
    while offset < buffer.len() {
        match io.writei(&buffer[offset..]) {
            Ok(frames) => offset += frames,
            Err(err) if err.errno() == Errno::EPIPE => {
                debug!("playback underrun");
                pcm.prepare()?;
            }
            Err(err) if err.errno() == Errno::EAGAIN => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Delays `input` by the length of `delay_line`. The delayed block doubles as
/// the next reference for the canceller, since it is what the speaker plays.
fn process_delay(input: &[f32], output: &mut [f32], delay_line: &mut [f32], delay_pos: &mut usize) {
    for (&sample, out) in input.iter().zip(output.iter_mut()) {
        *out = delay_line[*delay_pos];
        delay_line[*delay_pos] = sample;
        *delay_pos += 1;
        if *delay_pos == delay_line.len() {
            *delay_pos = 0;
        }
    }
}
