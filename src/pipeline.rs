use anyhow::{Context, Result};
use log::{debug, info};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::str::FromStr;

use crate::args::SynthesisArgs;
use crate::audio::{self, WavWriter};
use crate::config::PsolaConfig;
use crate::flags::ScaleFlags;
use crate::pitch::{PitchContour, PitchMarks};
use crate::psola::{FdPsolaProcessor, PsolaParams, ScaleGrid, ScaleRequest, SynthesisStats};

fn is_mark_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pm") || e.eq_ignore_ascii_case("marks"))
        .unwrap_or(false)
}

pub fn load_pitch_marks<P: AsRef<Path>>(
    path: P,
    signal: &[f64],
    sample_rate: u32,
    params: &PsolaParams,
) -> Result<PitchMarks> {
    let path = path.as_ref();
    if is_mark_file(path) {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pitch marks from {}", path.display()))?;
        let marks = PitchMarks::parse_text(&text)?;
        info!("Loaded {} pitch marks from {}", marks.len(), path.display());
        return Ok(PitchMarks::with_detected_voicing(marks, signal, sample_rate, params.periods)?);
    }

    let contour = PitchContour::load(path)
        .with_context(|| format!("Failed to load pitch contour from {}", path.display()))?;
    let marks = PitchMarks::from_contour(&contour, sample_rate, signal.len(), params.unvoiced_f0)?;
    Ok(marks)
}

pub fn resolve_params(args: &SynthesisArgs, config: &PsolaConfig) -> PsolaParams {
    let mut params = config.params();
    if let Some(order) = args.lp_order {
        params.lp_order = Some(order);
    }
    if let Some(preemphasis) = args.preemphasis {
        params.preemphasis = preemphasis;
    }
    if let Some(periods) = args.periods {
        params.periods = periods;
    }
    params
}

/// Scale vectors from the explicit options, falling back to the flag string.
pub fn scale_request(args: &SynthesisArgs, grid: ScaleGrid) -> Result<ScaleRequest> {
    let flags = match &args.flags {
        Some(s) => ScaleFlags::from_str(s).with_context(|| format!("Invalid flags: {}", s))?,
        None => ScaleFlags::default(),
    };
    debug!("Flags applied: {:?}", flags);

    let pick = |explicit: &Option<Vec<f64>>, flag: Option<f64>| -> Vec<f64> {
        match (explicit, flag) {
            (Some(values), _) => values.clone(),
            (None, Some(v)) => vec![v],
            (None, None) => vec![1.0],
        }
    };
    let request = ScaleRequest {
        pscales: pick(&args.pscale, flags.pscale),
        tscales: pick(&args.tscale, flags.tscale),
        escales: pick(&args.escale, flags.escale),
        vscales: pick(&args.vscale, flags.vscale),
        grid,
    };
    request.validate()?;
    Ok(request)
}

pub fn normalize_peak(samples: &mut [f64]) -> f64 {
    let peak = samples.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    if peak <= 1.0 {
        return 1.0;
    }
    let gain = 1.0 / peak;
    samples.iter_mut().for_each(|v| *v *= gain);
    gain
}

/// Streams into a new WAV file at `path`. The file is removed again when
/// `produce` fails, so no truncated output is left behind.
pub fn write_streamed<T, F>(path: &str, sample_rate: u32, produce: F) -> Result<T>
where
    F: FnOnce(&mut WavWriter<BufWriter<File>>) -> Result<T>,
{
    let mut writer = WavWriter::create(path, sample_rate)?;
    match produce(&mut writer) {
        Ok(value) => {
            writer
                .finalize()
                .with_context(|| format!("Failed to save audio to {}", path))?;
            Ok(value)
        }
        Err(e) => {
            drop(writer);
            if let Err(rm) = std::fs::remove_file(path) {
                debug!("Could not remove partial output {}: {}", path, rm);
            }
            Err(e)
        }
    }
}

pub fn synthesize(args: &SynthesisArgs, config: &PsolaConfig) -> Result<SynthesisStats> {
    let (samples, sample_rate) = audio::load_audio(&args.in_file)
        .with_context(|| format!("Failed to load audio from {}", args.in_file))?;

    if samples.is_empty() {
        audio::save_audio(&args.out_file, &[], sample_rate)
            .with_context(|| format!("Failed to save audio to {}", args.out_file))?;
        return Ok(SynthesisStats::default());
    }

    let params = resolve_params(args, config);
    let request = scale_request(args, config.grid())?;
    let marks = load_pitch_marks(&args.pitch_file, &samples, sample_rate, &params)?;

    info!(
        "Starting FD-PSOLA: {} samples at {}Hz, {} pitch marks",
        samples.len(),
        sample_rate,
        marks.len()
    );
    let mut processor = FdPsolaProcessor::new(params, sample_rate)?;

    let stats = if config.normalize() {
        let mut output = Vec::new();
        let stats = processor.process(&samples, &marks, &request, &mut output)?;
        let gain = normalize_peak(&mut output);
        if gain < 1.0 {
            info!("Normalized output peak (gain {:.3})", gain);
        }
        audio::save_audio(&args.out_file, &output, sample_rate)
            .with_context(|| format!("Failed to save audio to {}", args.out_file))?;
        stats
    } else {
        write_streamed(&args.out_file, sample_rate, |writer| {
            Ok(processor.process(&samples, &marks, &request, writer)?)
        })?
    };

    info!("Wrote {} samples to {}", stats.output_len, args.out_file);
    Ok(stats)
}
