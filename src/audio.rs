use anyhow::{Context, Result};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::get_codecs;
use symphonia::default::get_probe;
use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use log::{info, debug};

use crate::psola::SampleSink;

pub fn load_audio<P: AsRef<Path>>(path: P) -> Result<(Vec<f64>, u32)> {
    let path = path.as_ref();
    info!("Loading audio from {}", path.display());
    
    let file = File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
    
    let mss = MediaSourceStream::new(Box::new(ReadOnlySource::new(BufReader::new(file))), Default::default());
    
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    
    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    
    let probed = get_probe()
        .format(&hint, mss, &fmt_opts, &meta_opts)
        .with_context(|| "Failed to probe audio format")?;
    
    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .with_context(|| "No supported audio tracks found")?;
    
    let track_id = track.id;
    let codec_params = &track.codec_params;
    let sample_rate = codec_params
        .sample_rate
        .with_context(|| "Audio track has no sample rate")?;
    info!("Audio sample rate: {}Hz", sample_rate);
    
    let dec_opts: DecoderOptions = Default::default();
    let mut decoder = get_codecs()
        .make(&codec_params, &dec_opts)
        .with_context(|| "Failed to create decoder")?;
    
    let mut samples = Vec::new();
    
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::ResetRequired) => {
                debug!("Decoder reset required");
                continue;
            }
            Err(_) => break,
        };
        
        if packet.track_id() != track_id {
            continue;
        }
        
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let duration = decoded.capacity() as u64;
                
                if duration == 0 {
                    continue;
                }
                
                let channels = spec.channels.count();
                
                let mut sample_buf = SampleBuffer::<f64>::new(duration, spec);
                sample_buf.copy_interleaved_ref(decoded);
                
                if channels > 1 {
                    let interleaved = sample_buf.samples();
                    let mono_samples: Vec<f64> = interleaved
                        .chunks(channels)
                        .map(|chunk| chunk.iter().sum::<f64>() / channels as f64)
                        .collect();
                    samples.extend_from_slice(&mono_samples);
                } else {
                    samples.extend_from_slice(sample_buf.samples());
                }
            }
            Err(symphonia::core::errors::Error::DecodeError(_)) => {
                debug!("Decode error encountered, skipping packet");
                continue;
            }
            Err(symphonia::core::errors::Error::ResetRequired) => {
                debug!("Decoder reset required during decode");
                continue;
            }
            Err(e) => {
                return Err(anyhow::anyhow!("Decode error: {}", e));
            }
        }
    }
    
    info!("Loaded {} samples ({:.2}s)", samples.len(), samples.len() as f64 / sample_rate as f64);
    Ok((samples, sample_rate))
}

pub fn save_audio<P: AsRef<Path>>(path: P, samples: &[f64], sample_rate: u32) -> Result<()> {
    let path = path.as_ref();
    info!("Saving audio to {}", path.display());
    let mut writer = WavWriter::create(path, sample_rate)?;
    writer.write_block(samples)?;
    writer.finalize()?;
    Ok(())
}

const HEADER_LEN: u32 = 44;

/// Mono 16-bit PCM WAV sink. Samples are appended as they arrive and the RIFF
/// and data sizes are patched in by [`WavWriter::finalize`].
pub struct WavWriter<W: Write + Seek> {
    out: W,
    sample_rate: u32,
    frames: u32,
    clipped: usize,
}

impl WavWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P, sample_rate: u32) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file), sample_rate)?)
    }
}

impl<W: Write + Seek> WavWriter<W> {
    pub fn new(mut out: W, sample_rate: u32) -> std::io::Result<Self> {
        write_header(&mut out, sample_rate, 0)?;
        Ok(Self {
            out,
            sample_rate,
            frames: 0,
            clipped: 0,
        })
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn finalize(mut self) -> std::io::Result<W> {
        if self.clipped > 0 {
            log::warn!("Clipped {} samples to full scale", self.clipped);
        }
        let data_size = self.frames * 2;
        self.out.seek(SeekFrom::Start(0))?;
        write_header(&mut self.out, self.sample_rate, data_size)?;
        self.out.seek(SeekFrom::End(0))?;
        self.out.flush()?;
        debug!("Wrote {} frames at {}Hz", self.frames, self.sample_rate);
        Ok(self.out)
    }
}

impl<W: Write + Seek> SampleSink for WavWriter<W> {
    fn write_block(&mut self, samples: &[f64]) -> crate::Result<()> {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for &sample in samples {
            if sample.abs() > 1.0 {
                self.clipped += 1;
            }
            let clamped = sample.clamp(-1.0, 1.0);
            let int_sample = (clamped * 32767.0).round() as i16;
            bytes.extend_from_slice(&int_sample.to_le_bytes());
        }
        self.out.write_all(&bytes)?;
        self.frames += samples.len() as u32;
        Ok(())
    }
}

fn write_header<W: Write>(out: &mut W, sample_rate: u32, data_size: u32) -> std::io::Result<()> {
    let num_channels = 1u16;
    let bits_per_sample = 16u16;
    let byte_rate = sample_rate * num_channels as u32 * (bits_per_sample / 8) as u32;
    let block_align = num_channels * (bits_per_sample / 8);

    out.write_all(b"RIFF")?;
    out.write_all(&(HEADER_LEN - 8 + data_size).to_le_bytes())?;
    out.write_all(b"WAVE")?;

    out.write_all(b"fmt ")?;
    out.write_all(&16u32.to_le_bytes())?;
    out.write_all(&1u16.to_le_bytes())?;
    out.write_all(&num_channels.to_le_bytes())?;
    out.write_all(&sample_rate.to_le_bytes())?;
    out.write_all(&byte_rate.to_le_bytes())?;
    out.write_all(&block_align.to_le_bytes())?;
    out.write_all(&bits_per_sample.to_le_bytes())?;

    out.write_all(b"data")?;
    out.write_all(&data_size.to_le_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn u32_at(bytes: &[u8], pos: usize) -> u32 {
        u32::from_le_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
    }

    #[test]
    fn test_streamed_header_is_patched() {
        let mut writer = WavWriter::new(Cursor::new(Vec::new()), 16000).unwrap();
        writer.write_block(&[0.0, 0.5]).unwrap();
        writer.write_block(&[-1.0, 2.0, -3.0]).unwrap();
        assert_eq!(writer.frames(), 5);
        let bytes = writer.finalize().unwrap().into_inner();

        assert_eq!(bytes.len(), 44 + 10);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(u32_at(&bytes, 4), 36 + 10);
        assert_eq!(u32_at(&bytes, 24), 16000);
        assert_eq!(u32_at(&bytes, 40), 10);

        let pcm: Vec<i16> = bytes[44..]
            .chunks(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(pcm, vec![0, 16384, -32767, 32767, -32767]);
    }

    #[test]
    fn test_empty_file_is_valid() {
        let bytes = WavWriter::new(Cursor::new(Vec::new()), 44100)
            .unwrap()
            .finalize()
            .unwrap()
            .into_inner();
        assert_eq!(bytes.len(), 44);
        assert_eq!(u32_at(&bytes, 40), 0);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("fdpsola-audio-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tone.wav");
        let tone: Vec<f64> = (0..800).map(|i| 0.5 * (i as f64 * 0.05).sin()).collect();
        save_audio(&path, &tone, 8000).unwrap();

        let (loaded, fs) = load_audio(&path).unwrap();
        assert_eq!(fs, 8000);
        assert_eq!(loaded.len(), tone.len());
        for (a, b) in loaded.iter().zip(&tone) {
            assert!((a - b).abs() < 1e-3, "{} vs {}", a, b);
        }
        std::fs::remove_dir_all(&dir).ok();
    }
}
