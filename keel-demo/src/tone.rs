use keel_core::AudioFormat;
use std::f32::consts::TAU;

/// Sine generator that writes interleaved samples in any [`AudioFormat`].
pub struct Tone {
    phase: f32,
    step: f32,
    volume: f32,
    channels: usize,
    format: AudioFormat,
}

impl Tone {
    pub fn new(frequency: f32, volume: f32, sample_rate: u32, channels: u16, format: AudioFormat) -> Self {
        Self {
            phase: 0.0,
            step: TAU * frequency / sample_rate as f32,
            volume: volume.clamp(0.0, 1.0),
            channels: channels as usize,
            format,
        }
    }

    /// Fills `frames` frames of `buf` and returns how many were written.
    pub fn fill(&mut self, buf: &mut [u8], frames: u32) -> u32 {
        let sample_bytes = self.format.bytes_per_sample();
        let frame_bytes = sample_bytes * self.channels;
        let frames = (frames as usize).min(buf.len() / frame_bytes);

        for frame in buf.chunks_exact_mut(frame_bytes).take(frames) {
            let value = self.phase.sin() * self.volume;
            self.phase = (self.phase + self.step) % TAU;
            for sample in frame.chunks_exact_mut(sample_bytes) {
                encode(self.format, value, sample);
            }
        }
        frames as u32
    }
}

fn encode(format: AudioFormat, value: f32, out: &mut [u8]) {
    match format {
        AudioFormat::U8 => out[0] = ((value * 127.0) as i16 + 128) as u8,
        AudioFormat::S16 => out.copy_from_slice(&((value * i16::MAX as f32) as i16).to_le_bytes()),
        AudioFormat::S24 => {
            let v = (value * 8_388_607.0) as i32;
            out.copy_from_slice(&v.to_le_bytes()[..3]);
        }
        AudioFormat::S32 => out.copy_from_slice(&((value as f64 * i32::MAX as f64) as i32).to_le_bytes()),
        AudioFormat::F32 => out.copy_from_slice(&value.to_le_bytes()),
    }
}
