use super::device::select_device;
use super::{AudioBackend, AudioDevice, AudioError, AudioSettings, DeviceCallback, DeviceInfo};
use crate::threads::ThreadTracker;
use keel_io::{byte_ring, RingConsumer, RingProducer, Semaphore, StopFlag, ThreadHandle, Timeout};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Periods of slack between the fill thread and the device.
pub const JITTER_PERIODS: u32 = 3;

const FILL_WAIT_MIN: Duration = Duration::from_millis(1);
const FILL_WAIT_MAX: Duration = Duration::from_millis(50);
const FILL_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Stopped,
    Starting,
    Playing,
    Stopping,
}

/// Snapshot of the pipeline counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AudioStats {
    pub frames_written: u64,
    pub frames_played: u64,
    /// Device callbacks that found the ring short and played silence.
    pub underruns: u64,
    /// Fill calls that claimed more frames than were asked for.
    pub overruns: u64,
}

#[derive(Default)]
struct Counters {
    frames_written: AtomicU64,
    frames_played: AtomicU64,
    underruns: AtomicU64,
    overruns: AtomicU64,
}

/// Feeds an audio device from an application fill callback.
///
/// # Logic
/// The fill callback runs on a dedicated thread and writes one period at a
/// time into a byte ring sized for [`JITTER_PERIODS`] periods. The device
/// thread drains the ring from its own callback. A counting semaphore with
/// one permit per free period keeps the writer from ever lapping the reader:
/// the fill thread takes a permit before each write and the device callback
/// returns one for every full period it consumes.
///
/// The device side never blocks; when the ring is short it plays silence and
/// counts an underrun.
pub struct AudioPipeline<B: AudioBackend> {
    backend: B,
    device_info: DeviceInfo,
    settings: AudioSettings,
    threads: ThreadTracker,
    state: PipelineState,
    device: Option<B::Device>,
    fill_thread: Option<ThreadHandle>,
    counters: Arc<Counters>,
    period_frames: u32,
}

impl<B: AudioBackend> AudioPipeline<B> {
    /// Validates `settings` and selects the output device. Nothing is opened
    /// until [`AudioPipeline::start`].
    pub fn open(mut backend: B, settings: AudioSettings, threads: ThreadTracker) -> Result<Self, AudioError> {
        settings.validate()?;
        let devices = backend.enumerate_devices()?;
        let device_info = select_device(&devices, settings.device.as_deref())?;
        info!(
            "Audio: selected '{}' ({} Hz, {} ch, {:?})",
            device_info.name, settings.sample_rate, settings.channels, settings.format
        );
        Ok(Self {
            backend,
            device_info,
            settings,
            threads,
            state: PipelineState::Stopped,
            device: None,
            fill_thread: None,
            counters: Arc::new(Counters::default()),
            period_frames: 0,
        })
    }

    /// Opens the device and begins playback.
    ///
    /// `fill` is called with a period-sized buffer and the number of frames
    /// wanted, and returns how many frames it wrote. Any shortfall is padded
    /// with silence.
    ///
    /// # Errors
    /// `AlreadyStarted` unless the pipeline is stopped. Any other failure
    /// leaves the pipeline stopped with the device closed and no thread
    /// running.
    pub fn start<F>(&mut self, fill: F) -> Result<(), AudioError>
    where
        F: FnMut(&mut [u8], u32) -> u32 + Send + 'static,
    {
        if self.state != PipelineState::Stopped {
            return Err(AudioError::AlreadyStarted);
        }
        self.state = PipelineState::Starting;
        match self.try_start(fill) {
            Ok(()) => {
                self.state = PipelineState::Playing;
                info!("Audio: playing, {} frames per period", self.period_frames);
                Ok(())
            }
            Err(err) => {
                error!("Audio: start failed: {}", err);
                self.release();
                self.state = PipelineState::Stopped;
                Err(err)
            }
        }
    }

    fn try_start<F>(&mut self, fill: F) -> Result<(), AudioError>
    where
        F: FnMut(&mut [u8], u32) -> u32 + Send + 'static,
    {
        let device = self.backend.open_device(&self.device_info, &self.settings)?;
        let period_frames = match self.settings.buffer_frames {
            0 => device.preferred_buffer_frames().max(1),
            n => n,
        };
        let device = self.device.insert(device);
        self.period_frames = period_frames;

        let bytes_per_frame = self.settings.bytes_per_frame();
        let period_bytes = period_frames as usize * bytes_per_frame;
        let (producer, consumer) = byte_ring(period_bytes * JITTER_PERIODS as usize)?;
        let space = Arc::new(Semaphore::new(JITTER_PERIODS));

        let fill_loop = FillLoop {
            fill,
            producer,
            space: space.clone(),
            counters: self.counters.clone(),
            period_frames,
            bytes_per_frame,
            silence: self.settings.format.silence(),
            wait: Timeout::from(period_wait(period_frames, self.settings.sample_rate)),
        };
        self.fill_thread = Some(self.threads.spawn("keel-audio-fill", move |stop| fill_loop.run(stop))?);

        device.start(drain_callback(
            consumer,
            space,
            self.counters.clone(),
            period_bytes,
            bytes_per_frame,
            self.settings.format.silence(),
        ))
    }

    /// Stops playback: the fill thread is told to stop and joined, then the
    /// device is closed. Stopping a stopped pipeline does nothing.
    pub fn stop(&mut self) {
        if self.state == PipelineState::Stopped {
            return;
        }
        self.state = PipelineState::Stopping;
        self.release();
        self.state = PipelineState::Stopped;
        let stats = self.stats();
        info!(
            "Audio: stopped ({} frames played, {} underruns, {} overruns)",
            stats.frames_played, stats.underruns, stats.overruns
        );
    }

    fn release(&mut self) {
        if let Some(mut thread) = self.fill_thread.take() {
            thread.request_stop();
            if thread.join(Timeout::from(FILL_JOIN_TIMEOUT)).timed_out() {
                warn!("Audio: fill thread slow to stop (fill callback blocking?), waiting");
                thread.join(Timeout::INFINITE);
            }
        }
        if let Some(mut device) = self.device.take() {
            device.close();
            debug!("Audio: device '{}' closed", self.device_info.name);
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PipelineState::Playing
    }

    pub fn stats(&self) -> AudioStats {
        AudioStats {
            frames_written: self.counters.frames_written.load(Ordering::Relaxed),
            frames_played: self.counters.frames_played.load(Ordering::Relaxed),
            underruns: self.counters.underruns.load(Ordering::Relaxed),
            overruns: self.counters.overruns.load(Ordering::Relaxed),
        }
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    pub fn settings(&self) -> &AudioSettings {
        &self.settings
    }

    /// Frames per period of the running (or last) session; 0 before the
    /// first start.
    pub fn period_frames(&self) -> u32 {
        self.period_frames
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: AudioBackend> Drop for AudioPipeline<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn period_wait(period_frames: u32, sample_rate: u32) -> Duration {
    let period = Duration::from_secs_f64(period_frames as f64 / sample_rate as f64);
    period.clamp(FILL_WAIT_MIN, FILL_WAIT_MAX)
}

struct FillLoop<F> {
    fill: F,
    producer: RingProducer,
    space: Arc<Semaphore>,
    counters: Arc<Counters>,
    period_frames: u32,
    bytes_per_frame: usize,
    silence: u8,
    wait: Timeout,
}

impl<F> FillLoop<F>
where
    F: FnMut(&mut [u8], u32) -> u32,
{
    fn run(mut self, stop: StopFlag) {
        let period_bytes = self.period_frames as usize * self.bytes_per_frame;
        let mut period = vec![self.silence; period_bytes];
        debug!("Audio: fill thread running ({} bytes per period)", period_bytes);

        while !stop.is_stop_requested() {
            if self.space.acquire_timeout(self.wait).timed_out() {
                continue;
            }
            if stop.is_stop_requested() {
                break;
            }

            let mut frames = (self.fill)(&mut period, self.period_frames);
            if frames > self.period_frames {
                self.counters.overruns.fetch_add(1, Ordering::Relaxed);
                frames = self.period_frames;
            }
            period[frames as usize * self.bytes_per_frame..].fill(self.silence);

            let written = self.producer.write(&period);
            debug_assert_eq!(written, period_bytes, "permit granted without a free period");
            self.counters.frames_written.fetch_add((written / self.bytes_per_frame) as u64, Ordering::Relaxed);
        }
        debug!("Audio: fill thread exiting");
    }
}

fn drain_callback(
    mut consumer: RingConsumer,
    space: Arc<Semaphore>,
    counters: Arc<Counters>,
    period_bytes: usize,
    bytes_per_frame: usize,
    silence: u8,
) -> DeviceCallback {
    let mut drained = 0usize;
    Box::new(move |out: &mut [u8]| {
        let n = consumer.read(out);
        if n < out.len() {
            out[n..].fill(silence);
            counters.underruns.fetch_add(1, Ordering::Relaxed);
        }
        counters.frames_played.fetch_add((n / bytes_per_frame) as u64, Ordering::Relaxed);

        drained += n;
        while drained >= period_bytes {
            drained -= period_bytes;
            // Permits mirror free periods, so this cannot exceed the maximum.
            let released = space.release();
            debug_assert!(released.is_ok(), "drained more periods than the ring holds");
        }
    })
}
