//! Background detection loop
//!
//! Owns the producer thread that captures frames, runs the match
//! engine, and publishes detections to a callback and a bounded result
//! buffer. The loop survives capture failures and misbehaving
//! callbacks; only an explicit stop ends it.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use image::DynamicImage;

use super::capture::{FrameSource, Region};
use super::matcher::{Detection, MatchEngine};
use super::template::TemplateLibrary;
use super::VisionError;

use crate::config::settings::DetectionSettings;

/// Callback invoked synchronously on the loop thread for each detection
pub type DetectionCallback = Box<dyn Fn(Detection) + Send>;

/// Result of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The loop thread was spawned
    Started,
    /// The loop was already running; nothing changed
    AlreadyRunning,
}

/// Result of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The loop thread confirmed exit
    Stopped,
    /// The loop thread did not confirm exit within the timeout
    TimedOut,
}

/// Counters describing loop activity
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DetectionStats {
    /// Completed loop iterations
    pub iterations: u64,
    /// Total detections published
    pub detections: u64,
    /// Duration of the most recent match pass (ms)
    pub last_detection_ms: f32,
}

/// Continuous frame-scan producer
///
/// One instance drives one monitored screen region on one dedicated
/// thread. Restartable: after a stop (or a crash of the underlying
/// capture), `start` may be called again.
pub struct DetectionLoop {
    source: Arc<Mutex<Box<dyn FrameSource>>>,
    library: Arc<TemplateLibrary>,
    engine: MatchEngine,
    region: Option<Region>,
    buffer_cap: usize,
    running: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    results: Arc<Mutex<VecDeque<Detection>>>,
    iterations: Arc<AtomicU64>,
    detections: Arc<AtomicU64>,
    last_detection_us: Arc<AtomicU64>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DetectionLoop {
    /// Create a loop over the given source and template library
    pub fn new(
        source: Box<dyn FrameSource>,
        library: Arc<TemplateLibrary>,
        settings: &DetectionSettings,
    ) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            library,
            engine: MatchEngine::from_settings(settings),
            region: settings.region,
            buffer_cap: settings.result_buffer_cap,
            running: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            results: Arc::new(Mutex::new(VecDeque::new())),
            iterations: Arc::new(AtomicU64::new(0)),
            detections: Arc::new(AtomicU64::new(0)),
            last_detection_us: Arc::new(AtomicU64::new(0)),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the scan thread
    ///
    /// Refuses to start with an empty template library. Starting an
    /// already-running loop is a no-op reported as `AlreadyRunning`.
    /// The callback runs on the loop thread; a panic inside it is
    /// caught and logged, and never stops the loop.
    pub fn start(
        &self,
        callback: DetectionCallback,
        fps: f32,
    ) -> Result<StartOutcome, VisionError> {
        if self.library.is_empty() {
            return Err(VisionError::NoTemplates);
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("detection loop already running");
            return Ok(StartOutcome::AlreadyRunning);
        }
        self.stop_requested.store(false, Ordering::SeqCst);

        let source = Arc::clone(&self.source);
        let library = Arc::clone(&self.library);
        let engine = self.engine.clone();
        let region = self.region;
        let buffer_cap = self.buffer_cap;
        let running = Arc::clone(&self.running);
        let stop_requested = Arc::clone(&self.stop_requested);
        let results = Arc::clone(&self.results);
        let iterations = Arc::clone(&self.iterations);
        let detections = Arc::clone(&self.detections);
        let last_detection_us = Arc::clone(&self.last_detection_us);

        let period = Duration::from_secs_f32(1.0 / fps.max(0.1));
        let thread = thread::Builder::new()
            .name("detection-loop".to_string())
            .spawn(move || {
                log::info!(
                    "detection loop started ({} templates, {:.1} fps)",
                    library.len(),
                    fps
                );

                while !stop_requested.load(Ordering::SeqCst) {
                    let iteration_start = Instant::now();

                    let frame = {
                        let mut source = match source.lock() {
                            Ok(guard) => guard,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        source.capture(region)
                    };

                    match frame {
                        Ok(frame) => {
                            let gray = DynamicImage::ImageRgb8(frame).to_luma8();
                            let timestamp = SystemTime::now()
                                .duration_since(UNIX_EPOCH)
                                .unwrap_or_default()
                                .as_secs_f64();

                            let match_start = Instant::now();
                            let found = engine.detect(&gray, &library, timestamp);
                            last_detection_us
                                .store(match_start.elapsed().as_micros() as u64, Ordering::Relaxed);
                            detections.fetch_add(found.len() as u64, Ordering::Relaxed);

                            for detection in found {
                                {
                                    let mut buffer = match results.lock() {
                                        Ok(guard) => guard,
                                        Err(poisoned) => poisoned.into_inner(),
                                    };
                                    if buffer.len() >= buffer_cap {
                                        buffer.pop_front();
                                    }
                                    buffer.push_back(detection.clone());
                                }

                                // The callback gets the detection by value
                                // only; the loop's state is out of reach.
                                let outcome =
                                    catch_unwind(AssertUnwindSafe(|| callback(detection)));
                                if outcome.is_err() {
                                    log::error!(
                                        "detection callback panicked; loop continues"
                                    );
                                }
                            }
                        }
                        Err(e) => {
                            log::debug!("capture unavailable, retrying next cycle: {e}");
                        }
                    }

                    iterations.fetch_add(1, Ordering::Relaxed);

                    // Sleep off the rest of the period in short slices so a
                    // stop request is observed promptly. Overruns skip the
                    // sleep entirely; there is no catch-up bursting.
                    let elapsed = iteration_start.elapsed();
                    if elapsed < period {
                        let mut remaining = period - elapsed;
                        while remaining > Duration::ZERO
                            && !stop_requested.load(Ordering::SeqCst)
                        {
                            let slice = remaining.min(Duration::from_millis(50));
                            thread::sleep(slice);
                            remaining = remaining.saturating_sub(slice);
                        }
                    }
                }

                running.store(false, Ordering::SeqCst);
                log::info!("detection loop exited");
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                VisionError::CaptureUnavailable(format!("spawn failed: {e}"))
            })?;

        match self.handle.lock() {
            Ok(mut guard) => *guard = Some(thread),
            Err(poisoned) => *poisoned.into_inner() = Some(thread),
        }
        Ok(StartOutcome::Started)
    }

    /// Request a cooperative stop and wait for the thread to exit
    ///
    /// Waits up to `timeout`; if the thread has not confirmed exit by
    /// then, returns `TimedOut` instead of blocking forever. Stopping
    /// a loop that is not running is a no-op.
    pub fn stop(&self, timeout: Duration) -> StopOutcome {
        if !self.running.load(Ordering::SeqCst) {
            self.join_finished_thread();
            return StopOutcome::Stopped;
        }

        self.stop_requested.store(true, Ordering::SeqCst);

        let deadline = Instant::now() + timeout;
        while self.running.load(Ordering::SeqCst) {
            if Instant::now() >= deadline {
                log::warn!("detection loop did not confirm exit within {timeout:?}");
                return StopOutcome::TimedOut;
            }
            thread::sleep(Duration::from_millis(10));
        }

        self.join_finished_thread();
        StopOutcome::Stopped
    }

    /// Whether the scan thread is currently alive
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Take all buffered detections, oldest first
    pub fn drain_results(&self) -> Vec<Detection> {
        let mut buffer = match self.results.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        buffer.drain(..).collect()
    }

    /// Capture and match a single frame synchronously
    ///
    /// Convenience for hosts that want one scan without the background
    /// loop; capture failures propagate to the caller here.
    pub fn detect_once(&self) -> Result<Vec<Detection>, VisionError> {
        if self.library.is_empty() {
            return Err(VisionError::NoTemplates);
        }
        let frame = {
            let mut source = match self.source.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            source.capture(self.region)?
        };
        let gray = DynamicImage::ImageRgb8(frame).to_luma8();
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        Ok(self.engine.detect(&gray, &self.library, timestamp))
    }

    /// Snapshot of the loop's activity counters
    pub fn stats(&self) -> DetectionStats {
        DetectionStats {
            iterations: self.iterations.load(Ordering::Relaxed),
            detections: self.detections.load(Ordering::Relaxed),
            last_detection_ms: self.last_detection_us.load(Ordering::Relaxed) as f32 / 1000.0,
        }
    }

    /// Reap the thread handle once the loop has confirmed exit
    fn join_finished_thread(&self) {
        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::warn!("detection loop thread panicked before exit");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::capture::StaticFrameSource;
    use crate::vision::template::Template;
    use image::{DynamicImage, GrayImage, Luma, RgbImage};
    use std::sync::atomic::AtomicUsize;

    fn checker_gray(size: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            if (x / 2 + y / 2) % 2 == 0 {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    /// Frame that is an exact copy of the library's only template, so
    /// every iteration yields exactly one detection.
    fn matching_fixture() -> (Box<StaticFrameSource>, Arc<TemplateLibrary>) {
        let gray = checker_gray(8);
        let frame: RgbImage = DynamicImage::ImageLuma8(gray.clone()).to_rgb8();

        let mut library = TemplateLibrary::new();
        library.insert(Template::from_image("loot", &DynamicImage::ImageLuma8(gray)));

        (Box::new(StaticFrameSource::new(frame)), Arc::new(library))
    }

    fn fast_settings() -> DetectionSettings {
        DetectionSettings {
            match_threshold: 0.95,
            scale_ladder: vec![1.0],
            result_buffer_cap: 4,
            ..Default::default()
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_empty_library_refuses_start() {
        let (source, _) = matching_fixture();
        let detector = DetectionLoop::new(source, Arc::new(TemplateLibrary::new()), &fast_settings());

        let result = detector.start(Box::new(|_| {}), 10.0);
        assert!(matches!(result, Err(VisionError::NoTemplates)));
        assert!(!detector.is_running());
    }

    #[test]
    fn test_start_is_idempotent() {
        let (source, library) = matching_fixture();
        let detector = DetectionLoop::new(source, library, &fast_settings());

        assert_eq!(
            detector.start(Box::new(|_| {}), 50.0).unwrap(),
            StartOutcome::Started
        );
        assert_eq!(
            detector.start(Box::new(|_| {}), 50.0).unwrap(),
            StartOutcome::AlreadyRunning
        );

        assert_eq!(detector.stop(Duration::from_secs(2)), StopOutcome::Stopped);
        assert!(!detector.is_running());
    }

    #[test]
    fn test_stop_when_not_running_is_noop() {
        let (source, library) = matching_fixture();
        let detector = DetectionLoop::new(source, library, &fast_settings());
        assert_eq!(detector.stop(Duration::from_millis(100)), StopOutcome::Stopped);
    }

    #[test]
    fn test_panicking_callback_does_not_stop_loop() {
        let (source, library) = matching_fixture();
        let detector = DetectionLoop::new(source, library, &fast_settings());

        // Silence the default panic printer for the duration; the
        // callback below panics on every one of dozens of detections.
        let previous_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_callback = Arc::clone(&calls);
        detector
            .start(
                Box::new(move |_| {
                    calls_in_callback.fetch_add(1, Ordering::SeqCst);
                    panic!("callback failure");
                }),
                200.0,
            )
            .unwrap();

        let reached = wait_for(
            || detector.stats().iterations >= 50,
            Duration::from_secs(10),
        );

        let still_running = detector.is_running();
        let calls_seen = calls.load(Ordering::SeqCst);
        detector.stop(Duration::from_secs(2));
        std::panic::set_hook(previous_hook);

        assert!(reached, "loop never reached 50 iterations");
        assert!(still_running, "panicking callback killed the loop");
        assert!(calls_seen >= 50);
    }

    #[test]
    fn test_result_buffer_is_bounded() {
        let (source, library) = matching_fixture();
        let settings = fast_settings();
        let cap = settings.result_buffer_cap;
        let detector = DetectionLoop::new(source, library, &settings);

        detector.start(Box::new(|_| {}), 200.0).unwrap();
        assert!(wait_for(
            || detector.stats().detections > cap as u64 * 2,
            Duration::from_secs(10),
        ));
        detector.stop(Duration::from_secs(2));

        let drained = detector.drain_results();
        assert!(!drained.is_empty());
        assert!(drained.len() <= cap, "buffer exceeded cap: {}", drained.len());
        assert!(detector.drain_results().is_empty());
    }

    #[test]
    fn test_callback_receives_detections_in_order() {
        let (source, library) = matching_fixture();
        let detector = DetectionLoop::new(source, library, &fast_settings());

        let timestamps = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&timestamps);
        detector
            .start(
                Box::new(move |detection| {
                    sink.lock().unwrap().push(detection.timestamp);
                }),
                100.0,
            )
            .unwrap();

        assert!(wait_for(
            || timestamps.lock().unwrap().len() >= 5,
            Duration::from_secs(10),
        ));
        detector.stop(Duration::from_secs(2));

        let seen = timestamps.lock().unwrap();
        let mut sorted = seen.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(*seen, sorted, "detections arrived out of chronological order");
    }

    #[test]
    fn test_detect_once() {
        let (source, library) = matching_fixture();
        let detector = DetectionLoop::new(source, library, &fast_settings());

        let found = detector.detect_once().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].template, "loot");
    }

    #[test]
    fn test_capture_failure_is_survived() {
        struct FlakySource {
            calls: u64,
        }
        impl FrameSource for FlakySource {
            fn capture(&mut self, _region: Option<Region>) -> Result<RgbImage, VisionError> {
                self.calls += 1;
                if self.calls % 2 == 0 {
                    Err(VisionError::CaptureUnavailable("flaky".to_string()))
                } else {
                    let gray = checker_gray(8);
                    Ok(DynamicImage::ImageLuma8(gray).to_rgb8())
                }
            }
        }

        let mut library = TemplateLibrary::new();
        library.insert(Template::from_image(
            "loot",
            &DynamicImage::ImageLuma8(checker_gray(8)),
        ));

        let detector = DetectionLoop::new(
            Box::new(FlakySource { calls: 0 }),
            Arc::new(library),
            &fast_settings(),
        );

        detector.start(Box::new(|_| {}), 200.0).unwrap();
        assert!(wait_for(
            || detector.stats().iterations >= 10 && detector.stats().detections >= 3,
            Duration::from_secs(10),
        ));
        assert!(detector.is_running());
        detector.stop(Duration::from_secs(2));
    }
}
