//! Background capture loop feeding the [`FrameStore`].
//!
//! One worker thread owns the open [`CaptureSource`]. It opens the source
//! itself and reports the outcome back to [`CaptureLoop::start`], so open
//! errors reach the caller while the source never crosses threads. The worker
//! reads, optionally stamps, and publishes frames until told to stop; failed
//! reads are logged and retried after a back-off.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::error::CaptureError;
use crate::overlay::TextOverlay;
use crate::source::{CaptureSource, SourceFactory};
use crate::store::FrameStore;

pub const DEFAULT_READ_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Stamp the capture time onto each frame
    pub add_date: bool,
    /// Stamp the instantaneous frame rate onto each frame
    pub fps_counter: bool,
    /// Pause after a failed read
    pub read_backoff: Duration,
    /// Overlay font; system defaults are tried when unset
    pub font_path: Option<PathBuf>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            add_date: false,
            fps_counter: false,
            read_backoff: DEFAULT_READ_BACKOFF,
            font_path: None,
        }
    }
}

#[derive(Default)]
struct Counters {
    frames: AtomicU64,
    read_failures: AtomicU64,
}

struct Worker {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

pub struct CaptureLoop {
    factory: Arc<dyn SourceFactory>,
    store: Arc<FrameStore>,
    options: CaptureOptions,
    overlay: Option<Arc<TextOverlay>>,
    counters: Arc<Counters>,
    worker: Mutex<Option<Worker>>,
}

impl CaptureLoop {
    /// Set up a stopped loop.
    ///
    /// The overlay font is loaded here when either overlay is enabled. A
    /// missing font disables the overlay with a warning instead of failing.
    pub fn new(
        factory: Arc<dyn SourceFactory>,
        store: Arc<FrameStore>,
        options: CaptureOptions,
    ) -> Self {
        let overlay = if options.add_date || options.fps_counter {
            match TextOverlay::load(options.font_path.as_deref()) {
                Ok(overlay) => {
                    debug!("Overlay font: {}", overlay.font_path().display());
                    Some(Arc::new(overlay))
                }
                Err(e) => {
                    warn!("Frame overlay disabled: {e}");
                    None
                }
            }
        } else {
            None
        };

        Self {
            factory,
            store,
            options,
            overlay,
            counters: Arc::new(Counters::default()),
            worker: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<FrameStore> {
        &self.store
    }

    /// Open the source and start the worker. A no-op while already running.
    pub fn start(&self) -> Result<(), CaptureError> {
        let mut worker = self.worker.lock().unwrap();
        if let Some(current) = worker.as_ref() {
            if !current.handle.is_finished() {
                return Ok(());
            }
        }
        if let Some(finished) = worker.take() {
            self.store.close();
            let _ = finished.handle.join();
        }

        let running = Arc::new(AtomicBool::new(true));
        let (opened_tx, opened_rx) = crossbeam_channel::bounded(1);
        let ctx = WorkerContext {
            factory: self.factory.clone(),
            store: self.store.clone(),
            options: self.options.clone(),
            overlay: self.overlay.clone(),
            counters: self.counters.clone(),
            running: running.clone(),
        };
        let handle = thread::Builder::new()
            .name("capture".into())
            .spawn(move || ctx.run(opened_tx))
            .map_err(|e| CaptureError::open(self.factory.describe(), e))?;

        match opened_rx.recv() {
            Ok(Ok(())) => {
                info!("Capture started from {}", self.factory.describe());
                *worker = Some(Worker { running, handle });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(CaptureError::open(
                    self.factory.describe(),
                    "capture worker exited before opening the source",
                ))
            }
        }
    }

    /// Stop the worker and release the source. A no-op when not running.
    ///
    /// The store is closed first so that open streams finish promptly.
    pub fn stop(&self) {
        let mut worker = self.worker.lock().unwrap();
        let Some(current) = worker.take() else {
            return;
        };
        current.running.store(false, Ordering::Release);
        self.store.close();
        if current.handle.join().is_err() {
            error!("Capture worker panicked");
        }
        info!("Capture stopped");
    }

    pub fn is_running(&self) -> bool {
        let worker = self.worker.lock().unwrap();
        worker
            .as_ref()
            .is_some_and(|w| w.running.load(Ordering::Acquire) && !w.handle.is_finished())
    }

    /// Frames published since construction.
    pub fn frames_captured(&self) -> u64 {
        self.counters.frames.load(Ordering::Relaxed)
    }

    /// Failed reads since construction.
    pub fn read_failures(&self) -> u64 {
        self.counters.read_failures.load(Ordering::Relaxed)
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WorkerContext {
    factory: Arc<dyn SourceFactory>,
    store: Arc<FrameStore>,
    options: CaptureOptions,
    overlay: Option<Arc<TextOverlay>>,
    counters: Arc<Counters>,
    running: Arc<AtomicBool>,
}

impl WorkerContext {
    fn run(self, opened: crossbeam_channel::Sender<Result<(), CaptureError>>) {
        let mut source = match self.factory.open() {
            Ok(source) => source,
            Err(e) => {
                let _ = opened.send(Err(e));
                return;
            }
        };
        debug!("{} open at {}", self.factory.describe(), source.resolution());
        self.store.open();
        let _ = opened.send(Ok(()));

        while self.running.load(Ordering::Acquire) {
            self.capture_one(source.as_mut());
        }
        debug!("Capture worker exiting, releasing {}", self.factory.describe());
    }

    fn capture_one(&self, source: &mut dyn CaptureSource) {
        let started = Instant::now();
        match source.read_frame() {
            Ok(mut image) => {
                let captured_at = Local::now();
                if let Some(overlay) = &self.overlay {
                    let timestamp = self.options.add_date.then_some(captured_at);
                    let fps = self.options.fps_counter.then(|| {
                        1.0 / started.elapsed().as_secs_f64().max(f64::EPSILON)
                    });
                    overlay.stamp(&mut image, timestamp, fps);
                }
                self.store.publish(image, captured_at);
                self.counters.frames.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.read_failures.fetch_add(1, Ordering::Relaxed);
                warn!("{}: {e}", self.factory.describe());
                thread::sleep(self.options.read_backoff);
            }
        }
    }
}
