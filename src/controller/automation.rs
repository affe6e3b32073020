//! The combat/pickup state machine
//!
//! One [`AutomationController`] drives one monitored session. It
//! consumes detections into a distance-sorted queue, cycles combat
//! moves and attacks while the queue is empty, and drains the queue
//! sequentially the moment targets appear. Combat and pickup never
//! interleave: both run on the controller's own driving thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::queue::{PendingTarget, TargetQueue};
use super::state::{ControllerState, ControllerStatus};
use super::wander::WanderRing;
use super::ControllerError;

use crate::config::settings::{PickupPolicy, Settings};
use crate::driver::{Action, ActionDriver};
use crate::vision::detector::DetectionCallback;
use crate::vision::{Detection, DetectionLoop, StopOutcome};

/// Result of a controller shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every thread confirmed exit
    Clean,
    /// Some thread did not confirm exit within the join timeout
    TimedOut,
}

/// The queue, the state field, and the picking flag form one
/// synchronized unit; nothing reads or writes any of them without
/// holding the one lock around this struct.
struct ControlShared {
    state: ControllerState,
    queue: TargetQueue,
    picking_up: bool,
}

/// State machine consuming detections and driving an [`ActionDriver`]
pub struct AutomationController {
    detection: Arc<DetectionLoop>,
    driver: Arc<dyn ActionDriver>,
    settings: Settings,
    ring: WanderRing,
    shared: Arc<Mutex<ControlShared>>,
    stop_flag: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AutomationController {
    /// Create a controller over a detection loop and an action driver
    pub fn new(
        detection: Arc<DetectionLoop>,
        driver: Arc<dyn ActionDriver>,
        settings: Settings,
    ) -> Self {
        let ring = WanderRing::from_settings(&settings.combat);
        let shared = ControlShared {
            state: ControllerState::Idle,
            queue: TargetQueue::new(settings.pickup.dedup_radius),
            picking_up: false,
        };
        Self {
            detection,
            driver,
            settings,
            ring,
            shared: Arc::new(Mutex::new(shared)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Start the detection loop and the driving thread
    ///
    /// Fails if the session is already active or the detection loop
    /// refuses to start (no templates loaded).
    pub fn start(&self) -> Result<(), ControllerError> {
        {
            let shared = lock(&self.shared);
            if !matches!(
                shared.state,
                ControllerState::Idle | ControllerState::Stopped
            ) {
                return Err(ControllerError::AlreadyRunning);
            }
        }
        self.stop_flag.store(false, Ordering::SeqCst);

        let callback = ingest_callback(Arc::clone(&self.shared), self.ring.anchor());
        self.detection
            .start(callback, self.settings.detection.fps)?;

        lock(&self.shared).state = ControllerState::Combat;
        log::info!("automation started, entering combat");

        let drive = Drive {
            detection: Arc::clone(&self.detection),
            driver: Arc::clone(&self.driver),
            settings: self.settings.clone(),
            ring: self.ring.clone(),
            shared: Arc::clone(&self.shared),
            stop_flag: Arc::clone(&self.stop_flag),
        };
        let handle = thread::Builder::new()
            .name("automation-controller".to_string())
            .spawn(move || drive.run())
            .map_err(|e| {
                lock(&self.shared).state = ControllerState::Idle;
                self.detection
                    .stop(Duration::from_millis(self.settings.timings.join_timeout_ms));
                ControllerError::Spawn(e.to_string())
            })?;
        *lock_handle(&self.handle) = Some(handle);
        Ok(())
    }

    /// Stop the session, draining in-flight work
    ///
    /// The current pickup attempt (if any) finishes; no new work
    /// starts. Blocks up to the configured join timeout per thread and
    /// reports `TimedOut` rather than hanging. `Stopped` is only
    /// reported once every thread has exited.
    pub fn stop(&self) -> ShutdownOutcome {
        let join_timeout = Duration::from_millis(self.settings.timings.join_timeout_ms);

        {
            let mut shared = lock(&self.shared);
            if matches!(
                shared.state,
                ControllerState::Idle | ControllerState::Stopped
            ) {
                shared.state = ControllerState::Stopped;
                drop(shared);
                self.detection.stop(join_timeout);
                return ShutdownOutcome::Clean;
            }
            shared.state = ControllerState::Stopping;
        }
        log::info!("stop requested, draining in-flight work");
        self.stop_flag.store(true, Ordering::SeqCst);

        let thread_exited = self.join_with_timeout(join_timeout);
        let detection_exited = self.detection.stop(join_timeout) == StopOutcome::Stopped;

        if thread_exited && detection_exited {
            lock(&self.shared).state = ControllerState::Stopped;
            log::info!("automation stopped");
            ShutdownOutcome::Clean
        } else {
            log::warn!(
                "incomplete shutdown: controller exited = {thread_exited}, \
                 detection exited = {detection_exited}"
            );
            ShutdownOutcome::TimedOut
        }
    }

    /// Snapshot for supervising hosts
    pub fn status(&self) -> ControllerStatus {
        let shared = lock(&self.shared);
        ControllerStatus {
            state: shared.state,
            queue_depth: shared.queue.len(),
            detection_running: self.detection.is_running(),
        }
    }

    /// Feed one detection into the pending-target queue
    ///
    /// This is the entry the detection callback uses; hosts with their
    /// own detection pipeline may call it directly. Returns whether
    /// the detection was accepted (false = duplicate observation).
    pub fn ingest(&self, detection: Detection) -> bool {
        ingest_into(&self.shared, self.ring.anchor(), detection)
    }

    /// Wait for the driving thread to exit, bounded by `timeout`
    fn join_with_timeout(&self, timeout: Duration) -> bool {
        let Some(handle) = lock_handle(&self.handle).take() else {
            return true;
        };

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                // Put the handle back so a later stop can retry the join
                *lock_handle(&self.handle) = Some(handle);
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        if handle.join().is_err() {
            log::warn!("controller thread panicked before exit");
        }
        true
    }
}

/// Everything the driving thread owns
struct Drive {
    detection: Arc<DetectionLoop>,
    driver: Arc<dyn ActionDriver>,
    settings: Settings,
    ring: WanderRing,
    shared: Arc<Mutex<ControlShared>>,
    stop_flag: Arc<AtomicBool>,
}

impl Drive {
    fn run(self) {
        let mut rng = rand::rng();

        let slice = Duration::from_millis(self.settings.timings.loop_slice_ms);
        let move_interval = Duration::from_millis(self.settings.combat.move_interval_ms);
        let attack_interval = Duration::from_millis(self.settings.combat.attack_interval_ms);
        let cooldown = Duration::from_millis(self.settings.pickup.cooldown_ms);
        let watchdog_interval =
            Duration::from_millis(self.settings.timings.watchdog_interval_ms);

        let started = Instant::now();
        let mut last_move = started;
        let mut last_attack = started;
        let mut wander_moves = 0u32;
        let mut last_pass_end: Option<Instant> = None;
        let mut last_watchdog = started;
        let mut backoff = Duration::from_millis(self.settings.timings.restart_backoff_ms);
        let mut next_restart = started;

        while !self.stop_flag.load(Ordering::SeqCst) {
            let begin_pickup = {
                let mut shared = lock(&self.shared);
                let cooled = last_pass_end.map_or(true, |t| t.elapsed() >= cooldown);
                if shared.state == ControllerState::Combat
                    && !shared.picking_up
                    && !shared.queue.is_empty()
                    && cooled
                {
                    shared.picking_up = true;
                    shared.state = ControllerState::PickingUp;
                    true
                } else {
                    false
                }
            };

            if begin_pickup {
                log::info!("targets pending, interrupting combat for pickup");

                // A combat action may be mid-flight as a held key or
                // button; drop everything before collecting.
                let released = self.driver.release_inputs();
                if !released.success {
                    log::warn!(
                        "failed to release held inputs: {}",
                        released.error.as_deref().unwrap_or("unknown")
                    );
                }

                self.drain_targets();

                {
                    let mut shared = lock(&self.shared);
                    shared.picking_up = false;
                    if shared.state == ControllerState::PickingUp {
                        shared.state = ControllerState::Combat;
                    }
                }
                last_pass_end = Some(Instant::now());
                log::info!("pickup pass complete, resuming combat");
                continue;
            }

            if lock(&self.shared).state == ControllerState::Combat {
                let now = Instant::now();

                // Move and attack run on independent clocks
                if now.duration_since(last_move) >= move_interval {
                    self.combat_move(&mut rng, &mut wander_moves);
                    last_move = now;
                }
                if now.duration_since(last_attack) >= attack_interval {
                    let (x, y) = self.ring.sample(&mut rng);
                    let result = self.driver.attack(x, y);
                    if !result.success {
                        log::warn!(
                            "{} failed at ({x}, {y}): {}",
                            Action::Attack,
                            result.error.as_deref().unwrap_or("unknown")
                        );
                    }
                    last_attack = now;
                }
            }

            if last_watchdog.elapsed() >= watchdog_interval {
                last_watchdog = Instant::now();
                self.check_detection(&mut backoff, &mut next_restart);
            }

            thread::sleep(slice);
        }

        log::debug!("controller driving thread exiting");
    }

    /// One combat move: wander inside the ring, or return to the
    /// anchor once the cycle counter runs out
    fn combat_move(&self, rng: &mut impl rand::Rng, wander_moves: &mut u32) {
        let (x, y) = if *wander_moves >= self.settings.combat.max_wander_moves {
            log::debug!(
                "returning to anchor after {} wander moves",
                *wander_moves
            );
            *wander_moves = 0;
            self.ring.anchor()
        } else {
            *wander_moves += 1;
            self.ring.sample(rng)
        };

        let result = self
            .driver
            .move_to(x, y, self.settings.combat.move_duration_ms);
        if !result.success {
            log::warn!(
                "{} failed at ({x}, {y}): {}",
                Action::Move,
                result.error.as_deref().unwrap_or("unknown")
            );
        }
    }

    /// Drain the queue strictly sequentially, nearest first
    ///
    /// Exactly one attempt per target; stale targets are skipped
    /// without an attempt. Stop is observed at the between-target
    /// boundary, so the current attempt always completes.
    fn drain_targets(&self) {
        let staleness = Duration::from_millis(self.settings.pickup.staleness_ms);
        let settle = Duration::from_millis(self.settings.pickup.settle_delay_ms);
        let policy = self.settings.pickup.policy;

        let mut attempted = 0u32;
        let mut skipped = 0u32;
        loop {
            if self.stop_flag.load(Ordering::SeqCst) {
                log::info!("stop requested, abandoning remaining targets");
                break;
            }

            let target = lock(&self.shared).queue.pop_nearest();
            let Some(target) = target else { break };

            if target.is_stale(staleness) {
                skipped += 1;
                log::info!(
                    "skipping stale target '{}' at {:?} (queued {:.1?} ago)",
                    target.detection.template,
                    target.center,
                    target.first_seen.elapsed()
                );
            } else {
                attempted += 1;
                let (x, y) = target.center;
                let result = self
                    .driver
                    .pick_up(x, y, self.settings.pickup.pickup_duration_ms);
                if result.success {
                    log::debug!(
                        "picked up '{}' at ({x}, {y}) in {:.0}ms",
                        target.detection.template,
                        result.elapsed_ms
                    );
                } else {
                    log::warn!(
                        "{} failed for '{}' at ({x}, {y}): {}",
                        Action::PickUp,
                        target.detection.template,
                        result.error.as_deref().unwrap_or("unknown")
                    );
                }

                // Intentional pacing: the action system needs real time
                // for the pickup to register before the next attempt
                thread::sleep(settle);
            }

            if policy == PickupPolicy::NearestOnly {
                let dropped = lock(&self.shared).queue.clear();
                if dropped > 0 {
                    log::debug!("single-target policy dropped {dropped} further targets");
                }
                break;
            }
        }
        log::info!("pickup pass finished: {attempted} attempted, {skipped} stale");
    }

    /// Restart the detection loop if it died while we are active
    fn check_detection(&self, backoff: &mut Duration, next_restart: &mut Instant) {
        if self.detection.is_running() {
            *backoff = Duration::from_millis(self.settings.timings.restart_backoff_ms);
            return;
        }
        if Instant::now() < *next_restart {
            return;
        }

        log::warn!("detection loop is down, attempting restart");
        let callback = ingest_callback(Arc::clone(&self.shared), self.ring.anchor());
        match self.detection.start(callback, self.settings.detection.fps) {
            Ok(_) => {
                log::info!("detection loop restarted");
                *backoff = Duration::from_millis(self.settings.timings.restart_backoff_ms);
            }
            Err(e) => {
                log::error!("detection restart failed: {e}");
                *next_restart = Instant::now() + *backoff;
                *backoff = (*backoff * 2).min(Duration::from_millis(
                    self.settings.timings.max_restart_backoff_ms,
                ));
            }
        }
    }
}

/// Build the callback the detection loop invokes per detection
fn ingest_callback(shared: Arc<Mutex<ControlShared>>, anchor: (i32, i32)) -> DetectionCallback {
    Box::new(move |detection| {
        ingest_into(&shared, anchor, detection);
    })
}

/// Dedup a detection against the queue and insert it sorted
fn ingest_into(
    shared: &Mutex<ControlShared>,
    anchor: (i32, i32),
    detection: Detection,
) -> bool {
    let target = PendingTarget::new(detection, anchor);
    let name = target.detection.template.clone();
    let center = target.center;
    let dist = target.distance;

    let mut shared = lock_inner(shared);
    if shared.queue.offer(target) {
        log::debug!(
            "queued target '{name}' at {center:?} ({dist:.0}px from anchor), depth {}",
            shared.queue.len()
        );
        true
    } else {
        log::trace!("duplicate observation of '{name}' near {center:?}");
        false
    }
}

fn lock(shared: &Arc<Mutex<ControlShared>>) -> MutexGuard<'_, ControlShared> {
    lock_inner(shared)
}

fn lock_inner(shared: &Mutex<ControlShared>) -> MutexGuard<'_, ControlShared> {
    match shared.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn lock_handle(
    handle: &Mutex<Option<JoinHandle<()>>>,
) -> MutexGuard<'_, Option<JoinHandle<()>>> {
    match handle.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
