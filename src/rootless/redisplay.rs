//! Deferred redisplay and colormaps
//!
//! Damage does not reach the screen immediately. The first damage after a
//! flush arms a short timer; when it fires (or when the last flush is older
//! than the maximum delay) the next pass through the server loop flushes
//! every frame at once. Colormap changes ride the same flush.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::native::{ColormapCallback, ConfigureMask, WindowChanges};
use crate::protocol::colormap::Colormap;
use crate::protocol::DrawableId;
use crate::rootless::RootlessScreen;

/// Time source for redisplay scheduling
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed point
    fn now(&self) -> Duration;
}

/// Wall clock based on [`Instant`]
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.micros.fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, to: Duration) {
        self.micros.store(to.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::SeqCst))
    }
}

/// Decides when queued damage gets flushed
#[derive(Debug, Clone)]
pub struct RedisplayScheduler {
    delay: Duration,
    max_delay: Duration,
    queued: bool,
    expired: bool,
    deadline: Option<Duration>,
    last_redisplay: Duration,
}

impl RedisplayScheduler {
    pub fn new(delay: Duration, max_delay: Duration, now: Duration) -> Self {
        Self {
            delay,
            max_delay,
            queued: false,
            expired: false,
            deadline: None,
            last_redisplay: now,
        }
    }

    /// Note new damage; arms the timer unless it already runs
    pub fn queue(&mut self, now: Duration) {
        self.queued = true;
        if self.deadline.is_none() {
            self.deadline = Some(now + self.delay);
        }
    }

    /// Fire the timer if it is due. It keeps running while damage is queued.
    pub fn tick(&mut self, now: Duration) {
        let Some(deadline) = self.deadline else { return };
        if now < deadline {
            return;
        }
        if self.queued {
            self.expired = true;
            self.deadline = Some(now + self.delay);
        } else {
            self.deadline = None;
        }
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn should_flush(&self, now: Duration) -> bool {
        self.queued && (self.expired || now > self.last_redisplay + self.max_delay)
    }

    /// A flush happened; the timer is cancelled so it cannot fire a
    /// second flush right behind this one
    pub fn flushed(&mut self, now: Duration) {
        self.queued = false;
        self.expired = false;
        self.deadline = None;
        self.last_redisplay = now;
    }

    pub fn is_queued(&self) -> bool {
        self.queued
    }

    pub fn last_redisplay(&self) -> Duration {
        self.last_redisplay
    }
}

fn lock_colormap(installed: &std::sync::Mutex<Option<Colormap>>) -> MutexGuard<'_, Option<Colormap>> {
    installed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RootlessScreen {
    pub fn queue_redisplay(&mut self) {
        let now = self.clock.now();
        self.scheduler.queue(now);
    }

    /// Fire the redisplay timer if it is due
    pub fn run_timers(&mut self) {
        let now = self.clock.now();
        self.scheduler.tick(now);
    }

    pub fn next_timer_deadline(&self) -> Option<Duration> {
        self.scheduler.next_deadline()
    }

    /// Flush the screen if queued damage is due. Returns true if it flushed.
    pub fn may_redisplay(&mut self) -> bool {
        let now = self.clock.now();
        if !self.scheduler.should_flush(now) {
            return false;
        }
        if self.colormap_changed {
            self.flush_colormaps();
        }
        trace!("Redisplay at {:?}", now);
        self.redisplay_screen();
        true
    }

    /// Work done each time the server loop is about to block
    pub fn block_handler(&mut self) {
        self.process_dri_releases();
        self.run_timers();
        self.may_redisplay();
    }

    /// Palette lookup handed to the host for indexed frames
    pub fn colormap_callback(&self) -> ColormapCallback {
        let installed = self.installed_colormap.clone();
        Arc::new(move |first, colors| lock_colormap(&installed).as_ref().is_some_and(|cm| cm.resolve(first, colors)))
    }

    pub fn install_colormap(&mut self, colormap: Colormap) {
        debug!("Installing colormap {}", colormap.id);
        *lock_colormap(&self.installed_colormap) = Some(colormap);
        self.colormap_changed = true;
        self.queue_redisplay();
    }

    pub fn installed_colormap(&self) -> Option<u32> {
        lock_colormap(&self.installed_colormap).as_ref().map(|cm| cm.id)
    }

    /// Store `(index, red, green, blue)` cells into colormap `id`. Only the
    /// installed colormap is tracked; returns false for any other.
    pub fn store_colors(&mut self, id: u32, cells: &[(usize, u16, u16, u16)]) -> bool {
        {
            let mut installed = lock_colormap(&self.installed_colormap);
            let Some(cm) = installed.as_mut().filter(|cm| cm.id == id) else {
                return false;
            };
            for &(index, r, g, b) in cells {
                cm.store_color(index, r, g, b);
            }
        }
        self.colormap_changed = true;
        self.queue_redisplay();
        true
    }

    /// Push the installed palette to the frame of `id`
    pub fn flush_window_colormap(&mut self, id: DrawableId) {
        let Some(wid) = self.records.get(&id).map(|r| r.wid) else { return };
        self.stop_drawing(id, false);
        let changes = WindowChanges {
            colormap: Some(self.colormap_callback()),
            ..Default::default()
        };
        self.configure_frame(wid, ConfigureMask::COLORMAP, &changes);
    }

    /// Push the palette to every indexed frame
    pub fn flush_colormaps(&mut self) {
        self.colormap_changed = false;
        let indexed: Vec<DrawableId> = self
            .records
            .keys()
            .copied()
            .filter(|id| self.tree.get(*id).is_some_and(|d| d.depth == 8))
            .collect();
        for id in indexed {
            self.flush_window_colormap(id);
        }
    }
}
