//! Rootless screen
//!
//! Every top-level protocol window is backed by its own native window. The
//! [`RootlessScreen`] owns the bridging state: one [`WindowRecord`] per framed
//! top-level, the native id registries, the DRI surface manager, the redisplay
//! scheduler and whatever resize is in flight. All of it lives on the server
//! thread; only the registries are shared with the native event thread.
//!
//! The hooks that wrap the default window operations are spread over the
//! submodules:
//! - `frame`: realize, unrealize, destroy, reparent, restack and levels
//! - `drawing`: start and stop direct access to native buffers
//! - `resize`: move, resize, border changes and copy-window strategies
//! - `damage`: damage tracking, paint hooks and drawing primitives
//! - `redisplay`: deferred flushing and colormaps
//! - `dri`: accelerated surfaces
//! - `requests`: protocol requests driving the hooks

pub mod damage;
pub mod drawing;
pub mod dri;
pub mod frame;
pub mod redisplay;
pub mod registry;
pub mod requests;
pub mod resize;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::info;

use crate::config::Config;
use crate::native::{NativeHost, WindowId};
use crate::protocol::colormap::Colormap;
use crate::protocol::pixmap::{PixelBuffer, PixmapHeader};
use crate::protocol::{DrawableId, DrawableTree, WindowOps};
use crate::shared::{Point, Rect};

pub use dri::{DriSurfaceManager, SurfaceLease, SurfaceNotifyArg, SurfaceNotifyKind};
pub use redisplay::{Clock, ManualClock, MonotonicClock, RedisplayScheduler};
pub use registry::SurfaceRegistry;
pub use resize::CopyMode;

/// Level index used for the root window's frame
pub const NUM_WINDOW_LEVELS: usize = 5;

/// Native levels when the root is not framed
pub const NORMAL_WINDOW_LEVELS: [i32; NUM_WINDOW_LEVELS + 1] = [0, 3, 4, 5, i32::MIN + 30, i32::MIN + 29];

/// Native levels once the root has a frame of its own
pub const ROOTED_WINDOW_LEVELS: [i32; NUM_WINDOW_LEVELS + 1] = [202, 203, 204, 205, 201, 200];

/// Property holding a framed window's host-wide native number
pub const NATIVE_WINDOW_PROPERTY: &str = "_NATIVE_WINDOW_ID";

/// Root property holding the native origin of the protocol screen
pub const NATIVE_SCREEN_ORIGIN_PROPERTY: &str = "_NATIVE_SCREEN_ORIGIN";

/// A native buffer locked for direct drawing
#[derive(Debug, Clone)]
pub(crate) struct FrameLock {
    pub(crate) pixels: PixelBuffer,
    pub(crate) rowbytes: usize,
    pub(crate) pixmap: PixmapHeader,
}

/// Bridging state of a framed top-level window
#[derive(Debug)]
pub struct WindowRecord {
    /// Outer geometry in protocol screen coordinates
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub border_width: u32,
    /// Index into the level tables
    pub level: usize,
    pub wid: WindowId,
    pub window: DrawableId,
    pub(crate) lock: Option<FrameLock>,
    /// Pixmaps displaced while drawing, restored on stop
    pub(crate) old_pixmaps: Vec<(DrawableId, Option<PixmapHeader>)>,
    pub unrealize_time: Option<Duration>,
    pub is_update_disabled: bool,
    pub is_reorder_pending: bool,
    pub is_offscreen: bool,
    pub is_obscured: bool,
}

impl WindowRecord {
    pub(crate) fn new(window: DrawableId, wid: WindowId, outer: Rect, border_width: u32, level: usize) -> Self {
        Self {
            x: outer.x1,
            y: outer.y1,
            width: outer.width() as u32,
            height: outer.height() as u32,
            border_width,
            level,
            wid,
            window,
            lock: None,
            old_pixmaps: Vec::new(),
            unrealize_time: None,
            is_update_disabled: false,
            is_reorder_pending: false,
            is_offscreen: false,
            is_obscured: false,
        }
    }

    /// True while the native buffer is locked
    pub fn is_drawing(&self) -> bool {
        self.lock.is_some()
    }

    pub fn rowbytes(&self) -> Option<usize> {
        self.lock.as_ref().map(|l| l.rowbytes)
    }

    /// Pixmap wrapping the locked buffer
    pub fn pixmap(&self) -> Option<&PixmapHeader> {
        self.lock.as_ref().map(|l| &l.pixmap)
    }

    pub fn outer_rect(&self) -> Rect {
        Rect::from_xywh(self.x, self.y, self.width, self.height)
    }
}

/// Screen behaviour knobs
#[derive(Debug, Clone)]
pub struct ScreenOptions {
    /// Native coordinates of the protocol screen's origin
    pub origin: Point,
    pub dri_enabled: bool,
    pub redisplay_delay: Duration,
    pub max_redisplay_delay: Duration,
    /// Copy only the cut-off strip when a north-west anchored resize shrinks
    /// one dimension
    pub preserve_partial_strips: bool,
}

impl Default for ScreenOptions {
    fn default() -> Self {
        Self {
            origin: Point::default(),
            dri_enabled: true,
            redisplay_delay: Duration::from_millis(10),
            max_redisplay_delay: Duration::from_millis(60),
            preserve_partial_strips: true,
        }
    }
}

impl ScreenOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            origin: Point::new(config.screen.origin_x, config.screen.origin_y),
            dri_enabled: config.dri.enabled,
            redisplay_delay: Duration::from_millis(config.redisplay.delay_ms),
            max_redisplay_delay: Duration::from_millis(config.redisplay.max_delay_ms),
            preserve_partial_strips: config.resize.preserve_partial_strips,
        }
    }
}

/// Rootless bridging context for one protocol screen
pub struct RootlessScreen {
    pub(crate) tree: DrawableTree,
    pub(crate) lower: Box<dyn WindowOps>,
    pub(crate) host: Arc<dyn NativeHost>,
    pub(crate) records: HashMap<DrawableId, WindowRecord>,
    pub(crate) window_registry: Arc<SurfaceRegistry<WindowId>>,
    pub(crate) dri: DriSurfaceManager,
    pub(crate) scheduler: RedisplayScheduler,
    pub(crate) resize: Option<resize::ResizeState>,
    pub(crate) copy_mode: CopyMode,
    pub(crate) installed_colormap: Arc<Mutex<Option<Colormap>>>,
    pub(crate) colormap_changed: bool,
    pub(crate) options: ScreenOptions,
    /// Suppresses native configuration while applying host-initiated moves
    pub(crate) no_configure_window: bool,
    pub(crate) windows_hidden: bool,
    /// Nonzero while DRI drawing must not be used
    pub(crate) no_dri_drawing: u32,
    pub(crate) clock: Arc<dyn Clock>,
}

impl RootlessScreen {
    pub fn new(
        host: Arc<dyn NativeHost>,
        lower: Box<dyn WindowOps>,
        tree: DrawableTree,
        options: ScreenOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let scheduler = RedisplayScheduler::new(options.redisplay_delay, options.max_redisplay_delay, clock.now());
        let dri = DriSurfaceManager::new(options.dri_enabled);
        info!(
            "Rootless screen created ({}x{}, origin {:?})",
            tree.get(tree.root()).map(|r| r.width).unwrap_or(0),
            tree.get(tree.root()).map(|r| r.height).unwrap_or(0),
            options.origin
        );
        Self {
            tree,
            lower,
            host,
            records: HashMap::new(),
            window_registry: Arc::new(SurfaceRegistry::new()),
            dri,
            scheduler,
            resize: None,
            copy_mode: CopyMode::Normal,
            installed_colormap: Arc::new(Mutex::new(None)),
            colormap_changed: false,
            options,
            no_configure_window: false,
            windows_hidden: false,
            no_dri_drawing: 0,
            clock,
        }
    }

    pub fn tree(&self) -> &DrawableTree {
        &self.tree
    }

    /// Attribute changes that need no bridging (background, gravity, flags)
    pub fn tree_mut(&mut self) -> &mut DrawableTree {
        &mut self.tree
    }

    pub fn host(&self) -> &Arc<dyn NativeHost> {
        &self.host
    }

    pub fn origin(&self) -> Point {
        self.options.origin
    }

    pub fn record(&self, id: DrawableId) -> Option<&WindowRecord> {
        self.records.get(&id)
    }

    pub(crate) fn record_mut(&mut self, id: DrawableId) -> Option<&mut WindowRecord> {
        self.records.get_mut(&id)
    }

    /// Record of the top-level window containing `id`
    pub fn top_level_record(&self, id: DrawableId) -> Option<&WindowRecord> {
        self.records.get(&self.tree.top_level(id)?)
    }

    pub fn window_registry(&self) -> &Arc<SurfaceRegistry<WindowId>> {
        &self.window_registry
    }

    pub fn surface_registry(&self) -> &Arc<SurfaceRegistry<crate::native::SurfaceId>> {
        self.dri.registry()
    }

    pub fn dri(&self) -> &DriSurfaceManager {
        &self.dri
    }

    pub fn scheduler(&self) -> &RedisplayScheduler {
        &self.scheduler
    }

    pub fn copy_mode(&self) -> CopyMode {
        self.copy_mode
    }

    pub fn windows_hidden(&self) -> bool {
        self.windows_hidden
    }

    /// Framed windows, in no particular order
    pub fn framed_windows(&self) -> Vec<DrawableId> {
        self.records.keys().copied().collect()
    }

    /// True for realized windows whose top-level has a frame
    pub(crate) fn is_framed(&self, id: DrawableId) -> bool {
        self.tree.get(id).is_some_and(|d| d.is_viewable()) && self.top_level_record(id).is_some()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::native::headless::HeadlessHost;
    use crate::protocol::{BitGravity, FbWindowOps, WindowClass};

    pub(crate) struct Fixture {
        pub screen: RootlessScreen,
        pub host: Arc<HeadlessHost>,
        pub clock: Arc<ManualClock>,
    }

    pub(crate) fn fixture() -> Fixture {
        fixture_with(ScreenOptions::default())
    }

    pub(crate) fn fixture_with(options: ScreenOptions) -> Fixture {
        let host = Arc::new(HeadlessHost::new());
        let clock = Arc::new(ManualClock::new());
        let screen = RootlessScreen::new(
            host.clone(),
            Box::new(FbWindowOps::new()),
            DrawableTree::new(1024, 768, 24),
            options,
            clock.clone(),
        );
        Fixture { screen, host, clock }
    }

    impl Fixture {
        /// Create and map a top-level window with NorthWest bit gravity
        pub(crate) fn top_level(&mut self, x: i32, y: i32, w: u32, h: u32, bw: u32) -> DrawableId {
            let root = self.screen.tree().root();
            self.child(root, x, y, w, h, bw)
        }

        pub(crate) fn child(&mut self, parent: DrawableId, x: i32, y: i32, w: u32, h: u32, bw: u32) -> DrawableId {
            let id = self
                .screen
                .tree_mut()
                .create_window(parent, x, y, w, h, bw, WindowClass::InputOutput)
                .expect("parent exists");
            self.screen.tree_mut().get_mut(id).expect("just created").bit_gravity = BitGravity::NorthWest;
            self.screen.map_window(id);
            id
        }

        pub(crate) fn wid(&self, id: DrawableId) -> WindowId {
            self.screen.record(id).expect("framed").wid
        }
    }
}
