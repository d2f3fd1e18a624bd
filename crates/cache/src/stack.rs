//! The slice stack: a cache of pre-rendered cross-sections
//!
//! A [`SliceStack`] owns one off-screen render target per slice of a
//! renderable along its current depth axis. Slices are regenerated
//! lazily: mutating the renderable only marks slots dirty and queues
//! them for refresh on the idle queue, one slot per tick, ordered so
//! that the slices nearest the viewer are rebuilt first. Drawing a
//! dirty slice refreshes it synchronously as a backstop.
//!
//! Teardown is asynchronous as well: the stack empties itself
//! immediately and hands each target to the idle queue for release, so
//! destroying a large stack never stalls the caller.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use sliceview_render::{
    Bounds3, RenderContext, RenderTarget, Renderable, SliceAxes, SliceTransform, TargetFactory,
    TRANSPARENT,
};
use sliceview_scheduler::{CancellationToken, IdleQueue};

use crate::config::StackConfig;
use crate::index::SliceIndexer;

/// Shared handle to the renderable a stack draws.
pub type SharedRenderable = Arc<Mutex<dyn Renderable>>;

/// The idle queue slice stacks schedule refresh and release work on.
pub type RenderQueue = IdleQueue<dyn RenderContext>;

static NEXT_STACK_ID: AtomicU64 = AtomicU64::new(0);

/// Counters and gauges describing a stack's activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StackStats {
    /// Current number of slots.
    pub slot_count: usize,
    /// Slots whose content is stale.
    pub dirty_slots: usize,
    /// Slots still waiting in the refresh queue.
    pub pending_refreshes: usize,
    /// Slots regenerated from the idle queue.
    pub refreshes: u64,
    /// Slots regenerated synchronously on the draw path.
    pub sync_refreshes: u64,
    /// Queue entries consumed for slots that were already clean.
    pub skipped_clean: u64,
    /// Refresh attempts deferred because the renderable was not ready.
    pub skipped_not_ready: u64,
    /// Work discarded because the stack was reconfigured or destroyed
    /// while it was in flight.
    pub dropped_stale: u64,
    /// Calls to [`SliceStack::draw`].
    pub draws: u64,
    /// Resizes that fell back to the default slot size.
    pub resize_fallbacks: u64,
    /// Refreshes abandoned because no usable surface could be allocated.
    pub resize_failures: u64,
    /// Targets released, either at teardown or after going stale.
    pub targets_released: u64,
}

struct Slot {
    /// `None` while the target is checked out by in-flight refresh or
    /// draw work, or after teardown.
    target: Option<Box<dyn RenderTarget>>,
    dirty: bool,
}

struct StackState {
    axes: Option<SliceAxes>,
    indexer: Option<SliceIndexer>,
    slots: Vec<Slot>,
    refresh_queue: VecDeque<usize>,
    last_drawn: Option<usize>,
    /// Bumped on every reconfigure and teardown; in-flight work carries
    /// the generation it started under and is discarded on mismatch.
    generation: u64,
    /// Guards queued refresh ticks; replaced, not reset, so cancelled
    /// ticks stay cancelled.
    loop_token: CancellationToken,
    refreshes: u64,
    sync_refreshes: u64,
    skipped_clean: u64,
    skipped_not_ready: u64,
    dropped_stale: u64,
    draws: u64,
    resize_fallbacks: u64,
    resize_failures: u64,
    targets_released: u64,
}

struct StackInner {
    name: String,
    renderable: SharedRenderable,
    targets: TargetFactory,
    queue: RenderQueue,
    config: StackConfig,
    state: Mutex<StackState>,
}

/// A stack of pre-rendered slices for one renderable.
///
/// Cheap to clone; clones share the same slots and counters. Queued
/// work holds only weak references, so dropping every clone lets the
/// stack be freed even with ticks still pending.
#[derive(Clone)]
pub struct SliceStack {
    inner: Arc<StackInner>,
}

impl SliceStack {
    /// Creates an empty stack. No slots exist until [`set_axes`] is
    /// called.
    ///
    /// [`set_axes`]: SliceStack::set_axes
    pub fn new(
        renderable: SharedRenderable,
        targets: TargetFactory,
        queue: RenderQueue,
        config: StackConfig,
    ) -> Self {
        let id = NEXT_STACK_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            inner: Arc::new(StackInner {
                name: format!("stack{}", id),
                renderable,
                targets,
                queue,
                config,
                state: Mutex::new(StackState {
                    axes: None,
                    indexer: None,
                    slots: Vec::new(),
                    refresh_queue: VecDeque::new(),
                    last_drawn: None,
                    generation: 0,
                    loop_token: CancellationToken::new(),
                    refreshes: 0,
                    sync_refreshes: 0,
                    skipped_clean: 0,
                    skipped_not_ready: 0,
                    dropped_stale: 0,
                    draws: 0,
                    resize_fallbacks: 0,
                    resize_failures: 0,
                    targets_released: 0,
                }),
            }),
        }
    }

    /// The stack's unique name, used to key its queue tasks.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The sizing policy this stack was built with.
    pub fn config(&self) -> &StackConfig {
        &self.inner.config
    }

    /// Orients the stack: slices run along the axis perpendicular to
    /// the `(xax, yax)` display plane.
    ///
    /// Existing slots are discarded (their targets released through the
    /// queue) and a fresh set is allocated, sized from the renderable's
    /// depth resolution when it reports one. All new slots start dirty
    /// and a refresh cycle is scheduled.
    pub fn set_axes(&self, xax: usize, yax: usize) {
        let inner = &self.inner;
        let axes = match SliceAxes::new(xax, yax) {
            Some(axes) => axes,
            None => {
                debug_assert!(false, "invalid slice axes ({}, {})", xax, yax);
                log::warn!("{}: invalid slice axes ({}, {})", inner.name, xax, yax);
                return;
            }
        };

        let requested = {
            let mut renderable = inner.renderable.lock().unwrap();
            renderable.set_axes(axes);
            renderable
                .data_resolution(axes.xax(), axes.yax())
                .map(|res| res[axes.zax()] as usize)
        };
        let count = inner.config.clamped_slot_count(requested);

        let old = {
            let mut state = inner.state.lock().unwrap();
            let old = StackInner::drain_slots(&mut state);
            state.generation += 1;
            state.loop_token.cancel();
            state.loop_token = CancellationToken::new();
            state.axes = Some(axes);
            state.indexer = None;
            state.last_drawn = None;
            let generation = state.generation;
            state.slots = (0..count)
                .map(|index| Slot {
                    target: Some((inner.targets)(&format!(
                        "{}.gen{}.slot{}",
                        inner.name, generation, index
                    ))),
                    dirty: true,
                })
                .collect();
            old
        };
        StackInner::release_async(inner, old);

        log::debug!("{}: configured {} slots ({})", inner.name, count, axes);
        self.on_data_changed();
    }

    /// Tells the stack that the renderable's data or display bounds
    /// changed. Recomputes the depth mapping and invalidates every
    /// slot.
    pub fn on_data_changed(&self) {
        let inner = &self.inner;
        let bounds = { inner.renderable.lock().unwrap().display_bounds() };
        {
            let mut state = inner.state.lock().unwrap();
            let axes = match state.axes {
                Some(axes) => axes,
                None => return,
            };
            let (zmin, zmax) = bounds.range(axes.zax());
            let len = state.slots.len();
            state.indexer = SliceIndexer::new(zmin, zmax, len);
            if state.indexer.is_none() {
                log::warn!(
                    "{}: degenerate depth range [{}, {}], stack disabled",
                    inner.name,
                    zmin,
                    zmax
                );
            }
        }
        self.invalidate_all();
    }

    /// Marks every slot dirty and rebuilds the refresh queue.
    ///
    /// The queue interleaves outward from the last slice served (or the
    /// middle of the stack before any draw), so refreshes reach the
    /// slices the viewer is looking at first. Scheduling is idempotent:
    /// repeated invalidations while a cycle is pending leave a single
    /// tick on the idle queue.
    pub fn invalidate_all(&self) {
        let inner = &self.inner;
        let token = {
            let mut state = inner.state.lock().unwrap();
            let len = state.slots.len();
            if len == 0 {
                state.refresh_queue.clear();
                return;
            }
            let start = match state.last_drawn {
                Some(index) => index.min(len - 1),
                None => len / 2,
            };
            for slot in &mut state.slots {
                slot.dirty = true;
            }
            state.refresh_queue = interleaved_refresh_order(len, start).into();
            log::debug!(
                "{}: invalidated {} slots, refreshing outward from {}",
                inner.name,
                len,
                start
            );
            state.loop_token.clone()
        };
        StackInner::schedule_tick(inner, &token);
    }

    /// Runs one step of the refresh cycle against `ctx`.
    ///
    /// Normally driven by the idle queue; exposed so hosts without an
    /// idle loop can pump the cycle themselves. Consumes one queue
    /// entry: a dirty slot is refreshed, a clean one is skipped. Leaves
    /// a follow-up tick on the idle queue while entries remain.
    pub fn run_one_refresh_step(&self, ctx: &mut dyn RenderContext) {
        StackInner::run_refresh_tick(&self.inner, ctx);
    }

    /// Draws the slice containing depth position `zpos` onto the
    /// current viewport.
    ///
    /// Records the slot as the most recently served so the next refresh
    /// cycle starts near it. A dirty slot is refreshed synchronously
    /// first; if it cannot be refreshed (renderable not ready, no
    /// usable surface) nothing is drawn. Positions outside the depth
    /// range fall into the nearest end slice.
    pub fn draw(&self, ctx: &mut dyn RenderContext, zpos: f64, xform: Option<&SliceTransform>) {
        let inner = &self.inner;
        let (index, axes, dirty) = {
            let mut state = inner.state.lock().unwrap();
            let (axes, indexer) = match (state.axes, state.indexer) {
                (Some(axes), Some(indexer)) => (axes, indexer),
                _ => {
                    log::debug!("{}: draw before configuration", inner.name);
                    return;
                }
            };
            let index = indexer.position_to_index(zpos);
            state.draws += 1;
            state.last_drawn = Some(index);
            let dirty = match state.slots.get(index) {
                Some(slot) => slot.dirty,
                None => {
                    debug_assert!(false, "slot index {} out of range", index);
                    return;
                }
            };
            (index, axes, dirty)
        };

        if dirty {
            if StackInner::refresh_slot(inner, ctx, index) {
                inner.state.lock().unwrap().sync_refreshes += 1;
            } else {
                log::debug!(
                    "{}: slice at {:.3} not refreshable, drawing nothing",
                    inner.name,
                    zpos
                );
                return;
            }
        }

        let (mut target, generation) = {
            let mut state = inner.state.lock().unwrap();
            let generation = state.generation;
            match state.slots.get_mut(index).and_then(|slot| slot.target.take()) {
                Some(target) => (target, generation),
                None => return,
            }
        };
        let bounds = { inner.renderable.lock().unwrap().display_bounds() };
        if let Err(err) = target.draw_on_bounds(
            ctx,
            zpos,
            bounds.range(axes.xax()),
            bounds.range(axes.yax()),
            axes,
            xform,
        ) {
            log::warn!("{}: draw of slot {} failed: {}", inner.name, index, err);
        }
        StackInner::return_target(inner, ctx, index, generation, target, false);
    }

    /// Tears the stack down.
    ///
    /// Slots and the refresh queue are emptied immediately and any
    /// pending refresh ticks are cancelled; the targets themselves are
    /// released one per idle-queue task. The stack can be reconfigured
    /// again afterwards with [`set_axes`].
    ///
    /// [`set_axes`]: SliceStack::set_axes
    pub fn destroy_all(&self) {
        let inner = &self.inner;
        let old = {
            let mut state = inner.state.lock().unwrap();
            state.generation += 1;
            state.loop_token.cancel();
            state.loop_token = CancellationToken::new();
            state.axes = None;
            state.indexer = None;
            state.last_drawn = None;
            StackInner::drain_slots(&mut state)
        };
        log::debug!("{}: destroyed, releasing {} targets", inner.name, old.len());
        StackInner::release_async(inner, old);
    }

    /// Current number of slots.
    pub fn slot_count(&self) -> usize {
        self.inner.state.lock().unwrap().slots.len()
    }

    /// True once [`set_axes`] has built a usable stack.
    ///
    /// [`set_axes`]: SliceStack::set_axes
    pub fn is_configured(&self) -> bool {
        let state = self.inner.state.lock().unwrap();
        state.axes.is_some() && state.indexer.is_some() && !state.slots.is_empty()
    }

    /// The depth range currently covered by the stack.
    pub fn slice_range(&self) -> Option<(f64, f64)> {
        let state = self.inner.state.lock().unwrap();
        state.indexer.map(|indexer| indexer.range())
    }

    /// The depth position at the centre of slot `index`.
    pub fn slot_position(&self, index: usize) -> Option<f64> {
        let state = self.inner.state.lock().unwrap();
        state.indexer.and_then(|indexer| {
            if index < indexer.len() {
                Some(indexer.index_to_position(index))
            } else {
                None
            }
        })
    }

    /// The slot that would serve depth position `zpos`.
    pub fn slot_index_at(&self, zpos: f64) -> Option<usize> {
        let state = self.inner.state.lock().unwrap();
        state.indexer.map(|indexer| indexer.position_to_index(zpos))
    }

    /// The most recently drawn slot, if any.
    pub fn last_drawn_index(&self) -> Option<usize> {
        self.inner.state.lock().unwrap().last_drawn
    }

    /// Number of slots still waiting in the refresh queue.
    pub fn pending_refreshes(&self) -> usize {
        self.inner.state.lock().unwrap().refresh_queue.len()
    }

    /// Snapshot of the stack's counters.
    pub fn stats(&self) -> StackStats {
        let state = self.inner.state.lock().unwrap();
        StackStats {
            slot_count: state.slots.len(),
            dirty_slots: state.slots.iter().filter(|slot| slot.dirty).count(),
            pending_refreshes: state.refresh_queue.len(),
            refreshes: state.refreshes,
            sync_refreshes: state.sync_refreshes,
            skipped_clean: state.skipped_clean,
            skipped_not_ready: state.skipped_not_ready,
            dropped_stale: state.dropped_stale,
            draws: state.draws,
            resize_fallbacks: state.resize_fallbacks,
            resize_failures: state.resize_failures,
            targets_released: state.targets_released,
        }
    }
}

impl StackInner {
    /// Empties the slot list and refresh queue, returning every target
    /// still held by a slot. Checked-out targets are not included; the
    /// generation bump makes their owners release them on return.
    fn drain_slots(state: &mut StackState) -> Vec<Box<dyn RenderTarget>> {
        state.refresh_queue.clear();
        state.slots.drain(..).filter_map(|slot| slot.target).collect()
    }

    /// Hands each target to the idle queue for release, one per task.
    fn release_async(inner: &Arc<StackInner>, targets: Vec<Box<dyn RenderTarget>>) {
        for mut target in targets {
            let weak = Arc::downgrade(inner);
            inner.queue.enqueue(move |ctx: &mut (dyn RenderContext + 'static)| {
                target.release(ctx);
                if let Some(inner) = weak.upgrade() {
                    inner.state.lock().unwrap().targets_released += 1;
                }
            });
        }
    }

    /// Puts one refresh tick on the idle queue. Named, so repeated
    /// scheduling while a tick is already pending is a no-op.
    fn schedule_tick(inner: &Arc<StackInner>, token: &CancellationToken) {
        let weak = Arc::downgrade(inner);
        let name = format!("{}.refresh", inner.name);
        inner.queue.enqueue_guarded(&name, token, move |ctx: &mut (dyn RenderContext + 'static)| {
            if let Some(inner) = weak.upgrade() {
                StackInner::run_refresh_tick(&inner, ctx);
            }
        });
    }

    fn run_refresh_tick(inner: &Arc<StackInner>, ctx: &mut dyn RenderContext) {
        let entry = {
            let mut state = inner.state.lock().unwrap();
            if state.slots.is_empty() {
                state.refresh_queue.clear();
                return;
            }
            match state.refresh_queue.pop_front() {
                Some(index) => {
                    let dirty = state.slots.get(index).map(|slot| slot.dirty);
                    Some((index, dirty))
                }
                None => None,
            }
        };

        match entry {
            Some((index, Some(true))) => {
                if StackInner::refresh_slot(inner, ctx, index) {
                    inner.state.lock().unwrap().refreshes += 1;
                }
            }
            Some((_, Some(false))) => {
                inner.state.lock().unwrap().skipped_clean += 1;
            }
            Some((index, None)) => {
                debug_assert!(false, "queued slot index {} out of range", index);
            }
            None => return,
        }

        // Keep the cycle alive while entries remain.
        let token = {
            let state = inner.state.lock().unwrap();
            if state.refresh_queue.is_empty() {
                None
            } else {
                Some(state.loop_token.clone())
            }
        };
        if let Some(token) = token {
            StackInner::schedule_tick(inner, &token);
        }
    }

    /// Regenerates the content of slot `index`. Returns true if the
    /// slot ended up clean.
    ///
    /// The target is checked out of the slot so no stack lock is held
    /// while renderable or target code runs; the generation recorded at
    /// checkout decides whether the target goes back or gets released.
    fn refresh_slot(inner: &Arc<StackInner>, ctx: &mut dyn RenderContext, index: usize) -> bool {
        if !inner.renderable.lock().unwrap().ready() {
            inner.state.lock().unwrap().skipped_not_ready += 1;
            log::debug!("{}: renderable not ready, slot {} left dirty", inner.name, index);
            return false;
        }

        let (mut target, generation, axes, indexer) = {
            let mut state = inner.state.lock().unwrap();
            let (axes, indexer) = match (state.axes, state.indexer) {
                (Some(axes), Some(indexer)) => (axes, indexer),
                _ => return false,
            };
            let slot = match state.slots.get_mut(index) {
                Some(slot) => slot,
                None => return false,
            };
            let target = match slot.target.take() {
                Some(target) => target,
                None => return false,
            };
            (target, state.generation, axes, indexer)
        };

        let zpos = indexer.index_to_position(index);

        let requested = {
            let renderable = inner.renderable.lock().unwrap();
            renderable
                .data_resolution(axes.xax(), axes.yax())
                .map(|res| (res[axes.xax()], res[axes.yax()]))
        };
        let (width, height) = inner.config.clamped_slot_size(requested);

        if !StackInner::generation_current(inner, generation) {
            StackInner::discard_stale(inner, ctx, target);
            return false;
        }

        if target.size() != (width, height) {
            if let Err(err) = target.set_size(width, height) {
                log::warn!(
                    "{}: could not size slot {} to {}x{}: {}",
                    inner.name,
                    index,
                    width,
                    height,
                    err
                );
                inner.state.lock().unwrap().resize_fallbacks += 1;
                let fallback = inner.config.clamped_slot_size(None);
                if fallback == (width, height) || target.set_size(fallback.0, fallback.1).is_err() {
                    inner.state.lock().unwrap().resize_failures += 1;
                    log::warn!("{}: no usable surface for slot {}", inner.name, index);
                    return StackInner::return_target(inner, ctx, index, generation, target, false);
                }
            }
        }
        let (width, height) = target.size();

        if !StackInner::generation_current(inner, generation) {
            StackInner::discard_stale(inner, ctx, target);
            return false;
        }

        let saved = ctx.save_transform();
        if let Err(err) = target.bind(ctx) {
            log::warn!("{}: bind of slot {} failed: {}", inner.name, index, err);
            ctx.restore_transform(saved);
            return StackInner::return_target(inner, ctx, index, generation, target, false);
        }

        let bounds = { inner.renderable.lock().unwrap().display_bounds() };
        ctx.set_ortho(axes, width, height, &bounds);
        ctx.clear(TRANSPARENT);
        {
            let mut renderable = inner.renderable.lock().unwrap();
            renderable.pre_draw(ctx);
            renderable.draw(ctx, zpos);
            renderable.post_draw(ctx);
        }
        target.unbind(ctx);
        ctx.restore_transform(saved);
        log::debug!("{}: refreshed slot {} at {:.3}", inner.name, index, zpos);

        StackInner::return_target(inner, ctx, index, generation, target, true)
    }

    fn generation_current(inner: &StackInner, generation: u64) -> bool {
        inner.state.lock().unwrap().generation == generation
    }

    /// Releases a checked-out target whose stack has moved on.
    fn discard_stale(inner: &Arc<StackInner>, ctx: &mut dyn RenderContext, mut target: Box<dyn RenderTarget>) {
        target.release(ctx);
        let mut state = inner.state.lock().unwrap();
        state.dropped_stale += 1;
        state.targets_released += 1;
    }

    /// Returns a checked-out target to its slot, marking the slot clean
    /// when `refreshed` is set. If the stack was reconfigured or torn
    /// down in the meantime the target is released instead. Returns
    /// true only for a completed refresh into a live slot.
    fn return_target(
        inner: &Arc<StackInner>,
        ctx: &mut dyn RenderContext,
        index: usize,
        generation: u64,
        mut target: Box<dyn RenderTarget>,
        refreshed: bool,
    ) -> bool {
        let mut state = inner.state.lock().unwrap();
        let live = state.generation == generation
            && matches!(state.slots.get(index), Some(slot) if slot.target.is_none());
        if live {
            let slot = &mut state.slots[index];
            slot.target = Some(target);
            if refreshed {
                slot.dirty = false;
            }
            refreshed
        } else {
            state.dropped_stale += 1;
            state.targets_released += 1;
            drop(state);
            target.release(ctx);
            false
        }
    }
}

/// The order in which an all-dirty stack refreshes: start at `start`
/// and fan outward, strictly alternating between the slices above it
/// and the slices below it until one side runs out.
fn interleaved_refresh_order(len: usize, start: usize) -> Vec<usize> {
    debug_assert!(start < len);
    let mut above = start..len;
    let mut below = (0..start).rev();
    let mut order = Vec::with_capacity(len);
    for turn in 0.. {
        let next = if turn % 2 == 0 {
            above.next().or_else(|| below.next())
        } else {
            below.next().or_else(|| above.next())
        };
        match next {
            Some(index) => order.push(index),
            None => break,
        }
    }
    order
}
