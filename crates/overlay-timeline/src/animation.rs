// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Playback state machine and animation timer.
//!
//! [`Playback`] is the synchronous state machine: it owns the scroll offset
//! and the current position and answers every input with an [`Update`]
//! describing what to write back to the UI. [`AnimationEngine`] wraps it with
//! an owned, cancellable timer task and the outbound capabilities.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::slider::{SliderLayout, SliderTimeline, TimelinePosition};

/// Animation ticks needed to advance by one full step.
pub const TICKS_PER_STEP: f64 = 12.0;

/// Tick interval used when the overlay does not specify one.
pub const DEFAULT_ANIMATION_INTERVAL: Duration = Duration::from_millis(50);

/// Who is currently driving the scroll offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Dragging,
    Animating,
}

/// Why an animation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Paused,
    FocusLost,
    OverlayChanged,
    TimeReset,
    UserDrag,
    ReachedEnd,
}

/// Side effects produced by one state machine input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    /// Offset to write back to the scroll surface
    pub scroll_to: Option<f64>,
    /// New published position (`Some(None)` publishes "loading")
    pub position: Option<Option<TimelinePosition>>,
    /// Play a selection haptic
    pub haptic: bool,
    /// The animation stopped for this reason
    pub stopped: Option<StopReason>,
}

impl Update {
    fn merge(self, later: Update) -> Update {
        Update {
            scroll_to: later.scroll_to.or(self.scroll_to),
            position: later.position.or(self.position),
            haptic: self.haptic || later.haptic,
            stopped: self.stopped.or(later.stopped),
        }
    }
}

/// Drag/animation state machine over a slider timeline.
#[derive(Debug, Clone)]
pub struct Playback {
    state: PlaybackState,
    offset: f64,
    timeline: SliderTimeline,
    layout: SliderLayout,
    position: Option<TimelinePosition>,
}

impl Playback {
    #[must_use]
    pub fn new(layout: SliderLayout) -> Self {
        Self {
            state: PlaybackState::Idle,
            offset: 0.0,
            timeline: SliderTimeline::default(),
            layout,
            position: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    #[must_use]
    pub fn offset(&self) -> f64 {
        self.offset
    }

    #[must_use]
    pub fn position(&self) -> Option<TimelinePosition> {
        self.position
    }

    #[must_use]
    pub fn timeline(&self) -> &SliderTimeline {
        &self.timeline
    }

    #[must_use]
    pub fn layout(&self) -> &SliderLayout {
        &self.layout
    }

    /// Replace the timeline, e.g. after an overlay or step change.
    ///
    /// Stops any animation. The displayed time is kept when the new timeline
    /// covers it, otherwise `anchor` (typically now) is selected.
    pub fn set_timeline(&mut self, timeline: SliderTimeline, layout: SliderLayout, anchor: i64) -> Update {
        let stopped = self.stop(StopReason::OverlayChanged);

        let target = self.position.map_or(anchor, |p| p.timestamp);
        self.timeline = timeline;
        self.layout = layout;

        let index = self.timeline.index_at_or_before(target).unwrap_or(0);
        self.offset = self.layout.nominal_offset(index);

        stopped.merge(Update {
            scroll_to: Some(self.offset),
            position: self.remap(),
            ..Update::default()
        })
    }

    /// Drop the timeline and publish "loading".
    pub fn reset(&mut self) -> Update {
        let stopped = self.stop(StopReason::TimeReset);
        self.timeline = SliderTimeline::default();
        self.offset = 0.0;

        stopped.merge(Update {
            scroll_to: Some(0.0),
            position: self.remap(),
            ..Update::default()
        })
    }

    /// The user started a scroll gesture; cancels any animation.
    pub fn begin_drag(&mut self) -> Update {
        let stopped = self.stop(StopReason::UserDrag);
        self.state = PlaybackState::Dragging;
        stopped
    }

    /// The scroll surface reported a new offset.
    ///
    /// Ignored while animating: the engine owns the offset then and the
    /// surface merely echoes what was written to it.
    pub fn scroll(&mut self, offset: f64) -> Update {
        if self.state == PlaybackState::Animating {
            return Update::default();
        }

        self.offset = if offset.is_finite() { offset.max(0.0) } else { 0.0 };
        let position = self.remap();
        Update {
            haptic: position.is_some(),
            position,
            ..Update::default()
        }
    }

    /// The gesture (or its momentum) ended; rest exactly on the selected step.
    pub fn end_drag(&mut self) -> Update {
        if self.state == PlaybackState::Animating {
            return Update::default();
        }

        self.state = PlaybackState::Idle;
        match self.position {
            Some(position) => {
                self.offset = self.layout.nominal_offset(position.index);
                Update {
                    scroll_to: Some(self.offset),
                    ..Update::default()
                }
            }
            None => Update::default(),
        }
    }

    /// Start animating from the current offset.
    ///
    /// Playback started on the last step rewinds to the first one. Nothing
    /// happens when there is no timeline.
    pub fn play(&mut self) -> Update {
        if self.state == PlaybackState::Animating || self.timeline.is_empty() {
            return Update::default();
        }

        let mut update = Update::default();
        if self.position.map(|p| p.index) == self.timeline.last_index() {
            self.offset = 0.0;
            update.scroll_to = Some(0.0);
            update.position = self.remap();
        }

        self.state = PlaybackState::Animating;
        update
    }

    /// Stop animating. Idempotent: stopping a stopped machine does nothing.
    pub fn stop(&mut self, reason: StopReason) -> Update {
        if self.state != PlaybackState::Animating {
            return Update::default();
        }

        self.state = PlaybackState::Idle;
        let scroll_to = self.position.map(|p| {
            self.offset = self.layout.nominal_offset(p.index);
            self.offset
        });

        Update {
            scroll_to,
            stopped: Some(reason),
            ..Update::default()
        }
    }

    /// Advance one animation frame; stops on reaching the last step.
    pub fn tick(&mut self) -> Update {
        if self.state != PlaybackState::Animating {
            return Update::default();
        }

        let max_offset = self.layout.max_offset(self.timeline.len());
        self.offset = (self.offset + self.layout.tick_advance()).min(max_offset);
        let position = self.remap();

        let stopped = if self.offset >= max_offset {
            self.state = PlaybackState::Idle;
            Some(StopReason::ReachedEnd)
        } else {
            None
        };

        Update {
            scroll_to: Some(self.offset),
            position,
            haptic: false,
            stopped,
        }
    }

    fn remap(&mut self) -> Option<Option<TimelinePosition>> {
        let next = self.timeline.position_for_offset(self.offset, &self.layout);
        if next == self.position {
            None
        } else {
            self.position = next;
            Some(next)
        }
    }
}

/// Write access to the UI scroll surface.
///
/// Called with the engine locked: implementations must not call back into
/// the [`AnimationEngine`] synchronously. Echoed offsets are delivered later
/// through [`ScrollEvents::on_offset_changed`].
pub trait ScrollSurface: Send + Sync {
    fn scroll_to(&self, offset: f64);
}

/// Tactile feedback on manual index changes; same locking rule as
/// [`ScrollSurface`].
pub trait Haptics: Send + Sync {
    fn selection_changed(&self);
}

/// Scroll gesture callbacks delivered by the UI layer.
pub trait ScrollEvents {
    fn on_gesture_start(&self);
    fn on_offset_changed(&self, offset: f64);
    fn on_gesture_end(&self);
}

struct Outputs {
    surface: Arc<dyn ScrollSurface>,
    haptics: Arc<dyn Haptics>,
    position_tx: watch::Sender<Option<TimelinePosition>>,
}

impl Outputs {
    fn apply(&self, update: &Update) {
        if let Some(offset) = update.scroll_to {
            self.surface.scroll_to(offset);
        }
        if let Some(position) = update.position {
            self.position_tx.send_replace(position);
        }
        if update.haptic {
            self.haptics.selection_changed();
        }
        if let Some(reason) = update.stopped {
            debug!("Animation stopped: {:?}", reason);
        }
    }
}

struct TimerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl TimerHandle {
    fn cancel(self) {
        self.token.cancel();
        self.task.abort();
    }
}

struct EngineInner {
    playback: Playback,
    timer: Option<TimerHandle>,
    interval: Duration,
}

impl EngineInner {
    // Any state other than Animating owns no timer.
    fn release_timer_unless_animating(&mut self) {
        if self.playback.state() != PlaybackState::Animating {
            if let Some(timer) = self.timer.take() {
                timer.cancel();
            }
        }
    }
}

fn lock(inner: &Mutex<EngineInner>) -> MutexGuard<'_, EngineInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives a [`Playback`] from UI events and an owned animation timer and
/// publishes the selected position.
///
/// Must be used inside a Tokio runtime; `play` spawns the timer task.
pub struct AnimationEngine {
    inner: Arc<Mutex<EngineInner>>,
    outputs: Arc<Outputs>,
}

impl std::fmt::Debug for AnimationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("AnimationEngine")
            .field("state", &inner.playback.state())
            .field("offset", &inner.playback.offset())
            .field("position", &inner.playback.position())
            .field("timer", &inner.timer.is_some())
            .finish_non_exhaustive()
    }
}

impl AnimationEngine {
    #[must_use]
    pub fn new(surface: Arc<dyn ScrollSurface>, haptics: Arc<dyn Haptics>, layout: SliderLayout) -> Self {
        let (position_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(Mutex::new(EngineInner {
                playback: Playback::new(layout),
                timer: None,
                interval: DEFAULT_ANIMATION_INTERVAL,
            })),
            outputs: Arc::new(Outputs {
                surface,
                haptics,
                position_tx,
            }),
        }
    }

    /// Subscribe to the published position; `None` means loading.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<TimelinePosition>> {
        self.outputs.position_tx.subscribe()
    }

    #[must_use]
    pub fn position(&self) -> Option<TimelinePosition> {
        lock(&self.inner).playback.position()
    }

    #[must_use]
    pub fn state(&self) -> PlaybackState {
        lock(&self.inner).playback.state()
    }

    #[must_use]
    pub fn offset(&self) -> f64 {
        lock(&self.inner).playback.offset()
    }

    /// Whether an animation timer task is currently owned.
    #[must_use]
    pub fn has_live_timer(&self) -> bool {
        lock(&self.inner).timer.is_some()
    }

    /// Install a new timeline (overlay or step change); cancels playback.
    pub fn set_timeline(
        &self,
        timeline: SliderTimeline,
        layout: SliderLayout,
        interval: Option<Duration>,
        anchor: i64,
    ) {
        self.dispatch(|inner| {
            inner.interval = interval.unwrap_or(DEFAULT_ANIMATION_INTERVAL);
            inner.playback.set_timeline(timeline, layout, anchor)
        });
    }

    /// The displayed time went back to "not ready".
    pub fn reset_time(&self) {
        self.dispatch(|inner| inner.playback.reset());
    }

    /// Start playback. Returns false when there is nothing to animate.
    pub fn play(&self) -> bool {
        let mut inner = lock(&self.inner);
        let update = inner.playback.play();
        let animating = inner.playback.state() == PlaybackState::Animating;
        if animating && inner.timer.is_none() {
            let interval = inner.interval;
            inner.timer = Some(self.spawn_timer(interval));
            info!("Animation started at {:?} per frame", interval);
        }
        self.outputs.apply(&update);
        animating
    }

    pub fn pause(&self) {
        self.stop(StopReason::Paused);
    }

    /// Play when idle, pause when animating.
    pub fn toggle(&self) -> bool {
        if self.state() == PlaybackState::Animating {
            self.pause();
            false
        } else {
            self.play()
        }
    }

    pub fn focus_lost(&self) {
        self.stop(StopReason::FocusLost);
    }

    pub fn overlay_changed(&self) {
        self.stop(StopReason::OverlayChanged);
    }

    fn stop(&self, reason: StopReason) {
        self.dispatch(|inner| inner.playback.stop(reason));
    }

    // Effects are applied under the engine lock so that a cancelled tick can
    // never write after the transition that cancelled it.
    fn dispatch(&self, input: impl FnOnce(&mut EngineInner) -> Update) {
        let mut inner = lock(&self.inner);
        let update = input(&mut inner);
        inner.release_timer_unless_animating();
        self.outputs.apply(&update);
    }

    fn spawn_timer(&self, interval: Duration) -> TimerHandle {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let inner = Arc::clone(&self.inner);
        let outputs = Arc::clone(&self.outputs);

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    () = task_token.cancelled() => return,
                    _ = ticker.tick() => {}
                }

                let mut engine = lock(&inner);
                // Cancellation happens under this lock, so a stopped engine
                // never sees another frame or its side effects.
                if task_token.is_cancelled() {
                    return;
                }
                let update = engine.playback.tick();
                if update.stopped.is_some() {
                    engine.timer = None;
                }
                outputs.apply(&update);
                if update.stopped.is_some() {
                    return;
                }
            }
        });

        TimerHandle { token, task }
    }
}

impl ScrollEvents for AnimationEngine {
    fn on_gesture_start(&self) {
        self.dispatch(|inner| inner.playback.begin_drag());
    }

    fn on_offset_changed(&self, offset: f64) {
        self.dispatch(|inner| inner.playback.scroll(offset));
    }

    fn on_gesture_end(&self) {
        self.dispatch(|inner| inner.playback.end_drag());
    }
}

impl Drop for AnimationEngine {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.inner).timer.take() {
            timer.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::TimeWindow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingSurface {
        offsets: Mutex<Vec<f64>>,
    }

    impl ScrollSurface for RecordingSurface {
        fn scroll_to(&self, offset: f64) {
            self.offsets.lock().unwrap().push(offset);
        }
    }

    #[derive(Default)]
    struct CountingHaptics {
        count: AtomicUsize,
    }

    impl Haptics for CountingHaptics {
        fn selection_changed(&self) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    // 96 px steps advance exactly 8 px per tick
    fn layout() -> SliderLayout {
        SliderLayout {
            step_width: 96.0,
            last_segment_width: 120.0,
        }
    }

    fn timeline(steps: i64) -> SliderTimeline {
        SliderTimeline::from_window(&TimeWindow::new(0, steps * 3600, 3600))
    }

    fn playback(steps: i64) -> Playback {
        let mut playback = Playback::new(layout());
        playback.set_timeline(timeline(steps), layout(), 0);
        playback
    }

    #[test]
    fn test_set_timeline_selects_anchor() {
        let mut playback = Playback::new(layout());
        let update = playback.set_timeline(timeline(4), layout(), 2 * 3600 + 10);
        assert_eq!(
            update.position,
            Some(Some(TimelinePosition { index: 2, timestamp: 7200 }))
        );
        assert_eq!(update.scroll_to, Some(192.0));
    }

    #[test]
    fn test_set_timeline_keeps_displayed_time() {
        let mut playback = playback(4);
        playback.scroll(3.0 * 96.0);
        assert_eq!(playback.position().unwrap().timestamp, 3 * 3600);

        let half_hourly = SliderTimeline::from_window(&TimeWindow::new(0, 4 * 3600, 1800));
        playback.set_timeline(half_hourly, layout(), 0);
        assert_eq!(playback.position(), Some(TimelinePosition { index: 6, timestamp: 3 * 3600 }));
    }

    #[test]
    fn test_drag_maps_offsets_with_haptics() {
        let mut playback = playback(4);
        assert!(playback.begin_drag().stopped.is_none());
        assert_eq!(playback.state(), PlaybackState::Dragging);

        let update = playback.scroll(150.0);
        assert_eq!(update.position, Some(Some(TimelinePosition { index: 1, timestamp: 3600 })));
        assert!(update.haptic);

        // Same index, no publish, no haptic
        let update = playback.scroll(160.0);
        assert_eq!(update, Update::default());
    }

    #[test]
    fn test_end_drag_snaps_to_step() {
        let mut playback = playback(4);
        playback.begin_drag();
        playback.scroll(250.0);
        let update = playback.end_drag();
        assert_eq!(playback.state(), PlaybackState::Idle);
        assert_eq!(update.scroll_to, Some(192.0));
        assert!((playback.offset() - 192.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_negative_offset_clamps() {
        let mut playback = playback(4);
        playback.scroll(200.0);
        playback.scroll(-50.0);
        assert_eq!(playback.position().unwrap().index, 0);
        assert!(playback.offset().abs() < f64::EPSILON);
    }

    #[test]
    fn test_twelve_ticks_advance_one_step() {
        let mut playback = playback(4);
        playback.play();
        for _ in 0..11 {
            let update = playback.tick();
            assert!(!update.haptic);
            assert!(update.position.is_none());
        }
        let update = playback.tick();
        assert_eq!(update.position, Some(Some(TimelinePosition { index: 1, timestamp: 3600 })));
        assert!(!update.haptic);
    }

    #[test]
    fn test_ticks_stop_at_last_index() {
        let mut playback = playback(2);
        playback.play();
        let mut ticks = 0;
        loop {
            ticks += 1;
            if playback.tick().stopped == Some(StopReason::ReachedEnd) {
                break;
            }
            assert!(ticks < 100, "animation never reached the end");
        }
        assert_eq!(ticks, 24);
        assert_eq!(playback.state(), PlaybackState::Idle);
        assert_eq!(playback.position().unwrap().index, 2);
        assert_eq!(playback.tick(), Update::default());
    }

    #[test]
    fn test_play_at_end_rewinds() {
        let mut playback = playback(2);
        playback.scroll(10_000.0);
        let update = playback.play();
        assert_eq!(update.scroll_to, Some(0.0));
        assert_eq!(playback.position().unwrap().index, 0);
        assert_eq!(playback.state(), PlaybackState::Animating);
    }

    #[test]
    fn test_play_without_timeline_is_noop() {
        let mut playback = Playback::new(layout());
        assert_eq!(playback.play(), Update::default());
        assert_eq!(playback.state(), PlaybackState::Idle);
    }

    #[test]
    fn test_scroll_echo_ignored_while_animating() {
        let mut playback = playback(4);
        playback.play();
        playback.tick();
        let offset = playback.offset();
        assert_eq!(playback.scroll(300.0), Update::default());
        assert!((playback.offset() - offset).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stop_is_idempotent_and_snaps() {
        let mut playback = playback(4);
        playback.play();
        for _ in 0..18 {
            playback.tick();
        }
        let update = playback.stop(StopReason::FocusLost);
        assert_eq!(update.stopped, Some(StopReason::FocusLost));
        assert_eq!(update.scroll_to, Some(96.0));
        assert_eq!(playback.stop(StopReason::OverlayChanged), Update::default());
    }

    #[test]
    fn test_drag_cancels_animation() {
        let mut playback = playback(4);
        playback.play();
        let update = playback.begin_drag();
        assert_eq!(update.stopped, Some(StopReason::UserDrag));
        assert_eq!(playback.state(), PlaybackState::Dragging);
    }

    #[test]
    fn test_reset_publishes_loading() {
        let mut playback = playback(4);
        playback.play();
        let update = playback.reset();
        assert_eq!(update.stopped, Some(StopReason::TimeReset));
        assert_eq!(update.position, Some(None));
        assert!(playback.timeline().is_empty());
    }

    fn engine() -> (AnimationEngine, Arc<RecordingSurface>, Arc<CountingHaptics>) {
        let surface = Arc::new(RecordingSurface::default());
        let haptics = Arc::new(CountingHaptics::default());
        let engine = AnimationEngine::new(surface.clone(), haptics.clone(), layout());
        (engine, surface, haptics)
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_animates_and_publishes() {
        let (engine, surface, haptics) = engine();
        let mut rx = engine.subscribe();
        engine.set_timeline(timeline(4), layout(), Some(Duration::from_millis(100)), 0);
        assert_eq!(*rx.borrow_and_update(), Some(TimelinePosition { index: 0, timestamp: 0 }));

        assert!(engine.play());
        assert!(engine.has_live_timer());

        tokio::time::sleep(Duration::from_millis(12 * 100 + 50)).await;
        assert_eq!(engine.position().unwrap().index, 1);
        assert!(rx.has_changed().unwrap());
        assert_eq!(haptics.count.load(Ordering::SeqCst), 0);
        assert!(surface.offsets.lock().unwrap().len() >= 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_focus_loss_cancels_timer() {
        let (engine, _surface, _haptics) = engine();
        engine.set_timeline(timeline(10), layout(), Some(Duration::from_millis(50)), 0);
        engine.play();
        tokio::time::sleep(Duration::from_millis(500)).await;

        engine.focus_lost();
        assert_eq!(engine.state(), PlaybackState::Idle);
        assert!(!engine.has_live_timer());

        let position = engine.position();
        let offset = engine.offset();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(engine.position(), position);
        assert!((engine.offset() - offset).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_cancellations_leave_no_timer() {
        let (engine, _surface, _haptics) = engine();
        engine.set_timeline(timeline(10), layout(), None, 0);
        engine.play();
        engine.focus_lost();
        engine.overlay_changed();
        engine.pause();
        assert!(!engine.has_live_timer());

        assert!(engine.play());
        assert!(engine.play());
        engine.set_timeline(timeline(6), layout(), None, 0);
        assert_eq!(engine.state(), PlaybackState::Idle);
        assert!(!engine.has_live_timer());
    }

    #[tokio::test(start_paused = true)]
    async fn test_animation_releases_timer_at_end() {
        let (engine, _surface, _haptics) = engine();
        engine.set_timeline(timeline(1), layout(), Some(Duration::from_millis(10)), 0);
        engine.play();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(engine.state(), PlaybackState::Idle);
        assert!(!engine.has_live_timer());
        assert_eq!(engine.position().unwrap().index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_time_stops_and_publishes_loading() {
        let (engine, _surface, _haptics) = engine();
        let rx = engine.subscribe();
        engine.set_timeline(timeline(4), layout(), None, 0);
        engine.play();
        engine.reset_time();
        assert!(!engine.has_live_timer());
        assert_eq!(*rx.borrow(), None);
    }

    // Parks the first non-zero write until released from the test body.
    struct GatedSurface {
        offsets: Mutex<Vec<f64>>,
        parked: Mutex<Option<std::sync::mpsc::Sender<()>>>,
        release: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl ScrollSurface for GatedSurface {
        fn scroll_to(&self, offset: f64) {
            if offset > 0.0 {
                if let Some(parked) = self.parked.lock().unwrap().take() {
                    parked.send(()).unwrap();
                    self.release.lock().unwrap().recv().unwrap();
                }
            }
            self.offsets.lock().unwrap().push(offset);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pause_during_tick_leaves_surface_on_step() {
        let (parked_tx, parked_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let surface = Arc::new(GatedSurface {
            offsets: Mutex::new(Vec::new()),
            parked: Mutex::new(Some(parked_tx)),
            release: Mutex::new(release_rx),
        });
        let engine = Arc::new(AnimationEngine::new(
            surface.clone(),
            Arc::new(CountingHaptics::default()),
            layout(),
        ));
        engine.set_timeline(timeline(4), layout(), Some(Duration::from_millis(5)), 0);
        engine.play();

        // The first tick is now blocked inside scroll_to.
        tokio::task::spawn_blocking(move || parked_rx.recv().unwrap()).await.unwrap();

        let pausing = Arc::clone(&engine);
        let pause = std::thread::spawn(move || pausing.pause());
        std::thread::sleep(Duration::from_millis(50));
        release_tx.send(()).unwrap();
        pause.join().unwrap();

        assert_eq!(engine.state(), PlaybackState::Idle);
        assert!(!engine.has_live_timer());
        let offset = engine.offset();
        assert!((offset % 96.0).abs() < f64::EPSILON);
        assert_eq!(surface.offsets.lock().unwrap().last(), Some(&offset));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(surface.offsets.lock().unwrap().last(), Some(&offset));
    }

    #[tokio::test]
    async fn test_manual_scrub_plays_haptics() {
        let (engine, surface, haptics) = engine();
        engine.set_timeline(timeline(4), layout(), None, 0);
        engine.on_gesture_start();
        engine.on_offset_changed(100.0);
        engine.on_offset_changed(120.0);
        engine.on_offset_changed(200.0);
        engine.on_gesture_end();

        assert_eq!(haptics.count.load(Ordering::SeqCst), 2);
        assert_eq!(surface.offsets.lock().unwrap().last(), Some(&192.0));
        assert!(engine.toggle());
        assert!(!engine.toggle());
    }
}
