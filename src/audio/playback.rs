//! Gapless playback scheduling on a shared output clock.
//!
//! The scheduler owns `next_start`, the point on the output clock where
//! the next inbound buffer will begin. Buffers are scheduled back-to-back;
//! a network stall leaves a natural gap which is not corrected. Rendering
//! happens in a [`PlaybackSink`] (a live output stream in production, a
//! collecting fake in tests); the scheduler only decides *when* each
//! buffer starts.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::audio::codec;

/// A monotonic clock over the output timing domain.
///
/// Capture and playback share one clock while both are active, so the
/// scheduler's decisions line up with what the device actually renders.
pub trait OutputClock: Send + Sync {
    /// Time elapsed on the output clock since the timing domain began.
    fn now(&self) -> Duration;
}

/// Renders scheduled buffers. Mutation entry points are only ever called
/// from the conversation control loop.
pub trait PlaybackSink: Send {
    /// Queue `samples` to begin rendering at `start` on the shared clock.
    fn submit(&mut self, start: Duration, samples: Vec<f32>, sample_rate: u32);

    /// Immediately cancel everything queued or mid-render.
    fn cancel_all(&mut self);
}

/// The output timing domain: one clock plus the sink rendering against it.
///
/// Produced by the capture source when it starts (capture establishes the
/// audio device context) and handed to the [`PlaybackScheduler`].
pub struct ClockContext {
    pub clock: Arc<dyn OutputClock>,
    pub sink: Box<dyn PlaybackSink>,
}

/// A scheduled, not-yet-finished playback item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScheduledItem {
    start: Duration,
    duration: Duration,
}

/// Schedules decoded inbound audio for gapless, non-overlapping playback.
pub struct PlaybackScheduler {
    context: Option<ClockContext>,
    next_start: Duration,
    scheduled: Vec<ScheduledItem>,
}

impl PlaybackScheduler {
    /// Creates an unattached scheduler. Until [`attach`](Self::attach) is
    /// called, `play` drops audio — inbound buffers arriving before the
    /// timing domain exists are never queued.
    pub fn new() -> Self {
        Self {
            context: None,
            next_start: Duration::ZERO,
            scheduled: Vec::new(),
        }
    }

    /// Attaches the output timing domain established by the capture engine.
    pub fn attach(&mut self, context: ClockContext) {
        self.next_start = context.clock.now();
        self.scheduled.clear();
        self.context = Some(context);
    }

    /// Stops all playback and releases the timing domain.
    pub fn detach(&mut self) {
        self.stop_all();
        self.context = None;
        self.next_start = Duration::ZERO;
    }

    /// Whether a timing domain is attached.
    pub fn is_attached(&self) -> bool {
        self.context.is_some()
    }

    /// Decodes `frame` at `sample_rate` and schedules it to start at
    /// `max(clock.now(), next_start)`, then advances `next_start` past it.
    ///
    /// No-op when no clock is attached or the frame decodes to nothing.
    pub fn play(&mut self, frame: &[u8], sample_rate: u32) {
        let Some(context) = &mut self.context else {
            tracing::trace!("playback not attached, dropping {} bytes", frame.len());
            return;
        };
        if sample_rate == 0 {
            return;
        }

        let samples = codec::decode(frame);
        if samples.is_empty() {
            return;
        }

        let duration = Duration::from_secs_f64(samples.len() as f64 / sample_rate as f64);
        let now = context.clock.now();
        Self::prune_finished(&mut self.scheduled, now);

        let start = now.max(self.next_start);
        context.sink.submit(start, samples, sample_rate);
        self.scheduled.push(ScheduledItem { start, duration });
        self.next_start = start + duration;
    }

    /// Halts every scheduled item regardless of playback position, clears
    /// the scheduled set, and resets `next_start` to the current clock.
    ///
    /// Safe to call when items have already finished naturally, and when
    /// nothing is attached.
    pub fn stop_all(&mut self) {
        if let Some(context) = &mut self.context {
            context.sink.cancel_all();
            self.next_start = context.clock.now();
        }
        self.scheduled.clear();
    }

    /// Number of items scheduled and not yet finished on the clock.
    pub fn scheduled_len(&mut self) -> usize {
        if let Some(context) = &self.context {
            let now = context.clock.now();
            Self::prune_finished(&mut self.scheduled, now);
        }
        self.scheduled.len()
    }

    /// The clock point where the next buffer would begin.
    pub fn next_start(&self) -> Duration {
        self.next_start
    }

    fn prune_finished(scheduled: &mut Vec<ScheduledItem>, now: Duration) {
        scheduled.retain(|item| item.start + item.duration > now);
    }
}

impl Default for PlaybackScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Clock driven by hand — for tests and clock-less capture sources.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the clock to an absolute point.
    pub fn set(&self, now: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl OutputClock for ManualClock {
    fn now(&self) -> Duration {
        self.now.lock().map(|guard| *guard).unwrap_or_default()
    }
}

/// Wall-clock backed output clock, for sources without a device clock.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputClock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Sink that renders nothing. Used where audio output is irrelevant
/// (WAV-driven smoke runs) — scheduling semantics stay observable.
#[derive(Debug, Default)]
pub struct NullSink;

impl PlaybackSink for NullSink {
    fn submit(&mut self, _start: Duration, _samples: Vec<f32>, _sample_rate: u32) {}

    fn cancel_all(&mut self) {}
}

/// One recorded submission to a [`CollectingSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub start: Duration,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Sink that records submissions and cancellations, for tests.
#[derive(Clone, Default)]
pub struct CollectingSink {
    inner: Arc<Mutex<CollectingSinkInner>>,
}

#[derive(Default)]
struct CollectingSinkInner {
    submissions: Vec<Submission>,
    cancellations: usize,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All submissions recorded so far.
    pub fn submissions(&self) -> Vec<Submission> {
        self.inner
            .lock()
            .map(|inner| inner.submissions.clone())
            .unwrap_or_default()
    }

    /// Number of `cancel_all` calls seen.
    pub fn cancellations(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.cancellations)
            .unwrap_or(0)
    }
}

impl PlaybackSink for CollectingSink {
    fn submit(&mut self, start: Duration, samples: Vec<f32>, sample_rate: u32) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.submissions.push(Submission {
                start,
                samples,
                sample_rate,
            });
        }
    }

    fn cancel_all(&mut self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.cancellations += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec;

    fn attached_scheduler() -> (PlaybackScheduler, ManualClock, CollectingSink) {
        let clock = ManualClock::new();
        let sink = CollectingSink::new();
        let mut scheduler = PlaybackScheduler::new();
        scheduler.attach(ClockContext {
            clock: Arc::new(clock.clone()),
            sink: Box::new(sink.clone()),
        });
        (scheduler, clock, sink)
    }

    /// 100ms of silence encoded at the given rate.
    fn frame_of_ms(ms: u64, rate: u32) -> Vec<u8> {
        let samples = vec![0.0f32; (rate as u64 * ms / 1000) as usize];
        codec::encode(&samples)
    }

    #[test]
    fn play_without_clock_is_dropped() {
        let mut scheduler = PlaybackScheduler::new();
        scheduler.play(&frame_of_ms(100, 24000), 24000);
        assert_eq!(scheduler.scheduled_len(), 0);
        assert_eq!(scheduler.next_start(), Duration::ZERO);
    }

    #[test]
    fn consecutive_plays_are_back_to_back() {
        let (mut scheduler, _clock, sink) = attached_scheduler();

        scheduler.play(&frame_of_ms(100, 24000), 24000);
        scheduler.play(&frame_of_ms(50, 24000), 24000);
        scheduler.play(&frame_of_ms(200, 24000), 24000);

        let subs = sink.submissions();
        assert_eq!(subs.len(), 3);
        assert_eq!(subs[0].start, Duration::ZERO);
        assert_eq!(subs[1].start, Duration::from_millis(100));
        assert_eq!(subs[2].start, Duration::from_millis(150));
        assert_eq!(scheduler.next_start(), Duration::from_millis(350));
    }

    #[test]
    fn starts_never_overlap_and_never_precede_now() {
        let (mut scheduler, clock, sink) = attached_scheduler();

        let durations_ms = [100u64, 30, 250, 10, 80];
        // Arbitrary wall-clock times at issuance.
        let issue_at_ms = [0u64, 20, 400, 410, 420];

        for (&d, &at) in durations_ms.iter().zip(issue_at_ms.iter()) {
            clock.set(Duration::from_millis(at));
            scheduler.play(&frame_of_ms(d, 24000), 24000);
        }

        let subs = sink.submissions();
        assert_eq!(subs.len(), durations_ms.len());
        for (i, sub) in subs.iter().enumerate() {
            assert!(sub.start >= Duration::from_millis(issue_at_ms[i]));
            if i > 0 {
                let prev_end = subs[i - 1].start
                    + Duration::from_secs_f64(
                        subs[i - 1].samples.len() as f64 / subs[i - 1].sample_rate as f64,
                    );
                assert!(
                    sub.start >= prev_end,
                    "item {} starts at {:?} before previous ends at {:?}",
                    i,
                    sub.start,
                    prev_end
                );
            }
        }
    }

    #[test]
    fn network_stall_leaves_a_gap() {
        let (mut scheduler, clock, sink) = attached_scheduler();

        scheduler.play(&frame_of_ms(100, 24000), 24000);
        // Clock runs past the end of the first buffer before the next arrives.
        clock.set(Duration::from_millis(500));
        scheduler.play(&frame_of_ms(100, 24000), 24000);

        let subs = sink.submissions();
        assert_eq!(subs[1].start, Duration::from_millis(500));
    }

    #[test]
    fn stop_all_cancels_clears_and_resets() {
        let (mut scheduler, clock, sink) = attached_scheduler();

        scheduler.play(&frame_of_ms(100, 24000), 24000);
        scheduler.play(&frame_of_ms(100, 24000), 24000);
        assert_eq!(scheduler.scheduled_len(), 2);

        clock.set(Duration::from_millis(50));
        scheduler.stop_all();

        assert_eq!(sink.cancellations(), 1);
        assert_eq!(scheduler.scheduled_len(), 0);
        assert_eq!(scheduler.next_start(), Duration::from_millis(50));
    }

    #[test]
    fn stop_all_tolerates_finished_items() {
        let (mut scheduler, clock, _sink) = attached_scheduler();

        scheduler.play(&frame_of_ms(100, 24000), 24000);
        clock.set(Duration::from_secs(10));
        // Item finished long ago; stopping must not error.
        scheduler.stop_all();
        assert_eq!(scheduler.scheduled_len(), 0);
    }

    #[test]
    fn finished_items_leave_the_scheduled_set() {
        let (mut scheduler, clock, _sink) = attached_scheduler();

        scheduler.play(&frame_of_ms(100, 24000), 24000);
        assert_eq!(scheduler.scheduled_len(), 1);

        clock.set(Duration::from_millis(101));
        assert_eq!(scheduler.scheduled_len(), 0);
    }

    #[test]
    fn stop_all_without_clock_is_noop() {
        let mut scheduler = PlaybackScheduler::new();
        scheduler.stop_all();
        assert_eq!(scheduler.scheduled_len(), 0);
    }

    #[test]
    fn empty_frame_is_ignored() {
        let (mut scheduler, _clock, sink) = attached_scheduler();
        scheduler.play(&[], 24000);
        assert!(sink.submissions().is_empty());
        assert_eq!(scheduler.next_start(), Duration::ZERO);
    }

    #[test]
    fn detach_stops_and_releases() {
        let (mut scheduler, _clock, sink) = attached_scheduler();
        scheduler.play(&frame_of_ms(100, 24000), 24000);
        scheduler.detach();

        assert!(!scheduler.is_attached());
        assert_eq!(sink.cancellations(), 1);

        // Further plays are dropped.
        scheduler.play(&frame_of_ms(100, 24000), 24000);
        assert_eq!(sink.submissions().len(), 1);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now(), Duration::from_millis(250));
        clock.set(Duration::from_millis(10));
        assert_eq!(clock.now(), Duration::from_millis(10));
    }
}
