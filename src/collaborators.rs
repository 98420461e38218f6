//! External collaborator contracts (§6, ambient E2).
//!
//! The engine never performs image recognition, input dispatch, or logging
//! itself; it calls out to host-supplied implementations of the traits
//! below. Each trait covers exactly one capability, following the same
//! trait-per-capability shape as the teacher's `PrintWriter` (`io.rs`):
//! a single-purpose interface plus a default real implementation and a
//! test double.

use std::time::{Duration, Instant};

use crate::action::ResolvedArgs;
use crate::recognition::{OcrParams, RecognitionParams, RecognitionResult};

/// The vision collaborator: realises a recognition request against
/// whatever screen-image source the host provides.
pub trait VisionBackend {
    /// Evaluates one recognition attempt. `DirectHit` never reaches this —
    /// the dispatcher short-circuits it to an always-successful result.
    fn recognize(&mut self, params: &RecognitionParams) -> RecognitionResult;

    /// Evaluates an OCR batch, returning every match before index
    /// selection. The default forwards to a single [`Self::recognize`]
    /// call wrapped in a one-element vector; backends with genuine batch
    /// support should override this.
    fn recognize_batch(&mut self, params: &OcrParams) -> Vec<RecognitionResult> {
        vec![self.recognize(&RecognitionParams::Ocr(params.clone()))]
    }
}

/// The input collaborator: realises a resolved action against whatever
/// input-injection mechanism the host provides.
pub trait InputBackend {
    /// Performs the action described by `args`. Returns whether the
    /// dispatch succeeded; `false` routes the node to `on_error`.
    fn perform(&mut self, args: &ResolvedArgs) -> bool;
}

/// Sink for `log`/`condition_log` output after `interpolate` has run.
pub trait LogSink {
    fn log(&mut self, line: &str);
}

/// Monotonic clock, abstracted so timeout and delay tests can supply a
/// fake instead of waiting on real wall-clock time. The executor's poll
/// loop and `pre_delay`/`post_delay` both go through this, never calling
/// `std::thread::sleep` directly.
pub trait Clock {
    fn now(&self) -> Instant;

    /// Waits `duration`, however "waiting" is defined for this clock — a
    /// real block for [`SystemClock`], a non-blocking advance for a fake.
    fn sleep(&self, duration: Duration);
}

/// [`Clock`] backed by [`std::time::Instant::now`] and a real
/// `std::thread::sleep`.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Deterministic [`Clock`] for tests. `now()` starts at construction time
/// and only ever advances when `sleep`/`advance` is called — never by
/// actual elapsed wall-clock time — so timeout and delay behavior can be
/// asserted without a test ever actually waiting.
pub struct FakeClock {
    base: Instant,
    elapsed: std::sync::atomic::AtomicU64,
}

impl FakeClock {
    #[must_use]
    pub fn new() -> Self {
        Self { base: Instant::now(), elapsed: std::sync::atomic::AtomicU64::new(0) }
    }

    /// Advances the fake clock without blocking. `sleep` calls this
    /// internally; tests may also call it directly to simulate time
    /// passing between two collaborator calls.
    pub fn advance(&self, duration: Duration) {
        self.elapsed.fetch_add(duration_as_millis(duration), std::sync::atomic::Ordering::SeqCst);
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.elapsed_ms())
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

fn duration_as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// [`VisionBackend`] that always reports failure — useful as a default for
/// graphs that never exercise recognition beyond `DirectHit`, and as the
/// "successor that never matches" fixture in timeout tests.
#[derive(Debug, Default)]
pub struct NoopVision;

impl VisionBackend for NoopVision {
    fn recognize(&mut self, _params: &RecognitionParams) -> RecognitionResult {
        RecognitionResult::failure()
    }
}

/// [`InputBackend`] that always reports success without performing any
/// side effect.
#[derive(Debug, Default)]
pub struct NoopInput;

impl InputBackend for NoopInput {
    fn perform(&mut self, _args: &ResolvedArgs) -> bool {
        true
    }
}

/// [`LogSink`] that discards every line.
#[derive(Debug, Default)]
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn log(&mut self, _line: &str) {}
}

/// [`LogSink`] that retains every line in order, for assertions in tests.
#[derive(Debug, Default)]
pub struct CollectLogSink {
    pub lines: Vec<String>,
}

impl LogSink for CollectLogSink {
    fn log(&mut self, line: &str) {
        self.lines.push(line.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_vision_always_fails() {
        let mut vision = NoopVision;
        let result = vision.recognize(&RecognitionParams::DirectHit);
        assert!(!result.success);
    }

    #[test]
    fn noop_input_always_succeeds() {
        let mut input = NoopInput;
        assert!(input.perform(&ResolvedArgs::None));
    }

    #[test]
    fn fake_clock_only_advances_on_sleep() {
        let clock = FakeClock::new();
        let t0 = clock.now();
        assert_eq!(clock.elapsed_ms(), 0);
        clock.sleep(Duration::from_millis(50));
        assert_eq!(clock.elapsed_ms(), 50);
        assert_eq!(clock.now(), t0 + Duration::from_millis(50));
    }

    #[test]
    fn collect_log_sink_retains_order() {
        let mut sink = CollectLogSink::default();
        sink.log("first");
        sink.log("second");
        assert_eq!(sink.lines, vec!["first".to_owned(), "second".to_owned()]);
    }
}
