//! Capture of simulated fatal paths.
//!
//! A test wraps a call in [`Capture::run`]. If code inside the block calls
//! [`Capture::raise`] (typically from a [`crate::mock::MockFatal`]), control
//! unwinds straight back out of the block and `run` returns
//! [`Captured::Raised`] instead of [`Captured::Completed`]. Side effects
//! recorded before the raise stay observable.
//!
//! Each `run` arms one target. Nested blocks form a stack and a raise lands in
//! the innermost one. Raising with nothing armed unwinds to the runner, which
//! records a configuration error for the test and moves on. With the `capture`
//! feature off, both `run` and `raise` end the test the same way.

use std::any::Any;
use std::cell::Cell;
use std::panic;
use std::rc::Rc;

/// Payload carried by a raise that has an armed target.
#[derive(Debug)]
#[cfg_attr(not(feature = "capture"), allow(dead_code))]
pub(crate) struct RaiseSignal {
    message: String,
}

/// Payload carried by a raise with no armed target.
#[derive(Debug)]
#[cfg_attr(not(feature = "capture"), allow(dead_code))]
pub(crate) struct UnarmedRaise {
    pub(crate) message: String,
}

/// Payload carried by `run` or `raise` when the `capture` feature is compiled
/// out. The message is the complete report text.
#[derive(Debug)]
#[cfg_attr(feature = "capture", allow(dead_code))]
pub(crate) struct CaptureDisabled {
    pub(crate) message: String,
}

/// What a raise reported on its way out of a capture block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raised {
    pub message: String,
}

/// Outcome of running a block under capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Captured<T> {
    /// The block fell through normally.
    Completed(T),
    /// The block was left through a raise.
    Raised(Raised),
}

impl<T> Captured<T> {
    pub fn is_raised(&self) -> bool {
        matches!(self, Captured::Raised(_))
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Captured::Completed(_))
    }

    /// The block's value if it completed.
    pub fn completed(self) -> Option<T> {
        match self {
            Captured::Completed(value) => Some(value),
            Captured::Raised(_) => None,
        }
    }

    pub fn raised(&self) -> Option<&Raised> {
        match self {
            Captured::Raised(raised) => Some(raised),
            Captured::Completed(_) => None,
        }
    }
}

/// Shared handle to the capture stack.
///
/// The runner keeps one per suite; doubles that need to raise hold a clone.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    depth: Rc<Cell<usize>>,
}

impl Capture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently armed blocks.
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    pub fn is_armed(&self) -> bool {
        self.depth.get() > 0
    }

    /// Disarm everything. The runner calls this before each test.
    pub fn reset(&self) {
        self.depth.set(0);
    }

    /// Run `body` with a capture target armed.
    ///
    /// Panics that are not raises pass through untouched.
    #[cfg(feature = "capture")]
    pub fn run<T>(&self, body: impl FnOnce() -> T) -> Captured<T> {
        self.depth.set(self.depth.get() + 1);
        let result = panic::catch_unwind(panic::AssertUnwindSafe(body));
        self.depth.set(self.depth.get().saturating_sub(1));
        match result {
            Ok(value) => Captured::Completed(value),
            Err(payload) => match payload.downcast::<RaiseSignal>() {
                Ok(signal) => {
                    log::debug!("capture resumed by raise: {}", signal.message);
                    Captured::Raised(Raised {
                        message: signal.message,
                    })
                }
                Err(other) => panic::resume_unwind(other),
            },
        }
    }

    /// Leave the innermost armed block, carrying `message`.
    #[cfg(feature = "capture")]
    pub fn raise(&self, message: impl Into<String>) -> ! {
        let message = message.into();
        if self.is_armed() {
            panic::resume_unwind(Box::new(RaiseSignal { message }))
        }
        log::error!("raise with no capture point armed: {}", message);
        panic::resume_unwind(Box::new(UnarmedRaise { message }))
    }

    /// Capture is compiled out: nothing can be armed, so `body` never runs
    /// and the runner reports the misuse at the test boundary.
    #[cfg(not(feature = "capture"))]
    pub fn run<T>(&self, _body: impl FnOnce() -> T) -> Captured<T> {
        log::error!("capture used with the `capture` feature disabled");
        panic::resume_unwind(Box::new(CaptureDisabled {
            message: "Must enable the `capture` feature to use capture.".to_string(),
        }))
    }

    /// With capture compiled out there is never a target; the runner reports
    /// the misuse at the test boundary.
    #[cfg(not(feature = "capture"))]
    pub fn raise(&self, message: impl Into<String>) -> ! {
        panic::resume_unwind(Box::new(CaptureDisabled {
            message: format!(
                "Must enable the `capture` feature to use raise: {}",
                message.into()
            ),
        }))
    }
}

/// How a test procedure left the runner's guard, if not normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Escape {
    Unarmed(String),
    Disabled(String),
    Panic(String),
}

impl Escape {
    pub(crate) fn classify(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<UnarmedRaise>() {
            Ok(raise) => return Escape::Unarmed(raise.message),
            Err(other) => other,
        };
        let payload = match payload.downcast::<CaptureDisabled>() {
            Ok(raise) => return Escape::Disabled(raise.message),
            Err(other) => other,
        };
        let payload = match payload.downcast::<RaiseSignal>() {
            Ok(raise) => return Escape::Unarmed(raise.message),
            Err(other) => other,
        };
        if let Some(text) = payload.downcast_ref::<&str>() {
            Escape::Panic((*text).to_string())
        } else if let Some(text) = payload.downcast_ref::<String>() {
            Escape::Panic(text.clone())
        } else {
            Escape::Panic("non-string panic payload".to_string())
        }
    }
}

#[cfg(all(test, not(feature = "capture")))]
mod disabled_tests {
    use super::*;

    #[test]
    fn run_without_feature_escapes_as_disabled() {
        let capture = Capture::new();
        let payload =
            panic::catch_unwind(panic::AssertUnwindSafe(|| capture.run(|| 7))).unwrap_err();
        assert_eq!(
            Escape::classify(payload),
            Escape::Disabled("Must enable the `capture` feature to use capture.".to_string())
        );
        assert_eq!(capture.depth(), 0);
    }
}
