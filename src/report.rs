//! Console report.
//!
//! Every assertion outcome is one line:
//!
//! ```text
//! <test>: <line>: <KIND>: <suite>: <message>
//! ```
//!
//! Per-test and run summaries are written as plain lines through the same
//! sink.

use crate::config::Verbosity;
use std::cell::RefCell;
use std::fmt;
use std::io::{self, Write};
use std::panic::Location;
use std::rc::Rc;

/// Result kind of a report line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Pass,
    Fail,
    Error,
    Msg,
}

impl Kind {
    /// Lowest verbosity at which this kind is printed. Errors always print.
    pub fn threshold(self) -> u8 {
        match self {
            Kind::Error => 0,
            Kind::Fail => 1,
            Kind::Pass => 2,
            Kind::Msg => 3,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Kind::Pass => "PASS",
            Kind::Fail => "FAIL",
            Kind::Error => "ERROR",
            Kind::Msg => "MSG",
        })
    }
}

/// One formatted outcome line.
#[derive(Debug, Clone, Copy)]
pub struct ReportLine<'a> {
    /// The test procedure the line came from.
    pub origin: &'a str,
    /// Source line of the assertion.
    pub line: u32,
    pub kind: Kind,
    pub suite: &'a str,
    pub message: &'a str,
}

impl fmt::Display for ReportLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}: {}: {}: {}",
            self.origin, self.line, self.kind, self.suite, self.message
        )
    }
}

/// Verbosity-gated line writer.
pub struct Reporter {
    verbosity: Verbosity,
    sink: Box<dyn Write>,
}

impl Reporter {
    pub fn stdout(verbosity: Verbosity) -> Self {
        Self::with_sink(verbosity, io::stdout())
    }

    pub fn with_sink(verbosity: Verbosity, sink: impl Write + 'static) -> Self {
        Self {
            verbosity,
            sink: Box::new(sink),
        }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Print an outcome line if the verbosity allows its kind.
    pub fn outcome(&mut self, line: ReportLine<'_>) {
        if self.verbosity.permits(line.kind.threshold()) {
            self.line(line);
        }
    }

    /// Print a `MSG` line if verbosity is at least `level`.
    pub fn message(&mut self, level: u8, line: ReportLine<'_>) {
        if self.verbosity.permits(level) {
            self.line(line);
        }
    }

    /// Unconditional line.
    pub fn line(&mut self, text: impl fmt::Display) {
        writeln!(self.sink, "{}", text).ok();
    }

    pub fn flush(&mut self) {
        self.sink.flush().ok();
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("verbosity", &self.verbosity)
            .finish_non_exhaustive()
    }
}

struct DiagnosticTarget {
    reporter: Rc<RefCell<Reporter>>,
    suite: String,
}

/// Echoes internal diagnostics into a report as `MSG` lines at
/// [`Verbosity::DIAGNOSTIC`] and above. Clones share the target.
///
/// A detached handle (the default) drops everything.
#[derive(Clone, Default)]
pub struct Diagnostics {
    target: Option<Rc<DiagnosticTarget>>,
}

impl Diagnostics {
    pub fn new(reporter: Rc<RefCell<Reporter>>, suite: impl Into<String>) -> Self {
        Self {
            target: Some(Rc::new(DiagnosticTarget {
                reporter,
                suite: suite.into(),
            })),
        }
    }

    pub fn detached() -> Self {
        Self::default()
    }

    /// Whether [`Diagnostics::emit`] would print anything.
    pub fn enabled(&self) -> bool {
        self.target.as_ref().is_some_and(|t| {
            t.reporter
                .try_borrow()
                .is_ok_and(|r| r.verbosity().permits(Verbosity::DIAGNOSTIC.0))
        })
    }

    /// Print one diagnostic line attributed to `origin`. Skipped while the
    /// reporter is busy printing something else.
    #[track_caller]
    pub fn emit(&self, origin: &str, text: fmt::Arguments<'_>) {
        let Some(target) = &self.target else {
            return;
        };
        let line = Location::caller().line();
        if let Ok(mut reporter) = target.reporter.try_borrow_mut() {
            if reporter.verbosity().permits(Verbosity::DIAGNOSTIC.0) {
                let message = text.to_string();
                reporter.message(
                    Verbosity::DIAGNOSTIC.0,
                    ReportLine {
                        origin,
                        line,
                        kind: Kind::Msg,
                        suite: &target.suite,
                        message: &message,
                    },
                );
            }
        }
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("attached", &self.target.is_some())
            .finish()
    }
}

/// In-memory sink whose clones share one buffer. Lets a caller read back what
/// a suite printed.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
