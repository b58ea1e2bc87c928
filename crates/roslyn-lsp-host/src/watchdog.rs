//! Failure watchdog over the server's diagnostic stream.
//!
//! The Roslyn server occasionally loses the named-pipe connection to its
//! out-of-process BuildHost while loading a large solution. The process
//! either dies or stops answering, and the only trace of the cause is a
//! timeout line on stderr. The watchdog reads stderr for the life of the
//! process and trips a [`FailureSignal`] when that line appears; the
//! supervisor consumes the signal to decide whether a failed request earns a
//! restart.

use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Log target for diagnostic stream events.
pub(crate) const WATCHDOG_TARGET: &str = "roslyn_lsp_host::watchdog";

/// Matches the BuildHost named-pipe connection timeout.
///
/// A line matches when it either pairs a `TimeoutException` with a named pipe
/// or BuildHost mention (in either order), or reports a connect attempt to a
/// named pipe or BuildHost that "timed out". A bare "timeout" next to a pipe
/// mention, as in configuration or progress lines, does not match. The
/// wording is owned by the upstream server, so a rephrased message stops
/// matching.
static FAILURE_SIGNATURE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)",
        r"timeoutexception.*(?:named[ _-]?pipe|build[ _-]?host)",
        r"|(?:named[ _-]?pipe|build[ _-]?host).*timeoutexception",
        r"|\bconnect(?:ion|ing)?\b.*(?:named[ _-]?pipe|build[ _-]?host).*\btimed[ _-]out\b",
        r"|(?:named[ _-]?pipe|build[ _-]?host).*\bconnect(?:ion|ing)?\b.*\btimed[ _-]out\b",
    ))
    .ok()
});

/// Returns `true` when the diagnostic line carries the failure signature.
#[must_use]
pub fn matches_failure_signature(line: &str) -> bool {
    FAILURE_SIGNATURE
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(line))
}

/// One-shot flag set when the failure signature is observed.
///
/// Cloning shares the flag. Every spawned process gets a fresh signal so a
/// stale trip from a dead process can never authorise a restart of its
/// successor.
#[derive(Debug, Clone, Default)]
pub struct FailureSignal {
    tripped: Arc<AtomicBool>,
}

impl FailureSignal {
    /// Creates an armed signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the signature as seen. Idempotent.
    pub fn trip(&self) {
        self.tripped.store(true, Ordering::SeqCst);
    }

    /// Whether the signature has been seen and not yet consumed.
    #[must_use]
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    /// Consumes the trip, returning whether it was set.
    ///
    /// Test-and-clear is a single atomic swap, so a trip racing with the
    /// take is either consumed now or observed by the next take.
    pub fn take(&self) -> bool {
        self.tripped.swap(false, Ordering::SeqCst)
    }
}

/// Inspects one diagnostic line, tripping the signal on a match.
///
/// Returns `true` when the line matched.
pub fn observe_line(line: &str, signal: &FailureSignal) -> bool {
    debug!(target: WATCHDOG_TARGET, line, "server stderr");
    if matches_failure_signature(line) {
        if !signal.is_tripped() {
            warn!(
                target: WATCHDOG_TARGET,
                line,
                "detected BuildHost pipe timeout in server diagnostics"
            );
        }
        signal.trip();
        return true;
    }
    false
}

/// Drains `stream` line by line on a dedicated thread until end of stream.
///
/// Invalid UTF-8 is replaced rather than treated as an error; the reader
/// only stops on EOF or a read failure.
///
/// # Errors
///
/// Returns an I/O error if the thread cannot be started.
pub fn spawn_watchdog<R>(stream: R, signal: FailureSignal) -> std::io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name(String::from("roslyn-lsp-stderr"))
        .spawn(move || drain(stream, &signal))
}

fn drain<R: Read>(stream: R, signal: &FailureSignal) {
    let mut reader = BufReader::new(stream);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buffer);
                observe_line(line.trim_end_matches(['\r', '\n']), signal);
            }
            Err(error) => {
                debug!(
                    target: WATCHDOG_TARGET,
                    error = %error,
                    "stopped reading server stderr"
                );
                break;
            }
        }
    }
    debug!(target: WATCHDOG_TARGET, "server stderr closed");
}
