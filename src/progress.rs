use std::io::{self, Write};

/// Number of chunks between two progress reports.
pub const PROGRESS_INTERVAL: usize = 1000;

/// Observer for chunk checksum progress.
///
/// Reports are informational only; an observer cannot influence the result.
pub trait ProgressObserver {
    /// `done` chunks out of `total` have been hashed.
    fn on_progress(&mut self, done: usize, total: usize);

    /// Called once after the last chunk.
    fn on_finish(&mut self) {}
}

impl<F: FnMut(usize, usize)> ProgressObserver for F {
    fn on_progress(&mut self, done: usize, total: usize) {
        self(done, total)
    }
}

/// Discards all reports.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&mut self, _done: usize, _total: usize) {}
}

/// Prints `Verifying Checksum: NN.NN%...` followed by a carriage return, so
/// each report overwrites the previous one on the same line.
#[derive(Debug)]
pub struct ConsoleProgress<W = io::Stdout> {
    out: W,
    printed: bool,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> ConsoleProgress<W> {
    pub fn with_writer(out: W) -> Self {
        Self {
            out,
            printed: false,
        }
    }
}

impl<W: Write> ProgressObserver for ConsoleProgress<W> {
    fn on_progress(&mut self, done: usize, total: usize) {
        let percent = if total == 0 {
            100.0
        } else {
            done as f64 / total as f64 * 100.0
        };

        // Progress is best effort; a closed stdout must not abort hashing.
        let _ = write!(self.out, "Verifying Checksum: {percent:.2}%...\r");
        let _ = self.out.flush();
        self.printed = true;
    }

    fn on_finish(&mut self) {
        if self.printed {
            let _ = writeln!(self.out);
            let _ = self.out.flush();
            self.printed = false;
        }
    }
}

/// Whether chunk number `done` (1-based) out of `total` should be reported.
pub(crate) fn should_report(done: usize, total: usize) -> bool {
    done % PROGRESS_INTERVAL == 0 || done == total
}
