//! Human-readable check report
//!
//! Checks print their own pass/fail lines through a [`Reporter`] and record
//! a boolean outcome; the reporter ANDs the outcomes into one verdict.

use std::fmt::Display;
use std::io::{self, Stdout, Write};

const RULE_WIDTH: usize = 50;

pub struct Reporter<W: Write = Stdout> {
    out: W,
    all_passed: bool,
    recorded: usize,
}

impl Reporter<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            all_passed: true,
            recorded: 0,
        }
    }

    // Report output is best effort; a closed stdout must not turn into a
    // failed check.
    fn emit(&mut self, line: impl Display) {
        let _ = writeln!(self.out, "{}", line);
    }

    /// Title line followed by a rule
    pub fn banner(&mut self, title: &str) {
        self.emit(title);
        self.rule();
    }

    pub fn rule(&mut self) {
        self.emit("=".repeat(RULE_WIDTH));
    }

    /// Blank line, then a heading
    pub fn section(&mut self, title: &str) {
        self.emit(format_args!("\n{}", title));
    }

    pub fn pass(&mut self, msg: impl Display) {
        self.emit(format_args!("✅ {}", msg));
    }

    pub fn fail(&mut self, msg: impl Display) {
        self.emit(format_args!("❌ {}", msg));
    }

    pub fn warn(&mut self, msg: impl Display) {
        self.emit(format_args!("⚠️  {}", msg));
    }

    /// Indented detail under the previous line
    pub fn detail(&mut self, msg: impl Display) {
        self.emit(format_args!("   {}", msg));
    }

    /// Labelled value, e.g. `📊 Project ID: my-project`
    pub fn field(&mut self, icon: &str, label: &str, value: impl Display) {
        self.emit(format_args!("{} {}: {}", icon, label, value));
    }

    pub fn line(&mut self, msg: impl Display) {
        self.emit(msg);
    }

    /// Fold one check outcome into the verdict
    pub fn record(&mut self, ok: bool) -> bool {
        self.all_passed &= ok;
        self.recorded += 1;
        ok
    }

    /// True when every recorded check passed (vacuously true with none)
    pub fn passed(&self) -> bool {
        self.all_passed
    }

    /// Number of outcomes recorded so far
    pub fn recorded(&self) -> usize {
        self.recorded
    }

    /// Final verdict line; on failure, a pointer to manual remediation
    pub fn summary(&mut self, outcome: &Summary<'_>) -> bool {
        self.emit("");
        self.rule();
        if self.all_passed {
            self.emit(outcome.success);
            if !outcome.next_steps.is_empty() {
                self.emit("\nNext steps:");
                for (i, step) in outcome.next_steps.iter().enumerate() {
                    self.emit(format_args!("{}. {}", i + 1, step));
                }
            }
        } else {
            self.emit(outcome.failure);
            self.emit(format_args!("\n{}", outcome.remediation));
        }
        self.all_passed
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Fixed text for the end of a report
#[derive(Debug, Clone, Copy)]
pub struct Summary<'a> {
    pub success: &'a str,
    pub next_steps: &'a [&'a str],
    pub failure: &'a str,
    pub remediation: &'a str,
}
