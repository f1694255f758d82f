use std::fmt;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Severity {
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Append-only sink for user-facing progress messages. Never fails.
pub trait Notifier {
    fn notify(&self, severity: Severity, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Error => eprintln!("{severity}: {message}"),
            _ => println!("{severity}: {message}"),
        }
    }
}
