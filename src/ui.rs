//! Terminal progress reporting for the CLI.
//!
//! Uploads and long calls get a spinner on a TTY and plain stderr lines
//! otherwise. Quiet mode silences stages entirely, for `--json` output
//! that may be piped.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

#[derive(Clone, Copy, Debug)]
pub struct Progress {
    is_tty: bool,
    quiet: bool,
}

impl Progress {
    pub fn new(is_tty: bool, quiet: bool) -> Self {
        Self { is_tty, quiet }
    }

    pub fn stage(&self, name: &str) -> Stage {
        if self.quiet {
            return Stage::new(name.to_string(), None, true);
        }
        if self.is_tty {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            Stage::new(name.to_string(), Some(spinner), false)
        } else {
            eprintln!("==> {name}");
            Stage::new(name.to_string(), None, false)
        }
    }
}

pub struct Stage {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    silent: bool,
}

impl Stage {
    fn new(name: String, spinner: Option<ProgressBar>, silent: bool) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
            silent,
        }
    }
}

impl Drop for Stage {
    fn drop(&mut self) {
        if self.silent {
            return;
        }
        let message = format!("✔ {} ({})", self.name, format_duration(self.start.elapsed()));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
