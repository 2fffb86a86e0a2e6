use crate::pipeline::Progress;
use core::fmt::{Debug, Formatter};
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinHandle;

type ProgressCallback = Box<dyn Fn() -> (u64, u64, String) + Send + Sync>;

/// Refresh rate for progress updates (10 Hz).
const REFRESH_INTERVAL: Duration = Duration::from_millis(100);

const TEMPLATE: &str = "{prefix:>12.bold.cyan} [{bar:25}] {elapsed:>4} {msg}";
const TEMPLATE_NO_COLOR: &str = "{prefix:>12} [{bar:25}] {elapsed:>4} {msg}";

/// Shared between the reporter and its refresh task.
#[derive(Debug)]
struct BarState {
    visible_after: Instant,
    visible: AtomicBool,
}

/// A stderr progress bar that stays hidden for short runs.
///
/// Nothing is drawn until `delay` has elapsed, so quick runs and runs with
/// logging enabled leave stderr untouched.
#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
    state: Arc<BarState>,
    callback: Arc<Mutex<ProgressCallback>>,
    refresh_task: Arc<JoinHandle<()>>,
    use_colors: bool,
}

impl ProgressReporter {
    /// Create a reporter; must be called from within a tokio runtime.
    #[must_use]
    pub fn new(delay: Duration, use_colors: bool) -> Self {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden());
        let template = if use_colors { TEMPLATE } else { TEMPLATE_NO_COLOR };
        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            bar.set_style(style.progress_chars("=> "));
        }

        let state = Arc::new(BarState {
            visible_after: Instant::now() + delay,
            visible: AtomicBool::new(false),
        });

        let callback = Arc::new(Mutex::new(Box::new(|| (0u64, 0u64, String::new())) as ProgressCallback));
        let refresh_task = tokio::spawn(refresh(bar.clone(), Arc::clone(&state), Arc::clone(&callback)));

        Self {
            bar,
            state,
            callback,
            refresh_task: Arc::new(refresh_task),
            use_colors,
        }
    }
}

impl Progress for ProgressReporter {
    fn set_phase(&self, phase: &str) {
        self.bar.set_prefix(phase.to_string());
    }

    fn set_determinate(&self, callback: Box<dyn Fn() -> (u64, u64, String) + Send + Sync + 'static>) {
        *self.callback.lock().expect("lock poisoned") = callback;
        self.bar.set_length(0);
        self.bar.set_position(0);
    }

    fn println(&self, msg: &str) {
        if self.state.visible.load(Ordering::Relaxed) {
            self.bar.suspend(|| eprintln!("{msg}"));
        } else {
            eprintln!("{msg}");
        }
    }

    fn use_colors(&self) -> bool {
        self.use_colors
    }

    fn done(&self) {
        self.refresh_task.abort();
        if self.state.visible.load(Ordering::Relaxed) {
            self.bar.finish_and_clear();
        }
    }
}

impl Debug for ProgressReporter {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("bar", &self.bar)
            .field("state", &self.state)
            .field("callback", &"<callback>")
            .field("refresh_task", &"<task>")
            .field("use_colors", &self.use_colors)
            .finish()
    }
}

/// Periodically pulls (total, done, message) from the callback into the bar.
async fn refresh(bar: ProgressBar, state: Arc<BarState>, callback: Arc<Mutex<ProgressCallback>>) {
    let mut interval = tokio::time::interval(REFRESH_INTERVAL);
    #[expect(clippy::infinite_loop, reason = "task runs until aborted")]
    loop {
        let _ = interval.tick().await;

        if !state.visible.load(Ordering::Relaxed) {
            if Instant::now() < state.visible_after {
                continue;
            }
            state.visible.store(true, Ordering::Relaxed);
            bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        }

        let (total, done, message) = {
            let callback = callback.lock().expect("lock poisoned");
            callback()
        };

        if total > 0 {
            bar.set_length(total);
            bar.set_position(done);
        }
        bar.set_message(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort on Windows")]
    async fn test_hidden_reporter_accepts_updates() {
        let reporter = ProgressReporter::new(Duration::from_secs(3600), false);

        reporter.set_phase("Fetching");
        reporter.set_determinate(Box::new(|| (4, 2, "2/4 packages".to_string())));
        reporter.done();

        assert!(!reporter.state.visible.load(Ordering::Relaxed));
        assert!(!reporter.use_colors());
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort on Windows")]
    async fn test_reporter_becomes_visible_after_delay() {
        let reporter = ProgressReporter::new(Duration::ZERO, true);
        reporter.set_determinate(Box::new(|| (10, 3, "3/10 packages".to_string())));

        tokio::time::sleep(REFRESH_INTERVAL * 3).await;

        assert!(reporter.state.visible.load(Ordering::Relaxed));
        assert_eq!(reporter.bar.length(), Some(10));
        assert_eq!(reporter.bar.position(), 3);
        reporter.done();
    }
}
