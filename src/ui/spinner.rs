use std::future::Future;
use std::io::IsTerminal;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

const MIN_SPINNER_DURATION: Duration = Duration::from_millis(600);
const TICK: Duration = Duration::from_millis(80);

/// Progress line on stderr. Inert when stderr is not a terminal.
pub struct Spinner {
    bar: Option<ProgressBar>,
}

impl Spinner {
    pub fn start(message: &str) -> Self {
        let spinner = Self::pending();
        spinner.updater()(message.to_string());
        spinner
    }

    /// Nothing is drawn until the first message arrives, so a login prompt
    /// can run before discovery reports anything.
    pub fn pending() -> Self {
        let bar = std::io::stderr().is_terminal().then(|| {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", " "])
                .template("{spinner:.cyan} {msg}")
            {
                bar.set_style(style);
            }
            bar
        });
        Self { bar }
    }

    /// Message sink for code that runs while the spinner is up, e.g.
    /// [`crate::discovery::Discoverer::on_progress`].
    pub fn updater(&self) -> impl Fn(String) + Send + Sync + 'static {
        let bar = self.bar.clone();
        move |message| {
            if let Some(bar) = &bar {
                let first = bar.message().is_empty();
                bar.set_message(message);
                if first {
                    bar.enable_steady_tick(TICK);
                }
            }
        }
    }

    /// Hide the spinner while `f` talks to the user.
    pub fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.bar {
            Some(bar) => bar.suspend(f),
            None => f(),
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

/// Run `fut` under a spinner, keeping it up long enough to be readable.
pub async fn with_spinner<T, F: Future<Output = T>>(message: &str, fut: F) -> T {
    let spinner = Spinner::start(message);
    let start = Instant::now();
    let result = fut.await;

    if spinner.bar.is_some() {
        let elapsed = start.elapsed();
        if elapsed < MIN_SPINNER_DURATION {
            tokio::time::sleep(MIN_SPINNER_DURATION - elapsed).await;
        }
    }

    spinner.finish();
    result
}
