use indicatif::{ProgressBar, ProgressStyle};
use simweave::engine::progress::{Progress, ProgressCallback};
use simweave::engine::state::PluginState;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const SPINNER_TICK_MS: u64 = 80;

/// Shows the current plugin state (and coupled iteration) on a stderr spinner.
#[derive(Clone)]
pub struct CliProgressHandler {
    pb: Arc<Mutex<ProgressBar>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        let pb = ProgressBar::new(0)
            .with_style(Self::spinner_style())
            .with_message("Initializing...");
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb.disable_steady_tick();
        pb.finish_and_clear();

        Self {
            pb: Arc::new(Mutex::new(pb)),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let pb_clone = self.pb.clone();

        Box::new(move |progress: Progress| {
            let Ok(pb_guard) = pb_clone.lock() else {
                warn!("Progress bar mutex was poisoned. Cannot update progress.");
                return;
            };

            match progress {
                Progress::StateChanged { plugin, to, .. } => match to {
                    PluginState::Done => {
                        pb_guard.disable_steady_tick();
                        pb_guard.finish_with_message(format!("✓ {} done", plugin));
                    }
                    PluginState::Failed => {
                        pb_guard.disable_steady_tick();
                        pb_guard.abandon_with_message(format!("✗ {} failed", plugin));
                    }
                    state => {
                        if pb_guard.is_finished() {
                            pb_guard.reset();
                            pb_guard.set_style(Self::spinner_style());
                            pb_guard.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
                        }
                        pb_guard.set_message(format!("{}: {}", plugin, Self::describe(state)));
                    }
                },
                Progress::IterationStart { iteration } => {
                    pb_guard.set_prefix(format!("[iteration {}]", iteration));
                }
                Progress::IterationFinish { iteration } => {
                    pb_guard.set_position(iteration as u64);
                }
                Progress::Message(msg) => {
                    if !pb_guard.is_finished() {
                        pb_guard.println(format!("  {}", msg));
                    } else {
                        pb_guard.set_message(msg);
                    }
                }
            }
        })
    }

    fn describe(state: PluginState) -> &'static str {
        match state {
            PluginState::Init => "starting",
            PluginState::TemplateRendered => "inputs rendered",
            PluginState::WorkspaceReady => "workspace ready",
            PluginState::Executing => "executing",
            PluginState::Postprocessing => "collecting results",
            PluginState::Done => "done",
            PluginState::Failed => "failed",
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {prefix:.dim} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn changed(to: PluginState) -> Progress {
        Progress::StateChanged {
            plugin: "shell".to_string(),
            from: PluginState::Init,
            to,
        }
    }

    #[test]
    fn handler_initializes_in_a_clean_state() {
        let handler = CliProgressHandler::new();
        let pb = handler.pb.lock().unwrap();
        assert!(pb.is_finished());
    }

    #[test]
    fn callback_follows_plugin_states() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();

        callback(changed(PluginState::Executing));
        {
            let pb = handler.pb.lock().unwrap();
            assert_eq!(pb.message(), "shell: executing");
            assert!(!pb.is_finished());
        }

        callback(changed(PluginState::Done));
        {
            let pb = handler.pb.lock().unwrap();
            assert!(pb.is_finished());
            assert_eq!(pb.message(), "✓ shell done");
        }
    }

    #[test]
    fn iterations_are_shown_as_prefix_and_position() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();

        callback(Progress::IterationStart { iteration: 3 });
        callback(Progress::IterationFinish { iteration: 3 });

        let pb = handler.pb.lock().unwrap();
        assert_eq!(pb.prefix(), "[iteration 3]");
        assert_eq!(pb.position(), 3);
    }

    #[test]
    fn callback_is_thread_safe() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();

        thread::spawn(move || {
            callback(changed(PluginState::TemplateRendered));
            callback(changed(PluginState::Failed));
        })
        .join()
        .unwrap();

        let pb = handler.pb.lock().unwrap();
        assert!(pb.is_finished());
        assert_eq!(pb.message(), "✗ shell failed");
    }
}
