use super::state::PluginState;

/// Events emitted while a plugin runs, for front ends that display progress.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    StateChanged {
        plugin: String,
        from: PluginState,
        to: PluginState,
    },

    /// A coupled run picked up parameter set `iteration` (1-based).
    IterationStart { iteration: usize },
    IterationFinish { iteration: usize },

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    pub fn is_silent(&self) -> bool {
        self.callback.is_none()
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }

    /// Reports a transition of `plugin`; the name is only cloned when someone listens.
    pub fn state_changed(&self, plugin: &str, from: PluginState, to: PluginState) {
        if let Some(cb) = &self.callback {
            cb(Progress::StateChanged {
                plugin: plugin.to_string(),
                from,
                to,
            });
        }
    }
}
