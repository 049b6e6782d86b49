use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle of a single plugin invocation.
///
/// States advance strictly in declaration order. `Failed` is absorbing and
/// reachable from any non-terminal state; a failed invocation is never
/// resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginState {
    Init,
    TemplateRendered,
    WorkspaceReady,
    Executing,
    Postprocessing,
    Done,
    Failed,
}

impl PluginState {
    /// The only state this one may advance to on success.
    pub fn successor(self) -> Option<Self> {
        match self {
            Self::Init => Some(Self::TemplateRendered),
            Self::TemplateRendered => Some(Self::WorkspaceReady),
            Self::WorkspaceReady => Some(Self::Executing),
            Self::Executing => Some(Self::Postprocessing),
            Self::Postprocessing => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::TemplateRendered => "TEMPLATE_RENDERED",
            Self::WorkspaceReady => "WORKSPACE_READY",
            Self::Executing => "EXECUTING",
            Self::Postprocessing => "POSTPROCESSING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: PluginState, to: PluginState },
    #[error("Invocation already finished in state {0}")]
    Terminal(PluginState),
}

/// Tracks the state of one pass through the plugin pipeline.
#[derive(Debug, Clone)]
pub struct Invocation {
    state: PluginState,
    history: Vec<PluginState>,
}

impl Default for Invocation {
    fn default() -> Self {
        Self::new()
    }
}

impl Invocation {
    pub fn new() -> Self {
        Self {
            state: PluginState::Init,
            history: vec![PluginState::Init],
        }
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    /// Every state visited so far, starting with `Init`.
    pub fn history(&self) -> &[PluginState] {
        &self.history
    }

    /// Moves to `next`, which must be the current state's successor.
    pub fn advance(&mut self, next: PluginState) -> Result<PluginState, StateError> {
        if self.state.is_terminal() {
            return Err(StateError::Terminal(self.state));
        }
        if self.state.successor() != Some(next) {
            return Err(StateError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        Ok(self.transition(next))
    }

    /// Marks the invocation as failed. Returns the state it failed from.
    pub fn fail(&mut self) -> Result<PluginState, StateError> {
        if self.state.is_terminal() {
            return Err(StateError::Terminal(self.state));
        }
        Ok(self.transition(PluginState::Failed))
    }

    fn transition(&mut self, next: PluginState) -> PluginState {
        let previous = self.state;
        self.state = next;
        self.history.push(next);
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HAPPY_PATH: [PluginState; 5] = [
        PluginState::TemplateRendered,
        PluginState::WorkspaceReady,
        PluginState::Executing,
        PluginState::Postprocessing,
        PluginState::Done,
    ];

    #[test]
    fn advance_walks_the_happy_path() {
        let mut inv = Invocation::new();
        for next in HAPPY_PATH {
            inv.advance(next).unwrap();
        }
        assert_eq!(inv.state(), PluginState::Done);
        assert_eq!(inv.history().len(), 6);
    }

    #[test]
    fn advance_rejects_skipping_states() {
        let mut inv = Invocation::new();
        let err = inv.advance(PluginState::Executing).unwrap_err();
        assert_eq!(
            err,
            StateError::InvalidTransition {
                from: PluginState::Init,
                to: PluginState::Executing
            }
        );
        assert_eq!(inv.state(), PluginState::Init);
    }

    #[test]
    fn advance_rejects_going_backwards() {
        let mut inv = Invocation::new();
        inv.advance(PluginState::TemplateRendered).unwrap();
        assert!(inv.advance(PluginState::Init).is_err());
        assert!(inv.advance(PluginState::TemplateRendered).is_err());
    }

    #[test]
    fn fail_is_reachable_from_every_non_terminal_state() {
        for steps in 0..HAPPY_PATH.len() {
            let mut inv = Invocation::new();
            for next in &HAPPY_PATH[..steps] {
                inv.advance(*next).unwrap();
            }
            let from = inv.fail().unwrap();
            assert_eq!(inv.state(), PluginState::Failed);
            assert_eq!(from, *inv.history().iter().rev().nth(1).unwrap());
        }
    }

    #[test]
    fn terminal_states_are_absorbing() {
        let mut failed = Invocation::new();
        failed.fail().unwrap();
        assert_eq!(
            failed.advance(PluginState::TemplateRendered),
            Err(StateError::Terminal(PluginState::Failed))
        );
        assert_eq!(failed.fail(), Err(StateError::Terminal(PluginState::Failed)));

        let mut done = Invocation::new();
        for next in HAPPY_PATH {
            done.advance(next).unwrap();
        }
        assert_eq!(done.fail(), Err(StateError::Terminal(PluginState::Done)));
    }

    #[test]
    fn display_uses_upper_snake_case() {
        assert_eq!(PluginState::TemplateRendered.to_string(), "TEMPLATE_RENDERED");
        assert_eq!(PluginState::Failed.to_string(), "FAILED");
    }
}
