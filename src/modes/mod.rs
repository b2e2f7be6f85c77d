//! Behavioral modes. The controller switches between these every tick;
//! each mode turns a world snapshot into one discrete action vector.

pub mod chase;
pub mod collect;
pub mod nn_collector;

use std::fmt;

use crate::actions::ActionVector;
use crate::inference::InferenceError;
use crate::world::WorldSnapshot;

pub use chase::ChaseAgent;
pub use collect::CollectAgent;
pub use nn_collector::NeuralCollectorAgent;

/// Closed set of behavior tags. Modes are identified by tag, never by
/// name strings, so a switch target always exists at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentMode {
    /// Stand still; the neutral state before any logic has run.
    Default,
    Collect,
    Chase,
    Harass,
    NeuralCollector,
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentMode::Default => "default",
            AgentMode::Collect => "collect",
            AgentMode::Chase => "chase",
            AgentMode::Harass => "harass",
            AgentMode::NeuralCollector => "neural-collector",
        };
        f.write_str(s)
    }
}

/// One pluggable behavior. Lifecycle hooks mirror the host's: `on_enable`
/// when the controller assembles its registry, `on_disable` at teardown.
pub trait ComponentAgent {
    fn mode(&self) -> AgentMode;

    fn on_enable(&mut self) {}

    fn on_disable(&mut self) {}

    fn compute_action(&mut self, world: &WorldSnapshot) -> Result<ActionVector, InferenceError>;

    /// Access to the neural mode's extra surface (decision requests,
    /// model swaps). Heuristic modes have none.
    fn as_neural_mut(&mut self) -> Option<&mut NeuralCollectorAgent> {
        None
    }
}

/// The modes available to one bot, assembled once at startup.
pub struct ModeRegistry {
    modes: Vec<Box<dyn ComponentAgent>>,
}

impl ModeRegistry {
    pub fn new(mut modes: Vec<Box<dyn ComponentAgent>>) -> Self {
        for mode in modes.iter_mut() {
            mode.on_enable();
        }
        Self { modes }
    }

    pub fn get_mut(&mut self, mode: AgentMode) -> Option<&mut Box<dyn ComponentAgent>> {
        self.modes.iter_mut().find(|m| m.mode() == mode)
    }

    pub fn contains(&self, mode: AgentMode) -> bool {
        self.modes.iter().any(|m| m.mode() == mode)
    }

    /// Mutable view of every registered neural mode.
    pub fn neural_modes_mut(&mut self) -> impl Iterator<Item = &mut NeuralCollectorAgent> {
        self.modes.iter_mut().filter_map(|m| m.as_neural_mut())
    }

    pub fn teardown(&mut self) {
        for mode in self.modes.iter_mut() {
            mode.on_disable();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_finds_modes_by_tag() {
        let mut registry = ModeRegistry::new(vec![
            Box::new(CollectAgent::new()),
            Box::new(ChaseAgent::new()),
        ]);
        assert!(registry.contains(AgentMode::Collect));
        assert!(registry.get_mut(AgentMode::Chase).is_some());
        assert!(!registry.contains(AgentMode::Harass));
        assert_eq!(registry.neural_modes_mut().count(), 0);
    }
}
