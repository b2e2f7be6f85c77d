pub mod actions;
pub mod arena;
pub mod controller;
pub mod geom;
pub mod inference;
pub mod modes;
pub mod sensors;
pub mod steering;
pub mod world;

// Re-export commonly used types for convenience
pub use actions::ActionVector;
pub use controller::{BotController, ClassicLogic, DecisionTicker, HarassLogic};
pub use modes::{AgentMode, ModeRegistry};
pub use world::WorldSnapshot;
