//! Top level bot loop. Every tick the controller re-evaluates which mode
//! should drive, lets that mode produce an action vector, and hands the
//! result to the steering layer.

use std::rc::Rc;

use tracing::{info, warn};

use crate::actions::ActionVector;
use crate::inference::model::ModelHandle;
use crate::inference::InferenceError;
use crate::modes::{AgentMode, ComponentAgent, ModeRegistry};
use crate::steering::{MoveCommand, ShootConfig, Steering};
use crate::world::WorldSnapshot;

/// Captures banked beyond which the bot turns aggressive outright.
const RUNAWAY_LEAD: usize = 5;
/// Seconds left under which a lead is worth defending by chasing.
const ENDGAME_SECONDS: f32 = 60.0;
/// Harass thresholds, lead based and absolute.
const HARASS_FLOOR: usize = 4;

/// Picks the mode for the coming tick. `previous` is the mode that drove
/// the last tick, so logics can carry state across evaluations.
pub trait ModeLogic {
    fn determine_mode(&self, world: &WorldSnapshot, previous: AgentMode) -> AgentMode;
}

/// First generation logic: collect by default, chase when the scoreboard
/// or an exposed enemy carrier says aggression pays off. Once chasing,
/// keep chasing until the enemy freezes or the lead evaporates.
#[derive(Debug, Default)]
pub struct ClassicLogic;

impl ModeLogic for ClassicLogic {
    fn determine_mode(&self, world: &WorldSnapshot, previous: AgentMode) -> AgentMode {
        let committed = previous == AgentMode::Chase && !world.enemy.frozen;
        let carrier_exposed =
            world.enemy.carrying > world.me.carrying && world.enemy_is_facing_away();
        let runaway = world.my_captured > RUNAWAY_LEAD;
        let closing_out = world.my_captured > world.their_captured
            && world.time_remaining < ENDGAME_SECONDS;

        if committed || carrier_exposed || runaway || closing_out {
            // A chase is only worth it while ahead and unburdened.
            if world.my_captured <= world.their_captured || world.me.carrying > 0 {
                AgentMode::Collect
            } else {
                AgentMode::Chase
            }
        } else {
            AgentMode::Collect
        }
    }
}

/// Second generation logic: harass whenever ahead on captures or past an
/// absolute floor, otherwise collect.
#[derive(Debug, Default)]
pub struct HarassLogic;

impl ModeLogic for HarassLogic {
    fn determine_mode(&self, world: &WorldSnapshot, _previous: AgentMode) -> AgentMode {
        if world.my_captured > world.their_captured || world.my_captured >= HARASS_FLOOR {
            AgentMode::Harass
        } else {
            AgentMode::Collect
        }
    }
}

/// Schedules network decisions on a fixed period, optionally repeating
/// the last decision on the ticks in between.
#[derive(Debug, Clone, Copy)]
pub struct DecisionTicker {
    period: u64,
    take_actions_between_decisions: bool,
}

impl DecisionTicker {
    pub fn new(period: u64, take_actions_between_decisions: bool) -> Self {
        Self { period: period.max(1), take_actions_between_decisions }
    }

    pub fn wants_decision(&self, step: u64) -> bool {
        step % self.period == 0
    }

    pub fn wants_action(&self, step: u64) -> bool {
        self.wants_decision(step) || self.take_actions_between_decisions
    }
}

impl Default for DecisionTicker {
    fn default() -> Self {
        Self::new(5, true)
    }
}

pub struct BotController {
    registry: ModeRegistry,
    logic: Box<dyn ModeLogic>,
    steering: Steering,
    ticker: DecisionTicker,
    current_mode: AgentMode,
}

impl BotController {
    pub fn new(
        registry: ModeRegistry,
        logic: Box<dyn ModeLogic>,
        ticker: DecisionTicker,
        shoot_config: ShootConfig,
    ) -> Self {
        Self {
            registry,
            logic,
            steering: Steering::new(shoot_config),
            ticker,
            current_mode: AgentMode::Default,
        }
    }

    pub fn current_mode(&self) -> AgentMode {
        self.current_mode
    }

    /// Runs one tick: mode selection, mode action, steering.
    pub fn step(&mut self, world: &WorldSnapshot) -> Result<MoveCommand, InferenceError> {
        let next = self.logic.determine_mode(world, self.current_mode);
        if next != self.current_mode {
            info!(from = %self.current_mode, to = %next, tick = world.tick, "mode switch");
            self.current_mode = next;
        }

        let action = match self.registry.get_mut(next) {
            Some(agent) => {
                if let Some(neural) = agent.as_neural_mut() {
                    if self.ticker.wants_decision(world.tick) {
                        neural.request_decision();
                    } else if self.ticker.wants_action(world.tick) {
                        neural.request_action();
                    }
                }
                agent.compute_action(world)?
            }
            None => {
                warn!(mode = %next, "mode not registered, holding still");
                ActionVector::NOOP
            }
        };

        Ok(self.steering.apply_action(world, action))
    }

    /// Swaps `new_model` into every neural mode currently driven by
    /// `old_model` and returns how many were updated. Modes running a
    /// different model are left alone.
    pub fn reinitialize_nn_agents(
        &mut self,
        old_model: &ModelHandle,
        new_model: ModelHandle,
    ) -> Result<usize, InferenceError> {
        let mut swapped = 0;
        for neural in self.registry.neural_modes_mut() {
            match neural.model() {
                Some(current) if Rc::ptr_eq(&current, old_model) => {
                    neural.set_model(new_model.clone())?;
                    swapped += 1;
                }
                _ => {}
            }
        }
        if swapped == 0 {
            warn!("no neural mode is running the old model, nothing swapped");
        }
        Ok(swapped)
    }

    pub fn teardown(&mut self) {
        self.registry.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ForwardAxis, RotateAxis};
    use crate::inference::runner::EpisodeId;
    use crate::inference::scripted::ScriptedModel;
    use crate::modes::{ChaseAgent, CollectAgent, ComponentAgent, NeuralCollectorAgent};
    use crate::world::testutil;

    #[test]
    fn classic_chases_an_exposed_carrier_while_ahead() {
        let mut snap = testutil::snapshot();
        snap.my_captured = 3;
        snap.their_captured = 1;
        snap.time_remaining = 200.0;
        snap.enemy.carrying = 2;
        snap.enemy.pose.heading_deg = 0.0;
        let mode = ClassicLogic.determine_mode(&snap, AgentMode::Default);
        assert_eq!(mode, AgentMode::Chase);
    }

    #[test]
    fn classic_collects_when_behind_or_carrying() {
        let mut snap = testutil::snapshot();
        snap.my_captured = 1;
        snap.their_captured = 3;
        snap.me.carrying = 1;
        let mode = ClassicLogic.determine_mode(&snap, AgentMode::Chase);
        assert_eq!(mode, AgentMode::Collect);
    }

    #[test]
    fn classic_chases_on_a_runaway_lead() {
        let mut snap = testutil::snapshot();
        snap.my_captured = 6;
        let mode = ClassicLogic.determine_mode(&snap, AgentMode::Default);
        assert_eq!(mode, AgentMode::Chase);
    }

    #[test]
    fn classic_keeps_chasing_a_mobile_enemy_while_ahead() {
        // The commitment branch alone must hold the mode, with no other
        // chase trigger active.
        let mut snap = testutil::snapshot();
        snap.my_captured = 3;
        snap.their_captured = 1;
        snap.time_remaining = 200.0;
        assert_eq!(
            ClassicLogic.determine_mode(&snap, AgentMode::Chase),
            AgentMode::Chase
        );
        // The same board seen from Collect stays Collect.
        assert_eq!(
            ClassicLogic.determine_mode(&snap, AgentMode::Collect),
            AgentMode::Collect
        );
    }

    #[test]
    fn classic_drops_the_chase_once_the_enemy_freezes() {
        let mut snap = testutil::snapshot();
        snap.my_captured = 3;
        snap.their_captured = 1;
        snap.time_remaining = 200.0;
        snap.enemy.frozen = true;
        let mode = ClassicLogic.determine_mode(&snap, AgentMode::Chase);
        assert_eq!(mode, AgentMode::Collect);
    }

    #[test]
    fn harass_triggers_on_a_lead_or_the_floor() {
        let mut snap = testutil::snapshot();
        snap.my_captured = 2;
        snap.their_captured = 1;
        assert_eq!(
            HarassLogic.determine_mode(&snap, AgentMode::Default),
            AgentMode::Harass
        );
        snap.my_captured = 4;
        snap.their_captured = 9;
        assert_eq!(
            HarassLogic.determine_mode(&snap, AgentMode::Default),
            AgentMode::Harass
        );
        snap.my_captured = 0;
        snap.their_captured = 0;
        assert_eq!(
            HarassLogic.determine_mode(&snap, AgentMode::Default),
            AgentMode::Collect
        );
    }

    #[test]
    fn ticker_spaces_decisions_by_period() {
        let ticker = DecisionTicker::new(5, true);
        assert!(ticker.wants_decision(0));
        assert!(!ticker.wants_decision(3));
        assert!(ticker.wants_decision(5));
        assert!(ticker.wants_action(3));

        let sparse = DecisionTicker::new(5, false);
        assert!(sparse.wants_action(5));
        assert!(!sparse.wants_action(3));
    }

    #[test]
    fn missing_mode_degrades_to_standing_still() {
        let registry = ModeRegistry::new(vec![Box::new(CollectAgent::new())]);
        let mut controller = BotController::new(
            registry,
            Box::new(HarassLogic),
            DecisionTicker::default(),
            ShootConfig::default(),
        );
        let mut snap = testutil::snapshot();
        snap.my_captured = 5;
        let command = controller.step(&snap).unwrap();
        assert_eq!(controller.current_mode(), AgentMode::Harass);
        assert_eq!(command.dir_to_go, crate::geom::Vec2::ZERO);
        assert!(!command.laser_on);
    }

    #[test]
    fn step_routes_through_the_selected_mode() {
        let registry = ModeRegistry::new(vec![
            Box::new(CollectAgent::new()),
            Box::new(ChaseAgent::new()),
        ]);
        let mut controller = BotController::new(
            registry,
            Box::new(ClassicLogic),
            DecisionTicker::default(),
            ShootConfig::default(),
        );
        let mut snap = testutil::snapshot();
        snap.my_captured = 6;
        // Chase drives straight at the enemy ahead.
        let command = controller.step(&snap).unwrap();
        assert!(command.dir_to_go.y > 0.9);
    }

    #[test]
    fn a_short_match_runs_end_to_end() {
        use crate::arena::Arena;

        let mut arena = Arena::new(11);
        let mut bots = [
            BotController::new(
                ModeRegistry::new(vec![
                    Box::new(CollectAgent::new()),
                    Box::new(ChaseAgent::new()),
                ]),
                Box::new(ClassicLogic),
                DecisionTicker::default(),
                ShootConfig::default(),
            ),
            BotController::new(
                ModeRegistry::new(vec![Box::new(CollectAgent::new())]),
                Box::new(HarassLogic),
                DecisionTicker::default(),
                ShootConfig::default(),
            ),
        ];

        for _ in 0..300 {
            let commands = [
                bots[0].step(&arena.snapshot_for(0)).unwrap(),
                bots[1].step(&arena.snapshot_for(1)).unwrap(),
            ];
            arena.step(commands);
        }
        assert_eq!(arena.tick(), 300);
        // Both bots settle into a real mode after the first tick.
        assert_ne!(bots[0].current_mode(), AgentMode::Default);
        assert_ne!(bots[1].current_mode(), AgentMode::Default);
    }

    #[test]
    fn model_swap_touches_only_matching_agents() {
        let mut agent = NeuralCollectorAgent::new(EpisodeId(1), 7, true);
        agent.on_enable();
        let preferred = ActionVector {
            forward: ForwardAxis::Forward,
            rotate: RotateAxis::Hold,
            ..ActionVector::NOOP
        };
        let obs_size = 408;
        let old: ModelHandle = Rc::new(ScriptedModel::preferring(obs_size, preferred));
        agent.set_model(old.clone()).unwrap();

        let registry = ModeRegistry::new(vec![Box::new(agent)]);
        let mut controller = BotController::new(
            registry,
            Box::new(ClassicLogic),
            DecisionTicker::default(),
            ShootConfig::default(),
        );
        let new: ModelHandle = Rc::new(ScriptedModel::preferring(obs_size, ActionVector::NOOP));
        assert_eq!(controller.reinitialize_nn_agents(&old, new.clone()).unwrap(), 1);
        // A second swap finds nothing on the old model.
        assert_eq!(controller.reinitialize_nn_agents(&old, new).unwrap(), 0);
    }
}
