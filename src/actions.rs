//! Discrete action vocabulary and the action-space description shared with
//! the inference pipeline.

use thiserror::Error;

/// Number of discrete branches in the agent action vector.
pub const NUM_ACTION_BRANCHES: usize = 5;

/// Branch sizes of the agent action vector, in declared order:
/// forward, rotate, shoot, go-to-target, go-to-base.
pub const AGENT_BRANCH_SIZES: [usize; NUM_ACTION_BRANCHES] = [3, 3, 2, 2, 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForwardAxis {
    #[default]
    Hold,
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotateAxis {
    #[default]
    Hold,
    Right,
    Left,
}

/// The 5-slot discrete action vector every behavioral mode produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionVector {
    pub forward: ForwardAxis,
    pub rotate: RotateAxis,
    pub shoot: bool,
    pub go_to_target: bool,
    pub go_to_base: bool,
}

impl ActionVector {
    /// The do-nothing action. Transient absences (no enemy, no reachable
    /// target, no model) degrade to this instead of failing.
    pub const NOOP: ActionVector = ActionVector {
        forward: ForwardAxis::Hold,
        rotate: RotateAxis::Hold,
        shoot: false,
        go_to_target: false,
        go_to_base: false,
    };

    pub fn to_discrete(&self) -> [i32; NUM_ACTION_BRANCHES] {
        let forward = match self.forward {
            ForwardAxis::Hold => 0,
            ForwardAxis::Forward => 1,
            ForwardAxis::Backward => 2,
        };
        let rotate = match self.rotate {
            RotateAxis::Hold => 0,
            RotateAxis::Right => 1,
            RotateAxis::Left => 2,
        };
        [
            forward,
            rotate,
            self.shoot as i32,
            self.go_to_target as i32,
            self.go_to_base as i32,
        ]
    }

    /// Decodes a raw discrete buffer; out-of-range values clamp to the
    /// hold/off choice rather than failing, since model outputs are already
    /// range-checked by the applier.
    pub fn from_discrete(raw: &[i32]) -> ActionVector {
        let at = |i: usize| raw.get(i).copied().unwrap_or(0);
        ActionVector {
            forward: match at(0) {
                1 => ForwardAxis::Forward,
                2 => ForwardAxis::Backward,
                _ => ForwardAxis::Hold,
            },
            rotate: match at(1) {
                1 => RotateAxis::Right,
                2 => RotateAxis::Left,
                _ => RotateAxis::Hold,
            },
            shoot: at(2) == 1,
            go_to_target: at(3) == 1,
            go_to_base: at(4) == 1,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error(
    "action spaces with both continuous and discrete actions are not supported \
     by legacy models; the spec must be all continuous or all discrete"
)]
pub struct MixedActionSpecError;

/// Describes the shape of a policy's action space. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    num_continuous: usize,
    branch_sizes: Vec<usize>,
}

impl ActionSpec {
    pub fn make_discrete(branch_sizes: &[usize]) -> Self {
        Self { num_continuous: 0, branch_sizes: branch_sizes.to_vec() }
    }

    pub fn make_continuous(num_actions: usize) -> Self {
        Self { num_continuous: num_actions, branch_sizes: Vec::new() }
    }

    /// The spec every agent mode in this crate uses: 5 discrete branches
    /// sized (3, 3, 2, 2, 2), matching [`ActionVector`].
    pub fn agent_default() -> Self {
        Self::make_discrete(&AGENT_BRANCH_SIZES)
    }

    pub fn num_continuous(&self) -> usize {
        self.num_continuous
    }

    pub fn num_discrete(&self) -> usize {
        self.branch_sizes.len()
    }

    pub fn branch_sizes(&self) -> &[usize] {
        &self.branch_sizes
    }

    pub fn sum_of_discrete_branches(&self) -> usize {
        self.branch_sizes.iter().sum()
    }

    /// Legacy trainers only support purely continuous or purely discrete
    /// action spaces; a combined spec against one is a configuration error.
    pub fn check_all_continuous_or_discrete(&self) -> Result<(), MixedActionSpecError> {
        if self.num_continuous > 0 && !self.branch_sizes.is_empty() {
            return Err(MixedActionSpecError);
        }
        Ok(())
    }

    pub fn combine(specs: &[ActionSpec]) -> ActionSpec {
        let num_continuous = specs.iter().map(|s| s.num_continuous).sum();
        let branch_sizes: Vec<usize> =
            specs.iter().flat_map(|s| s.branch_sizes.iter().copied()).collect();
        ActionSpec { num_continuous, branch_sizes }
    }
}

/// Continuous and discrete action buffers for one agent, as filled by the
/// inference pipeline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionBuffers {
    pub continuous: Vec<f32>,
    pub discrete: Vec<i32>,
}

impl ActionBuffers {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn for_spec(spec: &ActionSpec) -> Self {
        Self {
            continuous: vec![0.0; spec.num_continuous()],
            discrete: vec![0; spec.num_discrete()],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.continuous.is_empty() && self.discrete.is_empty()
    }

    pub fn clear(&mut self) {
        self.continuous.fill(0.0);
        self.discrete.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_vector_roundtrips_through_discrete() {
        let action = ActionVector {
            forward: ForwardAxis::Backward,
            rotate: RotateAxis::Right,
            shoot: true,
            go_to_target: false,
            go_to_base: true,
        };
        assert_eq!(action.to_discrete(), [2, 1, 1, 0, 1]);
        assert_eq!(ActionVector::from_discrete(&action.to_discrete()), action);
    }

    #[test]
    fn noop_is_all_zero() {
        assert_eq!(ActionVector::NOOP.to_discrete(), [0; NUM_ACTION_BRANCHES]);
    }

    #[test]
    fn agent_spec_shape() {
        let spec = ActionSpec::agent_default();
        assert_eq!(spec.num_discrete(), 5);
        assert_eq!(spec.sum_of_discrete_branches(), 12);
        assert!(spec.check_all_continuous_or_discrete().is_ok());
    }

    #[test]
    fn mixed_spec_is_rejected() {
        let mixed = ActionSpec::combine(&[
            ActionSpec::make_continuous(2),
            ActionSpec::make_discrete(&[3]),
        ]);
        assert_eq!(mixed.check_all_continuous_or_discrete(), Err(MixedActionSpecError));
    }

    #[test]
    fn combine_concatenates_branches_in_order() {
        let combined = ActionSpec::combine(&[
            ActionSpec::make_discrete(&[3, 3]),
            ActionSpec::make_discrete(&[2, 2, 2]),
        ]);
        assert_eq!(combined.branch_sizes(), &[3, 3, 2, 2, 2]);
    }
}
