//! Named, row-major float tensors passed between the generators, the
//! engine, and the appliers. The first shape dimension is always the
//! batch.

/// Canonical tensor names of the model contract. Models address their
/// inputs and outputs by these strings.
pub mod names {
    pub const BATCH_SIZE: &str = "batch_size";
    pub const SEQUENCE_LENGTH: &str = "sequence_length";
    pub const VECTOR_OBSERVATION: &str = "vector_observation";
    pub const RECURRENT_IN: &str = "recurrent_in";
    pub const PREVIOUS_ACTION: &str = "prev_action";
    pub const ACTION_MASK: &str = "action_masks";
    pub const RANDOM_NORMAL_EPSILON: &str = "epsilon";

    pub const VALUE_ESTIMATE: &str = "value_estimate";
    pub const RECURRENT_OUT: &str = "recurrent_out";
    pub const CONTINUOUS_ACTIONS: &str = "continuous_actions";
    pub const DISCRETE_ACTIONS: &str = "discrete_actions";
    /// Combined action output of first-generation models.
    pub const ACTION_DEPRECATED: &str = "action";

    pub fn observation(index: usize) -> String {
        format!("obs_{index}")
    }

    pub fn visual_observation(index: usize) -> String {
        format!("visual_observation_{index}")
    }
}

/// A named tensor with shape metadata and flat row-major storage.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorProxy {
    pub name: String,
    /// Batch-first shape; -1 in the batch slot means "any".
    pub shape: Vec<i64>,
    pub data: Vec<f32>,
}

impl TensorProxy {
    pub fn new(name: impl Into<String>, shape: Vec<i64>) -> Self {
        let len = concrete_len(&shape);
        Self { name: name.into(), shape, data: vec![0.0; len] }
    }

    /// A tensor holding a single scalar.
    pub fn scalar(name: impl Into<String>, value: f32) -> Self {
        Self { name: name.into(), shape: vec![1], data: vec![value] }
    }

    /// Floats per batch row.
    pub fn feature_len(&self) -> usize {
        self.shape
            .iter()
            .skip(1)
            .map(|&d| d.max(0) as usize)
            .product::<usize>()
            .max(1)
    }

    pub fn batch_size(&self) -> usize {
        self.shape.first().map(|&d| d.max(0) as usize).unwrap_or(0)
    }

    /// Sets the batch dimension and zeroes the storage.
    pub fn resize_batch(&mut self, batch_size: usize) {
        if self.shape.is_empty() {
            self.shape = vec![batch_size as i64];
        } else {
            self.shape[0] = batch_size as i64;
        }
        let len = batch_size * self.feature_len();
        self.data.clear();
        self.data.resize(len, 0.0);
    }

    pub fn row(&self, index: usize) -> &[f32] {
        let len = self.feature_len();
        &self.data[index * len..(index + 1) * len]
    }

    pub fn row_mut(&mut self, index: usize) -> &mut [f32] {
        let len = self.feature_len();
        &mut self.data[index * len..(index + 1) * len]
    }

    pub fn fill_row(&mut self, index: usize, value: f32) {
        self.row_mut(index).fill(value);
    }
}

fn concrete_len(shape: &[i64]) -> usize {
    shape.iter().map(|&d| d.max(0) as usize).product()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_batch_zeroes_and_reshapes() {
        let mut t = TensorProxy::new("action_masks", vec![-1, 4]);
        assert_eq!(t.data.len(), 0);
        t.resize_batch(3);
        assert_eq!(t.shape, vec![3, 4]);
        assert_eq!(t.data.len(), 12);

        t.row_mut(1).copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(t.row(1), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(t.row(0), &[0.0; 4]);

        t.resize_batch(2);
        assert_eq!(t.row(1), &[0.0; 4]);
    }

    #[test]
    fn feature_len_ignores_the_batch_dimension() {
        let t = TensorProxy::new("obs_0", vec![-1, 3, 5]);
        assert_eq!(t.feature_len(), 15);
        let scalar = TensorProxy::scalar("batch_size", 7.0);
        assert_eq!(scalar.feature_len(), 1);
        assert_eq!(scalar.data, vec![7.0]);
    }

    #[test]
    fn observation_names_are_indexed() {
        assert_eq!(names::observation(2), "obs_2");
        assert_eq!(names::visual_observation(0), "visual_observation_0");
    }
}
