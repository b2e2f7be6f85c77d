//! Observation sensors feeding the inference pipeline. A sensor owns its
//! shape, refreshes from a [`WorldSnapshot`], and serializes itself into a
//! flat float slice.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::warn;

use crate::world::{HitTag, WorldSnapshot};

/// Shared sensor handle. Sensors are owned by a mode but also referenced
/// by the batching runner, single threaded throughout.
pub type SensorHandle = Rc<RefCell<dyn Sensor>>;

pub trait Sensor {
    fn name(&self) -> &str;

    /// Flat observation length this sensor writes.
    fn observation_size(&self) -> usize;

    /// Observation rank: 1 for flat vectors, 3 for image-like grids. The
    /// legacy model contract routes sensors to inputs by rank.
    fn rank(&self) -> usize {
        1
    }

    /// Refreshes internal state from the world. Called once per decision
    /// step, before [`Sensor::write`].
    fn update(&mut self, snap: &WorldSnapshot);

    /// Serializes the current observation and returns the number of
    /// floats written.
    fn write(&mut self, writer: &mut ObservationWriter<'_>) -> usize;
}

/// Cursor over a destination float slice, usually one batch row of an
/// observation tensor.
pub struct ObservationWriter<'a> {
    data: &'a mut [f32],
    cursor: usize,
}

impl<'a> ObservationWriter<'a> {
    pub fn new(data: &'a mut [f32]) -> Self {
        Self { data, cursor: 0 }
    }

    pub fn push(&mut self, value: f32) {
        if self.cursor < self.data.len() {
            self.data[self.cursor] = value;
        }
        self.cursor += 1;
    }

    pub fn extend(&mut self, values: &[f32]) {
        for &v in values {
            self.push(v);
        }
    }

    /// Floats pushed so far, including any that overflowed the slice.
    pub fn written(&self) -> usize {
        self.cursor
    }
}

/// Buffered scalar observations, filled by mode code between `update` and
/// `write` through the `add_*` API.
pub struct VectorSensor {
    name: String,
    size: usize,
    buffer: Vec<f32>,
}

impl VectorSensor {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            buffer: Vec::with_capacity(size),
        }
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn add(&mut self, value: f32) {
        self.buffer.push(value);
    }

    pub fn add_bool(&mut self, value: bool) {
        self.buffer.push(if value { 1.0 } else { 0.0 });
    }

}

impl Sensor for VectorSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn observation_size(&self) -> usize {
        self.size
    }

    fn update(&mut self, _snap: &WorldSnapshot) {
        // Content arrives through the add_* API after the clear.
    }

    fn write(&mut self, writer: &mut ObservationWriter<'_>) -> usize {
        if self.buffer.len() != self.size {
            warn!(
                sensor = %self.name,
                expected = self.size,
                got = self.buffer.len(),
                "vector observation count mismatch, padding with zeros"
            );
        }
        for i in 0..self.size {
            writer.push(self.buffer.get(i).copied().unwrap_or(0.0));
        }
        self.size
    }
}

/// Wraps another sensor and emits its last N observations, oldest first.
/// Slots are zero until the wrapped sensor has produced that many updates.
pub struct StackingSensor {
    name: String,
    inner: SensorHandle,
    stack: VecDeque<Vec<f32>>,
    num_stacked: usize,
}

impl StackingSensor {
    pub fn new(inner: SensorHandle, num_stacked: usize) -> Self {
        let (name, size) = {
            let inner = inner.borrow();
            (format!("StackingSensor_size{num_stacked}_{}", inner.name()), inner.observation_size())
        };
        let mut stack = VecDeque::with_capacity(num_stacked);
        for _ in 0..num_stacked {
            stack.push_back(vec![0.0; size]);
        }
        Self { name, inner, stack, num_stacked }
    }
}

impl Sensor for StackingSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn observation_size(&self) -> usize {
        self.num_stacked * self.inner.borrow().observation_size()
    }

    fn update(&mut self, snap: &WorldSnapshot) {
        self.inner.borrow_mut().update(snap);
    }

    fn write(&mut self, writer: &mut ObservationWriter<'_>) -> usize {
        // Capture the wrapped sensor's current observation into the
        // newest slot, dropping the oldest.
        let size = self.inner.borrow().observation_size();
        let mut newest = self.stack.pop_front().unwrap_or_else(|| vec![0.0; size]);
        newest.fill(0.0);
        {
            let mut slot_writer = ObservationWriter::new(&mut newest);
            self.inner.borrow_mut().write(&mut slot_writer);
        }
        self.stack.push_back(newest);

        for slot in &self.stack {
            writer.extend(slot);
        }
        self.observation_size()
    }
}

/// Fan of perception rays around the agent's forward direction.
///
/// Per ray the output is a one-hot over the detectable tags, a miss flag,
/// and the normalized hit distance, in that order.
pub struct RayPerceptionSensor {
    name: String,
    ray_angles: Vec<f32>,
    ray_length: f32,
    detectable: Vec<HitTag>,
    output: Vec<f32>,
}

impl RayPerceptionSensor {
    pub fn new(
        name: impl Into<String>,
        rays_per_direction: usize,
        max_degrees: f32,
        ray_length: f32,
        detectable: Vec<HitTag>,
    ) -> Self {
        let ray_angles = fan_angles(rays_per_direction, max_degrees);
        let output_len = ray_angles.len() * (detectable.len() + 2);
        Self {
            name: name.into(),
            ray_angles,
            ray_length,
            detectable,
            output: vec![0.0; output_len],
        }
    }

}

impl Sensor for RayPerceptionSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn observation_size(&self) -> usize {
        self.output.len()
    }

    fn update(&mut self, snap: &WorldSnapshot) {
        let per_ray = self.detectable.len() + 2;
        self.output.fill(0.0);
        for (ray_index, offset) in self.ray_angles.iter().enumerate() {
            let heading = snap.me.pose.heading_deg + offset;
            let base = ray_index * per_ray;
            match snap.raycast(heading, self.ray_length) {
                Some(hit) => {
                    if let Some(tag_index) = self.detectable.iter().position(|t| *t == hit.tag) {
                        self.output[base + tag_index] = 1.0;
                    }
                    self.output[base + per_ray - 1] = hit.fraction;
                }
                None => {
                    // Miss flag sits after the tag one-hot.
                    self.output[base + self.detectable.len()] = 1.0;
                    self.output[base + per_ray - 1] = 1.0;
                }
            }
        }
    }

    fn write(&mut self, writer: &mut ObservationWriter<'_>) -> usize {
        writer.extend(&self.output);
        self.output.len()
    }
}

/// Middle ray first, then pairs fanning right and left, the layout the
/// trained models expect.
fn fan_angles(rays_per_direction: usize, max_degrees: f32) -> Vec<f32> {
    let mut angles = vec![0.0];
    if rays_per_direction == 0 {
        return angles;
    }
    let delta = max_degrees / rays_per_direction as f32;
    for i in 1..=rays_per_direction {
        angles.push(delta * i as f32);
        angles.push(-delta * i as f32);
    }
    angles
}

/// Observation order is part of the model contract; keep it stable by
/// sorting sensors by name, not by insertion order.
pub fn sort_by_name(sensors: &mut [SensorHandle]) {
    sensors.sort_by_key(|s| s.borrow().name().to_owned());
}

/// Total observation length of a sensor list.
pub fn total_observation_size(sensors: &[SensorHandle]) -> usize {
    sensors.iter().map(|s| s.borrow().observation_size()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::testutil;

    fn handle<S: Sensor + 'static>(sensor: S) -> SensorHandle {
        Rc::new(RefCell::new(sensor))
    }

    #[test]
    fn vector_sensor_pads_short_buffers() {
        let mut sensor = VectorSensor::new("VectorSensor", 4);
        sensor.add(1.0);
        sensor.add_bool(true);
        let mut row = [9.0; 4];
        let mut writer = ObservationWriter::new(&mut row);
        assert_eq!(sensor.write(&mut writer), 4);
        assert_eq!(row, [1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn stacking_sensor_emits_oldest_first_with_zero_padding() {
        let inner = Rc::new(RefCell::new(VectorSensor::new("VectorSensor", 2)));
        let inner_handle: SensorHandle = inner.clone();
        let mut stacked = StackingSensor::new(inner_handle, 3);
        assert_eq!(stacked.observation_size(), 6);

        let snap = testutil::snapshot();
        {
            let mut guard = inner.borrow_mut();
            guard.clear();
            guard.add(1.0);
            guard.add(2.0);
        }
        stacked.update(&snap);
        let mut row = [0.0f32; 6];
        let mut writer = ObservationWriter::new(&mut row);
        stacked.write(&mut writer);
        // Two zero slots precede the single real observation.
        assert_eq!(row, [0.0, 0.0, 0.0, 0.0, 1.0, 2.0]);

        {
            let mut guard = inner.borrow_mut();
            guard.clear();
            guard.add(3.0);
            guard.add(4.0);
        }
        stacked.update(&snap);
        let mut row = [0.0f32; 6];
        let mut writer = ObservationWriter::new(&mut row);
        stacked.write(&mut writer);
        assert_eq!(row, [0.0, 0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn ray_sensor_tags_hits_and_marks_misses() {
        let mut sensor = RayPerceptionSensor::new(
            "RayPerceptionSensor",
            1,
            90.0,
            80.0,
            vec![HitTag::Enemy, HitTag::Wall],
        );
        // 3 rays x (2 tags + miss + fraction).
        assert_eq!(sensor.observation_size(), 12);

        let snap = testutil::snapshot();
        sensor.update(&snap);
        let mut row = [0.0f32; 12];
        let mut writer = ObservationWriter::new(&mut row);
        sensor.write(&mut writer);

        // Middle ray: enemy dead ahead at distance 40 of 80.
        assert_eq!(&row[0..3], &[1.0, 0.0, 0.0]);
        assert!((row[3] - 0.5).abs() < 0.05);
        // Right ray (+90 degrees): wall at 50 of 80.
        assert_eq!(&row[4..7], &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn sensors_are_sorted_by_name() {
        let mut sensors: Vec<SensorHandle> = vec![
            handle(VectorSensor::new("StackingSensor_size3_VectorSensor", 1)),
            handle(VectorSensor::new("RayPerceptionSensor", 1)),
        ];
        sort_by_name(&mut sensors);
        assert_eq!(sensors[0].borrow().name(), "RayPerceptionSensor");
    }

    #[test]
    fn fan_angles_start_at_the_middle() {
        assert_eq!(fan_angles(2, 90.0), vec![0.0, 45.0, -45.0, 90.0, -90.0]);
    }
}
