use crate::geometry::matrix::Matrix4f;
use crate::scene::{InstanceId, ObjectId};
use crate::{bezier_factors, time_mapped, Float};
use anyhow::{bail, Result};

/// What an instance replicates: a mesh object or another instance
/// (nested instancing flattens at scene preprocess).
#[derive(Debug, Clone, Copy)]
pub enum InstanceBase {
    Object(ObjectId),
    Instance(InstanceId),
}

/// One object-to-world keyframe.
#[derive(Debug, Clone, Copy)]
struct TimeStepTransform {
    obj_to_world: Matrix4f,
    time: Float,
}

/// A placed copy of one or more base objects. One keyframe makes the
/// transform static; three make it quadratic-Bezier animated over the
/// keyframe time range.
#[derive(Debug, Default)]
pub struct Instance {
    time_steps: Vec<TimeStepTransform>,
    base_ids: Vec<InstanceBase>,
}

impl Instance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_object(&mut self, id: ObjectId) {
        self.base_ids.push(InstanceBase::Object(id));
    }

    pub fn add_instance(&mut self, id: InstanceId) {
        self.base_ids.push(InstanceBase::Instance(id));
    }

    /// Appends a keyframe; callers provide one (static) or three (Bezier).
    pub fn add_matrix(&mut self, obj_to_world: Matrix4f, time: Float) {
        self.time_steps.push(TimeStepTransform { obj_to_world, time });
    }

    pub fn base_ids(&self) -> &[InstanceBase] {
        &self.base_ids
    }

    pub fn has_motion_blur(&self) -> bool {
        self.time_steps.len() > 2
    }

    pub fn num_keyframes(&self) -> usize {
        self.time_steps.len()
    }

    /// Validates the keyframe count at scene preprocess.
    pub fn finalize(&self) -> Result<()> {
        match self.time_steps.len() {
            1 | 3 => Ok(()),
            n => bail!("instance has {} keyframes; expected 1 (static) or 3 (Bezier)", n),
        }
    }

    pub fn matrix(&self, step: usize) -> &Matrix4f {
        &self.time_steps[step].obj_to_world
    }

    pub fn matrix_at_time(&self, time: Float) -> Matrix4f {
        if !self.has_motion_blur() {
            return self.time_steps[0].obj_to_world;
        }
        let time_start = self.time_steps.first().map(|s| s.time).unwrap_or(0.0);
        let time_end = self.time_steps.last().map(|s| s.time).unwrap_or(1.0);
        if time <= time_start {
            self.time_steps[0].obj_to_world
        } else if time >= time_end {
            self.time_steps[2].obj_to_world
        } else {
            let t = time_mapped(time, time_start, time_end);
            let factors = bezier_factors(t);
            Matrix4f::bezier_interpolate(
                &[
                    self.time_steps[0].obj_to_world,
                    self.time_steps[1].obj_to_world,
                    self.time_steps[2].obj_to_world,
                ],
                factors,
            )
        }
    }
}
