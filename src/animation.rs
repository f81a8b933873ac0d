/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use crate::types::LayerVector;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnimatedProperty {
    Opacity { from: f32, to: f32 },
    Translate { from: LayerVector, to: LayerVector },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnimatedValue {
    Opacity(f32),
    Translate(LayerVector),
}

/// A composited property animation. Times are in seconds.
#[derive(Clone, Debug, PartialEq)]
pub struct Animation {
    pub property: AnimatedProperty,
    pub duration: f64,
    pub delay: f64,
    /// `None` repeats forever.
    pub iterations: Option<u32>,
}

impl Animation {
    pub fn new(property: AnimatedProperty, duration: f64) -> Animation {
        Animation {
            property,
            duration,
            delay: 0.0,
            iterations: Some(1),
        }
    }

    fn value_at(&self, progress: f32) -> AnimatedValue {
        match self.property {
            AnimatedProperty::Opacity { from, to } => {
                AnimatedValue::Opacity(from + (to - from) * progress)
            }
            AnimatedProperty::Translate { from, to } => {
                AnimatedValue::Translate(from.lerp(to, progress))
            }
        }
    }
}

/// Per-generation playback state of one animation.
///
/// Playback does not start until `init` is called, which happens when the
/// owning generation becomes the one on screen. The begin time is taken from
/// the first evaluation after that.
#[derive(Clone, Debug)]
pub struct AnimationState {
    animation: Animation,
    initialized: bool,
    begin_time: Option<f64>,
}

impl AnimationState {
    pub fn new(animation: Animation) -> AnimationState {
        AnimationState {
            animation,
            initialized: false,
            begin_time: None,
        }
    }

    pub fn init(&mut self) {
        self.initialized = true;
        self.begin_time = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Returns the value to apply at `time`, and whether the animation is
    /// still running afterwards.
    pub fn evaluate(&mut self, time: f64) -> (Option<AnimatedValue>, bool) {
        if !self.initialized {
            return (None, false);
        }
        let begin = *self.begin_time.get_or_insert(time);
        let elapsed = time - begin - self.animation.delay;
        if elapsed < 0.0 {
            return (Some(self.animation.value_at(0.0)), true);
        }
        if self.animation.duration <= 0.0 {
            return (Some(self.animation.value_at(1.0)), false);
        }

        let cycles = elapsed / self.animation.duration;
        if let Some(iterations) = self.animation.iterations {
            if cycles >= iterations as f64 {
                return (Some(self.animation.value_at(1.0)), false);
            }
        }
        let progress = cycles.fract() as f32;
        (Some(self.animation.value_at(progress)), true)
    }
}
