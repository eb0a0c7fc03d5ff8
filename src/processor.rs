//! Per-session gesture pipeline: turns hand observations into stable pose and
//! motion labels.
//!
//! One [`GestureStreamProcessor`] owns every piece of temporal state for a
//! single tracked hand. Independent video sources need independent processors.

use log::{debug, info, warn};
use serde::Serialize;

use crate::classifier::Classifier;
use crate::error::PipelineError;
use crate::hand::{BoundingBox, FrameInput, HandObservation, INDEX_FINGERTIP, Point};
use crate::labels::LabelCatalog;
use crate::normalize::normalize;
use crate::smoother::{DEFAULT_ALPHA, TemporalSmoother};
use crate::trajectory::{DEFAULT_WINDOW_LEN, TrajectoryWindow};
use crate::voter::{ClassId, DEFAULT_HISTORY_LEN, LabelHistory, record_and_resolve};

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub ema_alpha: f32,
    pub history_len: usize,
    pub window_len: usize,
    /// Raw pose id that enables fingertip trajectory capture.
    pub pointer_class: ClassId,
    /// Motion id reported while no motion judgment is possible.
    pub neutral_motion_class: ClassId,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            ema_alpha: DEFAULT_ALPHA,
            history_len: DEFAULT_HISTORY_LEN,
            window_len: DEFAULT_WINDOW_LEN,
            pointer_class: 2,
            neutral_motion_class: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    NoHand,
    HandTracked,
}

/// Outcome of one processed frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameResult {
    pub hand_detected: bool,
    pub pose_id: Option<ClassId>,
    pub pose_label: Option<String>,
    pub motion_id: Option<ClassId>,
    pub motion_label: Option<String>,
    pub raw_pose_id: Option<ClassId>,
    pub raw_motion_id: Option<ClassId>,
    pub landmarks: Option<Vec<[i32; 2]>>,
    pub bounding_box: Option<BoundingBox>,
    pub handedness: Option<String>,
}

impl FrameResult {
    pub fn no_hand() -> Self {
        Self {
            hand_detected: false,
            pose_id: None,
            pose_label: None,
            motion_id: None,
            motion_label: None,
            raw_pose_id: None,
            raw_motion_id: None,
            landmarks: None,
            bounding_box: None,
            handedness: None,
        }
    }
}

pub struct GestureStreamProcessor<P, M> {
    settings: PipelineSettings,
    pose_classifier: P,
    motion_classifier: M,
    pose_labels: LabelCatalog,
    motion_labels: LabelCatalog,

    // session state
    state: TrackingState,
    smoother: TemporalSmoother,
    window: TrajectoryWindow,
    pose_history: LabelHistory,
    motion_history: LabelHistory,
}

impl<P: Classifier, M: Classifier> GestureStreamProcessor<P, M> {
    pub fn new(settings: PipelineSettings, pose_classifier: P, motion_classifier: M) -> Self {
        Self {
            smoother: TemporalSmoother::new(settings.ema_alpha),
            window: TrajectoryWindow::new(settings.window_len),
            pose_history: LabelHistory::new(settings.history_len),
            motion_history: LabelHistory::new(settings.history_len),
            state: TrackingState::NoHand,
            settings,
            pose_classifier,
            motion_classifier,
            pose_labels: LabelCatalog::default(),
            motion_labels: LabelCatalog::default(),
        }
    }

    pub fn with_labels(mut self, pose_labels: LabelCatalog, motion_labels: LabelCatalog) -> Self {
        self.pose_labels = pose_labels;
        self.motion_labels = motion_labels;
        self
    }

    /// Process a detector frame. Only the first reported hand is used; a
    /// malformed hand is logged and handled as if no hand was seen.
    pub fn process_frame(&mut self, frame: &FrameInput) -> Result<FrameResult, PipelineError> {
        let hand = match frame.primary_hand() {
            Some(h) => match h.validate() {
                Ok(()) => Some(h),
                Err(e) => {
                    warn!("ignoring malformed hand: {e}");
                    None
                }
            },
            None => None,
        };
        if frame.hands.len() > 1 {
            debug!("{} hands reported; tracking the first", frame.hands.len());
        }
        self.process(hand, frame.width, frame.height)
    }

    /// Advance the session by one frame.
    ///
    /// Session state is only modified once both classifiers have answered, so
    /// an error leaves the session exactly as it was.
    pub fn process(
        &mut self,
        hand: Option<&HandObservation>,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<FrameResult, PipelineError> {
        let Some(hand) = hand else {
            self.window.push_degenerate();
            self.transition(TrackingState::NoHand);
            return Ok(FrameResult::no_hand());
        };
        hand.validate()?;

        let raw = &hand.landmarks;
        let bounding_box = BoundingBox::around(raw, frame_width, frame_height);
        // staged copies; committed only after both classifiers succeed
        let mut smoother = self.smoother.clone();
        let smoothed = smoother.smooth(raw)?;

        let pose_features = normalize(&smoothed);
        let raw_pose_id = self
            .pose_classifier
            .classify(&pose_features)
            .map_err(PipelineError::PoseClassifier)?;

        // gate on the raw pose so capture reacts without the vote's lag
        let sample = if raw_pose_id == self.settings.pointer_class {
            smoothed.get(INDEX_FINGERTIP).copied().unwrap_or(Point::ORIGIN)
        } else {
            Point::ORIGIN
        };
        let mut window = self.window.clone();
        window.push(sample);

        let raw_motion_id = if window.is_full() {
            let motion_features = window.flatten_normalized(frame_width, frame_height);
            self.motion_classifier
                .classify(&motion_features)
                .map_err(PipelineError::MotionClassifier)?
        } else {
            self.settings.neutral_motion_class
        };

        let landmarks = smoothed.iter().map(Point::rounded).collect();
        self.smoother = smoother;
        self.window = window;
        let pose_id = record_and_resolve(&mut self.pose_history, raw_pose_id);
        let motion_id = record_and_resolve(&mut self.motion_history, raw_motion_id);
        self.transition(TrackingState::HandTracked);

        debug!("pose {raw_pose_id}->{pose_id} motion {raw_motion_id}->{motion_id}");
        Ok(FrameResult {
            hand_detected: true,
            pose_id: Some(pose_id),
            pose_label: Some(self.pose_labels.label(pose_id).to_string()),
            motion_id: Some(motion_id),
            motion_label: Some(self.motion_labels.label(motion_id).to_string()),
            raw_pose_id: Some(raw_pose_id),
            raw_motion_id: Some(raw_motion_id),
            landmarks: Some(landmarks),
            bounding_box,
            handedness: hand.handedness.clone(),
        })
    }

    /// Forget all temporal state; the next frame behaves like a session start.
    pub fn reset(&mut self) {
        self.smoother.reset();
        self.window.clear();
        self.pose_history.clear();
        self.motion_history.clear();
        self.state = TrackingState::NoHand;
        info!("session reset");
    }

    fn transition(&mut self, next: TrackingState) {
        if self.state != next {
            debug!("tracking: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

#[cfg(test)]
impl<P, M> GestureStreamProcessor<P, M> {
    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn window(&self) -> &TrajectoryWindow {
        &self.window
    }

    pub fn pose_history(&self) -> &LabelHistory {
        &self.pose_history
    }

    pub fn motion_history(&self) -> &LabelHistory {
        &self.motion_history
    }
}
