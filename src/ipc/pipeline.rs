use anyhow::{Result, anyhow};
use log::{error, info, warn};
use serde::Deserialize;
use std::io::{BufRead, Write};

use super::dispatch::ActionDispatcher;
use crate::classifier::{ArgmaxClassifier, Classifier, GatedClassifier, ProcessModel};
use crate::config::Profile;
use crate::hand::FrameInput;
use crate::processor::GestureStreamProcessor;

/// A session backed by model processes, as built from a profile.
pub type Session = StreamSession<ArgmaxClassifier<ProcessModel>, GatedClassifier<ProcessModel>>;

/// One JSON line of the frame stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StreamRequest {
    Frame(FrameInput),
    Reset,
}

/// A processor plus the action bindings applied to its output.
pub struct StreamSession<P, M> {
    processor: GestureStreamProcessor<P, M>,
    dispatcher: ActionDispatcher,
    frames: u64,
}

/// Start both model processes and wire them into a fresh session.
pub fn build_session(profile: &Profile) -> Result<Session> {
    let models = &profile.models;
    let pose_labels = models
        .pose
        .catalog(&profile.base_dir)
        .map_err(|e| anyhow!("pose labels: {e}"))?;
    let motion_labels = models
        .motion
        .catalog(&profile.base_dir)
        .map_err(|e| anyhow!("motion labels: {e}"))?;

    let pose = ArgmaxClassifier::new(ProcessModel::spawn(&models.pose.command)?);
    let motion = GatedClassifier::new(
        ProcessModel::spawn(&models.motion.command)?,
        profile.pipeline.motion_score_threshold,
        profile.pipeline.neutral_motion_class,
    );

    let processor = GestureStreamProcessor::new(profile.settings(), pose, motion)
        .with_labels(pose_labels, motion_labels);
    info!(
        "session ready (profile '{}')",
        profile.meta.name.as_deref().unwrap_or("unnamed")
    );
    Ok(StreamSession::new(
        processor,
        ActionDispatcher::new(profile.bindings.clone(), profile.shortcuts.clone()),
    ))
}

impl<P: Classifier, M: Classifier> StreamSession<P, M> {
    pub fn new(processor: GestureStreamProcessor<P, M>, dispatcher: ActionDispatcher) -> Self {
        Self {
            processor,
            dispatcher,
            frames: 0,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Handle one request and build its JSON reply.
    pub fn handle(&mut self, req: StreamRequest) -> serde_json::Value {
        match req {
            StreamRequest::Reset => {
                self.processor.reset();
                self.dispatcher.reset();
                serde_json::json!({"ok": true, "data": "reset"})
            }
            StreamRequest::Frame(frame) => match self.processor.process_frame(&frame) {
                Ok(result) => {
                    self.frames += 1;
                    let actions = self.dispatcher.update(&result).unwrap_or_else(|e| {
                        warn!("dispatch failed: {e}");
                        Vec::new()
                    });
                    serde_json::json!({"ok": true, "data": result, "actions": actions})
                }
                Err(e) => {
                    error!("frame failed: {e}");
                    serde_json::json!({"ok": false, "error": e.to_string()})
                }
            },
        }
    }

    /// Parse and handle one raw line.
    pub fn handle_line(&mut self, line: &str) -> serde_json::Value {
        match serde_json::from_str::<StreamRequest>(line) {
            Ok(req) => self.handle(req),
            Err(e) => {
                warn!("bad request: {e}");
                serde_json::json!({"ok": false, "error": format!("bad request: {e}")})
            }
        }
    }
}

#[cfg(test)]
impl<P, M> StreamSession<P, M> {
    pub fn processor(&self) -> &GestureStreamProcessor<P, M> {
        &self.processor
    }
}

/// Drive a session from JSON lines until the reader is exhausted. Every
/// non-empty input line gets exactly one reply line.
pub fn run_stream<R, W, P, M>(
    reader: R,
    mut writer: W,
    session: &mut StreamSession<P, M>,
) -> Result<u64>
where
    R: BufRead,
    W: Write,
    P: Classifier,
    M: Classifier,
{
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let resp = session.handle_line(&line);
        writeln!(writer, "{resp}")?;
        writer.flush()?;
    }
    info!("stream finished after {} frames", session.frames());
    Ok(session.frames())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClassifierError;
    use crate::processor::PipelineSettings;
    use crate::voter::ClassId;
    use std::collections::HashMap;
    use std::io::Cursor;

    type Stub = Box<dyn FnMut(&[f32]) -> Result<ClassId, ClassifierError>>;

    fn frame_line(x: f32) -> String {
        let pts: Vec<[f32; 2]> = (0..21).map(|i| [x + i as f32, 100.0 - i as f32]).collect();
        serde_json::json!({"op": "frame", "width": 640, "height": 480, "hands": [{"landmarks": pts}]})
            .to_string()
    }

    fn session(pose: Stub) -> StreamSession<Stub, Stub> {
        let motion: Stub = Box::new(|_: &[f32]| -> Result<ClassId, ClassifierError> { Ok(0) });
        StreamSession::new(
            GestureStreamProcessor::new(PipelineSettings::default(), pose, motion),
            ActionDispatcher::new(
                HashMap::from([("pose.Unknown".to_string(), "action:noop".to_string())]),
                HashMap::new(),
            ),
        )
    }

    #[test]
    fn replies_once_per_line() {
        let pose: Stub = Box::new(|_: &[f32]| -> Result<ClassId, ClassifierError> { Ok(1) });
        let mut s = session(pose);
        let input = format!(
            "{}\n\n{}\n{{\"op\":\"reset\"}}\nnot json\n{{\"op\":\"frame\",\"width\":640,\"height\":480}}\n",
            frame_line(10.0),
            frame_line(12.0)
        );
        let mut out = Vec::new();
        let n = run_stream(Cursor::new(input), &mut out, &mut s).unwrap();
        assert_eq!(n, 3);

        let replies: Vec<serde_json::Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(replies.len(), 5);
        assert_eq!(replies[0]["data"]["pose_id"], 1);
        assert_eq!(replies[0]["data"]["hand_detected"], true);
        // no labels configured, so every id reads as unknown and fires once
        assert_eq!(replies[0]["actions"][0]["trigger"], "pose.Unknown");
        assert_eq!(replies[1]["actions"].as_array().unwrap().len(), 0);
        assert_eq!(replies[2]["data"], "reset");
        assert_eq!(replies[3]["ok"], false);
        assert_eq!(replies[4]["data"]["hand_detected"], false);
    }

    #[test]
    fn classifier_errors_become_error_replies() {
        let pose: Stub = Box::new(|_: &[f32]| -> Result<ClassId, ClassifierError> {
            Err(ClassifierError::Closed)
        });
        let mut s = session(pose);
        let resp = s.handle_line(&frame_line(0.0));
        assert_eq!(resp["ok"], false);
        assert!(resp["error"].as_str().unwrap().contains("pose classifier"));
        assert_eq!(s.frames(), 0);
        assert!(s.processor().pose_history().is_empty());
    }
}
