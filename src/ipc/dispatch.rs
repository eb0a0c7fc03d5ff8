use anyhow::{Result, anyhow};
use log::info;
use serde::Serialize;
use std::collections::HashMap;

use crate::processor::FrameResult;

/// Right-hand side of a `[bindings]` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Named application action, e.g. `play`, resolved to a key via `[shortcuts]`.
    Action(String),
    /// Keyboard shortcut sent directly, e.g. `ArrowRight`.
    Key(String),
}

pub fn parse_binding(s: &str) -> Result<Binding> {
    if let Some(rest) = s.strip_prefix("action:") {
        return Ok(Binding::Action(rest.trim().to_string()));
    }
    if let Some(rest) = s.strip_prefix("key:") {
        return Ok(Binding::Key(rest.trim().to_string()));
    }
    Err(anyhow!("unknown action mapping '{s}'"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionEvent {
    /// Binding key that fired, e.g. `pose.Open`.
    pub trigger: String,
    pub action: Option<String>,
    /// Keyboard shortcut for the action, if one is known.
    pub key: Option<String>,
}

/// Turns stable labels into bound actions. An action fires once when its label
/// becomes the stable label; holding the gesture does not repeat it, and
/// neither does a dropout in the middle of it. Only `reset` re-arms.
#[derive(Debug, Default)]
pub struct ActionDispatcher {
    bindings: HashMap<String, String>,
    shortcuts: HashMap<String, String>,
    last_pose: Option<String>,
    last_motion: Option<String>,
}

impl ActionDispatcher {
    pub fn new(bindings: HashMap<String, String>, shortcuts: HashMap<String, String>) -> Self {
        Self {
            bindings,
            shortcuts,
            last_pose: None,
            last_motion: None,
        }
    }

    pub fn reset(&mut self) {
        self.last_pose = None;
        self.last_motion = None;
    }

    fn resolve(&self, trigger: String, binding: Binding) -> ActionEvent {
        match binding {
            Binding::Action(name) => ActionEvent {
                trigger,
                key: self.shortcuts.get(&name).cloned(),
                action: Some(name),
            },
            Binding::Key(key) => ActionEvent {
                trigger,
                action: None,
                key: Some(key),
            },
        }
    }

    pub fn update(&mut self, frame: &FrameResult) -> Result<Vec<ActionEvent>> {
        if !frame.hand_detected {
            return Ok(Vec::new());
        }

        let mut fired = Vec::new();
        for (kind, label, last) in [
            ("pose", &frame.pose_label, &mut self.last_pose),
            ("motion", &frame.motion_label, &mut self.last_motion),
        ] {
            if *label == *last {
                continue;
            }
            last.clone_from(label);
            let Some(label) = label else { continue };

            let key = format!("{kind}.{label}");
            if let Some(value) = self.bindings.get(&key) {
                fired.push((key, parse_binding(value)?));
            }
        }

        Ok(fired
            .into_iter()
            .map(|(key, binding)| {
                let ev = self.resolve(key, binding);
                info!("{} -> action={:?} key={:?}", ev.trigger, ev.action, ev.key);
                ev
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(pose: &str, motion: &str) -> FrameResult {
        FrameResult {
            hand_detected: true,
            pose_label: Some(pose.to_string()),
            motion_label: Some(motion.to_string()),
            ..FrameResult::no_hand()
        }
    }

    fn dispatcher() -> ActionDispatcher {
        ActionDispatcher::new(
            HashMap::from([
                ("pose.Open".to_string(), "action:play".to_string()),
                ("pose.OK".to_string(), "action:restart".to_string()),
                ("motion.Clockwise".to_string(), "key:>".to_string()),
            ]),
            HashMap::from([("play".to_string(), "Space".to_string())]),
        )
    }

    fn count_fired(d: &mut ActionDispatcher, frames: &[FrameResult]) -> usize {
        frames.iter().map(|f| d.update(f).unwrap().len()).sum()
    }

    #[test]
    fn fires_on_label_change_only() {
        let mut d = dispatcher();
        let ev = d.update(&frame("Open", "Stop")).unwrap();
        assert_eq!(
            ev,
            vec![ActionEvent {
                trigger: "pose.Open".into(),
                action: Some("play".into()),
                key: Some("Space".into()),
            }]
        );
        assert!(d.update(&frame("Open", "Stop")).unwrap().is_empty());

        let ev = d.update(&frame("Open", "Clockwise")).unwrap();
        assert_eq!(ev.len(), 1);
        assert_eq!(ev[0].action, None);
        assert_eq!(ev[0].key.as_deref(), Some(">"));
    }

    #[test]
    fn actions_without_shortcut_keep_their_name() {
        let mut d = dispatcher();
        let ev = d.update(&frame("OK", "Stop")).unwrap();
        assert_eq!(ev[0].action.as_deref(), Some("restart"));
        assert_eq!(ev[0].key, None);
    }

    #[test]
    fn unbound_labels_are_ignored() {
        let mut d = dispatcher();
        assert!(d.update(&frame("Pointer", "Move Up")).unwrap().is_empty());
    }

    #[test]
    fn dropout_inside_held_gesture_fires_once() {
        let mut d = dispatcher();
        let mut frames: Vec<FrameResult> = (0..10).map(|_| frame("Open", "Stop")).collect();
        frames[5] = FrameResult::no_hand();
        assert_eq!(count_fired(&mut d, &frames), 1);
    }

    #[test]
    fn new_gesture_after_dropout_fires() {
        let mut d = dispatcher();
        let frames = [
            frame("Open", "Stop"),
            FrameResult::no_hand(),
            frame("OK", "Stop"),
            frame("Open", "Stop"),
        ];
        assert_eq!(count_fired(&mut d, &frames), 3);
    }

    #[test]
    fn reset_rearms() {
        let mut d = dispatcher();
        assert_eq!(d.update(&frame("Open", "Stop")).unwrap().len(), 1);
        d.reset();
        assert_eq!(d.update(&frame("Open", "Stop")).unwrap().len(), 1);
    }

    #[test]
    fn serializes_action_and_key() {
        let ev = ActionEvent {
            trigger: "pose.OK".into(),
            action: Some("restart".into()),
            key: Some("r".into()),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(
            v,
            serde_json::json!({"trigger": "pose.OK", "action": "restart", "key": "r"})
        );
        assert!(parse_binding("cmd:rm").is_err());
        assert_eq!(parse_binding("key: f").unwrap(), Binding::Key("f".into()));
    }
}
