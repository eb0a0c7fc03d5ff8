//! Classifier capability and the adapters around probability-producing models.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    io::{BufRead, BufReader, Write},
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
};

use crate::error::ClassifierError;
use crate::voter::ClassId;

/// Maps a feature vector to a class id.
pub trait Classifier {
    fn classify(&mut self, features: &[f32]) -> Result<ClassId, ClassifierError>;
}

impl<F> Classifier for F
where
    F: FnMut(&[f32]) -> Result<ClassId, ClassifierError>,
{
    fn classify(&mut self, features: &[f32]) -> Result<ClassId, ClassifierError> {
        self(features)
    }
}

/// Maps a feature vector to a probability per class.
pub trait ProbabilityModel {
    fn predict(&mut self, features: &[f32]) -> Result<Vec<f32>, ClassifierError>;
}

/// Index and value of the highest probability. The first maximum wins.
fn top_class(probs: &[f32]) -> Result<(ClassId, f32), ClassifierError> {
    let mut best: Option<(ClassId, f32)> = None;
    for (i, &p) in probs.iter().enumerate() {
        if best.is_none_or(|(_, top)| p > top) {
            best = Some((i, p));
        }
    }
    best.ok_or(ClassifierError::EmptyDistribution)
}

/// Plain arg-max over a model's distribution.
pub struct ArgmaxClassifier<M> {
    model: M,
}

impl<M: ProbabilityModel> ArgmaxClassifier<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

impl<M: ProbabilityModel> Classifier for ArgmaxClassifier<M> {
    fn classify(&mut self, features: &[f32]) -> Result<ClassId, ClassifierError> {
        let probs = self.model.predict(features)?;
        Ok(top_class(&probs)?.0)
    }
}

/// Arg-max that falls back to a neutral class when the model is not confident.
pub struct GatedClassifier<M> {
    model: M,
    score_threshold: f32,
    fallback: ClassId,
}

impl<M: ProbabilityModel> GatedClassifier<M> {
    pub fn new(model: M, score_threshold: f32, fallback: ClassId) -> Self {
        Self {
            model,
            score_threshold,
            fallback,
        }
    }
}

impl<M: ProbabilityModel> Classifier for GatedClassifier<M> {
    fn classify(&mut self, features: &[f32]) -> Result<ClassId, ClassifierError> {
        let probs = self.model.predict(features)?;
        let (id, score) = top_class(&probs)?;
        if score < self.score_threshold {
            debug!(
                "motion class {id} below threshold ({score:.3} < {:.3}); using {}",
                self.score_threshold, self.fallback
            );
            return Ok(self.fallback);
        }
        Ok(id)
    }
}

#[derive(Serialize)]
struct ModelRequest<'a> {
    features: &'a [f32],
}

#[derive(Deserialize)]
struct ModelResponse {
    probabilities: Vec<f32>,
}

/// A model served by a child process over JSON lines on stdin/stdout.
///
/// Each request is `{"features":[...]}`; each reply is `{"probabilities":[...]}`.
pub struct ProcessModel {
    command: String,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ProcessModel {
    pub fn spawn(argv: &[String]) -> Result<Self, ClassifierError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ClassifierError::Other("empty model command".into()))?;
        let command = argv.join(" ");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| ClassifierError::Spawn {
                command: command.clone(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(ClassifierError::Closed)?;
        let stdout = child.stdout.take().ok_or(ClassifierError::Closed)?;
        info!("model: started `{command}` (pid={})", child.id());
        Ok(Self {
            command,
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }
}

impl ProbabilityModel for ProcessModel {
    fn predict(&mut self, features: &[f32]) -> Result<Vec<f32>, ClassifierError> {
        let line = serde_json::to_string(&ModelRequest { features })? + "\n";
        self.stdin.write_all(line.as_bytes())?;
        self.stdin.flush()?;

        let mut resp = String::new();
        if self.stdout.read_line(&mut resp)? == 0 {
            return Err(ClassifierError::Closed);
        }
        let resp: ModelResponse = serde_json::from_str(&resp)?;
        Ok(resp.probabilities)
    }
}

impl Drop for ProcessModel {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            warn!("model: failed to stop `{}`: {e}", self.command);
        }
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<f32>);

    impl ProbabilityModel for Fixed {
        fn predict(&mut self, _: &[f32]) -> Result<Vec<f32>, ClassifierError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn argmax_picks_first_maximum() {
        let mut c = ArgmaxClassifier::new(Fixed(vec![0.1, 0.4, 0.4, 0.1]));
        assert_eq!(c.classify(&[]).unwrap(), 1);
    }

    #[test]
    fn gate_substitutes_fallback_below_threshold() {
        let mut weak = GatedClassifier::new(Fixed(vec![0.2, 0.3, 0.45, 0.05]), 0.5, 0);
        assert_eq!(weak.classify(&[]).unwrap(), 0);

        let mut strong = GatedClassifier::new(Fixed(vec![0.1, 0.8, 0.1]), 0.5, 0);
        assert_eq!(strong.classify(&[]).unwrap(), 1);

        // threshold is inclusive
        let mut edge = GatedClassifier::new(Fixed(vec![0.5, 0.0, 0.5]), 0.5, 3);
        assert_eq!(edge.classify(&[]).unwrap(), 0);
    }

    #[test]
    fn empty_distribution_is_an_error() {
        let mut c = ArgmaxClassifier::new(Fixed(vec![]));
        assert!(matches!(
            c.classify(&[]),
            Err(ClassifierError::EmptyDistribution)
        ));
    }

    #[test]
    fn closures_are_classifiers() {
        let mut calls = 0;
        let mut c = |f: &[f32]| -> Result<ClassId, ClassifierError> {
            calls += 1;
            Ok(f.len())
        };
        assert_eq!(c.classify(&[0.0; 4]).unwrap(), 4);
        drop(c);
        assert_eq!(calls, 1);
    }

    #[test]
    fn spawn_failure_is_reported() {
        let argv = vec!["/nonexistent/handctl-model".to_string()];
        assert!(matches!(
            ProcessModel::spawn(&argv),
            Err(ClassifierError::Spawn { .. })
        ));
        assert!(matches!(
            ProcessModel::spawn(&[]),
            Err(ClassifierError::Other(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn process_model_speaks_json_lines() {
        // answers every request line with the same distribution
        let argv: Vec<String> = [
            "sh",
            "-c",
            r#"while read -r _; do echo '{"probabilities":[0.1,0.7,0.2]}'; done"#,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let mut c = ArgmaxClassifier::new(ProcessModel::spawn(&argv).unwrap());
        assert_eq!(c.classify(&[0.0, 1.0]).unwrap(), 1);
        assert_eq!(c.classify(&[0.5, 0.5]).unwrap(), 1);
    }
}
