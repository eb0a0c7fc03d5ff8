use thiserror::Error;

/// Problems with the keypoints handed to the pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InputError {
    #[error("hand has no keypoints")]
    Empty,
    #[error("expected {expected} keypoints, got {got}")]
    WrongKeypointCount { expected: usize, got: usize },
    #[error("keypoint {index} is not finite")]
    NonFinite { index: usize },
    #[error("keypoint count changed from {previous} to {current}; reset required")]
    KeypointCountChanged { previous: usize, current: usize },
}

/// Failures raised while invoking an external classifier.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("failed to start model `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("model i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("model closed its output stream")]
    Closed,
    #[error("malformed model response: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error("model returned an empty distribution")]
    EmptyDistribution,
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("pose classifier: {0}")]
    PoseClassifier(#[source] ClassifierError),
    #[error("motion classifier: {0}")]
    MotionClassifier(#[source] ClassifierError),
}
