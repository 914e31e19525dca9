//! Core data model.
//!
//! Source content is immutable learning material. A scenario is one user's
//! engagement with a piece of source content; it is split into ordered
//! programs (stages, career branches, assessment attempts), each holding
//! ordered tasks. Every submission produces an evaluation and the activity
//! trail is kept as append-only log entries.

/// Declares a UUID newtype identifier.
macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::Error;

            fn from_str(s: &str) -> crate::error::Result<Self> {
                uuid::Uuid::parse_str(s).map(Self).map_err(|e| {
                    crate::error::Error::Other(format!(
                        "invalid {} {s:?}: {e}",
                        stringify!($name)
                    ))
                })
            }
        }
    };
}

/// Declares a fieldless enum stored as a snake_case string.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $text ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::Error;

            fn from_str(s: &str) -> crate::error::Result<Self> {
                match s {
                    $( $text => Ok(Self::$variant), )+
                    other => Err(crate::error::Error::Other(format!(
                        "unknown {} {other:?}",
                        stringify!($name)
                    ))),
                }
            }
        }
    };
}

pub mod evaluation;
pub mod log;
pub mod program;
pub mod scenario;
pub mod source;
pub mod task;

pub use evaluation::{EvaluatedBy, Evaluation, ScoreResult, ScoredResponse};
pub use log::{LogEntry, LogKind, NewLogEntry};
pub use program::{
    AttemptConfig, AttemptType, ExplorationConfig, ExplorationKind, Program, ProgramConfig,
    ProgramStatus, StageConfig,
};
pub use scenario::{LearningMode, Scenario, ScenarioStatus};
pub use source::{
    QuestionDefinition, Rubric, RubricCriterion, SourceContent, SourceMetadata, StageDefinition,
    TaskTemplate,
};
pub use task::{Task, TaskConfig, TaskKind, TaskResponse, TaskStatus};

id_type!(
    /// Identifier of a [`Scenario`].
    ScenarioId
);
id_type!(
    /// Identifier of a [`Program`].
    ProgramId
);
id_type!(
    /// Identifier of a [`Task`].
    TaskId
);
id_type!(
    /// Identifier of an [`Evaluation`].
    EvaluationId
);
id_type!(
    /// Identifier of a [`LogEntry`].
    LogId
);

/// Ensure `value` is a JSON object and return it mutably.
pub(crate) fn object_mut(
    value: &mut serde_json::Value,
) -> &mut serde_json::Map<String, serde_json::Value> {
    if !value.is_object() {
        *value = serde_json::Value::Object(serde_json::Map::new());
    }
    match value {
        serde_json::Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}
