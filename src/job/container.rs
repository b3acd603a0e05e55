// src/job/container.rs

//! Executable containers: what a task actually runs.
//!
//! A container is a tagged union over the supported execution modes. It
//! carries only the data needed to reconstruct a launch spec; the actual
//! process/JVM management lives in the execution layer, outside this crate.
//! Containers are immutable after construction and are persisted as a JSON
//! column on the task row.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::TaskId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutableContainer {
    /// A class executed inside the scheduler-owned JVM.
    Java {
        class_name: String,
        #[serde(default)]
        serialized_args: BTreeMap<String, String>,
    },
    /// A class executed in a dedicated forked JVM.
    ForkedJava {
        class_name: String,
        #[serde(default)]
        serialized_args: BTreeMap<String, String>,
        #[serde(default)]
        java_home: Option<String>,
        #[serde(default)]
        jvm_args: Vec<String>,
    },
    /// A native command line.
    Native { command_line: Vec<String> },
    /// An inline script run by a named engine.
    Script { engine: String, code: String },
}

impl ExecutableContainer {
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutableContainer::Java { .. } => "java",
            ExecutableContainer::ForkedJava { .. } => "forked_java",
            ExecutableContainer::Native { .. } => "native",
            ExecutableContainer::Script { .. } => "script",
        }
    }

    /// Produce a launch spec for one execution attempt.
    pub fn create_executable(&self, init: &ExecutableInitializer) -> Executable {
        let command = match self {
            ExecutableContainer::Java {
                class_name,
                serialized_args,
            } => {
                let mut cmd = vec!["java".to_string(), class_name.clone()];
                cmd.extend(serialized_args.iter().map(|(k, v)| format!("{k}={v}")));
                cmd
            }
            ExecutableContainer::ForkedJava {
                class_name,
                serialized_args,
                java_home,
                jvm_args,
            } => {
                let java = match java_home {
                    Some(home) => format!("{home}/bin/java"),
                    None => "java".to_string(),
                };
                let mut cmd = vec![java];
                cmd.extend(jvm_args.iter().cloned());
                cmd.push(class_name.clone());
                cmd.extend(serialized_args.iter().map(|(k, v)| format!("{k}={v}")));
                cmd
            }
            ExecutableContainer::Native { command_line } => command_line.clone(),
            ExecutableContainer::Script { engine, code } => {
                vec![engine.clone(), code.clone()]
            }
        };

        Executable {
            task: init.task.clone(),
            attempt: init.attempt,
            command,
        }
    }
}

/// Per-attempt context handed to [`ExecutableContainer::create_executable`].
#[derive(Debug, Clone)]
pub struct ExecutableInitializer {
    pub task: TaskId,
    pub attempt: u32,
}

/// A concrete launch spec for one task execution attempt.
///
/// This is a value, not a running process; the execution layer decides how
/// to turn it into one.
#[derive(Debug, Clone, PartialEq)]
pub struct Executable {
    pub task: TaskId,
    pub attempt: u32,
    pub command: Vec<String>,
}
