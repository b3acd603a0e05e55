// src/job/flow.rs

//! Workflow control: IF branching, block replication and loops.
//!
//! A [`FlowSpec`] is the *static* declaration attached to a task at
//! submission; block members and branch targets are referred to by base
//! name so the same spec stays valid on cloned instances (`name*2`,
//! `name#3`). A [`FlowAction`] is the *runtime* outcome the execution layer
//! reports when the task terminates: which branch its flow script chose,
//! how many replicas to spawn, or whether to iterate again.

use serde::{Deserialize, Serialize};

/// Static workflow declaration on a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowSpec {
    /// Two exclusive branches joined by a continuation task.
    ///
    /// `if_branch` / `else_branch` name the entry task of each branch;
    /// `continuation` names the join task that runs after whichever branch
    /// was taken.
    If {
        if_branch: String,
        else_branch: String,
        continuation: String,
    },
    /// The named block is duplicated `runs - 1` extra times when the action
    /// fires; copies get `*k` name suffixes.
    Replicate { block: Vec<String> },
    /// The named block (terminated by the task carrying this spec) is cloned
    /// with the next `#i` iteration suffix as long as the action says to
    /// iterate.
    Loop { block: Vec<String> },
}

/// Which branch of an IF action was selected at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    If,
    Else,
}

/// Runtime outcome of a terminating task, reported by the execution layer.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowAction {
    /// Plain termination: children become eligible as dependencies resolve.
    Continue,
    /// The task's flow script selected a branch; the other one is pruned.
    IfBranch { branch: Branch },
    /// Spawn `runs - 1` extra copies of the declared block.
    Replicate { runs: u32 },
    /// Run the declared block again (`iterate == true`) or fall through to
    /// the loop-exit children (`iterate == false`).
    Loop { iterate: bool },
}
