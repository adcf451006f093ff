//! Cuts a labeled script into continuations.
//!
//! Resuming at label `k` must behave as if the script ran from the top and
//! paused at `k`. Because the IR is a tree, the body of continuation `k` is
//! the rest of the block holding the label, followed by the rest of every
//! block that encloses it, innermost first:
//!
//! ```text
//! a                      continuation L1:   c
//! if p {                                    d
//!   b                                       (else branch skipped)
//!   L1:                                     e
//!   c
//!   d
//! } else {
//!   x
//! }
//! e
//! ```
//!
//! Only `if` nodes may enclose a label. Native loops cannot be resumed
//! mid-iteration, so a label inside one is a compiler defect.

use crate::compiler::ir::{LabelId, Stmt};
use crate::{Error, Result};

/// One resumable unit of a script.
#[derive(Debug, Clone, PartialEq)]
pub struct Continuation {
    /// The label this continuation resumes at.
    pub label: LabelId,
    /// Label-free statements to run.
    pub body: Vec<Stmt>,
}

/// Splits a script into one continuation per label, in label order.
pub fn split(script: &[Stmt]) -> Result<Vec<Continuation>> {
    let mut labels = Vec::new();
    collect_labels(script, &mut labels)?;

    labels
        .into_iter()
        .map(|label| {
            let mut path = Vec::new();
            if !locate(script, label, &mut path) {
                return Err(Error::Internal(format!("label {label} vanished while splitting")));
            }
            Ok(Continuation { label, body: splice(&path) })
        })
        .collect()
}

fn collect_labels(block: &[Stmt], out: &mut Vec<LabelId>) -> Result<()> {
    for stmt in block {
        match stmt {
            Stmt::Label(label) => {
                if out.contains(label) {
                    return Err(Error::Internal(format!("label {label} placed twice")));
                }
                out.push(*label);
            }
            Stmt::If { then, otherwise, .. } => {
                collect_labels(then, out)?;
                collect_labels(otherwise, out)?;
            }
            Stmt::Repeat { body, .. } | Stmt::While { body, .. } | Stmt::Forever(body) => {
                if body.iter().any(Stmt::contains_label) {
                    return Err(Error::Internal("suspension point inside a native loop".into()));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Records the chain of `(block, index)` positions from the script root down
/// to the label. Every entry but the last points at an enclosing `if`.
fn locate<'a>(block: &'a [Stmt], label: LabelId, path: &mut Vec<(&'a [Stmt], usize)>) -> bool {
    for (i, stmt) in block.iter().enumerate() {
        match stmt {
            Stmt::Label(l) if *l == label => {
                path.push((block, i));
                return true;
            }
            Stmt::If { then, otherwise, .. } => {
                path.push((block, i));
                if locate(then, label, path) || locate(otherwise, label, path) {
                    return true;
                }
                path.pop();
            }
            _ => {}
        }
    }
    false
}

fn splice(path: &[(&[Stmt], usize)]) -> Vec<Stmt> {
    let mut body = Vec::new();
    for (block, index) in path.iter().rev() {
        body.extend(block[index + 1..].iter().cloned());
    }
    seal(body)
}

/// Strips labels and drops statements that follow a terminator.
fn seal(block: Vec<Stmt>) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(block.len());
    for stmt in block {
        let stmt = match stmt {
            Stmt::Label(_) => continue,
            Stmt::If { cond, then, otherwise } => Stmt::If {
                cond,
                then: seal(then),
                otherwise: seal(otherwise),
            },
            other => other,
        };
        let stop = stmt.is_terminator();
        out.push(stmt);
        if stop {
            break;
        }
    }
    out
}
