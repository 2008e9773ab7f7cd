//! Gesture scripts for `pullctl simulate`.
//!
//! One step per line; `#` starts a comment:
//!
//! ```text
//! viewport 390 844
//! container transactions
//! scroll 0
//! start 200
//! move 320
//! end
//! settle
//! ```

use thiserror::Error;

use crate::controller::{Dispatch, PullToRefresh};
use crate::pull::PullState;
use crate::surface::Surface;
use crate::tracker::TouchEvent;
use crate::viewport::Viewport;

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Touch(TouchEvent),
    Scroll(f32),
    Viewport(Viewport),
    /// Observe a fresh container with this name.
    Container(String),
    /// Block until the in-flight refresh settles.
    Settle,
}

#[derive(Debug, Error, PartialEq)]
#[error("line {line}: {msg}")]
pub struct ScriptError {
    pub line: usize,
    pub msg: String,
}

pub fn parse(src: &str) -> Result<Vec<Step>, ScriptError> {
    let mut steps = Vec::new();
    for (idx, raw) in src.lines().enumerate() {
        let line = idx + 1;
        let text = raw.split('#').next().unwrap_or("").trim();
        if text.is_empty() {
            continue;
        }
        let err = |msg: String| ScriptError { line, msg };
        let mut words = text.split_whitespace();
        let op = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();

        let number = |i: usize| -> Result<f32, ScriptError> {
            let w = args
                .get(i)
                .ok_or_else(|| err(format!("'{op}' expects {} argument(s)", i + 1)))?;
            w.parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| err(format!("'{w}' is not a number")))
        };
        let arity = |n: usize| -> Result<(), ScriptError> {
            if args.len() == n {
                Ok(())
            } else {
                Err(err(format!("'{op}' takes {n} argument(s), got {}", args.len())))
            }
        };

        let step = match op {
            "start" => {
                arity(1)?;
                Step::Touch(TouchEvent::start(number(0)?))
            }
            "move" => {
                arity(1)?;
                Step::Touch(TouchEvent::moved(number(0)?))
            }
            "end" => {
                // the release position is optional; the recognizer only uses the last move
                if args.len() > 1 {
                    return Err(err("'end' takes at most 1 argument".to_string()));
                }
                let y = if args.is_empty() { 0.0 } else { number(0)? };
                Step::Touch(TouchEvent::end(y))
            }
            "scroll" => {
                arity(1)?;
                Step::Scroll(number(0)?)
            }
            "viewport" => {
                arity(2)?;
                let (w, h) = (number(0)?, number(1)?);
                if w < 1.0 || h < 1.0 {
                    return Err(err("viewport dimensions must be positive".to_string()));
                }
                Step::Viewport(Viewport {
                    width: w as u32,
                    height: h as u32,
                })
            }
            "settle" => {
                arity(0)?;
                Step::Settle
            }
            "container" => {
                arity(1)?;
                Step::Container(args[0].to_string())
            }
            other => return Err(err(format!("unknown step '{other}'"))),
        };
        steps.push(step);
    }
    Ok(steps)
}

/// One line of a replay transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub step: Step,
    pub dispatch: Option<Dispatch>,
    pub state: PullState,
}

/// Feeds `steps` through the controller. Settlements are only applied at
/// `settle` steps, which wait without a timeout, so transcripts are
/// deterministic.
pub fn replay(steps: &[Step], ptr: &mut PullToRefresh) -> Vec<Record> {
    let mut out = Vec::with_capacity(steps.len());
    for step in steps {
        let dispatch = match step {
            Step::Touch(ev) => Some(ptr.handle(*ev)),
            Step::Scroll(offset) => {
                ptr.surface_mut().scroll_to(*offset);
                None
            }
            Step::Viewport(vp) => {
                ptr.resize(*vp);
                None
            }
            Step::Container(name) => {
                ptr.register_container(Surface::new(name.as_str()));
                None
            }
            Step::Settle => {
                ptr.wait_settled(None);
                None
            }
        };
        out.push(Record {
            step: step.clone(),
            dispatch,
            state: ptr.state(),
        });
    }
    out
}
