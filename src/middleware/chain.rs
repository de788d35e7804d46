//! Executes a filter plan around one action.

use std::cell::Cell;
use std::fmt;

use tracing::trace;

use super::{FilterPlan, Next};
use crate::controller::Controller;
use crate::error::{Error, Halt};
use crate::exchange::Exchange;

/// Where a dispatch is, or where it stopped.
///
/// ```text
/// Resolving → Before → Around → Action → Completed
///      └─────────┴────────┴────────┴──→ failed at that phase
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    /// Route lookup, controller construction, filter planning.
    Resolving,
    Before,
    Around,
    Action,
    Completed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resolving => "resolving",
            Self::Before    => "before",
            Self::Around    => "around",
            Self::Action    => "action",
            Self::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Runs the before-phase, then the around-chain with `action` at its core.
///
/// `phase` tracks progress so the caller knows where a failure (or a panic)
/// escaped from. A render-finished signal from any phase ends the dispatch
/// successfully.
pub(crate) fn execute(
    plan: &FilterPlan,
    controller: &mut dyn Controller,
    action: &str,
    ex: &mut Exchange,
    phase: &Cell<Phase>,
) -> Result<(), Error> {
    phase.set(Phase::Before);
    for filter in &plan.before {
        match filter.before(ex) {
            Ok(()) => {}
            Err(Halt::Rendered) => {
                trace!(action, "rendered in before phase");
                phase.set(Phase::Completed);
                return Ok(());
            }
            Err(Halt::Failed(error)) => return Err(error),
        }
    }

    phase.set(Phase::Around);
    let mut invoke = |ex: &mut Exchange| {
        phase.set(Phase::Action);
        let result = controller.call(action, ex);
        // Back in interceptor post-logic unless the action itself failed.
        if !matches!(result, Err(Halt::Failed(_))) {
            phase.set(Phase::Around);
        }
        result
    };

    match Next::new(&plan.around, &mut invoke).run(ex) {
        Ok(()) | Err(Halt::Rendered) => {
            phase.set(Phase::Completed);
            Ok(())
        }
        Err(Halt::Failed(error)) => Err(error),
    }
}
