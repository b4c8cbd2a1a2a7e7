use crate::executor;
use crate::pipeline::build_pipeline;
use crate::script_parser::{split_control_flow, split_lines};
use crate::status;

/// State carried between commands by the shell loop.
#[derive(Debug, Default)]
pub struct ShellState {
    /// Status of the most recently executed pipeline.
    pub last_status: i32,
    /// Entered lines, oldest first.
    pub history: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub should_exit: bool,
    pub status: i32,
}

/// Run one input, which may hold several lines, each a chain of pipelines
/// joined by `&&`, `||` and `;`.
///
/// Short-circuiting starts from a zero status on every line. A skipped
/// segment leaves the status untouched. Evaluation stops at the first
/// pipeline that asks the shell to exit.
pub fn run(input: &str, state: &mut ShellState) -> Outcome {
    let mut status = status::SUCCESS;

    for line in split_lines(input) {
        let mut previous = status::SUCCESS;

        for segment in split_control_flow(&line) {
            if let Some(connector) = segment.connector
                && connector.skips(previous)
            {
                log::debug!("skipping {:?} after {} status {previous}", segment.text, connector.as_str());
                continue;
            }

            let pipeline = build_pipeline(&segment.text);
            let execution = executor::execute(&pipeline, &state.history);
            previous = execution.status;
            status = execution.status;
            state.last_status = execution.status;

            if execution.exit_requested {
                return Outcome {
                    should_exit: true,
                    status,
                };
            }
        }
    }

    Outcome {
        should_exit: false,
        status,
    }
}
