use crate::ast::{Pipeline, RedirectSpec, Stage, Word};
use crate::expander::expand_tilde;
use crate::parser::{split_pipes, tokenize};
use crate::redirect::parse_redirection;

/// Build one stage from the words between two pipes.
fn build_stage(words: Vec<Word>) -> Stage {
    let (cleaned, stdout_redirects, stderr_redirects) = parse_redirection(words);
    let mut cleaned = cleaned.iter().map(|word| expand_tilde(word));
    let command = cleaned.next().unwrap_or_default();
    let args = cleaned.collect();

    Stage {
        command,
        args,
        stdout_redirects: expand_targets(stdout_redirects),
        stderr_redirects: expand_targets(stderr_redirects),
    }
}

fn expand_targets(redirects: Vec<RedirectSpec>) -> Vec<RedirectSpec> {
    redirects
        .into_iter()
        .map(|spec| RedirectSpec {
            path: expand_tilde(&spec.path),
            ..spec
        })
        .collect()
}

/// Parse one pipeline's text into stages.
///
/// Input with no stages at all still yields a single empty stage, which the
/// executor treats as a no-op.
pub fn build_pipeline(line: &str) -> Pipeline {
    let stages = split_pipes(tokenize(line)).into_iter().map(build_stage).collect();
    Pipeline::new(stages)
}
