use std::fs::{File, OpenOptions};

use crate::ast::{RedirectMode, RedirectSpec, Word};
use crate::error::ExecError;

/// Every output redirection operator the resolver understands.
const REDIRECT_OPERATORS: &[&str] = &[">", "1>", ">>", "1>>", "2>", "2>>"];

/// Which stream a redirect operator applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Returns true if the text is one of the recognized redirect operators.
pub fn is_redirect_operator(token: &str) -> bool {
    REDIRECT_OPERATORS.contains(&token)
}

fn classify(operator: &str) -> (Stream, RedirectMode) {
    let stream = if operator.starts_with('2') {
        Stream::Stderr
    } else {
        Stream::Stdout
    };
    let mode = if operator.ends_with(">>") {
        RedirectMode::Append
    } else {
        RedirectMode::Truncate
    };
    (stream, mode)
}

/// Separate redirect operators from regular arguments.
///
/// Returns the remaining words in their original order plus the stdout and
/// stderr redirects in appearance order. An operator with no following word
/// is dropped and scanning stops.
pub fn parse_redirection(words: Vec<Word>) -> (Vec<String>, Vec<RedirectSpec>, Vec<RedirectSpec>) {
    let mut cleaned = Vec::new();
    let mut stdout_redirects = Vec::new();
    let mut stderr_redirects = Vec::new();
    let mut words = words.into_iter();

    while let Some(word) = words.next() {
        let operator = match &word {
            Word::Operator(op) if is_redirect_operator(op) => op.clone(),
            _ => {
                cleaned.push(word.into_string());
                continue;
            }
        };

        let Some(target) = words.next() else {
            log::debug!("dropping dangling redirect operator {operator}");
            break;
        };

        let (stream, mode) = classify(&operator);
        let spec = RedirectSpec::new(target.into_string(), mode);
        match stream {
            Stream::Stdout => stdout_redirects.push(spec),
            Stream::Stderr => stderr_redirects.push(spec),
        }
    }

    (cleaned, stdout_redirects, stderr_redirects)
}

impl RedirectSpec {
    /// Open the target for writing, creating it if needed.
    pub fn open(&self) -> Result<File, ExecError> {
        let mut options = OpenOptions::new();
        options.write(true).create(true);
        match self.mode {
            RedirectMode::Truncate => options.truncate(true),
            RedirectMode::Append => options.append(true),
        };
        options.open(&self.path).map_err(|source| ExecError::Redirect {
            path: self.path.clone(),
            source,
        })
    }

    /// Open and immediately close the target, keeping only the
    /// create/truncate side effect.
    pub fn touch(&self) -> Result<(), ExecError> {
        log::debug!("priming redirect target {} ({:?})", self.path, self.mode);
        self.open().map(drop)
    }
}

fn prime_earlier(redirects: &[RedirectSpec]) -> Result<Option<&RedirectSpec>, ExecError> {
    let Some((active, earlier)) = redirects.split_last() else {
        return Ok(None);
    };
    for spec in earlier {
        spec.touch()?;
    }
    Ok(Some(active))
}

/// Prime every redirect target except the last one of each stream and return
/// the last ones, which are the targets the stage output is bound to.
///
/// Nothing is kept open: the active targets are opened later by whoever binds
/// them.
pub fn prepare_redirect_targets<'a>(
    stdout_redirects: &'a [RedirectSpec],
    stderr_redirects: &'a [RedirectSpec],
) -> Result<(Option<&'a RedirectSpec>, Option<&'a RedirectSpec>), ExecError> {
    let stdout = prime_earlier(stdout_redirects)?;
    let stderr = prime_earlier(stderr_redirects)?;
    Ok((stdout, stderr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tokenize;

    fn parse(line: &str) -> (Vec<String>, Vec<RedirectSpec>, Vec<RedirectSpec>) {
        parse_redirection(tokenize(line))
    }

    #[test]
    fn simple_stdout_redirect() {
        let (args, out, err) = parse("echo hello > out.txt");
        assert_eq!(args, vec!["echo", "hello"]);
        assert_eq!(out, vec![RedirectSpec::new("out.txt", RedirectMode::Truncate)]);
        assert!(err.is_empty());
    }

    #[test]
    fn append_redirect() {
        let (args, out, _) = parse("echo hello >> out.txt");
        assert_eq!(args, vec!["echo", "hello"]);
        assert_eq!(out, vec![RedirectSpec::new("out.txt", RedirectMode::Append)]);
    }

    #[test]
    fn explicit_fd_one_is_stdout() {
        let (_, out, err) = parse("cmd 1> a 1>> b");
        assert_eq!(
            out,
            vec![
                RedirectSpec::new("a", RedirectMode::Truncate),
                RedirectSpec::new("b", RedirectMode::Append),
            ]
        );
        assert!(err.is_empty());
    }

    #[test]
    fn stderr_redirects() {
        let (args, out, err) = parse("ls /bad 2> err.txt 2>> more.txt");
        assert_eq!(args, vec!["ls", "/bad"]);
        assert!(out.is_empty());
        assert_eq!(
            err,
            vec![
                RedirectSpec::new("err.txt", RedirectMode::Truncate),
                RedirectSpec::new("more.txt", RedirectMode::Append),
            ]
        );
    }

    #[test]
    fn redirects_between_arguments_keep_order() {
        let (args, out, _) = parse("echo a > f b c");
        assert_eq!(args, vec!["echo", "a", "b", "c"]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn dangling_operator_is_dropped() {
        let (args, out, err) = parse("echo hi >");
        assert_eq!(args, vec!["echo", "hi"]);
        assert!(out.is_empty());
        assert!(err.is_empty());
    }

    #[test]
    fn quoted_operator_is_an_argument() {
        let (args, out, _) = parse("echo '>' file");
        assert_eq!(args, vec!["echo", ">", "file"]);
        assert!(out.is_empty());
    }

    #[test]
    fn parsing_cleaned_words_again_finds_nothing() {
        let (args, out, err) = parse("cmd a > x 2> y b >> z");
        assert_eq!(out.len(), 2);
        assert_eq!(err.len(), 1);

        let again = args.iter().cloned().map(Word::Text).collect();
        let (args2, out2, err2) = parse_redirection(again);
        assert_eq!(args2, args);
        assert!(out2.is_empty());
        assert!(err2.is_empty());
    }

    #[test]
    fn prepare_returns_last_target_per_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = |name: &str| dir.path().join(name).display().to_string();

        let out = vec![
            RedirectSpec::new(path("a"), RedirectMode::Truncate),
            RedirectSpec::new(path("b"), RedirectMode::Append),
        ];
        let err = vec![RedirectSpec::new(path("e"), RedirectMode::Truncate)];

        let (active_out, active_err) = prepare_redirect_targets(&out, &err).unwrap();
        assert_eq!(active_out, Some(&out[1]));
        assert_eq!(active_err, Some(&err[0]));

        // Earlier targets are created; active ones are left for the caller
        assert!(dir.path().join("a").exists());
        assert!(!dir.path().join("b").exists());
        assert!(!dir.path().join("e").exists());
    }

    #[test]
    fn priming_truncates_or_preserves_by_mode() {
        let dir = tempfile::tempdir().unwrap();
        let truncated = dir.path().join("truncated");
        let appended = dir.path().join("appended");
        std::fs::write(&truncated, "old").unwrap();
        std::fs::write(&appended, "keep").unwrap();

        let out = vec![
            RedirectSpec::new(truncated.display().to_string(), RedirectMode::Truncate),
            RedirectSpec::new(appended.display().to_string(), RedirectMode::Append),
            RedirectSpec::new(dir.path().join("active").display().to_string(), RedirectMode::Truncate),
        ];
        prepare_redirect_targets(&out, &[]).unwrap();

        assert_eq!(std::fs::read_to_string(&truncated).unwrap(), "");
        assert_eq!(std::fs::read_to_string(&appended).unwrap(), "keep");
    }

    #[test]
    fn prepare_with_no_redirects() {
        let (out, err) = prepare_redirect_targets(&[], &[]).unwrap();
        assert!(out.is_none());
        assert!(err.is_none());
    }

    #[test]
    fn unopenable_target_is_a_redirect_error() {
        let spec = RedirectSpec::new("/nonexistent-dir-for-pipesh/x", RedirectMode::Truncate);
        let err = spec.open().unwrap_err();
        assert!(matches!(err, ExecError::Redirect { .. }));
        assert_eq!(err.status(), 1);
    }
}
