/// A token produced by the tokenizer.
///
/// Quoting is already resolved: `Text` carries the literal word with quotes
/// removed and escapes applied. Operators are only produced for *unquoted*
/// operator characters, so `"|"` stays a plain word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Word {
    /// A literal word.
    Text(String),
    /// An unquoted operator: `|`, `>`, `>>`, `1>`, `1>>`, `2>` or `2>>`.
    Operator(String),
}

impl Word {
    pub fn text(s: impl Into<String>) -> Self {
        Word::Text(s.into())
    }

    pub fn operator(s: impl Into<String>) -> Self {
        Word::Operator(s.into())
    }

    /// The word's text, whether it is a literal or an operator.
    pub fn as_str(&self) -> &str {
        match self {
            Word::Text(s) | Word::Operator(s) => s,
        }
    }

    pub fn into_string(self) -> String {
        match self {
            Word::Text(s) | Word::Operator(s) => s,
        }
    }

    pub fn is_pipe(&self) -> bool {
        matches!(self, Word::Operator(op) if op == "|")
    }
}

/// Controls whether a chained command runs based on the previous exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    /// `;`: always runs.
    Sequence,
    /// `&&`: runs only after a zero status.
    And,
    /// `||`: runs only after a non-zero status.
    Or,
}

impl Connector {
    pub fn as_str(self) -> &'static str {
        match self {
            Connector::Sequence => ";",
            Connector::And => "&&",
            Connector::Or => "||",
        }
    }

    /// Whether a segment behind this connector is skipped given the previous status.
    pub fn skips(self, previous_status: i32) -> bool {
        match self {
            Connector::Sequence => false,
            Connector::And => previous_status != 0,
            Connector::Or => previous_status == 0,
        }
    }
}

/// One control-flow segment of a raw input line.
///
/// `connector` is the operator that *precedes* the text; the first segment
/// of a line has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlSegment {
    pub connector: Option<Connector>,
    pub text: String,
}

/// How a redirect target is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    /// `>`: create or truncate.
    Truncate,
    /// `>>`: create or append.
    Append,
}

/// A single output redirection of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectSpec {
    pub path: String,
    pub mode: RedirectMode,
}

impl RedirectSpec {
    pub fn new(path: impl Into<String>, mode: RedirectMode) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }
}

/// One command of a pipeline with its arguments and redirects.
///
/// Redirects are kept in appearance order per stream; the last entry of each
/// list is the active target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stage {
    pub command: String,
    pub args: Vec<String>,
    pub stdout_redirects: Vec<RedirectSpec>,
    pub stderr_redirects: Vec<RedirectSpec>,
}

impl Stage {
    /// True for a stage with no command: empty input or redirects only.
    pub fn is_empty(&self) -> bool {
        self.command.is_empty()
    }
}

/// Stages connected stdout-to-stdin. Always holds at least one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        if stages.is_empty() {
            return Self {
                stages: vec![Stage::default()],
            };
        }
        Self { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.iter().all(Stage::is_empty)
    }

    /// A pipeline of exactly one stage.
    pub fn is_simple(&self) -> bool {
        self.stages.len() == 1
    }
}
