use crate::ast::Word;
use crate::redirect;

/// States for the tokenizer state machine.
#[derive(Clone, Copy)]
enum State {
    /// Between tokens: whitespace is skipped
    Normal,
    /// Building an unquoted word: whitespace ends it
    InWord,
    /// Inside double quotes: whitespace is preserved
    InDoubleQuote,
    /// Inside single quotes: everything is literal
    InSingleQuote,
}

/// Returned by the scanner when input ends inside a quote.
#[derive(Debug)]
struct Unterminated;

/// Accumulates words while the state machine runs.
#[derive(Default)]
struct WordBuilder {
    words: Vec<Word>,
    current: String,
    /// A word is in progress, even if its text is still empty (`""`).
    started: bool,
    /// Some part of the current word was quoted or escaped.
    quoted: bool,
}

impl WordBuilder {
    fn push(&mut self, ch: char) {
        self.current.push(ch);
        self.started = true;
    }

    fn push_escaped(&mut self, ch: char) {
        self.push(ch);
        self.quoted = true;
    }

    fn open_quote(&mut self) {
        self.started = true;
        self.quoted = true;
    }

    fn finish(&mut self) {
        if self.started {
            self.words.push(Word::Text(std::mem::take(&mut self.current)));
        }
        self.started = false;
        self.quoted = false;
    }

    fn operator(&mut self, op: String) {
        self.finish();
        self.words.push(Word::Operator(op));
    }

    /// A bare, unquoted `1` or `2` glued to `>` names the stream being redirected.
    fn take_fd_prefix(&mut self) -> Option<char> {
        if !self.started || self.quoted {
            return None;
        }
        let fd = match self.current.as_str() {
            "1" => '1',
            "2" => '2',
            _ => return None,
        };
        self.current.clear();
        self.started = false;
        Some(fd)
    }
}

/// Run the state machine. Fails only when input ends inside a quote.
fn scan(input: &str) -> Result<Vec<Word>, Unterminated> {
    let mut builder = WordBuilder::default();
    let mut state = State::Normal;
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        match (state, ch) {
            // ── Outside quotes: between tokens or inside an unquoted word ──
            (State::Normal | State::InWord, ' ' | '\t' | '\n') => {
                builder.finish();
                state = State::Normal;
            }
            (State::Normal | State::InWord, '"') => {
                builder.open_quote();
                state = State::InDoubleQuote;
            }
            (State::Normal | State::InWord, '\'') => {
                builder.open_quote();
                state = State::InSingleQuote;
            }
            (State::Normal | State::InWord, '\\') => {
                // Escaped char is literal; a trailing backslash stays as-is
                match chars.next() {
                    Some(next) => builder.push_escaped(next),
                    None => builder.push('\\'),
                }
                state = State::InWord;
            }
            (State::Normal | State::InWord, '|') => {
                if chars.peek() == Some(&'|') {
                    // `||` is a control operator, never a pipe
                    chars.next();
                    builder.push('|');
                    builder.push('|');
                    state = State::InWord;
                } else {
                    builder.operator("|".to_string());
                    state = State::Normal;
                }
            }
            (State::Normal | State::InWord, '>') => {
                let mut op = String::new();
                if let Some(fd) = builder.take_fd_prefix() {
                    op.push(fd);
                }
                op.push('>');
                if chars.peek() == Some(&'>') {
                    chars.next();
                    op.push('>');
                }
                builder.operator(op);
                state = State::Normal;
            }
            (State::Normal | State::InWord, c) => {
                builder.push(c);
                state = State::InWord;
            }

            // ── InDoubleQuote state: inside "..." ──
            (State::InDoubleQuote, '"') => {
                state = State::InWord;
            }
            (State::InDoubleQuote, '\\') => match chars.peek().copied() {
                Some(next @ ('"' | '\\' | '$' | '`')) => {
                    chars.next();
                    builder.push(next);
                }
                Some('\n') => {
                    // Line continuation inside quotes
                    chars.next();
                }
                _ => builder.push('\\'),
            },
            (State::InDoubleQuote, c) => {
                builder.push(c);
            }

            // ── InSingleQuote state: inside '...' ──
            (State::InSingleQuote, '\'') => {
                state = State::InWord;
            }
            (State::InSingleQuote, c) => {
                builder.push(c);
            }
        }
    }

    match state {
        State::InDoubleQuote | State::InSingleQuote => Err(Unterminated),
        State::Normal | State::InWord => {
            builder.finish();
            Ok(builder.words)
        }
    }
}

/// Whitespace splitting used when quoting is malformed.
fn naive_split(input: &str) -> Vec<Word> {
    input
        .split_whitespace()
        .map(|piece| {
            if piece == "|" || redirect::is_redirect_operator(piece) {
                Word::operator(piece)
            } else {
                Word::text(piece)
            }
        })
        .collect()
}

/// Split a command line into words, resolving quotes and escapes.
///
/// Unterminated quotes never fail: the line falls back to plain whitespace
/// splitting.
pub fn tokenize(input: &str) -> Vec<Word> {
    match scan(input) {
        Ok(words) => words,
        Err(Unterminated) => {
            log::debug!("unterminated quote, falling back to whitespace split: {input:?}");
            naive_split(input)
        }
    }
}

/// True when `input` ends inside an open quote and needs another line.
pub fn is_incomplete(input: &str) -> bool {
    scan(input).is_err()
}

/// Split a word list into pipeline stages on unquoted `|`.
///
/// Empty groups from leading, trailing or doubled pipes are dropped.
pub fn split_pipes(words: Vec<Word>) -> Vec<Vec<Word>> {
    let mut groups = Vec::new();
    let mut current = Vec::new();

    for word in words {
        if word.is_pipe() {
            if !current.is_empty() {
                groups.push(std::mem::take(&mut current));
            }
        } else {
            current.push(word);
        }
    }

    if !current.is_empty() {
        groups.push(current);
    }

    groups
}
