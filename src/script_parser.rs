use crate::ast::{Connector, ControlSegment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

impl Quote {
    /// Quote state after seeing `ch` outside an escape.
    fn after(self, ch: char) -> Self {
        match (self, ch) {
            (Quote::None, '\'') => Quote::Single,
            (Quote::None, '"') => Quote::Double,
            (Quote::Single, '\'') | (Quote::Double, '"') => Quote::None,
            (state, _) => state,
        }
    }
}

/// Split a line into control-flow segments on unquoted `&&`, `||` and `;`.
///
/// Each segment records the operator in front of it. Segments are trimmed and
/// empty ones dropped, so `a ;; b` and a trailing `;` are harmless. Backslash
/// escapes are only honored inside double quotes.
pub fn split_control_flow(line: &str) -> Vec<ControlSegment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut connector = None;
    let mut quote = Quote::None;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if quote == Quote::Double && ch == '\\' {
            current.push(ch);
            if let Some(escaped) = chars.next() {
                current.push(escaped);
            }
            continue;
        }

        if quote != Quote::None {
            quote = quote.after(ch);
            current.push(ch);
            continue;
        }

        let found = match (ch, chars.peek()) {
            ('&', Some('&')) => Some(Connector::And),
            ('|', Some('|')) => Some(Connector::Or),
            (';', _) => Some(Connector::Sequence),
            _ => None,
        };

        match found {
            Some(next) => {
                if next != Connector::Sequence {
                    chars.next();
                }
                push_segment(&mut segments, connector, &current);
                current.clear();
                connector = Some(next);
            }
            None => {
                quote = quote.after(ch);
                current.push(ch);
            }
        }
    }
    push_segment(&mut segments, connector, &current);

    if segments.is_empty() {
        segments.push(ControlSegment {
            connector: None,
            text: String::new(),
        });
    }
    segments
}

fn push_segment(segments: &mut Vec<ControlSegment>, connector: Option<Connector>, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    // A segment after dropped empties keeps the operator closest to it;
    // the first surviving segment never has one.
    let connector = if segments.is_empty() { None } else { connector };
    segments.push(ControlSegment {
        connector,
        text: text.to_string(),
    });
}

/// Split multi-line input into logical lines on newlines outside quotes.
///
/// A quoted newline belongs to the word it appears in. Blank lines are
/// dropped.
pub fn split_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut quote = Quote::None;
    let mut chars = text.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' && quote != Quote::Single {
            current.push(ch);
            if let Some(escaped) = chars.next() {
                current.push(escaped);
            }
            continue;
        }
        if ch == '\n' && quote == Quote::None {
            lines.push(std::mem::take(&mut current));
            continue;
        }
        quote = quote.after(ch);
        current.push(ch);
    }
    lines.push(current);

    lines
        .into_iter()
        .filter(|line| !line.trim().is_empty())
        .collect()
}
