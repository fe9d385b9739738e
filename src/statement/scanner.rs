use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SqlBridgeError;

#[derive(Clone, Copy)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
}

fn is_line_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'-') && bytes.get(idx + 1) == Some(&b'-')
}

fn is_block_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'/') && bytes.get(idx + 1) == Some(&b'*')
}

fn is_block_comment_end(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'*') && bytes.get(idx + 1) == Some(&b'/')
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b == b'#'
}

fn scan_while(bytes: &[u8], start: usize, accept: impl Fn(u8) -> bool) -> usize {
    let mut idx = start;
    while idx < bytes.len() && accept(bytes[idx]) {
        idx += 1;
    }
    idx
}

/// Parameter layout of one SQL text.
///
/// Markers are rewritten to numbered `?N` form, one number per slot. A `:name` used more than
/// once (names compare case-insensitively) refers to a single slot; every bare `?` is its own
/// slot; `?N` addresses slot `N` directly, counting from 1.
#[derive(Debug, Clone)]
pub(crate) struct ParameterLayout {
    pub(crate) sql: Arc<str>,
    pub(crate) names: Vec<Option<String>>,
    by_name: HashMap<String, usize>,
    invalid: Option<String>,
}

impl ParameterLayout {
    /// Fails if the SQL holds a marker that addresses no slot, such as `?0`.
    pub(crate) fn check(&self) -> Result<(), SqlBridgeError> {
        match &self.invalid {
            Some(marker) => Err(SqlBridgeError::validation(format!(
                "parameter marker `{marker}` is invalid; positional markers count from ?1"
            ))),
            None => Ok(()),
        }
    }

    pub(crate) fn width(&self) -> usize {
        self.names.len()
    }

    pub(crate) fn slot_of(&self, name: &str) -> Option<usize> {
        let name = name.strip_prefix(':').unwrap_or(name);
        self.by_name.get(&name.to_ascii_uppercase()).copied()
    }

    fn slot_for_name(&mut self, name: &str) -> usize {
        let key = name.to_ascii_uppercase();
        if let Some(&slot) = self.by_name.get(&key) {
            return slot;
        }
        let slot = self.names.len();
        self.names.push(Some(name.to_owned()));
        self.by_name.insert(key, slot);
        slot
    }

    fn slot_for_position(&mut self, number: Option<usize>) -> usize {
        match number {
            Some(number) => {
                let slot = number - 1;
                if slot >= self.names.len() {
                    self.names.resize(slot + 1, None);
                }
                slot
            }
            None => {
                self.names.push(None);
                self.names.len() - 1
            }
        }
    }
}

/// Discover parameter markers, skipping quoted text and comments.
pub(crate) fn scan(sql: &str) -> ParameterLayout {
    let mut layout = ParameterLayout {
        sql: Arc::from(""),
        names: Vec::new(),
        by_name: HashMap::new(),
        invalid: None,
    };
    let mut out = String::with_capacity(sql.len() + 8);
    let mut state = State::Normal;
    let mut copied = 0;
    let mut idx = 0;
    let bytes = sql.as_bytes();

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                _ if is_line_comment_start(bytes, idx) => {
                    state = State::LineComment;
                    idx += 1;
                }
                _ if is_block_comment_start(bytes, idx) => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'?' => {
                    let end = scan_while(bytes, idx + 1, |b| b.is_ascii_digit());
                    let digits = &sql[idx + 1..end];
                    let number = match digits.parse::<usize>() {
                        Ok(number) if number > 0 => Some(number),
                        _ if digits.is_empty() => None,
                        _ => {
                            layout.invalid.get_or_insert_with(|| sql[idx..end].to_owned());
                            idx = end;
                            continue;
                        }
                    };
                    let slot = layout.slot_for_position(number);
                    out.push_str(&sql[copied..idx]);
                    out.push_str(&format!("?{}", slot + 1));
                    copied = end;
                    idx = end;
                    continue;
                }
                // `::` casts and `:=` assignments are not markers.
                b':' if idx == 0 || bytes[idx - 1] != b':' => {
                    let end = scan_while(bytes, idx + 1, is_name_byte);
                    if end > idx + 1 && bytes[idx + 1] != b'$' && bytes[idx + 1] != b'#' {
                        let slot = layout.slot_for_name(&sql[idx + 1..end]);
                        out.push_str(&sql[copied..idx]);
                        out.push_str(&format!("?{}", slot + 1));
                        copied = end;
                        idx = end;
                        continue;
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    state = State::Normal;
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if is_block_comment_end(bytes, idx) {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
        }
        idx += 1;
    }

    out.push_str(&sql[copied..]);
    layout.sql = Arc::from(out);
    layout
}
