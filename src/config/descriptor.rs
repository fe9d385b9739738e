//! `tnsnames.ora` parsing: alias names mapped to nested `(KEY = value)` network descriptors.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub(crate) const DESCRIPTOR_FILE: &str = "tnsnames.ora";

/// Network descriptor decomposed into the standard options it supplies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct NetworkDescriptor {
    pub host: String,
    pub port: Option<u16>,
    pub protocol: Option<String>,
    pub service: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    List(Vec<(String, Node)>),
}

impl Node {
    /// Depth-first search for the first parameter named `key`.
    fn find(&self, key: &str) -> Option<&Node> {
        let Node::List(pairs) = self else {
            return None;
        };
        pairs.iter().find_map(|(name, node)| {
            if name.eq_ignore_ascii_case(key) {
                Some(node)
            } else {
                node.find(key)
            }
        })
    }

    fn text(&self, key: &str) -> Option<&str> {
        match self.find(key)? {
            Node::Text(text) => Some(text.as_str()),
            Node::List(_) => None,
        }
    }
}

/// Parsed descriptor file, keyed by lowercase alias.
#[derive(Debug, Default)]
pub(crate) struct DescriptorFile {
    path: PathBuf,
    entries: HashMap<String, Node>,
}

impl DescriptorFile {
    pub(crate) fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|err| ConfigError::UnreadableFile {
            file: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        Self::parse(path, &contents)
    }

    pub(crate) fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let malformed = |reason: String| ConfigError::MalformedDescriptor {
            file: path.to_path_buf(),
            reason,
        };
        let tokens = tokenize(contents);
        let mut parser = Parser { tokens, pos: 0 };
        let mut entries = HashMap::new();

        while !parser.at_end() {
            let mut aliases = vec![parser.word().map_err(malformed)?];
            while parser.eat(&Token::Comma) {
                aliases.push(parser.word().map_err(malformed)?);
            }
            parser.expect(&Token::Equals).map_err(malformed)?;
            let value = parser.value().map_err(malformed)?;
            for alias in aliases {
                entries.insert(alias.to_ascii_lowercase(), value.clone());
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Resolve `alias` (case-insensitive) into the address it names. The first `ADDRESS` wins
    /// when the descriptor lists several.
    pub(crate) fn lookup(&self, alias: &str) -> Result<NetworkDescriptor, ConfigError> {
        let node = self
            .entries
            .get(&alias.to_ascii_lowercase())
            .ok_or_else(|| ConfigError::MissingAlias {
                alias: alias.to_owned(),
                file: self.path.clone(),
            })?;
        let malformed = |reason: String| ConfigError::MalformedDescriptor {
            file: self.path.clone(),
            reason,
        };

        let address = node
            .find("ADDRESS")
            .ok_or_else(|| malformed(format!("alias `{alias}` has no ADDRESS")))?;
        let host = address
            .text("HOST")
            .ok_or_else(|| malformed(format!("alias `{alias}` has no HOST")))?;
        let port = address
            .text("PORT")
            .map(|port| {
                port.parse::<u16>()
                    .map_err(|_| malformed(format!("alias `{alias}` has invalid PORT `{port}`")))
            })
            .transpose()?;
        let protocol = address.text("PROTOCOL").map(str::to_ascii_lowercase);
        let service = node
            .find("CONNECT_DATA")
            .and_then(|data| data.text("SERVICE_NAME").or_else(|| data.text("SID")))
            .map(str::to_owned);

        Ok(NetworkDescriptor {
            host: host.to_owned(),
            port,
            protocol,
            service,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Equals,
    Comma,
    Word(String),
}

fn tokenize(contents: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut chars = contents.chars().peekable();

    let flush = |word: &mut String, tokens: &mut Vec<Token>| {
        if !word.is_empty() {
            tokens.push(Token::Word(std::mem::take(word)));
        }
    };

    while let Some(ch) = chars.next() {
        match ch {
            '#' => {
                flush(&mut word, &mut tokens);
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
            }
            '(' | ')' | '=' | ',' => {
                flush(&mut word, &mut tokens);
                tokens.push(match ch {
                    '(' => Token::Open,
                    ')' => Token::Close,
                    '=' => Token::Equals,
                    _ => Token::Comma,
                });
            }
            c if c.is_whitespace() => flush(&mut word, &mut tokens),
            c => word.push(c),
        }
    }
    flush(&mut word, &mut tokens);
    tokens
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), String> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(format!("expected {token:?}, found {:?}", self.peek()))
        }
    }

    fn word(&mut self) -> Result<String, String> {
        match self.tokens.get(self.pos) {
            Some(Token::Word(word)) => {
                let word = word.clone();
                self.pos += 1;
                Ok(word)
            }
            other => Err(format!("expected a name, found {other:?}")),
        }
    }

    /// A value is one or more `(KEY = ...)` groups, or bare text.
    fn value(&mut self) -> Result<Node, String> {
        if self.peek() == Some(&Token::Open) {
            let mut pairs = Vec::new();
            while self.peek() == Some(&Token::Open) {
                pairs.push(self.pair()?);
            }
            return Ok(Node::List(pairs));
        }

        let mut words = Vec::new();
        while let Some(Token::Word(word)) = self.peek() {
            words.push(word.clone());
            self.pos += 1;
        }
        if words.is_empty() {
            return Err(format!("expected a value, found {:?}", self.peek()));
        }
        Ok(Node::Text(words.join(" ")))
    }

    fn pair(&mut self) -> Result<(String, Node), String> {
        self.expect(&Token::Open)?;
        let key = self.word()?;
        self.expect(&Token::Equals)?;
        let value = self.value()?;
        self.expect(&Token::Close)?;
        Ok((key, value))
    }
}
