//! The closed set of browser actions the LLM may ask for.
//!
//! Each line of a task record's `code` is one call-style statement, e.g.
//! `type_into("input[name=q]", "red couch")`. Anything outside this
//! vocabulary is rejected before it reaches the browser.

use std::fmt;
use std::time::Duration;

pub const DEFAULT_WAIT_FOR_MS: u64 = 5000;
/// Upper bound for `wait` and `wait_for` so one reply can't stall the loop.
pub const MAX_WAIT_MS: u64 = 60_000;

/// A single atomic step the LLM asks the agent to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Navigate { url: String },
    Click { selector: String },
    TypeInto { selector: String, text: String },
    PressKey { key: String },
    ExtractText { selector: String },
    Wait { duration: Duration },
    WaitFor { selector: String, timeout: Duration },
}

impl Action {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Navigate { .. } => "navigate",
            Self::Click { .. } => "click",
            Self::TypeInto { .. } => "type_into",
            Self::PressKey { .. } => "press_key",
            Self::ExtractText { .. } => "extract_text",
            Self::Wait { .. } => "wait",
            Self::WaitFor { .. } => "wait_for",
        }
    }

    /// Parse one statement.
    pub fn parse(line: &str) -> Result<Self, ActionParseError> {
        let call = Call::parse(line)?;
        let name = call.name.as_str();
        let action = match name {
            "navigate" => {
                let [url] = call.strings::<1>()?;
                Self::Navigate { url }
            }
            "click" => {
                let [selector] = call.strings::<1>()?;
                Self::Click { selector }
            }
            "type_into" => {
                let [selector, text] = call.strings::<2>()?;
                Self::TypeInto { selector, text }
            }
            "press_key" => {
                let [key] = call.strings::<1>()?;
                Self::PressKey { key }
            }
            "extract_text" => {
                let [selector] = call.strings::<1>()?;
                Self::ExtractText { selector }
            }
            "wait" => {
                call.arity(1, 1)?;
                Self::Wait {
                    duration: Duration::from_millis(call.millis(0)?),
                }
            }
            "wait_for" => {
                call.arity(1, 2)?;
                let selector = call.string(0)?;
                let ms = if call.args.len() == 2 {
                    call.millis(1)?
                } else {
                    DEFAULT_WAIT_FOR_MS
                };
                Self::WaitFor {
                    selector,
                    timeout: Duration::from_millis(ms),
                }
            }
            other => return Err(ActionParseError::UnknownAction(other.to_string())),
        };
        Ok(action)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Navigate { url } => write!(f, "navigate({url:?})"),
            Self::Click { selector } => write!(f, "click({selector:?})"),
            Self::TypeInto { selector, text } => write!(f, "type_into({selector:?}, {text:?})"),
            Self::PressKey { key } => write!(f, "press_key({key:?})"),
            Self::ExtractText { selector } => write!(f, "extract_text({selector:?})"),
            Self::Wait { duration } => write!(f, "wait({})", duration.as_millis()),
            Self::WaitFor { selector, timeout } => {
                write!(f, "wait_for({selector:?}, {})", timeout.as_millis())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionParseError {
    #[error("expected a call like `click(\"#id\")`")]
    NotACall,

    #[error("unknown action `{0}`; use navigate, click, type_into, press_key, extract_text, wait or wait_for")]
    UnknownAction(String),

    #[error("`{name}` takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("argument {index} of `{name}` must be a {expected}")]
    ArgumentType {
        name: String,
        index: usize,
        expected: &'static str,
    },

    #[error("`{name}` waits at most {max_ms}ms, got {got}")]
    WaitTooLong { name: String, max_ms: u64, got: u64 },

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unexpected `{0}`")]
    Unexpected(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Arg {
    Str(String),
    Num(u64),
}

#[derive(Debug)]
struct Call {
    name: String,
    args: Vec<Arg>,
}

impl Call {
    fn parse(line: &str) -> Result<Self, ActionParseError> {
        let line = line.trim().trim_end_matches(';').trim_end();
        let open = line.find('(').ok_or(ActionParseError::NotACall)?;
        let name = line[..open].trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ActionParseError::NotACall);
        }

        let mut chars = line[open + 1..].chars().peekable();
        let mut args = Vec::new();
        loop {
            skip_ws(&mut chars);
            match chars.peek().copied() {
                Some(')') if args.is_empty() => {
                    chars.next();
                    break;
                }
                Some(q @ ('"' | '\'')) => {
                    chars.next();
                    args.push(Arg::Str(read_string(&mut chars, q)?));
                }
                Some(c) if c.is_ascii_digit() => {
                    let mut digits = String::new();
                    while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                        digits.push(d);
                        chars.next();
                    }
                    let n = digits.parse().map_err(|_| ActionParseError::Unexpected(c))?;
                    args.push(Arg::Num(n));
                }
                Some(c) => return Err(ActionParseError::Unexpected(c)),
                None => return Err(ActionParseError::NotACall),
            }

            skip_ws(&mut chars);
            match chars.next() {
                Some(',') => continue,
                Some(')') => break,
                Some(c) => return Err(ActionParseError::Unexpected(c)),
                None => return Err(ActionParseError::NotACall),
            }
        }

        skip_ws(&mut chars);
        if let Some(c) = chars.next() {
            return Err(ActionParseError::Unexpected(c));
        }

        Ok(Self {
            name: name.to_string(),
            args,
        })
    }

    fn arity(&self, min: usize, max: usize) -> Result<(), ActionParseError> {
        if (min..=max).contains(&self.args.len()) {
            return Ok(());
        }
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{min} to {max}")
        };
        Err(ActionParseError::Arity {
            name: self.name.clone(),
            expected,
            got: self.args.len(),
        })
    }

    fn string(&self, index: usize) -> Result<String, ActionParseError> {
        match self.args.get(index) {
            Some(Arg::Str(s)) => Ok(s.clone()),
            _ => Err(self.type_error(index, "string")),
        }
    }

    fn number(&self, index: usize) -> Result<u64, ActionParseError> {
        match self.args.get(index) {
            Some(Arg::Num(n)) => Ok(*n),
            _ => Err(self.type_error(index, "number")),
        }
    }

    fn millis(&self, index: usize) -> Result<u64, ActionParseError> {
        let ms = self.number(index)?;
        if ms > MAX_WAIT_MS {
            return Err(ActionParseError::WaitTooLong {
                name: self.name.clone(),
                max_ms: MAX_WAIT_MS,
                got: ms,
            });
        }
        Ok(ms)
    }

    fn strings<const N: usize>(&self) -> Result<[String; N], ActionParseError> {
        self.arity(N, N)?;
        let mut out: [String; N] = std::array::from_fn(|_| String::new());
        for (index, slot) in out.iter_mut().enumerate() {
            *slot = self.string(index)?;
        }
        Ok(out)
    }

    fn type_error(&self, index: usize, expected: &'static str) -> ActionParseError {
        ActionParseError::ArgumentType {
            name: self.name.clone(),
            index: index + 1,
            expected,
        }
    }
}

fn skip_ws(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}

fn read_string(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    quote: char,
) -> Result<String, ActionParseError> {
    let mut out = String::new();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => return Err(ActionParseError::UnterminatedString),
            },
            c if c == quote => return Ok(out),
            c => out.push(c),
        }
    }
    Err(ActionParseError::UnterminatedString)
}
