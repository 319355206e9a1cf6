//! Step scripts: a line-oriented description of a coroutine.
//!
//! ```text
//! # comment
//! wait 250ms        TimeDelay (also `1.5s`, `2s`)
//! frame             EndOfTick
//! yield             empty yield, treated as EndOfTick
//! custom door-open  Custom condition keyed "door-open"
//! value loading     a value that is not a wait condition
//! fail out of ammo  the coroutine faults at this step
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use stepbridge_core::{BoxError, Coroutine, WaitCondition, Yielded};

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Wait(Duration),
    Frame,
    Yield,
    Custom(String),
    Value(String),
    Fail(String),
}

impl Step {
    fn to_yielded(&self) -> Result<Yielded, BoxError> {
        Ok(match self {
            Step::Wait(delay) => WaitCondition::TimeDelay(*delay).into(),
            Step::Frame => WaitCondition::EndOfTick.into(),
            Step::Yield => Yielded::Empty,
            Step::Custom(key) => WaitCondition::custom(key.as_str()).into(),
            Step::Value(text) => Yielded::other(text.clone()),
            Step::Fail(message) => return Err(Box::new(ScriptFault(message.clone()))),
        })
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Wait(delay) => write!(f, "wait {delay:?}"),
            Step::Frame => f.write_str("frame"),
            Step::Yield => f.write_str("yield"),
            Step::Custom(key) => write!(f, "custom {key}"),
            Step::Value(text) => write!(f, "value {text}"),
            Step::Fail(message) => write!(f, "fail {message}"),
        }
    }
}

/// Error raised by a `fail` step when the coroutine reaches it.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ScriptFault(pub String);

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("line {line}: unknown directive {directive:?}")]
    UnknownDirective { line: usize, directive: String },

    #[error("line {line}: `{directive}` needs an argument")]
    MissingArgument { line: usize, directive: &'static str },

    #[error("line {line}: `{directive}` takes no argument")]
    UnexpectedArgument { line: usize, directive: &'static str },

    #[error("line {line}: invalid duration {value:?} (expected e.g. 250ms, 1.5s)")]
    InvalidDuration { line: usize, value: String },
}

/// A parsed script. Cheap to clone; every [`Script::coroutine`] call starts
/// a fresh run from the first step.
#[derive(Debug, Clone)]
pub struct Script {
    steps: Arc<[Step]>,
}

impl Script {
    pub fn parse(source: &str) -> Result<Self, ScriptError> {
        let mut steps = Vec::new();
        for (idx, raw) in source.lines().enumerate() {
            let line = idx + 1;
            let text = raw.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }

            let (directive, arg) = match text.split_once(char::is_whitespace) {
                Some((directive, rest)) => (directive, rest.trim()),
                None => (text, ""),
            };

            let step = match directive {
                "wait" => {
                    let arg = required(line, "wait", arg)?;
                    let delay = parse_duration(arg).ok_or_else(|| ScriptError::InvalidDuration {
                        line,
                        value: arg.to_string(),
                    })?;
                    Step::Wait(delay)
                }
                "frame" => {
                    none(line, "frame", arg)?;
                    Step::Frame
                }
                "yield" => {
                    none(line, "yield", arg)?;
                    Step::Yield
                }
                "custom" => Step::Custom(required(line, "custom", arg)?.to_string()),
                "value" => Step::Value(required(line, "value", arg)?.to_string()),
                "fail" => Step::Fail(required(line, "fail", arg)?.to_string()),
                other => {
                    return Err(ScriptError::UnknownDirective {
                        line,
                        directive: other.to_string(),
                    });
                }
            };
            steps.push(step);
        }

        Ok(Self {
            steps: steps.into(),
        })
    }

    /// Read and parse a script file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display()))?;
        Self::parse(&source).with_context(|| format!("invalid script {}", path.display()))
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Custom condition keys the script waits on, in first-use order.
    pub fn custom_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for step in self.steps.iter() {
            if let Step::Custom(key) = step {
                if !keys.contains(&key.as_str()) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    /// Sum of every `wait` step: a lower bound on the host time a run takes.
    /// `None` when the sum does not fit in a `Duration`.
    pub fn total_delay(&self) -> Option<Duration> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                Step::Wait(delay) => Some(*delay),
                _ => None,
            })
            .try_fold(Duration::ZERO, Duration::checked_add)
    }

    pub fn coroutine(&self) -> ScriptCoroutine {
        ScriptCoroutine {
            steps: Arc::clone(&self.steps),
            next: 0,
        }
    }
}

/// One run through a [`Script`].
#[derive(Debug)]
pub struct ScriptCoroutine {
    steps: Arc<[Step]>,
    next: usize,
}

impl Coroutine for ScriptCoroutine {
    fn resume(&mut self) -> Result<Option<Yielded>, BoxError> {
        let Some(step) = self.steps.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        step.to_yielded().map(Some)
    }
}

fn required<'a>(
    line: usize,
    directive: &'static str,
    arg: &'a str,
) -> Result<&'a str, ScriptError> {
    if arg.is_empty() {
        Err(ScriptError::MissingArgument { line, directive })
    } else {
        Ok(arg)
    }
}

fn none(line: usize, directive: &'static str, arg: &str) -> Result<(), ScriptError> {
    if arg.is_empty() {
        Ok(())
    } else {
        Err(ScriptError::UnexpectedArgument { line, directive })
    }
}

/// Parse `250ms`, `1.5s` or `2s`.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    let secs = if let Some(ms) = text.strip_suffix("ms") {
        ms.trim().parse::<f64>().ok()? / 1000.0
    } else if let Some(s) = text.strip_suffix('s') {
        s.trim().parse::<f64>().ok()?
    } else {
        return None;
    };
    Duration::try_from_secs_f64(secs).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_directive() {
        let script = Script::parse(
            "# warm up\n\
             wait 250ms\n\
             \n\
             frame\n\
             yield\n\
             custom door-open\n\
             value still loading\n\
             fail out of ammo\n",
        )
        .unwrap();

        assert_eq!(
            script.steps(),
            &[
                Step::Wait(Duration::from_millis(250)),
                Step::Frame,
                Step::Yield,
                Step::Custom("door-open".into()),
                Step::Value("still loading".into()),
                Step::Fail("out of ammo".into()),
            ]
        );
    }

    #[test]
    fn duration_forms() {
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("1.5s"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_duration("2s"), Some(Duration::from_secs(2)));
        assert_eq!(parse_duration("0s"), Some(Duration::ZERO));
        assert_eq!(parse_duration("2"), None);
        assert_eq!(parse_duration("-1s"), None);
        assert_eq!(parse_duration("fast"), None);
    }

    #[test]
    fn errors_carry_line_numbers() {
        assert_eq!(
            Script::parse("frame\njump 3").unwrap_err(),
            ScriptError::UnknownDirective {
                line: 2,
                directive: "jump".into()
            }
        );
        assert_eq!(
            Script::parse("\n\nwait").unwrap_err(),
            ScriptError::MissingArgument {
                line: 3,
                directive: "wait"
            }
        );
        assert_eq!(
            Script::parse("frame 2").unwrap_err(),
            ScriptError::UnexpectedArgument {
                line: 1,
                directive: "frame"
            }
        );
        assert!(matches!(
            Script::parse("wait soon").unwrap_err(),
            ScriptError::InvalidDuration { line: 1, .. }
        ));
    }

    #[test]
    fn display_matches_script_syntax() {
        let script = Script::parse("wait 1.5s\ncustom bell\nyield").unwrap();
        let rendered: Vec<String> = script.steps().iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["wait 1.5s", "custom bell", "yield"]);
    }

    #[test]
    fn coroutine_replays_steps_from_the_start() {
        let script = Script::parse("frame\nvalue 7\nfail boom").unwrap();

        for _ in 0..2 {
            let mut co = script.coroutine();
            assert!(matches!(
                co.resume().unwrap(),
                Some(Yielded::Wait(WaitCondition::EndOfTick))
            ));
            match co.resume().unwrap() {
                Some(Yielded::Other(value)) => {
                    assert_eq!(value.downcast_ref::<String>().map(String::as_str), Some("7"));
                }
                other => panic!("expected an unrecognized value, got {other:?}"),
            }
            assert_eq!(co.resume().unwrap_err().to_string(), "boom");
        }
    }

    #[test]
    fn exhausted_coroutine_reports_none() {
        let script = Script::parse("yield").unwrap();
        let mut co = script.coroutine();
        assert!(matches!(co.resume().unwrap(), Some(Yielded::Empty)));
        assert!(co.resume().unwrap().is_none());
    }

    #[test]
    fn summary_helpers() {
        let script =
            Script::parse("wait 100ms\ncustom a\nwait 0.4s\ncustom b\ncustom a").unwrap();
        assert_eq!(script.total_delay(), Some(Duration::from_millis(500)));
        assert_eq!(script.custom_keys(), vec!["a", "b"]);
    }

    #[test]
    fn total_delay_overflow_is_none() {
        let script = Script::parse("wait 1e19s\nframe\nwait 1e19s").unwrap();
        assert_eq!(script.steps().len(), 3);
        assert_eq!(script.total_delay(), None);
    }
}
