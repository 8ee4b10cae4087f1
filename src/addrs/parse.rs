//! Tokenizer for dotted address strings.

use crate::error::ConfigError;

use super::InstanceKey;

/// One step of a parsed address traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// `.name`
    Attr(String),
    /// `[0]` or `["key"]`
    Index(InstanceKey),
}

impl Step {
    /// Returns the attribute name, if this is an attribute step.
    #[must_use]
    pub fn as_attr(&self) -> Option<&str> {
        match self {
            Self::Attr(name) => Some(name),
            Self::Index(_) => None,
        }
    }
}

fn invalid(input: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidAddress {
        input: input.to_string(),
        message: message.into(),
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Splits `module.a[0].test_instance.b["k"]` into steps.
///
/// # Errors
///
/// Returns an error on empty names, unterminated brackets or strings, and
/// trailing garbage.
pub fn parse_steps(input: &str) -> Result<Vec<Step>, ConfigError> {
    let chars: Vec<char> = input.trim().chars().collect();
    let mut steps = Vec::new();
    let mut pos = 0;
    let mut expect_name = true;

    while pos < chars.len() {
        if expect_name {
            let start = pos;
            while pos < chars.len() && is_name_char(chars[pos]) {
                pos += 1;
            }
            if start == pos {
                return Err(invalid(input, format!("expected a name at offset {start}")));
            }
            steps.push(Step::Attr(chars[start..pos].iter().collect()));
            expect_name = false;
            continue;
        }

        match chars[pos] {
            '.' => {
                pos += 1;
                expect_name = true;
            }
            '[' => {
                pos += 1;
                let key = if chars.get(pos) == Some(&'"') {
                    pos += 1;
                    let mut value = String::new();
                    loop {
                        match chars.get(pos) {
                            None => return Err(invalid(input, "unterminated string key")),
                            Some('\\') => {
                                if let Some(escaped) = chars.get(pos + 1) {
                                    value.push(*escaped);
                                }
                                pos += 2;
                            }
                            Some('"') => {
                                pos += 1;
                                break;
                            }
                            Some(c) => {
                                value.push(*c);
                                pos += 1;
                            }
                        }
                    }
                    InstanceKey::String(value)
                } else {
                    let start = pos;
                    while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '-') {
                        pos += 1;
                    }
                    let digits: String = chars[start..pos].iter().collect();
                    let index = digits
                        .parse::<i64>()
                        .map_err(|_| invalid(input, format!("invalid index {digits:?}")))?;
                    InstanceKey::Int(index)
                };
                if chars.get(pos) != Some(&']') {
                    return Err(invalid(input, "expected ']'"));
                }
                pos += 1;
                steps.push(Step::Index(key));
            }
            other => return Err(invalid(input, format!("unexpected character {other:?}"))),
        }
    }

    if expect_name {
        return Err(invalid(input, "address must not be empty or end with '.'"));
    }
    Ok(steps)
}
