//! Composite `(base, buffer)` key for per-buffer parameter records.
//!
//! Records are always looked up by the structured key. The textual form
//! `base_index` exists for display and for exchanging parameter sets with
//! other tools, and is parsed with `nom`.

use std::fmt;
use std::str::FromStr;

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{alpha1, alphanumeric1, digit1};
use nom::combinator::{all_consuming, map_res, recognize};
use nom::multi::many0_count;
use nom::sequence::pair;
use nom::{IResult, Parser};
use serde::{Deserialize, Serialize};

use super::parameter::ParameterError;

/// Qualified parameter name: a model parameter plus the buffer it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QualifiedName {
    base: String,
    buffer: usize,
}

impl QualifiedName {
    pub fn new(base: impl Into<String>, buffer: usize) -> Self {
        Self {
            base: base.into(),
            buffer,
        }
    }

    /// The model parameter name with the buffer suffix stripped.
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn buffer(&self) -> usize {
        self.buffer
    }

    /// Same base name, different buffer.
    pub fn with_buffer(&self, buffer: usize) -> Self {
        Self::new(self.base.clone(), buffer)
    }

    /// Parse `base_index`, splitting at the last underscore.
    ///
    /// ```
    /// use savuka::parameters::QualifiedName;
    ///
    /// let name = QualifiedName::parse("nativeyint_10").unwrap();
    /// assert_eq!(name.base(), "nativeyint");
    /// assert_eq!(name.buffer(), 10);
    /// assert!(QualifiedName::parse("slope").is_err());
    /// ```
    pub fn parse(text: &str) -> Result<Self, ParameterError> {
        let invalid = |reason: &str| ParameterError::InvalidName {
            name: text.to_string(),
            reason: reason.to_string(),
        };

        let (base, index) = text
            .rsplit_once('_')
            .ok_or_else(|| invalid("missing '_<buffer>' suffix"))?;
        let (_, base) = all_consuming(identifier)
            .parse(base)
            .map_err(|_| invalid("base name must be an identifier"))?;
        let (_, buffer) = all_consuming(buffer_index)
            .parse(index)
            .map_err(|_| invalid("buffer suffix must be a non-negative integer"))?;

        Ok(Self::new(base, buffer))
    }
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))
    .parse(input)
}

fn buffer_index(input: &str) -> IResult<&str, usize> {
    map_res(digit1, str::parse::<usize>).parse(input)
}

/// Check that a model parameter name can be embedded in a qualified name.
pub(crate) fn is_valid_base(base: &str) -> bool {
    all_consuming(identifier).parse(base).is_ok()
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.base, self.buffer)
    }
}

impl FromStr for QualifiedName {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for QualifiedName {
    type Error = ParameterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<QualifiedName> for String {
    fn from(name: QualifiedName) -> Self {
        name.to_string()
    }
}
