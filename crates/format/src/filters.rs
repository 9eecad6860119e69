//! Filter implementations

use gollum_core::format::Filter;
use gollum_core::Message;
use regex::bytes::Regex;

/// Keeps only messages whose payload matches a regular expression
///
/// Matches on raw payload bytes, so binary-safe.
pub struct RegExpFilter {
    expression: Regex,
}

impl RegExpFilter {
    /// Compile the expression
    pub fn new(expression: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            expression: Regex::new(expression)?,
        })
    }
}

impl Filter for RegExpFilter {
    fn accepts(&self, msg: &Message) -> bool {
        self.expression.is_match(msg.payload())
    }

    fn name(&self) -> &'static str {
        "reg_exp"
    }
}
