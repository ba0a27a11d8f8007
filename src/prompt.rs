// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Operator prompts.
//!
//! Recipes ask the operator questions through the [`Prompt`] trait, so that
//! tests can script the answers.

use inquire::{Confirm, Select, Text};

/// Layer of indirection for asking the operator questions.
pub trait Prompt {
    /// Ask a yes/no question.
    fn confirm(&self, message: &str, default: bool) -> Result<bool>;

    /// Ask for a free-form answer.
    fn text(&self, message: &str) -> Result<String>;

    /// Ask operator to pick one of the options.
    fn select(&self, message: &str, options: Vec<String>) -> Result<String>;
}

/// Terminal prompts through inquire.
#[derive(Debug, Default, Clone)]
pub struct InquirePrompt;

impl InquirePrompt {
    pub fn new() -> Self {
        Self
    }
}

impl Prompt for InquirePrompt {
    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        Ok(Confirm::new(message).with_default(default).prompt()?)
    }

    fn text(&self, message: &str) -> Result<String> {
        Ok(Text::new(message).prompt()?)
    }

    fn select(&self, message: &str, options: Vec<String>) -> Result<String> {
        Ok(Select::new(message, options).prompt()?)
    }
}

/// Check if free-form answer is an explicit yes.
///
/// Only a single `y` or `Y` counts.
pub fn is_explicit_yes(answer: &str) -> bool {
    matches!(answer.trim(), "y" | "Y")
}

/// Prompt error types.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// Terminal prompt failed or was interrupted.
    #[error(transparent)]
    Inquire(#[from] inquire::InquireError),
}

/// Friendly result alias :3
pub type Result<T, E = PromptError> = std::result::Result<T, E>;

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::{cell::RefCell, collections::VecDeque};

    /// Answers prompts from a fixed script, in order.
    ///
    /// Confirmations take "y"/"n" entries. Selections take the option text.
    /// Running out of answers is treated as the operator cancelling.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedPrompt {
        answers: RefCell<VecDeque<String>>,
        asked: RefCell<Vec<String>>,
    }

    impl ScriptedPrompt {
        pub(crate) fn new(answers: impl IntoIterator<Item = impl Into<String>>) -> Self {
            Self {
                answers: RefCell::new(answers.into_iter().map(Into::into).collect()),
                asked: RefCell::default(),
            }
        }

        pub(crate) fn asked(&self) -> Vec<String> {
            self.asked.borrow().clone()
        }

        fn next(&self, message: &str) -> Result<String> {
            self.asked.borrow_mut().push(message.to_string());
            self.answers
                .borrow_mut()
                .pop_front()
                .ok_or(PromptError::Inquire(inquire::InquireError::OperationCanceled))
        }
    }

    impl Prompt for ScriptedPrompt {
        fn confirm(&self, message: &str, _default: bool) -> Result<bool> {
            Ok(self.next(message)? == "y")
        }

        fn text(&self, message: &str) -> Result<String> {
            self.next(message)
        }

        fn select(&self, message: &str, _options: Vec<String>) -> Result<String> {
            self.next(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case("y", true; "lower")]
    #[test_case("Y", true; "upper")]
    #[test_case(" y\n", true; "padded")]
    #[test_case("yes", false; "word")]
    #[test_case("n", false; "no")]
    #[test_case("", false; "empty")]
    #[test]
    fn explicit_yes(answer: &str, expect: bool) {
        assert_eq!(is_explicit_yes(answer), expect);
    }
}
