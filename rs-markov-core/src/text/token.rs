use std::fmt;

use serde::{Deserialize, Serialize};

/// Characters that open a group and bind to the token that follows them.
const OPENING: &[char] = &['(', '[', '{', '¿', '¡'];

/// Unicode punctuation not covered by `char::is_ascii_punctuation`.
const EXTRA_PUNCTUATION: &[char] = &['¿', '¡', '…', '“', '”', '‘', '’', '«', '»', '–', '—'];

/// A single unit of a tokenized sentence.
///
/// `Begin` and `End` are reserved sentinels bounding every learned sentence;
/// they can never be produced from text, so no input can collide with them.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Token {
	/// Sentence-start sentinel.
	Begin,
	/// Sentence-end sentinel.
	End,
	/// A word or a punctuation run.
	Word(String),
}

impl Token {
	/// Creates a word token.
	pub fn word(text: impl Into<String>) -> Self {
		Token::Word(text.into())
	}

	/// Returns the text of a word token, `None` for sentinels.
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Token::Word(text) => Some(text),
			_ => None,
		}
	}

	/// True for `Begin` and `End`.
	pub fn is_sentinel(&self) -> bool {
		!matches!(self, Token::Word(_))
	}

	/// True for word tokens made only of punctuation characters.
	pub fn is_punctuation(&self) -> bool {
		self.as_str().is_some_and(is_punctuation)
	}
}

impl fmt::Display for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Token::Begin => f.write_str("<begin>"),
			Token::End => f.write_str("<end>"),
			Token::Word(text) => f.write_str(text),
		}
	}
}

/// True if `text` is non-empty and every char is punctuation.
pub(crate) fn is_punctuation(text: &str) -> bool {
	!text.is_empty()
		&& text
			.chars()
			.all(|c| c.is_ascii_punctuation() || EXTRA_PUNCTUATION.contains(&c))
}

/// True if `text` is made only of opening brackets.
pub(crate) fn is_opening(text: &str) -> bool {
	!text.is_empty() && text.chars().all(|c| OPENING.contains(&c))
}
