use serde::{Deserialize, Serialize};

use super::token::{Token, is_opening, is_punctuation};

/// Sentence-terminal punctuation.
const TERMINALS: &[char] = &['.', '!', '?', '…'];

/// Closing marks that stay glued to a terminal run (`"Stop!"`, `(really?)`).
const CLOSERS: &[char] = &['"', '\'', ')', ']', '}', '”', '’', '»'];

/// Tokenization rules shared by every corpus model.
///
/// The configuration is a plain value: hosts build it once at startup and
/// hand copies to each model, nothing mutates it afterwards.
///
/// ## Contract
/// - `split_sentences` keeps terminal punctuation with its sentence
/// - `tokenize` wraps non-empty output in `Begin`/`End`
/// - `detokenize` preserves word order and word identity; only spacing
///   around punctuation and the first capital letter are lossy
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TokenizerConfig {
	/// Treat line breaks as sentence boundaries (chat messages are lines).
	pub split_on_newlines: bool,

	/// Upper-case the first word when detokenizing.
	pub capitalize_first: bool,
}

impl Default for TokenizerConfig {
	fn default() -> Self {
		Self {
			split_on_newlines: true,
			capitalize_first: true,
		}
	}
}

impl TokenizerConfig {
	/// Splits raw text into trimmed, non-empty sentences.
	///
	/// A sentence ends after a run of `.`, `!`, `?` or `…` (plus any closing
	/// quotes or brackets) followed by whitespace or the end of the text.
	/// `3.14` or `file.txt` therefore never split.
	pub fn split_sentences(&self, text: &str) -> Vec<String> {
		let mut sentences = Vec::new();
		let mut current = String::new();
		let mut chars = text.chars().peekable();

		while let Some(c) = chars.next() {
			if self.split_on_newlines && (c == '\n' || c == '\r') {
				flush_sentence(&mut sentences, &mut current);
				continue;
			}

			current.push(c);
			if !TERMINALS.contains(&c) {
				continue;
			}

			// Absorb "?!", "..." and trailing closers
			while let Some(&next) = chars.peek() {
				if TERMINALS.contains(&next) || CLOSERS.contains(&next) {
					current.push(next);
					chars.next();
				} else {
					break;
				}
			}

			if chars.peek().is_none_or(|next| next.is_whitespace()) {
				flush_sentence(&mut sentences, &mut current);
			}
		}
		flush_sentence(&mut sentences, &mut current);

		sentences
	}

	/// Splits a sentence into tokens wrapped by `Begin` and `End`.
	///
	/// Whitespace separates chunks; inside a chunk, the leading and trailing
	/// non-alphanumeric runs become their own tokens, so `"(well-known,"`
	/// yields `(`, `well-known`, `,` and `don't` stays whole.
	///
	/// Empty or whitespace-only input yields an empty vector.
	pub fn tokenize(&self, sentence: &str) -> Vec<Token> {
		let mut tokens = vec![Token::Begin];
		for chunk in sentence.split_whitespace() {
			split_chunk(chunk, &mut tokens);
		}

		if tokens.len() == 1 {
			return Vec::new();
		}
		tokens.push(Token::End);
		tokens
	}

	/// Joins tokens back into readable text.
	///
	/// - Sentinels are skipped
	/// - Closing punctuation attaches to the previous token
	/// - Opening brackets attach to the next token
	/// - The first word is capitalized if `capitalize_first` is set
	pub fn detokenize(&self, tokens: &[Token]) -> String {
		let mut out = String::new();
		let mut glue_next = false;
		let mut capitalized = !self.capitalize_first;

		for text in tokens.iter().filter_map(Token::as_str) {
			let punctuation = is_punctuation(text);
			let opening = punctuation && is_opening(text);

			if !out.is_empty() && !glue_next && (!punctuation || opening) {
				out.push(' ');
			}

			if !capitalized && text.chars().any(char::is_alphanumeric) {
				push_capitalized(&mut out, text);
				capitalized = true;
			} else {
				out.push_str(text);
			}

			glue_next = opening;
		}

		out
	}

	/// Normal form used to compare sentences: re-tokenized, lower-cased,
	/// whitespace collapsed.
	///
	/// Training sentences and generated candidates go through the same
	/// function, so spacing differences never hide a verbatim replay.
	pub fn canonicalize(&self, sentence: &str) -> String {
		let tokens = self.tokenize(sentence);
		self.detokenize(&tokens)
			.to_lowercase()
			.split_whitespace()
			.collect::<Vec<_>>()
			.join(" ")
	}
}

fn flush_sentence(sentences: &mut Vec<String>, current: &mut String) {
	let trimmed = current.trim();
	if !trimmed.is_empty() {
		sentences.push(trimmed.to_owned());
	}
	current.clear();
}

fn split_chunk(chunk: &str, tokens: &mut Vec<Token>) {
	let start = chunk
		.char_indices()
		.find(|(_, c)| c.is_alphanumeric())
		.map(|(i, _)| i);
	let end = chunk
		.char_indices()
		.rev()
		.find(|(_, c)| c.is_alphanumeric())
		.map(|(i, c)| i + c.len_utf8());

	let (Some(start), Some(end)) = (start, end) else {
		// Nothing but symbols: ":)", "...", "-"
		tokens.push(Token::word(chunk));
		return;
	};

	for part in [&chunk[..start], &chunk[start..end], &chunk[end..]] {
		if !part.is_empty() {
			tokens.push(Token::word(part));
		}
	}
}

fn push_capitalized(out: &mut String, text: &str) {
	let mut chars = text.chars();
	if let Some(first) = chars.next() {
		out.extend(first.to_uppercase());
		out.push_str(chars.as_str());
	}
}
