use anyhow::anyhow;
use tracing::{
  instrument,
  trace
};

use crate::validation::Field;

/// Splits a session line into words.
/// Single and double quotes group words
/// and may start mid-token, so
/// `desc:"two words"` is one word.
/// Backslash escapes the next character
/// outside single quotes.
pub(crate) fn split_words(
  line: &str
) -> anyhow::Result<Vec<String>> {
  let mut words = Vec::new();
  let mut current = String::new();
  let mut in_word = false;
  let mut quote: Option<char> = None;
  let mut chars = line.chars();

  while let Some(ch) = chars.next() {
    match (quote, ch) {
      | (Some('\''), '\'') => quote = None,
      | (Some('\''), c) => current.push(c),
      | (Some('"'), '"') => quote = None,
      | (_, '\\') => {
        let escaped =
          chars.next().ok_or_else(|| {
            anyhow!(
              "trailing backslash in \
               command"
            )
          })?;
        current.push(escaped);
        in_word = true;
      }
      | (Some(_), c) => current.push(c),
      | (None, '"' | '\'') => {
        quote = Some(ch);
        in_word = true;
      }
      | (None, c) if c.is_whitespace() => {
        if in_word {
          words.push(std::mem::take(
            &mut current
          ));
          in_word = false;
        }
      }
      | (None, c) => {
        current.push(c);
        in_word = true;
      }
    }
  }

  if let Some(open) = quote {
    return Err(anyhow!(
      "unterminated {open} quote"
    ));
  }
  if in_word {
    words.push(current);
  }

  Ok(words)
}

/// Separates free words from `key:value`
/// field modifiers. Everything after `--`
/// is a free word.
#[instrument(skip(args))]
pub(crate) fn parse_words_and_mods(
  args: &[String]
) -> (Vec<String>, Vec<(Field, String)>) {
  let mut words = Vec::new();
  let mut mods = Vec::new();

  let mut literal = false;
  for arg in args {
    if arg == "--" && !literal {
      literal = true;
      continue;
    }

    if !literal
      && let Some((field, value)) =
        parse_one_mod(arg)
    {
      trace!(field = %field, value = %value, "parsed modifier");
      mods.push((field, value));
      continue;
    }

    words.push(arg.clone());
  }

  (words, mods)
}

fn parse_one_mod(
  tok: &str
) -> Option<(Field, String)> {
  let (key, value) =
    if let Some((k, v)) =
      tok.split_once(':')
    {
      (k, v)
    } else if let Some((k, v)) =
      tok.split_once('=')
    {
      (k, v)
    } else {
      return None;
    };

  let field =
    match key.to_ascii_lowercase().as_str()
    {
      | "name" | "title" => {
        Field::TaskName
      }
      | "due" => Field::DueDate,
      | "pri" | "priority" => {
        Field::Priority
      }
      | "desc" | "description" => {
        Field::Description
      }
      | _ => return None
    };

  Some((field, value.to_string()))
}
