//! Command-line tokenizer
//!
//! A deliberately minimal, deterministic grammar: whitespace splits tokens
//! unless inside a quoted region; `"…"` and `'…'` each open a region closed
//! by its own matching quote, with the other quote character literal
//! inside; backslash escapes are not interpreted; an unterminated quote
//! runs to end of input; empty tokens are discarded.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteMode {
    None,
    Double,
    Single,
}

/// Split `line` into argument tokens per the grammar above.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote = QuoteMode::None;
    let mut in_token = false;

    for ch in line.chars() {
        match quote {
            QuoteMode::None => match ch {
                '"' => {
                    quote = QuoteMode::Double;
                    in_token = true;
                }
                '\'' => {
                    quote = QuoteMode::Single;
                    in_token = true;
                }
                ' ' => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                _ => {
                    current.push(ch);
                    in_token = true;
                }
            },
            QuoteMode::Double => {
                if ch == '"' {
                    quote = QuoteMode::None;
                } else {
                    current.push(ch);
                }
            }
            QuoteMode::Single => {
                if ch == '\'' {
                    quote = QuoteMode::None;
                } else {
                    current.push(ch);
                }
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn splits_on_plain_whitespace() {
        assert_eq!(tokenize("Echo hello world"), vec!["Echo", "hello", "world"]);
    }

    #[test]
    fn double_and_single_quoted_regions_keep_inner_spaces() {
        assert_eq!(tokenize("  \"a b\"  'c d'  "), vec!["a b", "c d"]);
    }

    #[test]
    fn opposite_quote_char_is_literal_inside_a_region() {
        assert_eq!(tokenize("\"it's fine\""), vec!["it's fine"]);
        assert_eq!(tokenize("'she said \"hi\"'"), vec!["she said \"hi\""]);
    }

    #[test]
    fn unterminated_quote_runs_to_end_of_input() {
        assert_eq!(tokenize("echo \"open ended"), vec!["echo", "open ended"]);
    }

    #[test]
    fn consecutive_spaces_discard_empty_tokens() {
        assert_eq!(tokenize("a    b"), vec!["a", "b"]);
    }

    #[test]
    fn backslash_is_not_an_escape() {
        assert_eq!(tokenize(r"a\ b"), vec![r"a\", "b"]);
    }

    proptest! {
        #[test]
        fn round_trips_simple_tokens(tokens in proptest::collection::vec("[a-zA-Z0-9_]{1,8}", 1..6)) {
            let joined = tokens.join(" ");
            prop_assert_eq!(tokenize(&joined), tokens);
        }
    }
}
