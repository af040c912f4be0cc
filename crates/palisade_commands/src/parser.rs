//! Quote-aware command-line tokenizer.
//!
//! Runs of whitespace separate tokens except inside double-quote pairs,
//! which form a single token with surrounding whitespace trimmed; empty
//! tokens are discarded. An unterminated quote swallows the rest of the
//! line as one token. Malformed quoting never fails; worst case is a
//! different tokenization than the user intended.

/// Split a raw line into tokens.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;

    for c in line.chars() {
        if c == '"' {
            if in_quote {
                flush(&mut tokens, &mut current);
                in_quote = false;
            } else {
                // The opening quote keeps whatever was already buffered:
                // `ab"cd ef"` is one token, `abcd ef`.
                in_quote = true;
            }
        } else if c.is_whitespace() && !in_quote {
            flush(&mut tokens, &mut current);
        } else {
            current.push(c);
        }
    }
    flush(&mut tokens, &mut current);
    tokens
}

fn flush(tokens: &mut Vec<String>, current: &mut String) {
    let token = current.trim();
    if !token.is_empty() {
        tokens.push(token.to_string());
    }
    current.clear();
}

/// Split a raw line into a command name and its positional arguments.
///
/// The first token is the command: one leading `/` or `!` is stripped and
/// the name is lowercased. Empty and whitespace-only lines (and a bare
/// prefix) yield no command.
pub fn parse_command(line: &str) -> (Option<String>, Vec<String>) {
    let mut tokens = tokenize(line);
    if tokens.is_empty() {
        return (None, Vec::new());
    }

    let first = tokens.remove(0);
    let name = first
        .strip_prefix('/')
        .or_else(|| first.strip_prefix('!'))
        .unwrap_or(&first)
        .to_lowercase();
    if name.is_empty() {
        return (None, tokens);
    }
    (Some(name), tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_arguments_form_one_token() {
        let (cmd, args) = parse_command("/give \"john doe\" 5");
        assert_eq!(cmd.as_deref(), Some("give"));
        assert_eq!(args, vec!["john doe", "5"]);
    }

    #[test]
    fn empty_lines_yield_no_command() {
        assert_eq!(parse_command(""), (None, Vec::new()));
        assert_eq!(parse_command("   \t  "), (None, Vec::new()));
        assert_eq!(parse_command("/"), (None, Vec::new()));
    }

    #[test]
    fn command_is_lowercased_and_prefix_stripped() {
        let (cmd, args) = parse_command("!Heal 50");
        assert_eq!(cmd.as_deref(), Some("heal"));
        assert_eq!(args, vec!["50"]);

        let (cmd, _) = parse_command("TELEPORT home");
        assert_eq!(cmd.as_deref(), Some("teleport"));
    }

    #[test]
    fn unterminated_quote_swallows_the_rest() {
        let (cmd, args) = parse_command("/say \"hello there everyone");
        assert_eq!(cmd.as_deref(), Some("say"));
        assert_eq!(args, vec!["hello there everyone"]);
    }

    #[test]
    fn quote_opening_mid_token_extends_it() {
        assert_eq!(tokenize("ab\"cd ef\""), vec!["abcd ef"]);
    }

    #[test]
    fn empty_quotes_are_discarded() {
        let (cmd, args) = parse_command("/kick \"\" reason");
        assert_eq!(cmd.as_deref(), Some("kick"));
        assert_eq!(args, vec!["reason"]);
    }

    #[test]
    fn quoted_whitespace_is_trimmed() {
        assert_eq!(tokenize("\"  spaced out  \""), vec!["spaced out"]);
    }

    #[test]
    fn runs_of_whitespace_separate_tokens() {
        let (cmd, args) = parse_command("/tp   north   \t 12  9");
        assert_eq!(cmd.as_deref(), Some("tp"));
        assert_eq!(args, vec!["north", "12", "9"]);
    }
}
