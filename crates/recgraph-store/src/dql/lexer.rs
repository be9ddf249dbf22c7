//! DQL tokenizer

use recgraph_core::{RecgraphError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    At,
    /// Identifier, predicate, number or uid literal
    Word(String),
    /// Double-quoted string, unescaped
    Str(String),
    /// `/pattern/flags`
    Regex { pattern: String, flags: String },
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '~' | '-' | '+' | '<' | '>' | '$')
}

/// Split a query into tokens
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                // comment to end of line
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '{' | '}' | '(' | ')' | '[' | ']' | ',' | ':' | '@' => {
                chars.next();
                tokens.push(match c {
                    '{' => Token::LBrace,
                    '}' => Token::RBrace,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    ',' => Token::Comma,
                    ':' => Token::Colon,
                    _ => Token::At,
                });
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some('r') => text.push('\r'),
                            Some(other) => text.push(other),
                            None => break,
                        },
                        c => text.push(c),
                    }
                }
                if !closed {
                    return Err(RecgraphError::engine("unterminated string literal"));
                }
                tokens.push(Token::Str(text));
            }
            '/' => {
                chars.next();
                let mut pattern = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '/' => {
                            closed = true;
                            break;
                        }
                        '\\' => {
                            if let Some(&next) = chars.peek() {
                                if next == '/' {
                                    chars.next();
                                    pattern.push('/');
                                    continue;
                                }
                            }
                            pattern.push('\\');
                        }
                        c => pattern.push(c),
                    }
                }
                if !closed {
                    return Err(RecgraphError::engine("unterminated regular expression"));
                }
                let mut flags = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphabetic() {
                        flags.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Regex { pattern, flags });
            }
            c if is_word_char(c) => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if is_word_char(c) {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(word));
            }
            other => {
                return Err(RecgraphError::engine(format!(
                    "unexpected character {other:?} in query"
                )))
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_block() {
        let tokens = tokenize("{ obj(func: uid(2)) { gid: uid } }").unwrap();
        assert_eq!(tokens[0], Token::LBrace);
        assert_eq!(tokens[1], Token::Word("obj".into()));
        assert_eq!(tokens[4], Token::Colon);
        assert_eq!(tokens[5], Token::Word("uid".into()));
        assert_eq!(tokens.last(), Some(&Token::RBrace));
    }

    #[test]
    fn test_tokenize_literals() {
        let tokens = tokenize(r#"eq(User.name, "a \"b\"") regexp(User.name, /^A.*/i) ~Branch.proj"#)
            .unwrap();
        assert!(tokens.contains(&Token::Str("a \"b\"".into())));
        assert!(tokens.contains(&Token::Regex {
            pattern: "^A.*".into(),
            flags: "i".into()
        }));
        assert!(tokens.contains(&Token::Word("~Branch.proj".into())));
    }

    #[test]
    fn test_unterminated_string() {
        assert!(tokenize("eq(a, \"x").is_err());
    }
}
