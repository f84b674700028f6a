use crate::error::SyntaxError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident(String),
    Quoted(String),
    Colon,
    Minus,
    Or,
    And,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character of the token.
    pub offset: usize,
}

/// Splits a query into tokens. Quoted strings are unescaped here, so the
/// parser only ever sees their final text.
pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }
        match ch {
            ':' => {
                chars.next();
                tokens.push(Token {
                    kind: TokenKind::Colon,
                    offset,
                });
            }
            '-' => {
                chars.next();
                tokens.push(Token {
                    kind: TokenKind::Minus,
                    offset,
                });
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some((_, ch)) = chars.next() {
                    match ch {
                        '\\' => match chars.next() {
                            Some((_, escaped)) => text.push(escaped),
                            None => break,
                        },
                        '"' => {
                            closed = true;
                            break;
                        }
                        other => text.push(other),
                    }
                }
                if !closed {
                    return Err(SyntaxError::new(input, offset, "unterminated quoted phrase"));
                }
                if text.trim().is_empty() {
                    return Err(SyntaxError::new(input, offset, "empty quoted phrase"));
                }
                tokens.push(Token {
                    kind: TokenKind::Quoted(text),
                    offset,
                });
            }
            _ => {
                let mut word = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if ch.is_whitespace() || matches!(ch, ':' | '-' | '"') {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                let kind = match word.as_str() {
                    "OR" => TokenKind::Or,
                    "AND" => TokenKind::And,
                    _ => TokenKind::Ident(word),
                };
                tokens.push(Token { kind, offset });
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .expect("tokenize")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn splits_filters_terms_and_operators() {
        assert_eq!(
            kinds("tag:#urgent -draft OR api*"),
            vec![
                TokenKind::Ident("tag".to_string()),
                TokenKind::Colon,
                TokenKind::Ident("#urgent".to_string()),
                TokenKind::Minus,
                TokenKind::Ident("draft".to_string()),
                TokenKind::Or,
                TokenKind::Ident("api*".to_string()),
            ]
        );
    }

    #[test]
    fn unescapes_quoted_strings() {
        assert_eq!(
            kinds(r#""say \"hi\" \\ now""#),
            vec![TokenKind::Quoted(r#"say "hi" \ now"#.to_string())]
        );
    }

    #[test]
    fn lowercase_operators_are_words() {
        assert_eq!(
            kinds("or and"),
            vec![
                TokenKind::Ident("or".to_string()),
                TokenKind::Ident("and".to_string()),
            ]
        );
    }

    #[test]
    fn records_offsets() {
        let tokens = tokenize("  ab \"c\"").expect("tokenize");
        let offsets: Vec<usize> = tokens.iter().map(|token| token.offset).collect();
        assert_eq!(offsets, vec![2, 5]);
    }

    #[test]
    fn unterminated_phrase_is_rejected() {
        let err = tokenize("alpha \"beta").expect_err("should fail");
        assert_eq!(err.position, 6);
        assert_eq!(err.message, "unterminated quoted phrase");
        assert_eq!(err.input, "alpha \"beta");
    }

    #[test]
    fn blank_phrase_is_rejected() {
        assert!(tokenize("\"   \"").is_err());
        assert!(tokenize("\"\"").is_err());
    }
}
