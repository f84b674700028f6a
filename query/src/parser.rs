use crate::ast::AndExpression;
use crate::ast::Filter;
use crate::ast::Item;
use crate::ast::OrExpression;
use crate::ast::Query;
use crate::ast::Term;
use crate::error::SyntaxError;
use crate::lexer::Token;
use crate::lexer::TokenKind;
use crate::lexer::tokenize;

/// Parses a search string.
///
/// Blank input is valid and yields a query without an expression, which
/// matches every document.
pub fn parse(input: &str) -> Result<Query, SyntaxError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Ok(Query::default());
    }
    let mut parser = Parser {
        input,
        tokens,
        pos: 0,
    };
    let expression = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(parser.error_at(token.offset, "unexpected token"));
    }
    Ok(Query {
        expression: Some(expression),
    })
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn parse_or(&mut self) -> Result<OrExpression, SyntaxError> {
        let mut branches = vec![self.parse_and()?];
        while self.eat(&TokenKind::Or) {
            branches.push(self.parse_and()?);
        }
        Ok(OrExpression { branches })
    }

    fn parse_and(&mut self) -> Result<AndExpression, SyntaxError> {
        let mut items = vec![self.parse_item()?];
        loop {
            match self.peek_kind() {
                None | Some(TokenKind::Or) => break,
                Some(TokenKind::And) => {
                    self.pos += 1;
                    items.push(self.parse_item()?);
                }
                Some(_) => items.push(self.parse_item()?),
            }
        }
        Ok(AndExpression { items })
    }

    fn parse_item(&mut self) -> Result<Item, SyntaxError> {
        let Some(token) = self.next() else {
            return Err(self.error_at(self.input.len(), "expected a search term"));
        };
        match token.kind {
            TokenKind::Ident(word) => {
                if self.eat(&TokenKind::Colon) {
                    let value = self.parse_value();
                    Ok(Item::Filter(Filter { key: word, value }))
                } else {
                    Ok(Item::Term(Term::word(word, false)))
                }
            }
            TokenKind::Quoted(text) => Ok(Item::Term(Term::phrase(text, false))),
            TokenKind::Minus => self.parse_negated(token.offset),
            TokenKind::Colon => Err(self.error_at(token.offset, "unexpected ':'")),
            TokenKind::Or => Err(self.error_at(token.offset, "unexpected operator 'OR'")),
            TokenKind::And => Err(self.error_at(token.offset, "unexpected operator 'AND'")),
        }
    }

    fn parse_negated(&mut self, minus_offset: usize) -> Result<Item, SyntaxError> {
        match self.next().map(|token| token.kind) {
            Some(TokenKind::Ident(word)) => {
                if self.peek_kind() == Some(&TokenKind::Colon) {
                    return Err(
                        self.error_at(minus_offset, "negation cannot be applied to a filter")
                    );
                }
                Ok(Item::Term(Term::word(word, true)))
            }
            Some(TokenKind::Quoted(text)) => Ok(Item::Term(Term::phrase(text, true))),
            _ => Err(self.error_at(minus_offset, "expected a word or phrase after '-'")),
        }
    }

    /// Value position accepts the operator keywords as literal text, so
    /// `project:OR` names a project called `OR`.
    fn parse_value(&mut self) -> Option<String> {
        let value = match self.peek_kind()? {
            TokenKind::Ident(word) => word.clone(),
            TokenKind::Quoted(text) => text.clone(),
            TokenKind::Or => "OR".to_string(),
            TokenKind::And => "AND".to_string(),
            TokenKind::Colon | TokenKind::Minus => return None,
        };
        self.pos += 1;
        Some(value)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|token| &token.kind)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error_at(&self, position: usize, message: &str) -> SyntaxError {
        SyntaxError::new(self.input, position, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TermKind;
    use pretty_assertions::assert_eq;

    fn word(text: &str) -> Item {
        Item::Term(Term {
            negated: false,
            kind: TermKind::Word,
            text: text.to_string(),
        })
    }

    fn filter(key: &str, value: Option<&str>) -> Item {
        Item::Filter(Filter {
            key: key.to_string(),
            value: value.map(str::to_string),
        })
    }

    fn branches(query: &Query) -> Vec<Vec<Item>> {
        query
            .expression
            .as_ref()
            .map(|expr| {
                expr.branches
                    .iter()
                    .map(|branch| branch.items.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn blank_input_matches_everything() {
        assert_eq!(parse("").expect("parse"), Query::default());
        assert_eq!(parse("   \t ").expect("parse"), Query::default());
    }

    #[test]
    fn juxtaposition_and_explicit_and_are_equivalent() {
        let implicit = parse("alpha beta").expect("parse");
        let explicit = parse("alpha AND beta").expect("parse");
        assert_eq!(implicit, explicit);
        assert_eq!(branches(&implicit), vec![vec![word("alpha"), word("beta")]]);
    }

    #[test]
    fn or_splits_branches() {
        let query = parse("a b OR c").expect("parse");
        assert_eq!(
            branches(&query),
            vec![vec![word("a"), word("b")], vec![word("c")]]
        );
    }

    #[test]
    fn filters_accept_operator_keywords_as_values() {
        let query = parse("project:OR tag:AND x").expect("parse");
        assert_eq!(
            branches(&query),
            vec![vec![
                filter("project", Some("OR")),
                filter("tag", Some("AND")),
                word("x"),
            ]]
        );
    }

    #[test]
    fn filter_value_may_be_absent() {
        let query = parse("tag: -draft").expect("parse");
        assert_eq!(
            branches(&query),
            vec![vec![
                filter("tag", None),
                Item::Term(Term {
                    negated: true,
                    kind: TermKind::Word,
                    text: "draft".to_string(),
                }),
            ]]
        );
        let trailing = parse("project:").expect("parse");
        assert_eq!(branches(&trailing), vec![vec![filter("project", None)]]);
    }

    #[test]
    fn quoted_filter_values_keep_spaces() {
        let query = parse(r#"title:"release notes""#).expect("parse");
        assert_eq!(
            branches(&query),
            vec![vec![filter("title", Some("release notes"))]]
        );
    }

    #[test]
    fn prefix_and_phrase_terms() {
        let query = parse(r#"auth* -"legacy api""#).expect("parse");
        assert_eq!(
            branches(&query),
            vec![vec![
                Item::Term(Term {
                    negated: false,
                    kind: TermKind::Prefix,
                    text: "auth".to_string(),
                }),
                Item::Term(Term {
                    negated: true,
                    kind: TermKind::Phrase,
                    text: "legacy api".to_string(),
                }),
            ]]
        );
    }

    #[test]
    fn negated_filter_is_rejected() {
        let err = parse("-project:work").expect_err("should fail");
        assert_eq!(err.message, "negation cannot be applied to a filter");
        assert_eq!(err.position, 0);
    }

    #[test]
    fn dangling_operators_are_rejected() {
        for input in ["OR alpha", "alpha OR", "alpha AND", "alpha OR OR beta", "a AND OR b"] {
            let err = parse(input).expect_err(input);
            assert_eq!(err.input, input);
        }
    }

    #[test]
    fn dangling_minus_and_colon_are_rejected() {
        assert!(parse("alpha -").is_err());
        assert!(parse(":alpha").is_err());
        assert!(parse("key:value:more").is_err());
    }

    #[test]
    fn syntax_error_mentions_input() {
        let err = parse("\"open").expect_err("should fail");
        assert!(err.to_string().contains("\"\\\"open\""));
    }
}
