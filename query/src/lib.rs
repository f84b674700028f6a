/*!
# Vault Query

Parser and compiler for the vault search language.

A query is a free-text string made of words, `"quoted phrases"`, `prefix*`
words, `-negated` terms, `key:value` filters and the operators `OR` / `AND`
(juxtaposition means `AND`, and `AND` binds tighter than `OR`).

Compilation produces two independent pieces:

- an SQLite FTS5 match expression ([`Query::to_fts5`]), and
- relational filters ([`Query::extract_filters`]) for `project:` and `tag:`,
  which never appear inside the match expression.

## Example

```rust
use vault_query::parse;

let query = parse("project:work in:title API OR SDK").unwrap();
assert_eq!(query.to_fts5(), "title:API OR title:SDK");
assert_eq!(query.extract_filters().projects, vec!["work".to_string()]);
```
*/

mod ast;
mod compile;
mod error;
mod lexer;
mod parser;

pub use ast::AndExpression;
pub use ast::Filter;
pub use ast::FilterKey;
pub use ast::Item;
pub use ast::OrExpression;
pub use ast::Query;
pub use ast::Term;
pub use ast::TermKind;
pub use compile::ExtractedFilters;
pub use compile::MATCH_ALL;
pub use compile::normalize_tag;
pub use error::SyntaxError;
pub use parser::parse;
