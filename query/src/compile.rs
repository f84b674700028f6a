//! Lowering of a parsed [`Query`] into an FTS5 match expression and the
//! relational filters that are applied outside of full-text matching.

use crate::ast::Filter;
use crate::ast::FilterKey;
use crate::ast::Item;
use crate::ast::OrExpression;
use crate::ast::Query;
use crate::ast::Term;
use crate::ast::TermKind;
use serde::Serialize;

/// Match expression the store interprets as "every document".
pub const MATCH_ALL: &str = "*";

/// Characters that mean something to FTS5 but are never operators in the
/// search language.
const STRIPPED_CHARS: &[char] = &['.', '?', '+', '\\', '[', ']', '^', '$', '|', '{', '}'];

/// Barewords FTS5 would read as operators.
const FTS_KEYWORDS: &[&str] = &["AND", "OR", "NOT", "NEAR"];

/// Relational predicates collected from every branch of a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractedFilters {
    pub projects: Vec<String>,
    pub tags: Vec<String>,
}

impl ExtractedFilters {
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty() && self.tags.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Scope {
    #[default]
    Any,
    Title,
    Body,
}

impl Scope {
    fn from_in_value(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "title" => Self::Title,
            "body" => Self::Body,
            _ => Self::Any,
        }
    }
}

struct RenderedBranch {
    text: String,
    has_and: bool,
}

impl Query {
    /// Collects `project:` and `tag:` values regardless of branch structure.
    ///
    /// Tag values lose any leading `#` and are lower-cased. Empty values are
    /// dropped and duplicates are reported once.
    pub fn extract_filters(&self) -> ExtractedFilters {
        let mut filters = ExtractedFilters::default();
        let Some(expression) = &self.expression else {
            return filters;
        };
        let all_filters = expression
            .branches
            .iter()
            .flat_map(|branch| branch.items.iter())
            .filter_map(|item| match item {
                Item::Filter(filter) => Some(filter),
                Item::Term(_) => None,
            });
        for filter in all_filters {
            let Some(value) = filter.non_empty_value() else {
                continue;
            };
            match filter.kind() {
                FilterKey::Project => push_unique(&mut filters.projects, value.to_string()),
                FilterKey::Tag => {
                    let tag = normalize_tag(value);
                    if !tag.is_empty() {
                        push_unique(&mut filters.tags, tag);
                    }
                }
                _ => {}
            }
        }
        filters
    }

    /// Renders the full-text part of the query as an FTS5 match expression.
    ///
    /// Returns [`MATCH_ALL`] when the query has no text predicate at all.
    pub fn to_fts5(&self) -> String {
        match &self.expression {
            Some(expression) => render_or(expression),
            None => MATCH_ALL.to_string(),
        }
    }
}

/// Canonical form used for stored and queried tag names.
pub fn normalize_tag(raw: &str) -> String {
    raw.trim().trim_start_matches('#').trim().to_lowercase()
}

fn push_unique(values: &mut Vec<String>, value: String) {
    if !values.contains(&value) {
        values.push(value);
    }
}

fn render_or(expression: &OrExpression) -> String {
    let (hoisted, inherited_scope) = hoisted_run(expression);

    let rendered: Vec<RenderedBranch> = expression
        .branches
        .iter()
        .enumerate()
        .filter_map(|(idx, branch)| {
            let skip = if idx == 0 { hoisted } else { 0 };
            render_and(&branch.items[skip..], inherited_scope)
        })
        .collect();

    if rendered.is_empty() {
        return MATCH_ALL.to_string();
    }

    let needs_grouping = rendered.len() > 1;
    rendered
        .into_iter()
        .map(|branch| {
            if needs_grouping && branch.has_and {
                format!("({})", branch.text)
            } else {
                branch.text
            }
        })
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Length of the leading `project:` / `tag:` / `in:` run of the first branch
/// and the scope it leaves behind. Only applies when there is more than one
/// branch; the run is then shared by every branch.
fn hoisted_run(expression: &OrExpression) -> (usize, Scope) {
    if expression.branches.len() < 2 {
        return (0, Scope::Any);
    }
    let Some(first) = expression.branches.first() else {
        return (0, Scope::Any);
    };
    let mut scope = Scope::Any;
    let mut len = 0;
    for item in &first.items {
        let Item::Filter(filter) = item else {
            break;
        };
        let key = filter.kind();
        if !key.is_scoping() {
            break;
        }
        if key == FilterKey::In
            && let Some(value) = filter.non_empty_value()
        {
            scope = Scope::from_in_value(value);
        }
        len += 1;
    }
    (len, scope)
}

fn render_and(items: &[Item], inherited: Scope) -> Option<RenderedBranch> {
    let mut scope = inherited;
    let mut text = String::new();
    let mut has_and = false;

    for item in items {
        let (clause, negated) = match item {
            Item::Filter(filter) => match render_filter(filter, &mut scope) {
                Some(clause) => (clause, false),
                None => continue,
            },
            Item::Term(term) => match render_term(term, scope) {
                Some(clause) => (clause, term.negated),
                None => continue,
            },
        };

        if negated {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str("NOT ");
            text.push_str(&clause);
        } else if text.is_empty() {
            text = clause;
        } else {
            text.push_str(" AND ");
            text.push_str(&clause);
            has_and = true;
        }
    }

    if text.is_empty() {
        None
    } else {
        Some(RenderedBranch { text, has_and })
    }
}

fn render_filter(filter: &Filter, scope: &mut Scope) -> Option<String> {
    let value = filter.non_empty_value()?;
    match filter.kind() {
        FilterKey::Project | FilterKey::Tag => None,
        FilterKey::In => {
            *scope = Scope::from_in_value(value);
            None
        }
        FilterKey::Title => render_value(value, false).map(|value| format!("title:{value}")),
        FilterKey::Body => render_value(value, false).map(|value| format!("body:{value}")),
        FilterKey::Literal => {
            let literal = format!("{}:{value}", filter.key);
            render_value(&literal, false).map(|value| scoped(&value, *scope))
        }
    }
}

fn render_term(term: &Term, scope: Scope) -> Option<String> {
    let value = match term.kind {
        TermKind::Word => render_value(&term.text, false),
        TermKind::Prefix => render_value(&format!("{}*", term.text), false),
        TermKind::Phrase => render_value(&term.text, true),
    }?;
    Some(scoped(&value, scope))
}

fn scoped(value: &str, scope: Scope) -> String {
    match scope {
        Scope::Any => format!("(title:{value} OR body:{value})"),
        Scope::Title => format!("title:{value}"),
        Scope::Body => format!("body:{value}"),
    }
}

/// Sanitizes one value for FTS5.
///
/// Strips characters FTS5 would misread, keeps a trailing `*` as the prefix
/// marker and quotes anything that is not a plain bareword. Returns `None`
/// when nothing searchable is left.
fn render_value(raw: &str, force_quotes: bool) -> Option<String> {
    let (stem, prefix) = match raw.trim().strip_suffix('*') {
        Some(stem) => (stem, true),
        None => (raw.trim(), false),
    };
    let cleaned: String = stem
        .chars()
        .filter(|ch| !STRIPPED_CHARS.contains(ch))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    let quote = force_quotes
        || FTS_KEYWORDS.contains(&cleaned)
        || cleaned.chars().any(|ch| !is_bareword_char(ch));
    let mut rendered = if quote {
        format!("\"{}\"", cleaned.replace('"', "\"\""))
    } else {
        cleaned.to_string()
    };
    if prefix {
        rendered.push('*');
    }
    Some(rendered)
}

fn is_bareword_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || !ch.is_ascii()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;
    use pretty_assertions::assert_eq;

    fn fts(input: &str) -> String {
        parse(input).expect("parse").to_fts5()
    }

    #[test]
    fn empty_queries_match_everything() {
        assert_eq!(fts(""), MATCH_ALL);
        assert_eq!(fts("   "), MATCH_ALL);
        assert_eq!(Query::default().to_fts5(), MATCH_ALL);
        let empty = Query {
            expression: Some(OrExpression::default()),
        };
        assert_eq!(empty.to_fts5(), MATCH_ALL);
    }

    #[test]
    fn filter_only_queries_match_everything() {
        assert_eq!(fts("project:work tag:urgent"), MATCH_ALL);
        assert_eq!(fts("project:a OR tag:b"), MATCH_ALL);
        assert_eq!(fts("in:title"), MATCH_ALL);
    }

    #[test]
    fn unscoped_terms_search_title_and_body() {
        assert_eq!(fts("api"), "(title:api OR body:api)");
    }

    #[test]
    fn adjacent_terms_join_with_and() {
        assert_eq!(
            fts("alpha beta"),
            "(title:alpha OR body:alpha) AND (title:beta OR body:beta)"
        );
    }

    #[test]
    fn negated_terms_join_with_a_space() {
        assert_eq!(
            fts("alpha -beta"),
            "(title:alpha OR body:alpha) NOT (title:beta OR body:beta)"
        );
        assert_eq!(fts("-beta"), "NOT (title:beta OR body:beta)");
    }

    #[test]
    fn lone_not_branch_is_not_grouped() {
        assert_eq!(
            fts("-draft OR api"),
            "NOT (title:draft OR body:draft) OR (title:api OR body:api)"
        );
    }

    #[test]
    fn explicit_columns_ignore_scope() {
        assert_eq!(fts("in:body title:intro x"), "title:intro AND body:x");
        assert_eq!(fts("body:setup"), "body:setup");
    }

    #[test]
    fn in_resets_on_unknown_value() {
        assert_eq!(fts("in:title a in:everywhere b"), "title:a AND (title:b OR body:b)");
    }

    #[test]
    fn scope_changes_mid_branch() {
        assert_eq!(fts("a in:body b"), "(title:a OR body:a) AND body:b");
    }

    #[test]
    fn unknown_keys_become_literal_terms() {
        assert_eq!(
            fts("lang:rust"),
            "(title:\"lang:rust\" OR body:\"lang:rust\")"
        );
        assert_eq!(fts("in:title lang:rust"), "title:\"lang:rust\"");
    }

    #[test]
    fn empty_filters_are_dropped() {
        assert_eq!(fts("title:"), MATCH_ALL);
        assert_eq!(fts("title: -x"), "NOT (title:x OR body:x)");
        assert_eq!(fts("in: api"), MATCH_ALL);
    }

    #[test]
    fn whitespace_after_colon_is_insignificant() {
        assert_eq!(fts("title: api"), "title:api");
    }

    #[test]
    fn sanitizes_special_characters() {
        assert_eq!(fts("node.js"), "(title:nodejs OR body:nodejs)");
        assert_eq!(fts("a+b?"), "(title:ab OR body:ab)");
        assert_eq!(fts("[$^|{}]"), MATCH_ALL);
    }

    #[test]
    fn keeps_trailing_star_for_prefix_search() {
        assert_eq!(fts("auth*"), "(title:auth* OR body:auth*)");
        assert_eq!(fts("in:title conf.ig*"), "title:config*");
        assert_eq!(fts("*"), MATCH_ALL);
    }

    #[test]
    fn quotes_phrases_and_punctuation() {
        assert_eq!(
            fts("\"release notes\""),
            "(title:\"release notes\" OR body:\"release notes\")"
        );
        assert_eq!(
            fts("in:body \"say \\\"hi\\\"\""),
            "body:\"say \"\"hi\"\"\""
        );
        assert_eq!(fts("in:title it's"), "title:\"it's\"");
        assert_eq!(fts("title:NOT"), "title:\"NOT\"");
    }

    #[test]
    fn extract_filters_normalizes_tags() {
        let query = parse("tag:#Urgent project:work OR tag:urgent project:home x").expect("parse");
        assert_eq!(
            query.extract_filters(),
            ExtractedFilters {
                projects: vec!["work".to_string(), "home".to_string()],
                tags: vec!["urgent".to_string()],
            }
        );
    }

    #[test]
    fn extract_filters_skips_empty_values() {
        let query = parse("tag:# x project:").expect("parse");
        assert!(query.extract_filters().is_empty());
    }

    #[test]
    fn and_branch_is_grouped_only_with_siblings() {
        assert_eq!(fts("a AND b"), "(title:a OR body:a) AND (title:b OR body:b)");
        assert_eq!(
            fts("project:x OR a AND b"),
            "(title:a OR body:a) AND (title:b OR body:b)"
        );
    }

    #[test]
    fn hoisted_scope_reaches_every_branch() {
        assert_eq!(
            fts("project:work in:title api OR sdk OR cli"),
            "title:api OR title:sdk OR title:cli"
        );
    }

    #[test]
    fn later_scope_does_not_hoist() {
        assert_eq!(
            fts("api in:title OR sdk"),
            "(title:api OR body:api) OR (title:sdk OR body:sdk)"
        );
    }

    #[test]
    fn normalize_tag_strips_hash_and_case() {
        assert_eq!(normalize_tag(" #Work "), "work");
        assert_eq!(normalize_tag("##x"), "x");
    }
}
