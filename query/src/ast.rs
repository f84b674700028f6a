/// Root of a parsed search string. `None` matches every document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub expression: Option<OrExpression>,
}

/// Branches combined with `OR`. An empty list matches every document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrExpression {
    pub branches: Vec<AndExpression>,
}

/// Items combined with `AND` (negated terms join with a bare `NOT`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AndExpression {
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Filter(Filter),
    Term(Term),
}

/// A `key:value` pair. The value is `None` when nothing followed the colon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub key: String,
    pub value: Option<String>,
}

impl Filter {
    pub fn kind(&self) -> FilterKey {
        FilterKey::parse(&self.key)
    }

    /// The value, if present and not blank.
    pub fn non_empty_value(&self) -> Option<&str> {
        self.value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// How the compiler treats a filter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKey {
    /// Relational predicate on the owning project alias.
    Project,
    /// Relational predicate on the document's tags.
    Tag,
    /// Changes the text column for the following terms of the branch.
    In,
    Title,
    Body,
    /// Unrecognized key, searched as the literal text `key:value`.
    Literal,
}

impl FilterKey {
    pub fn parse(key: &str) -> Self {
        match key.to_ascii_lowercase().as_str() {
            "project" => Self::Project,
            "tag" => Self::Tag,
            "in" => Self::In,
            "title" => Self::Title,
            "body" => Self::Body,
            _ => Self::Literal,
        }
    }

    /// Keys that only ever scope the query and never emit a text clause.
    pub fn is_scoping(self) -> bool {
        matches!(self, Self::Project | Self::Tag | Self::In)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub negated: bool,
    pub kind: TermKind,
    /// Term text; for [`TermKind::Prefix`] the trailing `*` is not included.
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermKind {
    Word,
    Prefix,
    Phrase,
}

impl Term {
    pub(crate) fn word(raw: String, negated: bool) -> Self {
        match raw.strip_suffix('*') {
            Some(stem) if !stem.is_empty() => Self {
                negated,
                kind: TermKind::Prefix,
                text: stem.to_string(),
            },
            _ => Self {
                negated,
                kind: TermKind::Word,
                text: raw,
            },
        }
    }

    pub(crate) fn phrase(text: String, negated: bool) -> Self {
        Self {
            negated,
            kind: TermKind::Phrase,
            text,
        }
    }
}
