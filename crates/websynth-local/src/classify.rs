//! Pure, deterministic query classification (spec.md §4.5). No I/O.
//!
//! Grounded on the teacher's style of plain free functions with ordered
//! substring/`match` chains (e.g. `content_type_lc_prefix`,
//! `is_generic_boilerplate_container`'s ordered deny-list).

use websynth_core::{AnswerShape, Classification, DomainHint};

/// Ordered (pattern, shape) table. First match wins -- ordering is part of
/// the contract (spec.md §4.5: "what is the" must beat "difference").
const ANSWER_SHAPE_PATTERNS_EN: &[(&str, AnswerShape)] = &[
    ("what is the", AnswerShape::Fact),
    ("what is a", AnswerShape::Fact),
    ("who is", AnswerShape::Fact),
    ("when was", AnswerShape::Fact),
    ("define ", AnswerShape::Fact),
    (" vs ", AnswerShape::Comparison),
    (" vs. ", AnswerShape::Comparison),
    ("difference between", AnswerShape::Comparison),
    ("compare ", AnswerShape::Comparison),
    ("top 10", AnswerShape::List),
    ("top 5", AnswerShape::List),
    ("list of", AnswerShape::List),
    ("best ", AnswerShape::List),
    ("how to", AnswerShape::HowTo),
    ("how do i", AnswerShape::HowTo),
    ("how can i", AnswerShape::HowTo),
    ("tutorial", AnswerShape::HowTo),
];

/// Secondary locale table (Russian, per spec.md §4.5's explicit requirement).
const ANSWER_SHAPE_PATTERNS_RU: &[(&str, AnswerShape)] = &[
    ("что такое", AnswerShape::Fact),
    ("кто такой", AnswerShape::Fact),
    ("чем отличается", AnswerShape::Comparison),
    ("разница между", AnswerShape::Comparison),
    ("топ 10", AnswerShape::List),
    ("список", AnswerShape::List),
    ("как настроить", AnswerShape::HowTo),
    ("как сделать", AnswerShape::HowTo),
];

const DOMAIN_DEVELOPER_PATTERNS: &[(&str, DomainHint)] = &[
    ("wordpress", DomainHint::WordPress),
    ("wp_", DomainHint::WordPress),
    ("add_action", DomainHint::WordPress),
    ("add_filter", DomainHint::WordPress),
    ("huggingface", DomainHint::HuggingFace),
    ("hugging face", DomainHint::HuggingFace),
    ("model card", DomainHint::HuggingFace),
    ("remote job", DomainHint::RemoteWork),
    ("remote work", DomainHint::RemoteWork),
    ("work from home", DomainHint::RemoteWork),
    ("freelance", DomainHint::Freelance),
    ("upwork", DomainHint::Freelance),
    ("contract gig", DomainHint::Freelance),
    ("job posting", DomainHint::Jobs),
    ("job opening", DomainHint::Jobs),
    ("hiring", DomainHint::Jobs),
    ("youtube", DomainHint::Video),
    ("video tutorial", DomainHint::Video),
    ("watch video", DomainHint::Video),
];

const DOMAIN_CODE_HOSTING_PATTERNS: &[&str] = &[
    "github",
    "gitlab",
    "source code",
    "repository for",
    "library for",
    "package for",
    "crate for",
    "npm package",
    "pip package",
];

/// Known library/framework aliases (case-insensitive substring) mapped to a
/// canonical id, consulted after the code-hosting table and before `LibraryDocs`.
const LIBRARY_ALIASES: &[(&str, &str)] = &[
    ("react", "react"),
    ("reactjs", "react"),
    ("vue", "vue"),
    ("vuejs", "vue"),
    ("angular", "angular"),
    ("django", "django"),
    ("flask", "flask"),
    ("fastapi", "fastapi"),
    ("express", "express"),
    ("nextjs", "next.js"),
    ("next.js", "next.js"),
    ("tokio", "tokio"),
    ("serde", "serde"),
    ("pandas", "pandas"),
    ("numpy", "numpy"),
    ("pytorch", "pytorch"),
    ("tensorflow", "tensorflow"),
];

pub fn answer_shape(query: &str) -> AnswerShape {
    let q = query.to_lowercase();
    for (pat, shape) in ANSWER_SHAPE_PATTERNS_EN {
        if q.contains(pat) {
            return *shape;
        }
    }
    for (pat, shape) in ANSWER_SHAPE_PATTERNS_RU {
        if q.contains(pat) {
            return *shape;
        }
    }
    AnswerShape::General
}

pub fn domain_hint(query: &str) -> (DomainHint, Option<String>) {
    let q = query.to_lowercase();
    for (pat, hint) in DOMAIN_DEVELOPER_PATTERNS {
        if q.contains(pat) {
            return (*hint, None);
        }
    }
    for pat in DOMAIN_CODE_HOSTING_PATTERNS {
        if q.contains(pat) {
            return (DomainHint::CodeHostingRepo, None);
        }
    }
    for (alias, canonical) in LIBRARY_ALIASES {
        if q.contains(alias) {
            return (DomainHint::LibraryDocs, Some(canonical.to_string()));
        }
    }
    (DomainHint::General, None)
}

pub fn classify(query: &str) -> Classification {
    let (domain_hint, library_id) = domain_hint(query);
    Classification {
        answer_shape: answer_shape(query),
        domain_hint,
        library_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fact_beats_comparison_on_specific_ordering() {
        assert_eq!(
            answer_shape("what is the difference between TCP and UDP"),
            AnswerShape::Fact
        );
    }

    #[test]
    fn comparison_shape() {
        assert_eq!(answer_shape("React vs Vue"), AnswerShape::Comparison);
    }

    #[test]
    fn list_shape() {
        assert_eq!(answer_shape("top 10 go frameworks"), AnswerShape::List);
    }

    #[test]
    fn howto_shape() {
        assert_eq!(answer_shape("how to setup nginx"), AnswerShape::HowTo);
    }

    #[test]
    fn general_shape_default() {
        assert_eq!(
            answer_shape("random unrelated query about cats"),
            AnswerShape::General
        );
    }

    #[test]
    fn wordpress_domain() {
        assert_eq!(
            domain_hint("wordpress add_action hook").0,
            DomainHint::WordPress
        );
    }

    #[test]
    fn code_hosting_domain() {
        assert_eq!(
            domain_hint("library for parsing JSON in Go").0,
            DomainHint::CodeHostingRepo
        );
    }

    #[test]
    fn library_docs_domain() {
        let (hint, lib) = domain_hint("react useEffect cleanup");
        assert_eq!(hint, DomainHint::LibraryDocs);
        assert_eq!(lib.as_deref(), Some("react"));
    }

    #[test]
    fn general_domain_default() {
        assert_eq!(
            domain_hint("random unrelated query about cats").0,
            DomainHint::General
        );
    }

    #[test]
    fn classification_is_pure() {
        let a = classify("react vs vue");
        let b = classify("react vs vue");
        assert_eq!(a.answer_shape, b.answer_shape);
        assert_eq!(a.domain_hint, b.domain_hint);
    }
}
