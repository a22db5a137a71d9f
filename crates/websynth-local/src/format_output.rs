//! Final output shaping: truncates the answer, optionally strips snippets,
//! and caps the source list (spec.md §4.9). Pure and idempotent.

use websynth_core::AnswerRecord;

#[derive(Debug, Clone, Copy)]
pub struct ShapeOptions {
    pub max_answer_chars: usize,
    pub include_snippets: bool,
    pub max_sources: usize,
}

impl Default for ShapeOptions {
    fn default() -> Self {
        Self {
            max_answer_chars: 4_000,
            include_snippets: true,
            max_sources: 20,
        }
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if max_chars == 0 || s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1).max(1)).collect();
    out.push('…');
    out
}

/// `shape(record, opts) -> record`. Running this twice with the same `opts`
/// must be a no-op on the second pass.
pub fn shape(record: &AnswerRecord, opts: &ShapeOptions) -> AnswerRecord {
    let answer = truncate_chars(&record.answer, opts.max_answer_chars);

    let sources = record
        .sources
        .iter()
        .take(opts.max_sources)
        .map(|s| websynth_core::SourceReference {
            index: s.index,
            title: s.title.clone(),
            url: s.url.clone(),
            snippet: if opts.include_snippets {
                s.snippet.clone()
            } else {
                None
            },
        })
        .collect::<Vec<_>>();

    let kept_indices: std::collections::HashSet<usize> = sources.iter().map(|s| s.index).collect();
    let facts = record
        .facts
        .iter()
        .map(|f| websynth_core::Fact {
            point: f.point.clone(),
            sources: f
                .sources
                .iter()
                .copied()
                .filter(|i| kept_indices.contains(i))
                .collect(),
        })
        .collect();

    AnswerRecord {
        query: record.query.clone(),
        answer,
        facts,
        sources,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use websynth_core::{Fact, SourceReference};

    fn sample_record() -> AnswerRecord {
        AnswerRecord {
            query: "rust async".to_string(),
            answer: "a".repeat(100),
            facts: vec![Fact {
                point: "fact one".to_string(),
                sources: vec![1, 2],
            }],
            sources: vec![
                SourceReference {
                    index: 1,
                    title: "A".to_string(),
                    url: "https://a.example".to_string(),
                    snippet: Some("snip a".to_string()),
                },
                SourceReference {
                    index: 2,
                    title: "B".to_string(),
                    url: "https://b.example".to_string(),
                    snippet: Some("snip b".to_string()),
                },
            ],
        }
    }

    #[test]
    fn truncates_answer_with_ellipsis() {
        let record = sample_record();
        let opts = ShapeOptions {
            max_answer_chars: 10,
            ..Default::default()
        };
        let shaped = shape(&record, &opts);
        assert_eq!(shaped.answer.chars().count(), 10);
        assert!(shaped.answer.ends_with('…'));
    }

    #[test]
    fn strips_snippets_when_disabled() {
        let record = sample_record();
        let opts = ShapeOptions {
            include_snippets: false,
            ..Default::default()
        };
        let shaped = shape(&record, &opts);
        assert!(shaped.sources.iter().all(|s| s.snippet.is_none()));
    }

    #[test]
    fn caps_source_list() {
        let record = sample_record();
        let opts = ShapeOptions {
            max_sources: 1,
            ..Default::default()
        };
        let shaped = shape(&record, &opts);
        assert_eq!(shaped.sources.len(), 1);
        assert_eq!(shaped.facts[0].sources, vec![1]);
    }

    #[test]
    fn shaping_is_idempotent() {
        let record = sample_record();
        let opts = ShapeOptions {
            max_answer_chars: 10,
            include_snippets: false,
            max_sources: 1,
        };
        let once = shape(&record, &opts);
        let twice = shape(&once, &opts);
        assert_eq!(once.answer, twice.answer);
        assert_eq!(once.sources.len(), twice.sources.len());
        assert_eq!(once.sources[0].snippet, twice.sources[0].snippet);
    }
}
