//! Content extraction: `(title, text, truncated)` from raw HTML, with a
//! three-stage fallback (spec.md §4.3).
//!
//! Grounded directly on the teacher's extraction idiom (`pick_readability_text`,
//! `pick_main_text`, `html_to_text`'s block-strip regex pass); the
//! query-aware chunking/scoring layer that depended on two path-only crates
//! absent from this workspace has been dropped -- this module only needs to
//! produce `(title, text, truncated)`.

use std::io::Cursor;

fn strip_block(html: &str, tag: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let open_pat = format!("<{tag}");
    let close_pat = format!("</{tag}");
    let mut out = String::with_capacity(html.len());
    let mut i = 0usize;
    while i < html.len() {
        let Some(start_rel) = lower[i..].find(&open_pat) else {
            out.push_str(&html[i..]);
            break;
        };
        let start = i + start_rel;
        out.push_str(&html[i..start]);
        let Some(close_rel) = lower[start..].find(&close_pat) else {
            break;
        };
        let close_start = start + close_rel;
        let Some(gt_rel) = lower[close_start..].find('>') else {
            break;
        };
        i = close_start + gt_rel + 1;
    }
    out
}

fn has_any_text(s: &str) -> bool {
    s.chars().any(|c| !c.is_whitespace())
}

/// Last-resort: strip `<script>`/`<style>` and the structural boilerplate
/// block tags, then strip all remaining tags via `html2text`.
pub fn regex_strip_extract(html: &str, width: usize) -> String {
    let mut s = strip_block(html, "script");
    s = strip_block(&s, "style");
    for tag in ["iframe", "svg", "header", "footer", "nav", "aside"] {
        s = strip_block(&s, tag);
    }
    let out = html2text::from_read(Cursor::new(s.as_bytes()), width).unwrap_or(s);
    if !has_any_text(&out) {
        String::new()
    } else {
        out
    }
}

fn class_or_id_lc(el: &html_scraper::ElementRef) -> String {
    let mut out = String::new();
    if let Some(c) = el.value().attr("class") {
        out.push_str(c);
        out.push(' ');
    }
    if let Some(i) = el.value().attr("id") {
        out.push_str(i);
    }
    if let Some(r) = el.value().attr("role") {
        out.push(' ');
        out.push_str(r);
    }
    out.to_ascii_lowercase()
}

fn is_boilerplate_container(el: &html_scraper::ElementRef) -> bool {
    let s = class_or_id_lc(el);
    if s.is_empty() {
        return false;
    }
    for bad in [
        "nav",
        "navbar",
        "navigation",
        "menu",
        "sidebar",
        "footer",
        "header",
        "banner",
        "contentinfo",
        "cookie",
        "consent",
        "ads",
        "advert",
        "promo",
        "subscribe",
        "newsletter",
        "share",
        "social",
        "actions",
        "related",
        "comments",
    ] {
        if s.contains(bad) {
            return true;
        }
    }
    false
}

fn element_text_chars(el: &html_scraper::ElementRef) -> usize {
    el.text().map(|t| t.chars().count()).sum()
}

fn element_link_text_chars(el: &html_scraper::ElementRef) -> usize {
    let Some(sel) = html_scraper::Selector::parse("a").ok() else {
        return 0;
    };
    el.select(&sel)
        .map(|a| a.text().map(|t| t.chars().count()).sum::<usize>())
        .sum()
}

/// Stage 2: structured DOM pruning. Prefers `<article>`/`<main>`/`.content`/
/// `.post-content`/`.article-content`/`#content`, falling back to scoring
/// `article, main, section, div` candidates directly.
fn pick_main_text(html: &str, width: usize) -> Option<String> {
    let doc = html_scraper::Html::parse_document(html);

    for sel_str in [
        "article",
        "main",
        ".content",
        ".post-content",
        ".article-content",
        "#content",
    ] {
        if let Ok(sel) = html_scraper::Selector::parse(sel_str) {
            if let Some(el) = doc.select(&sel).find(|el| {
                !is_boilerplate_container(el) && element_text_chars(el) >= 80
            }) {
                let frag = el.html();
                let txt = regex_strip_extract(&frag, width);
                if has_any_text(&txt) {
                    return Some(txt);
                }
            }
        }
    }

    let sel = html_scraper::Selector::parse("article, main, section, div").ok()?;
    let sel_p = html_scraper::Selector::parse("p").ok();
    let sel_li = html_scraper::Selector::parse("li").ok();
    let mut seen = 0usize;
    let mut best_score: i64 = 0;
    let mut best_html: Option<String> = None;

    for el in doc.select(&sel) {
        seen += 1;
        if seen > 20_000 {
            break;
        }
        if is_boilerplate_container(&el) {
            continue;
        }
        let txt = element_text_chars(&el);
        if txt < 20 {
            continue;
        }
        let link_txt = element_link_text_chars(&el);
        let non_link = txt.saturating_sub(link_txt);
        let mut score = (non_link as i64) - 3 * (link_txt as i64);
        let tag = el.value().name();
        if tag == "article" {
            score += 500;
        } else if tag == "main" {
            score += 300;
        }
        if txt > 0 {
            let density = (link_txt as f64) / (txt as f64);
            if density >= 0.66 {
                score -= 900;
            } else if density >= 0.50 {
                score -= 500;
            } else if density >= 0.33 {
                score -= 250;
            }
        }
        if let Some(sel) = sel_p.as_ref() {
            let pc = el.select(sel).take(50).count() as i64;
            score += 20 * pc.min(10);
        }
        if let Some(sel) = sel_li.as_ref() {
            let lc = el.select(sel).take(100).count() as i64;
            score += 3 * lc.min(20);
        }
        if non_link < 80 {
            score -= 200;
        }
        if score > best_score {
            best_score = score;
            best_html = Some(el.html());
        }
    }

    let frag = best_html?;
    let txt = regex_strip_extract(&frag, width);
    has_any_text(&txt).then_some(txt)
}

/// Stage 1: readability-style extraction, restricted to `article`/`main`
/// containers so it only fires when the page has a clear primary region.
fn pick_readability_text(html: &str, width: usize) -> Option<String> {
    let doc = html_scraper::Html::parse_document(html);
    let sel = html_scraper::Selector::parse("article, main").ok()?;
    let sel_p = html_scraper::Selector::parse("p").ok();
    let mut best_score: i64 = 0;
    let mut best_html: Option<String> = None;
    for el in doc.select(&sel).take(20_000) {
        if is_boilerplate_container(&el) {
            continue;
        }
        let txt = element_text_chars(&el);
        if txt < 50 {
            continue;
        }
        let link_txt = element_link_text_chars(&el);
        let non_link = txt.saturating_sub(link_txt);
        let mut score = (non_link as i64) - 4 * (link_txt as i64);
        let tag = el.value().name();
        if tag == "article" {
            score += 700;
        } else if tag == "main" {
            score += 400;
        }
        if let Some(sel) = sel_p.as_ref() {
            let pc = el.select(sel).take(80).count() as i64;
            score += 30 * pc.min(12);
        }
        if non_link < 150 {
            score -= 300;
        }
        if score > best_score {
            best_score = score;
            best_html = Some(el.html());
        }
    }
    let frag = best_html?;
    let txt = regex_strip_extract(&frag, width);
    has_any_text(&txt).then_some(txt)
}

fn extract_title(html: &str) -> Option<String> {
    let doc = html_scraper::Html::parse_document(html);
    if let Ok(sel) = html_scraper::Selector::parse(r#"meta[property="og:title"]"#) {
        if let Some(el) = doc.select(&sel).next() {
            if let Some(c) = el.value().attr("content") {
                let c = c.trim();
                if !c.is_empty() {
                    return Some(c.to_string());
                }
            }
        }
    }
    if let Ok(sel) = html_scraper::Selector::parse("title") {
        if let Some(el) = doc.select(&sel).next() {
            let t = el.text().collect::<Vec<_>>().join(" ");
            let t = t.split_whitespace().collect::<Vec<_>>().join(" ");
            if !t.is_empty() {
                return Some(t);
            }
        }
    }
    None
}

pub struct Extracted {
    pub title: String,
    pub text: String,
    pub truncated: bool,
}

fn truncate_with_ellipsis(s: &str, max_chars: usize) -> (String, bool) {
    if max_chars == 0 {
        return (String::new(), has_any_text(s));
    }
    let total = s.chars().count();
    if total <= max_chars {
        return (s.to_string(), false);
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1).max(1)).collect();
    out.push('…');
    (out, true)
}

/// `extract(url, html_bytes) -> (title, text, truncated)` (spec.md §4.3).
///
/// Tries readability, then structured DOM pruning, then regex strip, in
/// order, using the first stage that yields non-empty text.
pub fn extract(html: &str, max_content_chars: usize) -> Extracted {
    let width = 100;
    let title = extract_title(html).unwrap_or_default();

    let raw_text = pick_readability_text(html, width)
        .or_else(|| pick_main_text(html, width))
        .unwrap_or_else(|| regex_strip_extract(html, width));

    let (text, truncated) = truncate_with_ellipsis(raw_text.trim(), max_content_chars);
    Extracted {
        title,
        text,
        truncated,
    }
}

/// Plain-text fetch, used for raw-content endpoints whose body IS the
/// payload (no readability/DOM pruning applied).
pub fn extract_raw(bytes: &str, max_content_chars: usize) -> Extracted {
    let (text, truncated) = truncate_with_ellipsis(bytes.trim(), max_content_chars);
    Extracted {
        title: String::new(),
        text,
        truncated,
    }
}

/// `CleanHTML` contract from spec.md §8: strips all `<tag>` sequences and
/// collapses surrounding whitespace.
pub fn clean_html(s: &str) -> String {
    regex_strip_extract(s, 10_000).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readability_extraction_picks_article() {
        let html = r#"
        <html><head><title>Example</title></head>
        <body>
          <nav class="navbar"><a href="/a">A</a><a href="/b">B</a></nav>
          <article>
            <h1>Hello World</h1>
            <p>This is the real article content, long enough to win scoring against nav links.</p>
            <p>A second paragraph keeps the article density favorable over navigation chrome.</p>
          </article>
        </body></html>
        "#;
        let out = extract(html, 10_000);
        assert!(out.text.contains("real article content"));
        assert!(!out.text.contains("navbar"));
    }

    #[test]
    fn title_falls_back_to_og_title() {
        let html = r#"<html><head><meta property="og:title" content="OG Title"/></head><body><article><p>short body that is long enough to be picked up by extraction logic here.</p></article></body></html>"#;
        let out = extract(html, 10_000);
        assert_eq!(out.title, "OG Title");
    }

    #[test]
    fn truncates_with_ellipsis() {
        let html = r#"<html><body><article><p>0123456789abcdefghijklmnop long enough text block for article scoring to pick it as the main content region here.</p></article></body></html>"#;
        let out = extract(html, 20);
        assert!(out.truncated);
        assert!(out.text.ends_with('…'));
        assert!(out.text.chars().count() <= 20);
    }

    #[test]
    fn clean_html_strips_tags() {
        assert_eq!(clean_html("<b>x</b>"), "x");
    }

    #[test]
    fn regex_strip_drops_script_and_style() {
        let html = "<html><body><script>evil()</script><style>.a{}</style><p>visible text</p></body></html>";
        let out = regex_strip_extract(html, 80);
        assert!(out.contains("visible text"));
        assert!(!out.contains("evil()"));
    }

    #[test]
    fn empty_body_yields_empty_text() {
        let html = "<html><body>   </body></html>";
        let out = extract(html, 1_000);
        assert_eq!(out.text, "");
        assert!(!out.truncated);
    }
}
