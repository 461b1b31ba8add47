//! HTML/Markdown helpers shared by the rule matcher and the processor.

use std::sync::LazyLock;

use pulldown_cmark::{Event, Options, Parser};
use scraper::Html;
use tiktoken_rs::CoreBPE;
use tracing::warn;

/// Subtrees that never contribute visible text.
const INVISIBLE_TAGS: [&str; 4] = ["script", "style", "noscript", "iframe"];

static TOKENIZER: LazyLock<Option<CoreBPE>> = LazyLock::new(|| match tiktoken_rs::cl100k_base() {
    Ok(bpe) => Some(bpe),
    Err(e) => {
        warn!(error = %e, "cl100k_base tokenizer unavailable, counting words instead");
        None
    }
});

/// Visible plain text of an HTML fragment, whitespace-collapsed.
pub fn content_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut parts: Vec<&str> = Vec::new();

    for node in fragment.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|el| INVISIBLE_TAGS.contains(&el.name()))
        });
        if !hidden {
            parts.push(text);
        }
    }

    parts
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Token count of the visible text, in the LLM's unit of measure.
pub fn token_count(html: &str) -> usize {
    let text = content_text(html);
    match TOKENIZER.as_ref() {
        Some(bpe) => bpe.encode_with_special_tokens(&text).len(),
        None => text.split_whitespace().count(),
    }
}

/// Convert HTML to Markdown for prompting. Falls back to the input on failure.
pub fn to_markdown(html: &str) -> String {
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "iframe", "noscript"])
        .build();
    match converter.convert(html) {
        Ok(markdown) => markdown,
        Err(e) => {
            warn!(error = %e, "HTML to Markdown conversion failed, using raw content");
            html.to_string()
        }
    }
}

/// Render Markdown (LLM output) to HTML. Soft breaks become `<br />`.
pub fn to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);

    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    pulldown_cmark::html::push_html(&mut out, parser);
    out.trim().to_string()
}
