//! Embeds agent outputs in an entry body and extracts them again.
//!
//! Each agent block is followed by an inert marker naming the agent:
//!
//! ```text
//! <p>summary…</p><a data-ai-agent="summary"/><p>translation…</p><a data-ai-agent="translate"/>original…
//! ```
//!
//! Everything after the last marker is the original article. Older bodies
//! used a hidden `<div>` marker, which is still recognized when decoding.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Matches the current anchor marker (self-closing or empty pair) and the
/// legacy hidden-div marker.
static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"<a data-ai-agent="([^"<>]+)"\s*/>"#,
        r#"|<a data-ai-agent="([^"<>]+)"\s*></a>"#,
        r#"|<div data-ai-agent="([^"<>]+)" style="display: none;"></div>"#,
    ))
    .expect("marker regex is valid")
});

/// The marker emitted after an agent's block.
pub fn marker(agent: &str) -> String {
    format!(r#"<a data-ai-agent="{agent}"/>"#)
}

/// A body split into its original content and embedded agent outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    pub original: String,
    pub agents: HashMap<String, String>,
}

/// Split `body` at its markers.
///
/// Content between the previous marker (or the start) and a marker belongs
/// to that marker's agent. Whitespace-only blocks are dropped. A body with
/// no markers decodes to `(body, {})`.
pub fn decode(body: &str) -> Decoded {
    let mut agents = HashMap::new();
    let mut cursor = 0;

    for caps in MARKER_RE.captures_iter(body) {
        let (Some(whole), Some(name)) = (
            caps.get(0),
            caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)),
        ) else {
            continue;
        };
        let block = &body[cursor..whole.start()];
        if !block.trim().is_empty() {
            agents.insert(name.as_str().to_string(), block.to_string());
        }
        cursor = whole.end();
    }

    Decoded {
        original: body[cursor..].to_string(),
        agents,
    }
}

/// Rebuild a body from agent outputs and the original content.
///
/// Agents are written in `order`; names missing from `agents` are skipped.
/// Blocks for agents that are no longer in `order` are kept, after the
/// ordered ones, sorted by name. With no agent outputs the original is
/// returned unchanged.
pub fn encode<S: AsRef<str>>(
    agents: &HashMap<String, String>,
    original: &str,
    order: &[S],
) -> String {
    if agents.is_empty() {
        return original.to_string();
    }

    let mut stale: Vec<&String> = agents
        .keys()
        .filter(|name| !order.iter().any(|o| o.as_ref() == name.as_str()))
        .collect();
    stale.sort();

    let mut out = String::with_capacity(
        original.len() + agents.values().map(|v| v.len() + 64).sum::<usize>(),
    );
    let ordered = order.iter().map(|o| o.as_ref());
    for name in ordered.chain(stale.into_iter().map(String::as_str)) {
        if let Some(block) = agents.get(name) {
            out.push_str(block);
            out.push_str(&marker(name));
        }
    }
    out.push_str(original);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER: [&str; 3] = ["summary", "translate", "comment"];

    fn map(items: &[(&str, &str)]) -> HashMap<String, String> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn unmarked_body_decodes_to_itself() {
        for body in ["", "<p>Hello</p>", "  plain text \n", "<a href=\"x\">link</a>"] {
            let decoded = decode(body);
            assert_eq!(decoded.original, body);
            assert!(decoded.agents.is_empty());
        }
    }

    #[test]
    fn encode_empty_map_is_identity() {
        let original = "  <p>Hello</p>\n";
        assert_eq!(encode(&HashMap::new(), original, &ORDER), original);
    }

    #[test]
    fn encode_uses_canonical_order() {
        let agents = map(&[("translate", "<p>T</p>"), ("summary", "<p>S</p>")]);
        let body = encode(&agents, "<p>O</p>", &ORDER);
        assert_eq!(
            body,
            r#"<p>S</p><a data-ai-agent="summary"/><p>T</p><a data-ai-agent="translate"/><p>O</p>"#
        );
    }

    #[test]
    fn round_trip_restores_original_and_agents() {
        let cases = [
            map(&[("summary", "<p>S</p>")]),
            map(&[("summary", "<p>S</p>"), ("comment", "<div>C</div>")]),
            map(&[
                ("summary", "a"),
                ("translate", "\n<p>b</p>\n"),
                ("comment", "c"),
            ]),
        ];
        for agents in cases {
            let original = "\n<p>Original body</p>  ";
            let decoded = decode(&encode(&agents, original, &ORDER));
            assert_eq!(decoded.original, original);
            assert_eq!(decoded.agents, agents);
        }
    }

    #[test]
    fn empty_blocks_are_dropped() {
        let body = format!("   {}<p>O</p>", marker("summary"));
        let decoded = decode(&body);
        assert!(decoded.agents.is_empty());
        assert_eq!(decoded.original, "<p>O</p>");
    }

    #[test]
    fn decodes_legacy_div_marker() {
        let body = concat!(
            "<p>S</p>",
            r#"<div data-ai-agent="summary" style="display: none;"></div>"#,
            "<p>T</p>",
            r#"<a data-ai-agent="translate"/>"#,
            "<p>O</p>"
        );
        let decoded = decode(body);
        assert_eq!(decoded.original, "<p>O</p>");
        assert_eq!(decoded.agents, map(&[("summary", "<p>S</p>"), ("translate", "<p>T</p>")]));
    }

    #[test]
    fn decodes_anchor_variants() {
        let body = concat!(
            "A",
            r#"<a data-ai-agent="one" />"#,
            "B",
            r#"<a data-ai-agent="two"></a>"#,
            "O"
        );
        let decoded = decode(body);
        assert_eq!(decoded.agents, map(&[("one", "A"), ("two", "B")]));
        assert_eq!(decoded.original, "O");
    }

    #[test]
    fn legacy_content_is_reencoded_with_current_marker() {
        let legacy = r#"<p>S</p><div data-ai-agent="summary" style="display: none;"></div><p>O</p>"#;
        let decoded = decode(legacy);
        let body = encode(&decoded.agents, &decoded.original, &ORDER);
        assert_eq!(body, r#"<p>S</p><a data-ai-agent="summary"/><p>O</p>"#);
    }

    #[test]
    fn ordinary_anchors_are_not_markers() {
        let body = r#"<a href="/x" data-ai-agent="summary">link</a>tail"#;
        let decoded = decode(body);
        assert!(decoded.agents.is_empty());
        assert_eq!(decoded.original, body);
    }

    #[test]
    fn stale_agents_are_preserved_after_ordered_ones() {
        let agents = map(&[("retired", "<p>R</p>"), ("summary", "<p>S</p>")]);
        let body = encode(&agents, "O", &ORDER);
        assert_eq!(
            body,
            r#"<p>S</p><a data-ai-agent="summary"/><p>R</p><a data-ai-agent="retired"/>O"#
        );
        assert_eq!(decode(&body).agents, agents);
    }
}
