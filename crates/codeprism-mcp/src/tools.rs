//! Retrieval tool handlers and their text rendering.

use crate::{McpServer, ToolResult};
use codeprism_search::ScoredCard;
use serde_json::{json, Value};
use std::fmt::Write as _;

const DEFAULT_TICKET_FILES: usize = 15;
/// Card bodies longer than this are cut in tool output.
const MAX_CONTENT_CHARS: usize = 1200;

/// Cut `s` to at most `max` characters, marking the cut.
fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolResult> {
    match args.get(key).and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(ToolResult::tool_error(format!("Missing or empty '{key}' parameter"))),
    }
}

fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str()).filter(|s| !s.trim().is_empty())
}

fn optional_limit(args: &Value, key: &str) -> Option<usize> {
    args.get(key).and_then(|v| v.as_u64()).filter(|&n| n > 0).map(|n| n as usize)
}

/// Render ranked cards as a numbered markdown list.
pub fn format_cards(cards: &[ScoredCard]) -> String {
    let mut out = String::new();
    for (i, hit) in cards.iter().enumerate() {
        let card = &hit.card;
        let _ = writeln!(
            out,
            "### {}. {} [{} · {}] (score {:.3}, {})",
            i + 1,
            card.title,
            card.flow,
            card.card_type,
            hit.score,
            hit.source
        );
        if card.stale {
            out.push_str("_stale: source changed since this card was written_\n");
        }
        if !card.source_files.is_empty() {
            let _ = writeln!(out, "Files: {}", card.source_files.join(", "));
        }
        out.push('\n');
        out.push_str(&truncate_chars(card.content.trim(), MAX_CONTENT_CHARS));
        out.push_str("\n\n");
    }
    out
}

impl McpServer {
    pub(crate) fn tool_search(&self, args: &Value) -> ToolResult {
        let query = match required_str(args, "query") {
            Ok(q) => q,
            Err(e) => return e,
        };
        let branch = optional_str(args, "branch");
        let search = self.service().search();
        let limit = optional_limit(args, "limit").unwrap_or_else(|| search.default_limit());

        match search.search(query, branch, limit) {
            Ok(hits) if hits.is_empty() => ToolResult::text(format!("No cards found for \"{query}\".")),
            Ok(hits) => ToolResult::text(format_cards(&hits)),
            Err(e) => ToolResult::tool_error(format!("Search error: {e}")),
        }
    }

    pub(crate) fn tool_context(&self, args: &Value) -> ToolResult {
        let description = match required_str(args, "description") {
            Ok(d) => d,
            Err(e) => return e,
        };
        let branch = optional_str(args, "branch");

        match self.service().search().context(description, branch) {
            Ok(bundle) if bundle.cards.is_empty() => ToolResult::text("No relevant cards found."),
            Ok(bundle) => {
                let mut out = String::from("## Relevant knowledge\n\n");
                out.push_str(&format_cards(&bundle.cards));
                out.push_str("## Files\n\n");
                for file in &bundle.files {
                    let _ = writeln!(out, "- {file}");
                }
                ToolResult::text(out)
            }
            Err(e) => ToolResult::tool_error(format!("Context error: {e}")),
        }
    }

    pub(crate) fn tool_ticket_files(&self, args: &Value) -> ToolResult {
        let description = match required_str(args, "description") {
            Ok(d) => d,
            Err(e) => return e,
        };
        let limit = optional_limit(args, "limit").unwrap_or(DEFAULT_TICKET_FILES);

        match self.service().search().ticket_files(description, limit) {
            Ok(files) => ToolResult::json(&json!({ "files": files })),
            Err(e) => ToolResult::tool_error(format!("Ticket files error: {e}")),
        }
    }

    pub(crate) fn tool_save_insight(&self, args: &Value) -> ToolResult {
        let (flow, title, content) = match (
            required_str(args, "flow"),
            required_str(args, "title"),
            required_str(args, "content"),
        ) {
            (Ok(f), Ok(t), Ok(c)) => (f, t, c),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => return e,
        };
        let files: Vec<String> = args
            .get("files")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        match self.service().search().save_insight(flow, title, content, &files) {
            Ok(id) => ToolResult::json(&json!({ "id": id, "flow": flow.trim() })),
            Err(e) => ToolResult::tool_error(format!("Save error: {e}")),
        }
    }

    pub(crate) fn tool_list_flows(&self) -> ToolResult {
        match self.service().search().list_flows() {
            Ok(flows) => ToolResult::json(&flows),
            Err(e) => ToolResult::tool_error(format!("List flows error: {e}")),
        }
    }
}
