//! codeprism-mcp: JSON-RPC 2.0 tool server over stdio.
//!
//! Exposes the retrieval tools (`search`, `context`, `ticket_files`,
//! `save_insight`, `list_flows`) to AI coding assistants. One request per
//! line on stdin, one response per line on stdout; logs go to stderr.

use codeprism_core::{CodeprismConfig, CodeprismError};
use codeprism_sync::Codeprism;
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::sync::Arc;

pub mod tools;
pub mod types;

pub use types::*;

const PROTOCOL_VERSION: &str = "2024-11-05";

/// Tool server backed by a shared [`Codeprism`] service.
pub struct McpServer {
    pub name: String,
    pub version: String,
    cp: Arc<Codeprism>,
}

impl McpServer {
    pub fn new(cp: Arc<Codeprism>) -> Self {
        Self {
            name: "codeprism".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            cp,
        }
    }

    /// In-memory, keyword-only server for tests.
    pub fn for_testing() -> Result<Self, CodeprismError> {
        let cp = Codeprism::in_memory(CodeprismConfig::default())?;
        Ok(Self::new(Arc::new(cp)))
    }

    pub fn service(&self) -> &Arc<Codeprism> {
        &self.cp
    }

    /// Serve stdin/stdout until EOF.
    pub fn run(&self) -> io::Result<()> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        self.serve(stdin.lock(), &mut stdout.lock())
    }

    /// Serve newline-delimited requests from `reader`, writing responses to `writer`.
    pub fn serve(&self, reader: impl BufRead, writer: &mut impl Write) -> io::Result<()> {
        tracing::info!("codeprism tool server ready (stdio)");
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(line) {
                Ok(req) => req,
                Err(e) => {
                    let resp = JsonRpcResponse::error(Value::Null, PARSE_ERROR, format!("Parse error: {e}"));
                    write_response(writer, &resp)?;
                    continue;
                }
            };

            // Notifications carry no id and get no response.
            let Some(id) = request.id.clone() else {
                match request.method.as_str() {
                    "notifications/initialized" => tracing::info!("client initialized"),
                    other => tracing::debug!(method = other, "ignoring notification"),
                }
                continue;
            };

            let response = self.handle_request(&request.method, request.params.as_ref(), id);
            write_response(writer, &response)?;
        }
        tracing::info!("stdin closed, shutting down");
        Ok(())
    }

    pub fn handle_request(&self, method: &str, params: Option<&Value>, id: Value) -> JsonRpcResponse {
        match method {
            "initialize" => self.handle_initialize(id),
            "tools/list" => JsonRpcResponse::success(id, json!({ "tools": tool_definitions() })),
            "tools/call" => self.handle_tools_call(id, params),
            "ping" => JsonRpcResponse::success(id, json!({})),
            _ => JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {method}")),
        }
    }

    fn handle_initialize(&self, id: Value) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": { "listChanged": false }
                },
                "serverInfo": {
                    "name": self.name,
                    "version": self.version
                }
            }),
        )
    }

    fn handle_tools_call(&self, id: Value, params: Option<&Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing params");
        };
        let Some(tool_name) = params.get("name").and_then(|v| v.as_str()) else {
            return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing tool name");
        };
        let empty = json!({});
        let arguments = params.get("arguments").unwrap_or(&empty);

        let start = std::time::Instant::now();
        let result = self.dispatch_tool(tool_name, arguments);
        tracing::debug!(
            tool = tool_name,
            is_error = result.is_error,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "tool call"
        );

        match serde_json::to_value(result) {
            Ok(v) => JsonRpcResponse::success(id, v),
            Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, format!("Serialization error: {e}")),
        }
    }

    fn dispatch_tool(&self, name: &str, args: &Value) -> ToolResult {
        match name {
            "search" => self.tool_search(args),
            "context" => self.tool_context(args),
            "ticket_files" => self.tool_ticket_files(args),
            "save_insight" => self.tool_save_insight(args),
            "list_flows" => self.tool_list_flows(),
            _ => ToolResult::tool_error(format!("Unknown tool: {name}")),
        }
    }
}

pub(crate) fn write_response(writer: &mut impl Write, response: &JsonRpcResponse) -> io::Result<()> {
    let json = serde_json::to_string(response).map_err(io::Error::other)?;
    writeln!(writer, "{json}")?;
    writer.flush()
}

/// Tool schemas advertised by `tools/list`.
pub fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "search",
            "description": "Search knowledge cards about the indexed codebases. Returns the most relevant cards with their flow, type, score and source files.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Natural language or identifier query" },
                    "branch": { "type": "string", "description": "Only return cards valid on this branch" },
                    "limit": { "type": "integer", "description": "Maximum cards to return", "minimum": 1 }
                },
                "required": ["query"]
            }
        }),
        json!({
            "name": "context",
            "description": "Assemble context for a task: ranked, deduplicated cards (flows first) plus the list of files they reference.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "description": { "type": "string", "description": "Task or ticket description" },
                    "branch": { "type": "string", "description": "Only use cards valid on this branch" }
                },
                "required": ["description"]
            }
        }),
        json!({
            "name": "ticket_files",
            "description": "Files most likely touched by a ticket, scored by the relevance of the cards that reference them.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "description": { "type": "string", "description": "Ticket description" },
                    "limit": { "type": "integer", "description": "Maximum files to return (default 15)", "minimum": 1 }
                },
                "required": ["description"]
            }
        }),
        json!({
            "name": "save_insight",
            "description": "Save a developer insight as a searchable card in a flow.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "flow": { "type": "string", "description": "Flow the insight belongs to" },
                    "title": { "type": "string" },
                    "content": { "type": "string" },
                    "files": { "type": "array", "items": { "type": "string" }, "description": "Related file paths" }
                },
                "required": ["flow", "title", "content"]
            }
        }),
        json!({
            "name": "list_flows",
            "description": "List flows with their non-stale card counts, largest first.",
            "inputSchema": { "type": "object", "properties": {} }
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_names_are_unique() {
        let defs = tool_definitions();
        let mut names: Vec<&str> = defs.iter().filter_map(|d| d["name"].as_str()).collect();
        assert_eq!(names.len(), 5);
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 5);
    }

    #[test]
    fn unknown_method_is_reported() {
        let server = McpServer::for_testing().unwrap();
        let resp = server.handle_request("resources/list", None, json!(3));
        assert_eq!(resp.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[test]
    fn tools_call_without_params_is_invalid() {
        let server = McpServer::for_testing().unwrap();
        let resp = server.handle_request("tools/call", None, json!(4));
        assert_eq!(resp.error.unwrap().code, INVALID_PARAMS);
    }

    #[test]
    fn serve_skips_notifications_and_reports_parse_errors() {
        let server = McpServer::for_testing().unwrap();
        let input = concat!(
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n"
        );
        let mut out = Vec::new();
        server.serve(input.as_bytes(), &mut out).unwrap();
        let lines: Vec<Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["error"]["code"], PARSE_ERROR);
        assert_eq!(lines[0]["id"], Value::Null);
        assert_eq!(lines[1]["id"], 1);
        assert_eq!(lines[1]["result"], json!({}));
    }
}
