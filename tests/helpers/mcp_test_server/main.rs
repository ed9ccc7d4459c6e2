//! Test server binary for integration tests
//!
//! A minimal line-delimited JSON-RPC server over stdin/stdout, used by the
//! integration suites to exercise the stdio transport and connection runtime
//! against a real child process.
//!
//! Handled methods:
//!
//! - `initialize` -- answers with protocol version `2025-03-26` and a tools
//!   capability.
//! - `notifications/initialized` -- swallowed silently.
//! - `tools/list` -- two tools, `echo` and `sum`, delivered across two pages
//!   so clients must follow `nextCursor`.
//! - `ping` -- empty result.
//! - anything else -- JSON-RPC `-32601 Method not found`.
//!
//! Knobs (read from the environment at startup):
//!
//! - `MCPHERD_TEST_DELAY_MS` -- sleep this long before answering any method
//!   other than `initialize`. Used to create in-flight requests for timeout
//!   and stop tests.

use std::io::{self, BufRead, Write};
use std::time::Duration;

fn main() {
    let delay = std::env::var("MCPHERD_TEST_DELAY_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis);

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request: serde_json::Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(_) => {
                let response = error_response(&serde_json::Value::Null, -32700, "Parse error");
                if write_line(&mut out, &response).is_err() {
                    break;
                }
                continue;
            }
        };

        let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");
        let id = request.get("id").cloned().unwrap_or(serde_json::Value::Null);

        // Notifications get no reply at all.
        if id.is_null() {
            continue;
        }

        if method != "initialize" {
            if let Some(delay) = delay {
                std::thread::sleep(delay);
            }
        }

        let response = match method {
            "initialize" => result_response(
                &id,
                serde_json::json!({
                    "protocolVersion": "2025-03-26",
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "mcp-test-server", "version": "0.1.0" }
                }),
            ),
            "tools/list" => tools_list_response(&id, &request),
            "ping" => result_response(&id, serde_json::json!({})),
            _ => error_response(&id, -32601, &format!("Method not found: {method}")),
        };

        if write_line(&mut out, &response).is_err() {
            break;
        }
    }
}

/// The tool catalogue, delivered one tool per page.
fn tools_list_response(id: &serde_json::Value, request: &serde_json::Value) -> serde_json::Value {
    let cursor = request
        .get("params")
        .and_then(|p| p.get("cursor"))
        .and_then(|c| c.as_str());

    match cursor {
        None => result_response(
            id,
            serde_json::json!({
                "tools": [
                    {
                        "name": "echo",
                        "description": "Echoes input",
                        "inputSchema": {
                            "type": "object",
                            "properties": { "message": { "type": "string" } }
                        }
                    }
                ],
                "nextCursor": "page2"
            }),
        ),
        Some("page2") => result_response(
            id,
            serde_json::json!({
                "tools": [
                    {
                        "name": "sum",
                        "description": "Adds two integers",
                        "inputSchema": {
                            "type": "object",
                            "properties": {
                                "a": { "type": "integer" },
                                "b": { "type": "integer" }
                            }
                        }
                    }
                ]
            }),
        ),
        Some(other) => error_response(id, -32602, &format!("Unknown cursor: {other}")),
    }
}

fn result_response(id: &serde_json::Value, result: serde_json::Value) -> serde_json::Value {
    serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_response(id: &serde_json::Value, code: i32, message: &str) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}

fn write_line(out: &mut impl Write, response: &serde_json::Value) -> io::Result<()> {
    let serialized = serde_json::to_string(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(out, "{serialized}")?;
    out.flush()
}
