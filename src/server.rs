// ABOUTME: Model Context Protocol server over stdio
// ABOUTME: Exposes the generate_slides tool and documentation resources via JSON-RPC

use crate::errors::{Result, SlidesError};
use crate::generate::SlideGenerator;
use crate::invoker::CancelToken;
use crate::request::BuildRequest;
use crate::result::BuildResult;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub const SERVER_NAME: &str = "MkSlides Server";
pub const TOOL_NAME: &str = "generate_slides";
pub const PROTOCOL_VERSION: &str = "2024-11-05";
/// Versions a client may negotiate; anything else gets [`PROTOCOL_VERSION`]
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];

pub const README_URI: &str = "file:///readme";
pub const CREATING_SLIDES_URI: &str = "file:///docs/creating_slides";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;

/// Documentation served as MCP resources: (uri, name, path under docs dir, bundled copy)
const DOC_RESOURCES: &[(&str, &str, &str, &str)] = &[
    (README_URI, "README.md", "README.md", include_str!("../README.md")),
    (
        CREATING_SLIDES_URI,
        "creating_slides.md",
        "docs/creating_slides.md",
        include_str!("../docs/creating_slides.md"),
    ),
];

#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

type InFlight = Arc<Mutex<HashMap<String, CancelToken>>>;

/// MCP server handling one client on a line-delimited stream
pub struct McpServer {
    generator: Arc<SlideGenerator>,
    in_flight: InFlight,
}

impl McpServer {
    pub fn new(generator: SlideGenerator) -> Self {
        Self {
            generator: Arc::new(generator),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Serve requests from `input` until EOF, writing responses to `output`.
    ///
    /// Tool calls run on their own threads; all of them are finished before
    /// this returns. The writer is handed back once every response is out.
    pub fn serve<R, W>(&self, input: R, output: W) -> Result<W>
    where
        R: BufRead,
        W: Write + Send + 'static,
    {
        let writer = Arc::new(Mutex::new(output));
        let mut workers: Vec<JoinHandle<()>> = Vec::new();

        info!("{} listening on stdio", SERVER_NAME);

        for line in input.lines() {
            let line = line.map_err(|e| SlidesError::InternalError {
                message: "Failed to read from client".to_string(),
                source: Some(Box::new(e)),
            })?;
            if line.trim().is_empty() {
                continue;
            }

            workers.retain(|handle| !handle.is_finished());

            let message: Value = match serde_json::from_str(&line) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Discarding malformed message: {}", e);
                    send(&writer, &error_response(Value::Null, RpcError::new(PARSE_ERROR, e.to_string())));
                    continue;
                }
            };

            if let Some(handle) = self.dispatch(message, &writer) {
                workers.push(handle);
            }
        }

        info!("Client closed the connection, waiting for {} running builds", workers.len());
        for handle in workers {
            if handle.join().is_err() {
                error!("[Error] A build thread panicked");
            }
        }

        let writer = Arc::try_unwrap(writer)
            .map_err(|_| SlidesError::internal("Response writer still shared after shutdown"))?;
        Ok(writer.into_inner())
    }

    fn dispatch<W>(&self, message: Value, writer: &Arc<Mutex<W>>) -> Option<JoinHandle<()>>
    where
        W: Write + Send + 'static,
    {
        let method = message.get("method").and_then(Value::as_str).map(str::to_string);
        let id = message.get("id").cloned();
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        let (method, id) = match (method, id) {
            (Some(method), Some(id)) => (method, id),
            (Some(method), None) => {
                self.handle_notification(&method, &params);
                return None;
            }
            // A response to something we never send
            (None, Some(id)) if message.get("result").is_some() || message.get("error").is_some() => {
                debug!("Ignoring client response for id {}", id);
                return None;
            }
            (None, id) => {
                send(
                    writer,
                    &error_response(id.unwrap_or(Value::Null), RpcError::new(INVALID_REQUEST, "Missing method")),
                );
                return None;
            }
        };

        debug!("Received request {} ({})", method, id);

        if method == "tools/call" {
            return self.spawn_tool_call(id, params, Arc::clone(writer));
        }

        let response = match self.handle_request(&method, &params) {
            Ok(result) => success_response(id, result),
            Err(err) => error_response(id, err),
        };
        send(writer, &response);
        None
    }

    fn handle_notification(&self, method: &str, params: &Value) {
        match method {
            "notifications/initialized" => debug!("Client initialized"),
            "notifications/cancelled" => {
                let Some(request_id) = params.get("requestId") else {
                    warn!("Cancellation without requestId");
                    return;
                };
                match self.in_flight.lock().get(&request_id.to_string()) {
                    Some(token) => {
                        info!("Cancelling request {}", request_id);
                        token.cancel();
                    }
                    None => debug!("Cancellation for unknown or finished request {}", request_id),
                }
            }
            other => debug!("Ignoring notification {}", other),
        }
    }

    fn handle_request(&self, method: &str, params: &Value) -> std::result::Result<Value, RpcError> {
        match method {
            "initialize" => {
                let version = negotiate_version(params.get("protocolVersion").and_then(Value::as_str));
                Ok(json!({
                    "protocolVersion": version,
                    "capabilities": {
                        "tools": {},
                        "resources": {},
                    },
                    "serverInfo": {
                        "name": SERVER_NAME,
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }))
            }
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": [tool_descriptor()] })),
            "resources/list" => Ok(json!({ "resources": resource_descriptors() })),
            "resources/read" => {
                let uri = params
                    .get("uri")
                    .and_then(Value::as_str)
                    .ok_or_else(|| RpcError::new(INVALID_PARAMS, "resources/read requires a uri"))?;
                let text = self
                    .read_doc(uri)
                    .ok_or_else(|| RpcError::new(INVALID_PARAMS, format!("Unknown resource: {}", uri)))?;
                Ok(json!({
                    "contents": [{
                        "uri": uri,
                        "mimeType": "text/markdown",
                        "text": text,
                    }],
                }))
            }
            other => Err(RpcError::new(METHOD_NOT_FOUND, format!("Method not found: {}", other))),
        }
    }

    /// Start a build on its own thread. A call reusing the id of one still running is rejected.
    fn spawn_tool_call<W>(&self, id: Value, params: Value, writer: Arc<Mutex<W>>) -> Option<JoinHandle<()>>
    where
        W: Write + Send + 'static,
    {
        let key = id.to_string();
        let token = CancelToken::new();
        {
            let mut in_flight = self.in_flight.lock();
            if in_flight.contains_key(&key) {
                warn!("Rejecting tools/call with id {} already in flight", key);
                drop(in_flight);
                send(
                    &writer,
                    &error_response(id, RpcError::new(INVALID_REQUEST, format!("Request id {} is already in use", key))),
                );
                return None;
            }
            in_flight.insert(key.clone(), token.clone());
        }

        let generator = Arc::clone(&self.generator);
        let in_flight = Arc::clone(&self.in_flight);

        Some(thread::spawn(move || {
            let response = match call_tool(&generator, &params, &token) {
                Ok(result) => success_response(id, result),
                Err(err) => error_response(id, err),
            };
            in_flight.lock().remove(&key);
            send(&writer, &response);
        }))
    }

    /// Text of a documentation resource, or None for an unknown uri.
    ///
    /// A configured docs dir takes precedence; the copy bundled into the
    /// binary is served when none is set or the file cannot be read.
    pub fn read_doc(&self, uri: &str) -> Option<String> {
        let (_, name, relative, bundled) = DOC_RESOURCES.iter().find(|(known, ..)| *known == uri)?;

        if let Some(dir) = &self.generator.config().docs_dir {
            let path = dir.join(relative);
            info!("[Resource] Reading {} from: {:?}", name, path);
            match fs::read_to_string(&path) {
                Ok(content) => {
                    info!("[Resource] Successfully read {} ({} bytes)", name, content.len());
                    return Some(content);
                }
                Err(e) => warn!("[Resource] Could not read {:?}, serving bundled {}: {}", path, name, e),
            }
        }

        debug!("[Resource] Serving bundled {}", name);
        Some(bundled.to_string())
    }
}

fn negotiate_version(requested: Option<&str>) -> &'static str {
    match requested {
        Some(version) => SUPPORTED_PROTOCOL_VERSIONS
            .iter()
            .copied()
            .find(|supported| *supported == version)
            .unwrap_or_else(|| {
                info!("Client asked for protocol {}, offering {}", version, PROTOCOL_VERSION);
                PROTOCOL_VERSION
            }),
        None => PROTOCOL_VERSION,
    }
}

fn call_tool(generator: &SlideGenerator, params: &Value, cancel: &CancelToken) -> std::result::Result<Value, RpcError> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::new(INVALID_PARAMS, "tools/call requires a tool name"))?;
    if name != TOOL_NAME {
        return Err(RpcError::new(INVALID_PARAMS, format!("Unknown tool: {}", name)));
    }

    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
    let result = match BuildRequest::from_json(arguments) {
        Ok(request) => generator.generate_slides_with_cancel(&request, cancel),
        Err(err) => {
            warn!("[Error] {}", err);
            BuildResult::from_error(&err, None)
        }
    };

    tool_result(&result)
}

fn tool_result(result: &BuildResult) -> std::result::Result<Value, RpcError> {
    let structured = serde_json::to_value(result)
        .map_err(|e| RpcError::new(INTERNAL_ERROR, format!("Failed to encode result: {}", e)))?;
    let text = serde_json::to_string_pretty(&structured)
        .map_err(|e| RpcError::new(INTERNAL_ERROR, format!("Failed to encode result: {}", e)))?;

    Ok(json!({
        "content": [{ "type": "text", "text": text }],
        "structuredContent": structured,
        "isError": !result.success,
    }))
}

/// Tool schema advertised by `tools/list`
pub fn tool_descriptor() -> Value {
    json!({
        "name": TOOL_NAME,
        "description": "Generates HTML presentation slides from Markdown content using mkslides (Reveal.js). \
                        Returns the output directory and the list of generated files, or the build diagnostics on failure.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "markdown_content": {
                    "type": "string",
                    "description": "Raw Markdown for the slides, with '---' separating slides"
                },
                "output_dir": {
                    "type": "string",
                    "description": "Directory to write the presentation into (default ./mkslides_output)"
                },
                "config_override": {
                    "type": "object",
                    "description": "Complete mkslides configuration; replaces all other configuration options"
                },
                "slides_theme": {
                    "type": "string",
                    "description": "Slides theme, e.g. black, white, league"
                },
                "slides_highlight_theme": {
                    "type": "string",
                    "description": "Syntax highlighting theme for code blocks"
                },
                "revealjs_options": {
                    "type": "object",
                    "description": "Reveal.js options merged over the defaults"
                },
                "strict": {
                    "type": "boolean",
                    "description": "Fail the build on warnings",
                    "default": false
                }
            },
            "required": ["markdown_content"]
        }
    })
}

fn resource_descriptors() -> Vec<Value> {
    DOC_RESOURCES
        .iter()
        .map(|(uri, name, ..)| {
            json!({
                "uri": uri,
                "name": name,
                "mimeType": "text/markdown",
            })
        })
        .collect()
}

fn success_response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_response(id: Value, err: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": err.code, "message": err.message },
    })
}

fn send<W: Write>(writer: &Mutex<W>, message: &Value) {
    let mut out = writer.lock();
    let written = serde_json::to_writer(&mut *out, message)
        .map_err(std::io::Error::from)
        .and_then(|_| out.write_all(b"\n"))
        .and_then(|_| out.flush());
    if let Err(e) = written {
        error!("[Error] Failed to write response: {}", e);
    }
}
