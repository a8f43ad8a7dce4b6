//! Client for the line-oriented Lua console exposed on an instance's control socket.
//!
//! The console greets with two fixed-width lines, then evaluates one chunk per
//! line and answers with a YAML document terminated by `...`. Every call opens
//! a fresh connection, sends a single chunk and closes.
//!
//! The chunk wraps the operation body in `pcall` and returns a JSON envelope
//! `{ok, res, err}`. Arguments are JSON encoded and embedded in a Lua long string
//! whose bracket level never occurs in the argument text, so caller data cannot
//! escape into code.

use serde_json::Value;
use serde_yaml::Value as YamlValue;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::{ConsoleCall, Payload, RawResponse, Transport, TransportError, TransportResult};

const GREETING_LINES: usize = 2;
const END_OF_DOCUMENT: &str = "...";

pub struct ConsoleTransport {
    path: PathBuf,
    timeout: Duration,
}

impl ConsoleTransport {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn target(&self) -> String {
        self.path.display().to_string()
    }

    fn connect(&self) -> TransportResult<UnixStream> {
        if !self.path.exists() {
            return Err(TransportError::SocketMissing {
                path: self.path.clone(),
            });
        }
        let io_err = |err| TransportError::from_io(self.target(), err);
        let stream = UnixStream::connect(&self.path).map_err(io_err)?;
        stream.set_read_timeout(Some(self.timeout)).map_err(io_err)?;
        stream.set_write_timeout(Some(self.timeout)).map_err(io_err)?;
        Ok(stream)
    }

    fn evaluate(&self, call: &ConsoleCall) -> TransportResult<RawResponse> {
        let target = self.target();
        let io_err = |err| TransportError::from_io(target.clone(), err);

        let stream = self.connect()?;
        let mut writer = stream.try_clone().map_err(io_err)?;
        let mut reader = BufReader::new(stream);

        read_greeting(&mut reader, &target)?;

        let chunk = render_chunk(call)?;
        writer.write_all(chunk.as_bytes()).map_err(io_err)?;
        writer.write_all(b"\n").map_err(io_err)?;
        writer.flush().map_err(io_err)?;

        let document = read_document(&mut reader, &target)?;
        parse_reply(&target, &document)
    }
}

impl Transport for ConsoleTransport {
    fn send(&self, payload: &Payload) -> TransportResult<RawResponse> {
        let Payload::Console(call) = payload else {
            return Err(TransportError::Unsupported {
                transport: "console",
                payload: payload.kind(),
            });
        };
        debug!(operation = call.operation, socket = %self.path.display(), "evaluating on control socket");
        self.evaluate(call)
    }
}

fn read_line(reader: &mut impl BufRead, target: &str, line: &mut String) -> TransportResult<()> {
    line.clear();
    let read = reader
        .read_line(line)
        .map_err(|err| TransportError::from_io(target, err))?;
    if read == 0 {
        return Err(TransportError::protocol(target, "connection closed by instance"));
    }
    Ok(())
}

fn read_greeting(reader: &mut impl BufRead, target: &str) -> TransportResult<()> {
    let mut line = String::new();
    read_line(reader, target, &mut line)?;
    if !line.contains("console") {
        return Err(TransportError::protocol(
            target,
            format!("unexpected greeting {:?}", line.trim_end()),
        ));
    }
    for _ in 1..GREETING_LINES {
        read_line(reader, target, &mut line)?;
    }
    Ok(())
}

fn read_document(reader: &mut impl BufRead, target: &str) -> TransportResult<String> {
    let mut document = String::new();
    let mut line = String::new();
    loop {
        read_line(reader, target, &mut line)?;
        if line.trim_end() == END_OF_DOCUMENT {
            return Ok(document);
        }
        document.push_str(&line);
    }
}

/// Smallest long-bracket level whose closing bracket does not occur in `text`.
///
/// Level 0 is never used: the JSON array ends with `]`, which would fuse with
/// a `]]` closer.
fn bracket_level(text: &str) -> usize {
    (1..)
        .find(|level| !text.contains(&format!("]{}]", "=".repeat(*level))))
        .unwrap_or_default()
}

pub(crate) fn render_chunk(call: &ConsoleCall) -> TransportResult<String> {
    let args = serde_json::to_string(&call.args)
        .map_err(|err| TransportError::protocol(call.operation, err.to_string()))?;
    let eq = "=".repeat(bracket_level(&args));
    let body = call
        .body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    Ok(format!(
        "local json = require('json').new() \
         json.cfg({{encode_use_tostring = true}}) \
         local ok, res, err = pcall(function(...) {body} end, unpack(json.decode([{eq}[{args}]{eq}]))) \
         if not ok then res, err = nil, res end \
         if type(err) == 'table' then err = err.err or tostring(err) end \
         return json.encode({{ok = ok, res = res, err = err}})"
    ))
}

pub(crate) fn parse_reply(target: &str, document: &str) -> TransportResult<RawResponse> {
    let reply: YamlValue = serde_yaml::from_str(document)
        .map_err(|err| TransportError::protocol(target, format!("reply is not YAML: {err}")))?;
    let first = reply
        .as_sequence()
        .and_then(|items| items.first())
        .ok_or_else(|| TransportError::protocol(target, "empty reply"))?;

    match first {
        YamlValue::String(encoded) => {
            let envelope: Value = serde_json::from_str(encoded).map_err(|err| {
                TransportError::protocol(target, format!("envelope is not JSON: {err}"))
            })?;
            let result = envelope.get("res").cloned().unwrap_or(Value::Null);
            let error = envelope.get("err").filter(|err| !err.is_null()).cloned();
            Ok(RawResponse::Console { result, error })
        }
        YamlValue::Mapping(map) => match map.get("error") {
            // Raised outside pcall, e.g. a syntax error in the chunk.
            Some(YamlValue::String(message)) => Ok(RawResponse::Console {
                result: Value::Null,
                error: Some(Value::String(message.clone())),
            }),
            _ => Err(TransportError::protocol(target, "unexpected reply shape")),
        },
        _ => Err(TransportError::protocol(target, "unexpected reply shape")),
    }
}
