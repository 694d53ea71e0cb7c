use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, BufRead};

#[derive(Debug, Serialize, Deserialize)]
pub struct DapMessage {
    pub seq: u64,
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(flatten)]
    pub content: DapMessageContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DapMessageContent {
    Request {
        command: String,
        arguments: Option<Value>,
    },
    Response {
        request_seq: u64,
        success: bool,
        command: String,
        message: Option<String>,
        body: Option<Value>,
    },
    Event {
        event: String,
        body: Option<Value>,
    },
}

impl DapMessageContent {
    pub fn msg_type(&self) -> &'static str {
        match self {
            DapMessageContent::Request { .. } => "request",
            DapMessageContent::Response { .. } => "response",
            DapMessageContent::Event { .. } => "event",
        }
    }
}

impl DapMessage {
    pub fn new(seq: u64, content: DapMessageContent) -> Self {
        Self {
            seq,
            msg_type: content.msg_type().to_string(),
            content,
        }
    }

    pub fn is_request(&self) -> bool {
        self.msg_type == "request"
    }
}

/// `Content-Length: {len}\r\n\r\n{json}`
pub fn encode(msg: &DapMessage) -> serde_json::Result<String> {
    let json = serde_json::to_string(msg)?;
    Ok(format!("Content-Length: {}\r\n\r\n{}", json.len(), json))
}

/// `Ok(None)` at end of input.
pub fn read_message<R: BufRead>(reader: &mut R) -> io::Result<Option<DapMessage>> {
    let mut content_length = None;

    let length = loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }

        let line = line.trim_end();
        if line.is_empty() {
            match content_length {
                Some(length) => break length,
                None => continue,
            }
        }
        if let Some(value) = line.strip_prefix("Content-Length:") {
            content_length = value.trim().parse::<usize>().ok();
        }
    };

    let mut buffer = vec![0u8; length];
    reader.read_exact(&mut buffer)?;
    serde_json::from_slice(&buffer)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn reads_framed_requests() {
        let body = r#"{"seq":1,"type":"request","command":"initialize","arguments":{"adapterID":"r"}}"#;
        let framed = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
        let mut reader = Cursor::new(framed.into_bytes());

        let msg = read_message(&mut reader).unwrap().unwrap();
        assert!(msg.is_request());
        match msg.content {
            DapMessageContent::Request { command, arguments } => {
                assert_eq!(command, "initialize");
                assert_eq!(arguments, Some(json!({"adapterID": "r"})));
            }
            other => panic!("unexpected content: {:?}", other),
        }
        assert!(read_message(&mut reader).unwrap().is_none());
    }

    #[test]
    fn frames_events_with_byte_length() {
        let msg = DapMessage::new(
            7,
            DapMessageContent::Event {
                event: "output".to_string(),
                body: Some(json!({"output": "‘x’"})),
            },
        );
        let framed = encode(&msg).unwrap();
        let (header, json) = framed.split_once("\r\n\r\n").unwrap();

        assert_eq!(header, format!("Content-Length: {}", json.len()));
        assert!(json.contains("\"type\":\"event\""));
    }
}
