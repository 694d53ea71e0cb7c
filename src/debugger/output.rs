use std::io::{self, Write};
use std::sync::mpsc::Sender;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    pub text: String,
    pub is_error: bool,
}

/// Receives program output and diagnostics as steps run.
pub trait OutputSink: Send {
    fn receive(&mut self, record: OutputRecord);

    fn output(&mut self, text: &str) {
        self.receive(OutputRecord {
            text: text.to_string(),
            is_error: false,
        });
    }

    fn error(&mut self, text: &str) {
        self.receive(OutputRecord {
            text: text.to_string(),
            is_error: true,
        });
    }
}

#[derive(Debug, Default)]
pub struct BufferedOutput {
    records: Vec<OutputRecord>,
}

impl BufferedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[OutputRecord] {
        &self.records
    }

    pub fn outputs(&self) -> Vec<&str> {
        self.texts(false)
    }

    pub fn errors(&self) -> Vec<&str> {
        self.texts(true)
    }

    fn texts(&self, is_error: bool) -> Vec<&str> {
        self.records
            .iter()
            .filter(|r| r.is_error == is_error)
            .map(|r| r.text.as_str())
            .collect()
    }
}

impl OutputSink for BufferedOutput {
    fn receive(&mut self, record: OutputRecord) {
        self.records.push(record);
    }
}

impl OutputSink for Sender<OutputRecord> {
    fn receive(&mut self, record: OutputRecord) {
        // The receiving side going away only means nobody is listening anymore.
        let _ = self.send(record);
    }
}

/// Program output to stdout, diagnostics to stderr.
#[derive(Debug, Default)]
pub struct ConsoleOutput;

impl OutputSink for ConsoleOutput {
    fn receive(&mut self, record: OutputRecord) {
        let text = if record.text.ends_with('\n') {
            record.text
        } else {
            format!("{}\n", record.text)
        };

        if record.is_error {
            let _ = io::stderr().write_all(text.as_bytes());
        } else {
            let mut stdout = io::stdout();
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
        }
    }
}
