use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use crate::protocol::{Response, StreamHandler};

type Hook = Box<dyn FnOnce() + Send>;

enum Step {
    Line(String),
    Invalid(Vec<u8>),
    Run(Hook),
}

/// Everything the engine wrote to a [`ScriptedStream`]
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    lines: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<bool>>,
}

impl Transcript {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn responses(&self) -> Vec<Response> {
        self.lines
            .lock()
            .iter()
            .filter_map(|line| Response::parse(line))
            .collect()
    }

    /// Response codes in order, 0 for `OK`
    pub fn codes(&self) -> Vec<u8> {
        self.responses().iter().map(Response::code).collect()
    }

    pub fn last(&self) -> Option<String> {
        self.lines.lock().last().cloned()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

/// Terminal replaying a fixed script of input lines
///
/// `run` steps execute a callback when the engine asks for the line after
/// them, which lets a test act between two commands. After the script the
/// stream reports end of input, or blocks forever with `hang_at_end`.
pub struct ScriptedStream {
    steps: VecDeque<Step>,
    hang_at_end: bool,
    transcript: Transcript,
}

impl ScriptedStream {
    pub fn new() -> Self {
        Self {
            steps: VecDeque::new(),
            hang_at_end: false,
            transcript: Transcript::default(),
        }
    }

    pub fn from_lines(lines: &[&str]) -> Self {
        lines.iter().fold(Self::new(), |stream, line| stream.line(*line))
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.steps.push_back(Step::Line(line.into()));
        self
    }

    /// A line that is not valid UTF-8
    pub fn invalid(mut self, bytes: &[u8]) -> Self {
        self.steps.push_back(Step::Invalid(bytes.to_vec()));
        self
    }

    pub fn run(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.steps.push_back(Step::Run(Box::new(hook)));
        self
    }

    pub fn hang_at_end(mut self) -> Self {
        self.hang_at_end = true;
        self
    }

    pub fn transcript(&self) -> Transcript {
        self.transcript.clone()
    }
}

impl Default for ScriptedStream {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScriptedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedStream")
            .field("remaining_steps", &self.steps.len())
            .field("hang_at_end", &self.hang_at_end)
            .finish()
    }
}

#[async_trait]
impl StreamHandler for ScriptedStream {
    async fn read_line(&mut self) -> io::Result<Option<String>> {
        loop {
            match self.steps.pop_front() {
                Some(Step::Line(line)) => return Ok(Some(line)),
                Some(Step::Invalid(bytes)) => {
                    return String::from_utf8(bytes)
                        .map(Some)
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e));
                }
                Some(Step::Run(hook)) => hook(),
                None if self.hang_at_end => std::future::pending::<()>().await,
                None => return Ok(None),
            }
        }
    }

    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        if self.transcript.is_closed() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream closed"));
        }
        self.transcript.lines.lock().push(line.to_string());
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        *self.transcript.closed.lock() = true;
        Ok(())
    }
}
