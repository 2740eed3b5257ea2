//! Scripted in-memory port for exercising the shell exchange without hardware

use super::ShellPort;
use crate::error::Result;
use crate::shell::commands::PAUSE_STREAM;

/// Simulates a DWM1001 shell.
///
/// While `streaming` is set, every input-buffer poll behaves as if one more
/// telemetry line had arrived. Writing the `lec` command toggles streaming,
/// like the real firmware does.
pub struct MockPort {
    pub streaming: bool,
    pub input: Vec<u8>,
    pub written: Vec<Vec<u8>>,
    pub stream_line: Vec<u8>,
    responses: Vec<(Vec<u8>, Vec<u8>)>,
}

impl MockPort {
    pub fn new() -> Self {
        Self {
            streaming: false,
            input: Vec::new(),
            written: Vec::new(),
            stream_line: b"DIST,1,AN0,022E,7.94,8.03,0.00,3.44,POS,6.95,5.37,-1.97,52\r\n".to_vec(),
            responses: Vec::new(),
        }
    }

    pub fn streaming() -> Self {
        Self {
            streaming: true,
            ..Self::new()
        }
    }

    /// Queue `reply` into the input buffer whenever `command` is written
    pub fn respond(mut self, command: &[u8], reply: &[u8]) -> Self {
        self.responses.push((command.to_vec(), reply.to_vec()));
        self
    }

    pub fn wrote(&self, command: &[u8]) -> bool {
        self.written.iter().any(|w| w == command)
    }
}

impl ShellPort for MockPort {
    fn name(&self) -> &str {
        "mock"
    }

    fn bytes_to_read(&mut self) -> Result<u32> {
        if self.streaming {
            let line = self.stream_line.clone();
            self.input.extend_from_slice(&line);
        }
        Ok(self.input.len() as u32)
    }

    fn clear_input(&mut self) -> Result<()> {
        self.input.clear();
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.written.push(data.to_vec());
        if data == PAUSE_STREAM {
            self.streaming = !self.streaming;
        }
        if let Some((_, reply)) = self.responses.iter().find(|(cmd, _)| cmd == data) {
            self.input.extend_from_slice(reply);
        }
        Ok(())
    }

    fn read_available(&mut self) -> Result<Vec<u8>> {
        Ok(std::mem::take(&mut self.input))
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        if self.streaming && self.input.is_empty() {
            let line = self.stream_line.clone();
            self.input.extend_from_slice(&line);
        }
        if self.input.is_empty() {
            return Ok(None);
        }

        let end = self
            .input
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| i + 1)
            .unwrap_or(self.input.len());
        let raw: Vec<u8> = self.input.drain(..end).collect();
        let line = String::from_utf8_lossy(&raw);
        Ok(Some(line.trim_end_matches(&['\r', '\n'][..]).to_string()))
    }
}
