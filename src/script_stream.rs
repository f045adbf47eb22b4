use crate::error::StudioError;
use crate::scene::SceneScript;
use tracing::warn;

const SSE_DATA_PREFIX: &str = "data: ";
const SSE_DONE: &str = "[DONE]";
/// First key of every well-formed scene object.
const NARRATION_KEY: &str = "\"script\"";

/// Incremental scene extraction from a generation stream.
///
/// Accepts opaque byte chunks in either framing: SSE lines wrapping partial
/// text deltas, or a single JSON document split at arbitrary byte offsets.
/// Complete scene objects are emitted exactly once, in arrival order; an
/// incomplete tail is left in the buffer for the next chunk. The sequence is
/// finite and non-restartable.
#[derive(Default)]
pub struct ScriptStreamParser {
    /// Undecoded byte tail (a UTF-8 sequence split across chunks).
    pending: Vec<u8>,
    /// Partial transport line waiting for its terminator.
    line_buf: String,
    /// Append-only decoded script text.
    text: String,
    /// Emission cursor: everything before it has been consumed.
    cursor: usize,
    emitted: usize,
}

enum ScanResult {
    Complete(usize),
    Incomplete,
}

impl ScriptStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scenes emitted so far, across all calls.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Consume one chunk and return any scene objects it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SceneScript> {
        self.pending.extend_from_slice(chunk);
        self.drain_pending();
        self.extract_complete()
    }

    /// Signal end of stream. Flushes the partial line, extracts once more,
    /// and if nothing was emitted incrementally makes one best-effort parse
    /// of the whole buffer as a scene-array document.
    pub fn finish(&mut self) -> Vec<SceneScript> {
        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            self.line_buf.push_str(&tail);
        }
        if !self.line_buf.is_empty() {
            let line = std::mem::take(&mut self.line_buf);
            self.take_line(line.trim());
        }

        let mut scenes = self.extract_complete();
        if self.emitted == 0 {
            scenes = self.parse_full_document();
            self.emitted = scenes.len();
        }
        scenes
    }

    fn drain_pending(&mut self) {
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(s) => s.len(),
            Err(err) => err.valid_up_to(),
        };
        if valid == 0 {
            return;
        }

        let decoded = String::from_utf8_lossy(&self.pending[..valid]).into_owned();
        self.pending.drain(..valid);
        self.line_buf.push_str(&decoded);

        while let Some(pos) = self.line_buf.find('\n') {
            let line: String = self.line_buf.drain(..=pos).collect();
            self.take_line(line.trim());
        }
    }

    fn take_line(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }

        if let Some(payload) = line.strip_prefix(SSE_DATA_PREFIX) {
            let payload = payload.trim();
            if payload == SSE_DONE {
                return;
            }
            // Undecodable event payloads are dropped, not fatal.
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) {
                let delta = value
                    .get("choices")
                    .and_then(|c| c.get(0))
                    .and_then(|c| c.get("delta"))
                    .and_then(|d| d.get("content"))
                    .and_then(|t| t.as_str());
                if let Some(delta) = delta {
                    self.text.push_str(delta);
                }
            }
            return;
        }

        // Raw chunk fallback: single-shot documents and providers that skip
        // the event framing. Broken SSE internals are filtered out.
        if !line.contains("\"choices\":") {
            self.text.push_str(line);
        }
    }

    fn extract_complete(&mut self) -> Vec<SceneScript> {
        let mut out = Vec::new();
        loop {
            let Some(start) = self.next_candidate_start() else {
                break;
            };
            match scan_object(&self.text[start..]) {
                ScanResult::Complete(len) => {
                    let candidate = &self.text[start..start + len];
                    match serde_json::from_str::<SceneScript>(candidate) {
                        Ok(scene) if !scene.narration.is_empty() => {
                            out.push(scene);
                            self.emitted += 1;
                        }
                        Ok(_) => {
                            let err = StudioError::Parse("empty narration field".into());
                            warn!("skipping scene object: {err}");
                        }
                        Err(err) => {
                            let err = StudioError::Parse(err.to_string());
                            warn!("skipping scene object ({len} bytes): {err}");
                        }
                    }
                    self.cursor = start + len;
                }
                ScanResult::Incomplete => {
                    self.cursor = start;
                    break;
                }
            }
        }
        out
    }

    /// Next opening brace whose first key is the narration field. Returns
    /// `None` when the buffer holds no further candidate, leaving the cursor
    /// on any brace that is still undecidable.
    fn next_candidate_start(&mut self) -> Option<usize> {
        loop {
            let rel = self.text[self.cursor..].find('{')?;
            let brace = self.cursor + rel;
            let after = self.text[brace + 1..].trim_start();
            if after.starts_with(NARRATION_KEY) {
                self.cursor = brace;
                return Some(brace);
            }
            if NARRATION_KEY.starts_with(after) {
                // Too short to rule this brace in or out yet.
                self.cursor = brace;
                return None;
            }
            self.cursor = brace + 1;
        }
    }

    fn parse_full_document(&self) -> Vec<SceneScript> {
        let root: serde_json::Value = match serde_json::from_str(self.text.trim()) {
            Ok(value) => value,
            Err(_) => return Vec::new(),
        };

        let scenes = root
            .get("scenes")
            .and_then(|s| s.as_array())
            .or_else(|| root.as_array());
        let Some(scenes) = scenes else {
            return Vec::new();
        };

        scenes
            .iter()
            .filter_map(|value| serde_json::from_value::<SceneScript>(value.clone()).ok())
            .filter(|scene| !scene.narration.is_empty())
            .collect()
    }
}

/// Brace-depth scan with string/escape awareness. `input` starts at an
/// opening brace; returns the byte length of the balanced object.
fn scan_object(input: &str) -> ScanResult {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in input.bytes().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return ScanResult::Complete(i + 1);
                }
            }
            _ => {}
        }
    }
    ScanResult::Incomplete
}
