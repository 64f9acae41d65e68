//! WebAssembly bindings.
//!
//! Enable with the `wasm` feature:
//!
//! ```toml
//! [dependencies]
//! logoot = { version = "0.1", features = ["wasm"] }
//! ```
//!
//! Operations cross the boundary as JSON strings in the wire format, so the
//! JavaScript side can hand them straight to its socket.

use wasm_bindgen::prelude::*;

use crate::operation::Operation;

// ── ReplicatedDocument ──────────────────────────────────────────────

/// A collaborative text document for use from JavaScript.
#[wasm_bindgen(js_name = LogootDocument)]
pub struct WasmDocument {
    inner: crate::ReplicatedDocument,
}

#[wasm_bindgen(js_class = LogootDocument)]
impl WasmDocument {
    /// Create an empty document for the given site id.
    #[wasm_bindgen(constructor)]
    pub fn new(site: &str) -> Self {
        Self {
            inner: crate::ReplicatedDocument::new(site),
        }
    }

    /// Rebuild a document from a JSON snapshot.
    #[wasm_bindgen(js_name = fromSnapshot)]
    pub fn from_snapshot(site: &str, snapshot: &str) -> Result<WasmDocument, JsError> {
        Ok(Self {
            inner: crate::ReplicatedDocument::deserialize(site, snapshot)?,
        })
    }

    /// Insert text at a position. Returns the operations as a JSON array.
    pub fn insert(&mut self, text: &str, offset: usize) -> Result<String, JsError> {
        encode(&self.inner.insert(text, offset))
    }

    /// Delete `start..=end`. Returns the operations as a JSON array.
    pub fn delete(&mut self, start: usize, end: usize) -> Result<String, JsError> {
        encode(&self.inner.delete(start, end))
    }

    /// Replace the selection `start..end`. Returns the operations as a JSON
    /// array.
    #[wasm_bindgen(js_name = replaceRange)]
    pub fn replace_range(&mut self, text: &str, start: usize, end: usize) -> Result<String, JsError> {
        encode(&self.inner.replace_range(text, start, end))
    }

    /// Apply one operation received from a peer. Returns whether the visible
    /// text changed.
    pub fn receive(&mut self, payload: &str) -> Result<bool, JsError> {
        Ok(self.inner.receive(payload)?.changed())
    }

    /// Get the current visible text.
    pub fn value(&self) -> String {
        self.inner.value()
    }

    /// Get the number of visible characters.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if the text is empty.
    #[wasm_bindgen(js_name = isEmpty)]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Encode the full state as a JSON snapshot.
    pub fn serialize(&self) -> Result<String, JsError> {
        Ok(self.inner.serialize()?)
    }
}

fn encode(ops: &[Operation]) -> Result<String, JsError> {
    Ok(serde_json::to_string(ops)?)
}
