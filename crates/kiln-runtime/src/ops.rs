//! Ops backing the bootstrap globals.
//!
//! Registered through the `kiln_runtime` extension in `runtime.rs`. State
//! they need lives in the `OpState`: the module loader (for `require`), the
//! project root (for the manifest) and an optional render sink.

use crate::module_loader::{KilnModuleLoader, RequireSource};
use bytes::Bytes;
use deno_core::error::AnyError;
use deno_core::{op2, OpState};
use kiln_core::dev::{client_reference, ClientReferenceMetadata};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;

/// Project root, used to relativize manifest ids.
pub struct ProjectRoot(pub PathBuf);

/// Destination of the bytes the renderer writes.
///
/// `closed` is notified once the output is over, whether the renderer ended
/// it or the client went away.
pub struct RenderSink {
    tx: Option<UnboundedSender<Bytes>>,
    closed: Rc<Notify>,
}

impl RenderSink {
    pub fn new(tx: UnboundedSender<Bytes>, closed: Rc<Notify>) -> Self {
        Self {
            tx: Some(tx),
            closed,
        }
    }

    fn close(&mut self) {
        if self.tx.take().is_some() {
            self.closed.notify_one();
        }
    }
}

/// Forward a `console.*` call to tracing.
#[op2(fast)]
pub fn op_kiln_log(#[string] level: &str, #[string] message: &str) {
    match level {
        "error" => tracing::error!(target: "kiln::js", "{message}"),
        "warn" => tracing::warn!(target: "kiln::js", "{message}"),
        "debug" => tracing::debug!(target: "kiln::js", "{message}"),
        "trace" => tracing::trace!(target: "kiln::js", "{message}"),
        _ => tracing::info!(target: "kiln::js", "{message}"),
    }
}

/// Encode string to UTF-8 bytes.
#[op2]
#[serde]
pub fn op_kiln_encode_utf8(#[string] text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

/// Decode UTF-8 bytes to string, replacing invalid sequences.
#[op2]
#[string]
pub fn op_kiln_decode_utf8(#[buffer] bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Timer primitive behind `setTimeout` and friends.
#[op2(async)]
pub async fn op_kiln_sleep(delay: f64) {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let millis = if delay.is_finite() && delay > 0.0 {
        delay as u64
    } else {
        0
    };
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

/// `require.resolve`: an absolute path, or `node:<name>` for builtins.
#[op2]
#[string]
pub fn op_kiln_require_resolve(
    state: &mut OpState,
    #[string] specifier: String,
    #[string] referrer: String,
) -> Result<String, AnyError> {
    let loader = state.borrow::<Rc<KilnModuleLoader>>();
    loader.require_resolve(&specifier, &referrer)
}

/// Source and format of a file about to be required.
#[op2]
#[serde]
pub fn op_kiln_require_load(
    state: &mut OpState,
    #[string] path: String,
) -> Result<RequireSource, AnyError> {
    let loader = state.borrow::<Rc<KilnModuleLoader>>();
    loader.require_source(&path)
}

/// Manifest entry for `module#name`.
#[op2]
#[serde]
pub fn op_kiln_client_reference(
    state: &mut OpState,
    #[string] module: String,
    #[string] name: String,
) -> ClientReferenceMetadata {
    let root = state.borrow::<ProjectRoot>();
    client_reference(&root.0, &module, &name)
}

/// Push a chunk to the HTTP body. `false` once the receiver is gone.
#[op2(fast)]
pub fn op_kiln_stream_write(state: &mut OpState, #[buffer] chunk: &[u8]) -> bool {
    let Some(sink) = state.try_borrow_mut::<RenderSink>() else {
        return false;
    };
    let Some(tx) = &sink.tx else {
        return false;
    };
    if tx.send(Bytes::copy_from_slice(chunk)).is_ok() {
        true
    } else {
        tracing::debug!("render client went away; dropping output");
        sink.close();
        false
    }
}

/// Close the HTTP body.
#[op2(fast)]
pub fn op_kiln_stream_end(state: &mut OpState) {
    if let Some(sink) = state.try_borrow_mut::<RenderSink>() {
        sink.close();
    }
}
