// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Native calls run under a panic policy so a panic inside a codec surfaces as
// an ordinary engine failure instead of unwinding through the session.

use crate::engine::native::{EngineError, EngineResult};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

/// Run `f`, converting a panic into [`EngineError::Failed`] tagged with `stage`.
pub fn run_with_panic_policy<T, F>(stage: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(stage, panic = message, "panic contained at engine boundary");
            Err(EngineError::Failed(format!("{stage}: panic: {message}")))
        }
    }
}
