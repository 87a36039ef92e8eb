//! Completion callbacks to client-supplied URLs.

pub mod callback;
pub(crate) mod delivery;

pub use callback::{CallbackNotifier, CallbackPayload, HttpCallbackNotifier, NoopNotifier};
pub(crate) use delivery::CallbackQueue;
