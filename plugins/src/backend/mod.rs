pub mod codecli;
pub mod scripted;

pub use codecli::CodeCliBackend;
pub use scripted::{ScriptedBackend, ScriptedResponse};
