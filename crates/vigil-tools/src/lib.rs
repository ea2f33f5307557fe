//! Built-in tools, local script tools, and the tool dispatcher for Vigil.

mod blacklist;
mod command;
mod dispatcher;
mod http;
mod list;
mod process;
mod read;
pub mod script;

pub use blacklist::{Blacklist, ConfirmHandler};
pub use command::RunCommandTool;
pub use dispatcher::ToolDispatcher;
pub use http::{
    HttpTarget, RequestSender, ReqwestSender, SendRequestTool, prepare_raw_request,
};
pub use list::ListFilesTool;
pub use process::decode_output;
pub use read::{MAX_READ_BYTES, ReadFileTool};

/// Text form of an argument value: strings as-is, anything else as JSON.
pub(crate) fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
