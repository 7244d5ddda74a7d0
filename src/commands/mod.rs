pub mod app_command;

pub use app_command::{AppCommand, SignalArgs, SubmitArgs, HELP_TEXT};
