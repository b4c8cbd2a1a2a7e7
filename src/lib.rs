pub mod ast;
pub mod builtins;
pub mod cli;
pub mod dispatch;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod expander;
pub mod parser;
pub mod pipeline;
pub mod redirect;
pub mod script_parser;
pub mod status;
