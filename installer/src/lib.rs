//! dgtools installer library.
//!
//! This crate turns formula descriptors into installed command-line tools.
//! Each tool runs through the same pipeline: fetch and verify the source,
//! build it with the Go toolchain, install the binary and rendered shell
//! completions, then run the installed tool once as a smoke test. It backs
//! the `dgtools-installer` binary and can be driven programmatically.
//!
//! # Modules
//!
//! - [`builder`] - Toolchain invocation producing one executable per tool
//! - [`cli`] - Command-line argument definitions
//! - [`completion`] - Completion templates and placeholder substitution
//! - [`config`] - Engine configuration from TOML and CLI overrides
//! - [`dirs`] - Directory resolution abstraction for platform-specific paths
//! - [`error`] - Stage and pipeline error types
//! - [`fetch`] - Source retrieval, integrity checks and the fetch cache
//! - [`formula`] - Loading tool descriptors from formula files
//! - [`install_flow`] - Subcommand implementations behind the binary
//! - [`installer`] - Binary and completion installation
//! - [`output`] - Progress, summary and JSON report formatting
//! - [`pipeline`] - The per-tool state machine and concurrent runner
//! - [`process`] - Child processes with timeouts
//! - [`sha256_digest`] - Validated SHA-256 digests
//! - [`spec`] - Tool descriptors and their validation
//! - [`tool_name`] - Semantic wrapper for tool names
//! - [`verifier`] - Smoke test of installed tools

pub mod builder;
pub mod cli;
pub mod completion;
pub mod config;
pub mod dirs;
pub mod error;
pub mod fetch;
pub mod formula;
pub mod install_flow;
pub mod installer;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod sha256_digest;
pub mod spec;
#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
pub mod tool_name;
pub mod verifier;
