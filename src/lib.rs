//! # Lexbench
//!
//! An interactive harness for the classic compiler-construction toolchain:
//! run `lex`/`yacc`/`gcc` over tagged source blocks, stream tool output back
//! in real time, and drive the generated binaries through a pseudo-terminal
//! so their interactive transcripts can be diffed against the scripted input.
//!
//! ## Usage
//!
//! ```bash
//! lexbench block.txt [more-blocks...] [--workdir dir] [--config tools.toml] [--clean]
//! ```
//!
//! Each block file starts with a `/* command file options */` tag line; the
//! rest of the block is the source that gets written to `file` before the
//! command runs.
//!
//! ## Modules
//!
//! - `config` - Toolchain configuration (which programs to spawn)
//! - `harness` - Request parsing and dispatch of the tagged-block commands
//! - `pty` - Pseudo-terminal sessions for interactive binaries and the script diff
//! - `sink` - Output delivery seam between the harness and its host runtime
//! - `subprocess` - Child processes with incremental, real-time output capture
pub mod config;
pub mod harness;
pub mod pty;
pub mod sink;
pub mod subprocess;
