//! Pipeline services, leaves first.
//!
//! - `identify`: content hashing of binaries
//! - `process`: blocking subprocess execution with a deadline
//! - `decompiler`: Ghidra headless driver and the batch pool on top of it
//! - `corpus`: artifact naming contract and loading of decompiled functions
//! - `scoring`: prompt construction, inference backends, response parsing
//! - `ranking`: ranking table and its pure rendering
//! - `pipeline`: the end-to-end run

pub mod corpus;
pub mod decompiler;
pub mod identify;
pub mod pipeline;
pub mod process;
pub mod ranking;
pub mod scoring;
