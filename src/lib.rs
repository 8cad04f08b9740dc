//! Hollywood Casting: a short quiz picks your movie archetype, then an image
//! model puts your face on its poster.

#![allow(clippy::multiple_crate_versions)]
#![deny(clippy::all)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::complexity)]
#![deny(clippy::correctness)]
#![deny(clippy::disallowed_methods)]
#![deny(clippy::expect_used)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::panic)]
#![deny(clippy::perf)]
#![deny(clippy::trivially_copy_pass_by_ref)]
#![deny(clippy::unreachable)]
#![deny(clippy::unwrap_used)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod catalog;
pub mod cli;
pub mod clock;
pub mod config;
pub mod constants;
pub mod download;
pub mod error;
pub mod flow;
pub mod gemini;
pub mod photo;
pub mod poster;
pub mod replicate;
pub mod verdict;
pub mod web;

#[cfg(test)]
mod testing;
