//! # mutscope
//!
//! `mutscope` is a mutation testing engine. It alters a program under test
//! with small syntactic mutations, re-runs the test suites against every
//! variant and reports how many mutants the tests detect.
//!
//! - `mutation`: the language-agnostic engine: baseline measurement, bounded
//!   execution with deadlines, classification, scoring, events and reports
//! - `source`: a line-oriented text backend that mutates source files on
//!   disk and runs test commands as subprocesses
//! - `logging`: diagnostic tracing setup for the command-line tool (feature `cli`)

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

pub mod mutation;
pub mod source;

#[cfg(feature = "cli")]
#[cfg_attr(docsrs, doc(cfg(feature = "cli")))]
pub mod logging;
