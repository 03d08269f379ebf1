//! javelin: a whole-program static analyzer for a small class-based bytecode
//! language with virtual dispatch, fields, and arrays.
//!
//! The front end parses and links textual programs; the middle end contains
//! the analyses: intra/inter-procedural constant propagation, liveness, dead
//! code, class-hierarchy call graphs, context-(in)sensitive points-to, and
//! taint tracking on top of the points-to engine.

pub mod commons;
pub mod front_end;
pub mod middle_end;
