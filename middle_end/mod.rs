pub mod analysis;
pub mod callgraph;
pub mod icfg;
pub mod inter;
pub mod lang;
pub mod pta;
pub mod taint;
