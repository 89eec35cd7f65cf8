pub mod eval;
pub mod prune;
pub mod show;

pub mod util;
