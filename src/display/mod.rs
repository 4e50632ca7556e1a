pub mod trace;

pub use trace::format_tree;
