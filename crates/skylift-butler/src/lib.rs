mod provision;
mod tool;

pub use provision::ensure_installed;
pub use tool::ButlerTool;
