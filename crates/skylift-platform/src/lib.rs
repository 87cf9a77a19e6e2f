mod commands;
mod paths;

pub use commands::HideWindow;
pub use paths::{LauncherPaths, LauncherPathsError};
