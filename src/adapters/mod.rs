/// Adapters layer - interface adapters that convert between external formats and domain
pub mod cli;

pub use cli::Cli;
