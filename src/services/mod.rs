pub mod aggregator;
pub mod clock;
pub mod loader;
pub mod state;
pub mod watcher;
