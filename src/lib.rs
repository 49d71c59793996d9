pub mod cluster;
pub mod config;
pub mod error;
pub mod geom;
pub mod overlap;
pub mod scene;
pub mod topology;
pub mod vpsc;

#[cfg(feature = "cli")]
pub mod cli;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{LayoutConfig, load_config};
pub use error::{LayoutError, Result};
pub use geom::{Dim, Rectangle};
