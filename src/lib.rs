pub mod aggregate;
pub mod builder;
pub mod clustering;
pub mod error;
pub mod loader;
pub mod models;
pub mod normalize;
pub mod settings;
pub mod similarity;
pub mod taxonomy;

pub use builder::{build_taxonomy, run, RunSummary};
pub use error::{TaxonomyError, TaxonomyResult};
pub use settings::Settings;
pub use taxonomy::Taxonomy;
