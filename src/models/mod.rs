pub mod bundle;
pub mod metric;
pub mod scope;
pub mod snapshot;

pub use bundle::*;
pub use metric::*;
pub use scope::*;
pub use snapshot::*;
