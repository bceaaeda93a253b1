// Core models
pub mod campaign;
pub mod chain;
pub mod transaction;
pub mod wallet;

// Re-export commonly used types
pub use campaign::*;
pub use chain::*;
pub use transaction::*;
pub use wallet::*;
