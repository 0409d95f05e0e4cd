pub mod adobe;
pub mod api;
pub mod error;

pub use adobe::{AdobeClient, AdobeConnector, TokenManager};
pub use error::AdobeError;
