pub mod client;
pub mod normalize;
pub mod signing;

pub use client::{FormTransport, HttpTransport, SearchClient, SearchError};
pub use signing::{Resolution, SearchRequest, SignatureResolver, SigningCandidate, CANDIDATES};
