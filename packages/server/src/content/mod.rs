//! Synchronous edges of the pipeline: the upload gateway and the
//! read/delete router.

pub mod ingress;
pub mod router;

pub use ingress::{Accepted, IngressGateway};
pub use router::{Content, ContentRouter, Deleted};
