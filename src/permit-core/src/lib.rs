//! # permit-core
//!
//! S-100 permit generation: turns a licence id into one signed permit per
//! user holding that licence.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      PermitEngine                            │
//! │                                                              │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐      │
//! │  │ UserPermit   │  │  Holdings    │  │ ProductKey   │      │
//! │  │  client      │  │  client      │  │  client      │      │
//! │  └──────────────┘  └──────────────┘  └──────────────┘      │
//! │         │     (retry, bearer token, correlation id)         │
//! │         ▼                 ▼                 ▼               │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │  validate UPNs → dedupe holdings → key exchange  │      │
//! │  │        (manufacturer-key cache, AES-128)         │      │
//! │  └──────────────────────────────────────────────────┘      │
//! │                           │                                  │
//! │                           ▼                                  │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │   assemble → XML → XSD validate → SHA-384/ECDSA  │      │
//! │  └──────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Outcomes
//!
//! - **Generated**: permits keyed by user title (200)
//! - **NoContent**: the licence has no user permits or no holdings (204)
//! - **Failed**: a classified [`PermitError`] with code, origin and status

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::pedantic)] // Too strict for production code
#![allow(clippy::missing_errors_doc)] // Error documentation not required
#![allow(clippy::module_name_repetitions)] // Allow Type in module::Type

pub mod cache;
pub mod checksum;
pub mod config;
pub mod engine;
pub mod error;
pub mod holdings;
pub mod https;
pub mod key_exchange;
pub mod package;
pub mod permit;
pub mod schema;
pub mod services;
pub mod signature;
pub mod token;
pub mod types;
pub mod upn;
pub mod validation;
pub mod xml;

pub use cache::{ManufacturerKeyCache, TtlCache};
pub use checksum::{compute_checksum, is_valid_checksum};
pub use config::{PermitConfig, RetryPolicy, ServiceEndpoint};
pub use engine::{client_credentials_source, PermitEngine, PermitOutcome, PipelineState, SignedPermit, Upstreams};
pub use error::{ErrorCode, FieldError, PermitError, UpstreamService};
pub use https::{RequestContext, ServiceClient, CORRELATION_ID_HEADER};
pub use key_exchange::{KeyExchange, UpnInfo, UserKeys};
pub use package::{DirectoryPackager, PermitPackager};
pub use permit::{DatasetPermit, Permit, PermitAssembler, PermitHeader, Product};
pub use schema::PermitSchema;
pub use services::{HoldingsApi, ProductKeyApi, UserPermitApi};
pub use signature::{SignatureDocument, SignatureProvider};
pub use token::{AccessToken, ClientCredentialsTokenSource, StaticTokenSource, TokenProvider, TokenSource};
pub use types::{Cell, ErrorDetail, ErrorResponse, Holding, ProductKey, ProductKeyRequest, UserPermit, UserPermitServiceResponse};
pub use upn::{Upn, UpnError};
pub use validation::{PermitRequest, ProductRequest, RequestValidator};
pub use xml::XmlSerializer;
