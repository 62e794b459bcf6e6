//! Permit generation engine.
//!
//! This module implements the complete generation flow for one licence:
//! 1. Fetch and validate the licence's user permits
//! 2. Fetch and deduplicate the licence's holdings
//! 3. Fetch product keys for the surviving cells
//! 4. Re-encrypt every product key under each user's hardware id
//! 5. Assemble, serialize, schema-validate and sign one permit per user
//!
//! An empty user-permit or holdings payload ends the run with
//! [`PermitOutcome::NoContent`] before any later service is called. Every
//! other failure ends the run with the classified [`PermitError`]; a permit
//! that fails schema validation is never returned.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveTime};
use permit_keyring::SecretStore;
use tracing::{error, info, instrument};

use crate::cache::ManufacturerKeyCache;
use crate::config::{PermitConfig, ServiceEndpoint};
use crate::error::{FieldError, PermitError, UpstreamService};
use crate::holdings::{dedupe, product_key_requests};
use crate::https::{build_http_client, RequestContext, ServiceClient};
use crate::key_exchange::KeyExchange;
use crate::permit::{format_issue_date, Permit, PermitAssembler};
use crate::schema::PermitSchema;
use crate::services::{
    HoldingsApi, HoldingsClient, ProductKeyApi, ProductKeyClient, UserPermitApi, UserPermitClient,
};
use crate::signature::SignatureProvider;
use crate::token::{ClientCredentialsTokenSource, TokenProvider, TokenSource};
use crate::types::{Cell, Holding, UserPermit};
use crate::validation::{into_result, validate_user_permits, PermitRequest, RequestValidator, DATE_FORMAT};
use crate::xml::XmlSerializer;

/// Step of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// Calling the user permit service.
    FetchingUserPermits,
    /// Checking every UPN in the user permit payload.
    ValidatingUserPermits,
    /// Calling the holdings service.
    FetchingHoldings,
    /// Collapsing duplicate cells.
    Deduplicating,
    /// Calling the product key service.
    FetchingProductKeys,
    /// Resolving hardware ids and re-encrypting keys.
    ExchangingKeys,
    /// Building permit documents.
    AssemblingPermits,
    /// Writing and schema-validating XML.
    Serializing,
    /// Signing each permit.
    Signing,
    /// Permits generated.
    Done,
    /// An upstream payload was empty.
    NoContent,
    /// The run failed.
    Failed,
}

impl PipelineState {
    /// State name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FetchingUserPermits => "FetchingUserPermits",
            Self::ValidatingUserPermits => "ValidatingUserPermits",
            Self::FetchingHoldings => "FetchingHoldings",
            Self::Deduplicating => "Deduplicating",
            Self::FetchingProductKeys => "FetchingProductKeys",
            Self::ExchangingKeys => "ExchangingKeys",
            Self::AssemblingPermits => "AssemblingPermits",
            Self::Serializing => "Serializing",
            Self::Signing => "Signing",
            Self::Done => "Done",
            Self::NoContent => "NoContent",
            Self::Failed => "Failed",
        }
    }

    /// Whether the run ends in this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::NoContent | Self::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signed permit for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPermit {
    /// User title the permit was issued to.
    pub title: String,
    /// Permit XML.
    pub xml: String,
    /// Standalone signature document XML.
    pub signature_xml: String,
    /// Base64 signature over `xml`.
    pub signature: String,
}

/// Result of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermitOutcome {
    /// Permits keyed by user title.
    Generated(BTreeMap<String, SignedPermit>),
    /// No user permits or no holdings.
    NoContent,
}

impl PermitOutcome {
    /// HTTP-status-like outcome code: 200 or 204.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Generated(_) => 200,
            Self::NoContent => 204,
        }
    }

    /// Generated permits, if any.
    #[must_use]
    pub fn permits(&self) -> Option<&BTreeMap<String, SignedPermit>> {
        match self {
            Self::Generated(permits) => Some(permits),
            Self::NoContent => None,
        }
    }
}

/// The three upstream services.
#[derive(Clone)]
pub struct Upstreams {
    /// User permit service.
    pub user_permits: Arc<dyn UserPermitApi>,
    /// Holdings service.
    pub holdings: Arc<dyn HoldingsApi>,
    /// Product key service.
    pub product_keys: Arc<dyn ProductKeyApi>,
}

impl Upstreams {
    /// HTTP clients for every configured endpoint, sharing one connection
    /// pool and token provider.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn http(config: &PermitConfig, tokens: Arc<TokenProvider>) -> Result<Self, PermitError> {
        let client = build_http_client(config.request_timeout())?;
        let service = |endpoint: &ServiceEndpoint, origin: UpstreamService| {
            ServiceClient::new(
                client.clone(),
                endpoint,
                origin,
                Arc::clone(&tokens),
                config.retry.clone(),
            )
        };

        Ok(Self {
            user_permits: Arc::new(UserPermitClient::new(service(
                &config.user_permit_service,
                UpstreamService::UserPermitService,
            ))),
            holdings: Arc::new(HoldingsClient::new(service(
                &config.holdings_service,
                UpstreamService::Holdings,
            ))),
            product_keys: Arc::new(ProductKeyClient::new(service(
                &config.product_key_service,
                UpstreamService::ProductKeyService,
            ))),
        })
    }
}

/// Build a client-credentials token source from configuration, reading the
/// client secret from the secret store.
///
/// # Errors
///
/// Returns error if the token endpoint is not configured or the client
/// secret cannot be read.
pub async fn client_credentials_source(
    config: &PermitConfig,
    secrets: &dyn SecretStore,
) -> Result<Arc<dyn TokenSource>, PermitError> {
    if config.token_endpoint.trim().is_empty() {
        return Err(PermitError::config("token_endpoint is not configured"));
    }
    let secret = zeroize::Zeroizing::new(secrets.get_secret(&config.token_client_secret_name).await?);
    let client = build_http_client(config.request_timeout())?;
    Ok(Arc::new(ClientCredentialsTokenSource::new(
        client,
        config.token_endpoint.clone(),
        config.token_client_id.clone(),
        secret.as_str(),
    )))
}

/// Logs state transitions for one run.
struct Run<'a> {
    licence_id: Option<i64>,
    ctx: &'a RequestContext,
}

impl Run<'_> {
    fn enter(&self, state: PipelineState) {
        info!(
            licence_id = ?self.licence_id,
            correlation_id = %self.ctx.correlation_id,
            state = %state,
            "Pipeline state"
        );
    }

    fn finish(&self, result: &Result<PermitOutcome, PermitError>) {
        match result {
            Ok(PermitOutcome::Generated(permits)) => {
                info!(
                    licence_id = ?self.licence_id,
                    correlation_id = %self.ctx.correlation_id,
                    state = %PipelineState::Done,
                    permits = permits.len(),
                    "Pipeline state"
                );
            },
            Ok(PermitOutcome::NoContent) => self.enter(PipelineState::NoContent),
            Err(e) => {
                error!(
                    licence_id = ?self.licence_id,
                    correlation_id = %self.ctx.correlation_id,
                    state = %PipelineState::Failed,
                    code = %e.code(),
                    status = e.status_code(),
                    origin = ?e.origin(),
                    error = %e,
                    "Pipeline state"
                );
            },
        }
    }
}

/// The permit generation engine.
///
/// One engine serves many concurrent runs; the manufacturer-key and token
/// caches are the only state shared between them.
pub struct PermitEngine {
    config: PermitConfig,
    upstreams: Upstreams,
    manufacturer_keys: Arc<ManufacturerKeyCache>,
    key_exchange: KeyExchange,
    schema: PermitSchema,
    serializer: XmlSerializer,
    signer: SignatureProvider,
    validator: RequestValidator,
}

impl PermitEngine {
    /// Create an engine over the given upstreams.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the schema cannot
    /// be loaded.
    pub fn new(
        config: PermitConfig,
        upstreams: Upstreams,
        secrets: Arc<dyn SecretStore>,
    ) -> Result<Self, PermitError> {
        config.validate()?;

        let schema = match &config.schema_path {
            Some(path) => PermitSchema::from_file(path)?,
            None => PermitSchema::bundled()?,
        };
        info!(
            namespace = %schema.target_namespace(),
            version = %schema.version(),
            "PermitEngine: schema loaded"
        );

        let manufacturer_keys = Arc::new(ManufacturerKeyCache::new(
            Arc::clone(&secrets),
            config.manufacturer_key_ttl(),
        ));
        let key_exchange = KeyExchange::new(
            config.manufacturer_neutral_hardware_id.clone(),
            Arc::clone(&manufacturer_keys),
        );
        let serializer = XmlSerializer::new(schema.target_namespace());
        let signer = SignatureProvider::new(
            secrets,
            config.signing_key_secret_name.clone(),
            config.certificate_secret_name.clone(),
            config.certificate_id.clone(),
        );
        let validator = RequestValidator::new(config.allow_past_expiry);

        Ok(Self {
            config,
            upstreams,
            manufacturer_keys,
            key_exchange,
            schema,
            serializer,
            signer,
            validator,
        })
    }

    /// Create an engine talking HTTP to the configured endpoints.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid, the schema cannot be
    /// loaded, or the HTTP client cannot be built.
    pub fn from_config(
        config: PermitConfig,
        secrets: Arc<dyn SecretStore>,
        token_source: Arc<dyn TokenSource>,
    ) -> Result<Self, PermitError> {
        let tokens = Arc::new(TokenProvider::new(token_source, config.token_expiry_margin()));
        let upstreams = Upstreams::http(&config, tokens)?;
        Self::new(config, upstreams, secrets)
    }

    /// Load every manufacturer key from the secret store into the cache.
    /// Returns the number of keys loaded.
    pub async fn prime_manufacturer_keys(&self) -> usize {
        self.manufacturer_keys.prime().await
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &PermitConfig {
        &self.config
    }

    /// Schema permits are validated against.
    #[must_use]
    pub fn schema(&self) -> &PermitSchema {
        &self.schema
    }

    /// Generate signed permits for every user on a licence.
    ///
    /// # Errors
    ///
    /// Returns [`PermitError::Validation`] for a non-positive licence id or
    /// invalid user permits, the classified upstream error for a failed
    /// service call, or the crypto/schema/signing error that stopped the run.
    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id))]
    pub async fn generate(&self, licence_id: i64, ctx: &RequestContext) -> Result<PermitOutcome, PermitError> {
        let run = Run {
            licence_id: Some(licence_id),
            ctx,
        };
        let result = self.run_licence(licence_id, &run).await;
        run.finish(&result);
        result
    }

    async fn run_licence(&self, licence_id: i64, run: &Run<'_>) -> Result<PermitOutcome, PermitError> {
        let ctx = run.ctx;
        if licence_id <= 0 {
            return Err(PermitError::Validation {
                errors: vec![FieldError::new("licenceId", "Licence id must be a positive integer")],
            });
        }

        run.enter(PipelineState::FetchingUserPermits);
        ctx.check_cancelled()?;
        let user_permits = match self.upstreams.user_permits.get_user_permits(licence_id, ctx).await? {
            Some(response) if !response.user_permits.is_empty() => response.user_permits,
            _ => return Ok(PermitOutcome::NoContent),
        };

        run.enter(PipelineState::ValidatingUserPermits);
        into_result(validate_user_permits(&user_permits))?;

        run.enter(PipelineState::FetchingHoldings);
        ctx.check_cancelled()?;
        let holdings = match self.upstreams.holdings.get_holdings(licence_id, ctx).await? {
            Some(holdings) if !holdings.is_empty() => holdings,
            _ => return Ok(PermitOutcome::NoContent),
        };

        run.enter(PipelineState::Deduplicating);
        let holdings = dedupe(holdings);
        if holdings.is_empty() {
            return Ok(PermitOutcome::NoContent);
        }

        let permits = self.issue(run, &holdings, &user_permits).await?;
        Ok(PermitOutcome::Generated(permits))
    }

    /// Generate signed permits for explicit products and users.
    ///
    /// The request is validated first; the user permit and holdings
    /// services are not called.
    ///
    /// # Errors
    ///
    /// Returns [`PermitError::Validation`] with every field error, or the
    /// error that stopped the run.
    #[instrument(
        skip(self, request, ctx),
        fields(
            products = request.products.len(),
            users = request.user_permits.len(),
            correlation_id = %ctx.correlation_id
        )
    )]
    pub async fn generate_from_request(
        &self,
        request: &PermitRequest,
        ctx: &RequestContext,
    ) -> Result<PermitOutcome, PermitError> {
        let run = Run {
            licence_id: None,
            ctx,
        };
        let result = self.run_request(request, &run).await;
        run.finish(&result);
        result
    }

    async fn run_request(&self, request: &PermitRequest, run: &Run<'_>) -> Result<PermitOutcome, PermitError> {
        run.enter(PipelineState::ValidatingUserPermits);
        self.validator.validate(request, Local::now().date_naive())?;

        run.enter(PipelineState::Deduplicating);
        let holdings = request
            .products
            .iter()
            .map(|p| -> Result<Holding, PermitError> {
                let expiry = NaiveDate::parse_from_str(&p.permit_expiry_date, DATE_FORMAT).map_err(|e| {
                    PermitError::Validation {
                        errors: vec![FieldError::new("permitExpiryDate", e.to_string())],
                    }
                })?;
                Ok(Holding {
                    product_code: p.product_name.clone(),
                    product_title: p.product_name.clone(),
                    expiry_date: expiry.and_time(NaiveTime::MIN).and_utc(),
                    cells: vec![Cell {
                        cell_code: p.product_name.clone(),
                        cell_title: String::new(),
                        latest_edition_number: p.edition_number.to_string(),
                        latest_update_number: "0".to_string(),
                    }],
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let holdings = dedupe(holdings);

        let permits = self.issue(run, &holdings, &request.user_permits).await?;
        Ok(PermitOutcome::Generated(permits))
    }

    async fn issue(
        &self,
        run: &Run<'_>,
        holdings: &[Holding],
        user_permits: &[UserPermit],
    ) -> Result<BTreeMap<String, SignedPermit>, PermitError> {
        let ctx = run.ctx;

        run.enter(PipelineState::FetchingProductKeys);
        ctx.check_cancelled()?;
        let requests = product_key_requests(holdings);
        let product_keys = self
            .upstreams
            .product_keys
            .get_product_keys(&requests, ctx)
            .await?;

        run.enter(PipelineState::ExchangingKeys);
        ctx.check_cancelled()?;
        let users = self.key_exchange.resolve_users(user_permits).await?;
        let user_keys = self.key_exchange.re_encrypt_keys(&product_keys, &users)?;

        run.enter(PipelineState::AssemblingPermits);
        let assembler = PermitAssembler::new(
            format_issue_date(&Local::now()),
            self.config.data_server_name.clone(),
            self.config.data_server_identifier.clone(),
            self.schema.version(),
        );
        let permits = user_keys
            .iter()
            .map(|keys| -> Result<(String, Permit), PermitError> {
                Ok((keys.title.clone(), assembler.assemble(holdings, keys)?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        run.enter(PipelineState::Serializing);
        let documents = permits
            .iter()
            .map(|(title, permit)| -> Result<(String, String), PermitError> {
                let xml = self.serializer.serialize_permit(permit)?;
                self.schema.validate(&xml)?;
                Ok((title.clone(), xml))
            })
            .collect::<Result<Vec<_>, _>>()?;

        run.enter(PipelineState::Signing);
        let mut signed = BTreeMap::new();
        for (title, xml) in documents {
            ctx.check_cancelled()?;
            let document = self
                .signer
                .sign_permit(&self.config.permit_filename, &xml)
                .await?;
            let signature_xml = self.serializer.serialize_signature(&document)?;
            let key = unique_title(&signed, &title);
            signed.insert(
                key,
                SignedPermit {
                    title,
                    xml,
                    signature_xml,
                    signature: document.signature,
                },
            );
        }

        Ok(signed)
    }
}

/// `title`, or `title (n)` for the first free `n` if already taken.
fn unique_title(taken: &BTreeMap<String, SignedPermit>, title: &str) -> String {
    if !taken.contains_key(title) {
        return title.to_string();
    }
    (2..)
        .map(|n| format!("{title} ({n})"))
        .find(|candidate| !taken.contains_key(candidate))
        .unwrap_or_else(|| title.to_string())
}
