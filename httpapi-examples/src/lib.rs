use std::net::SocketAddr;
use std::sync::Arc;

use httpapi_client::behavior::{Header, HttpMethod, StaticHeader};
use httpapi_client::oauth::{
    ClientCredentials, ClientCredentialsTokenSource, OAuthToken, TokenProviderRegistry,
    TokenResetFilter,
};
use httpapi_client::{
    ActionDescriptor, ApiError, ApiExecutor, Argument, CancellationToken, DescriptorRegistry,
    HttpApiOptions, HyperTransport, MethodSignature, ParamSignature, ReturnSignature, Transport,
};
use serde::{Deserialize, Serialize};

/// Interface name the user API actions and its token provider share.
pub const USER_API: &str = "UserApi";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub name: Option<String>,
    pub page: u32,
}

/// Returns the server address from PORT env var, defaulting to 3000.
///
/// # Example
///
/// ```ignore
/// let addr = httpapi_examples::server_addr();
/// let listener = tokio::net::TcpListener::bind(addr).await?;
/// ```
pub fn server_addr() -> SocketAddr {
    let port = std::env::var("PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(3000);
    SocketAddr::from(([0, 0, 0, 0], port))
}

/// Method signatures of the user API.
pub mod user_api {
    use super::*;

    pub fn get_user() -> MethodSignature {
        MethodSignature::new(USER_API, "get_user")
            .behavior(HttpMethod::get("users/{id}"))
            .param(ParamSignature::of::<u64>("id"))
            .returns(ReturnSignature::json::<User>())
    }

    /// Complex parameter on GET: flattened into the query string.
    pub fn search_users() -> MethodSignature {
        MethodSignature::new(USER_API, "search_users")
            .behavior(HttpMethod::get("users"))
            .param(ParamSignature::complex::<SearchQuery>("query"))
            .param(ParamSignature::cancellation("cancel"))
            .returns(ReturnSignature::json::<Vec<User>>())
    }

    /// Complex parameter on POST: sent as the JSON body.
    pub fn create_user() -> MethodSignature {
        MethodSignature::new(USER_API, "create_user")
            .behavior(HttpMethod::post("users"))
            .behavior(StaticHeader::new("X-Request-Source", "typed-client"))
            .param(ParamSignature::complex::<User>("user"))
            .param(ParamSignature::of::<String>("tenant").bind(Header::new("X-Tenant")))
            .returns(ReturnSignature::json::<User>())
    }

    pub fn me() -> MethodSignature {
        MethodSignature::new(USER_API, "me")
            .behavior(HttpMethod::get("me"))
            .behavior(OAuthToken::new())
            .filter(TokenResetFilter)
            .returns(ReturnSignature::json::<User>())
    }
}

/// Typed client for the demo user API.
///
/// Descriptors are built once when the client is created; every method
/// call reuses them.
pub struct UserApiClient {
    executor: ApiExecutor,
    get_user: Arc<ActionDescriptor>,
    search_users: Arc<ActionDescriptor>,
    create_user: Arc<ActionDescriptor>,
    me: Arc<ActionDescriptor>,
}

impl UserApiClient {
    /// Client for the API at `base_url`, authenticating with the
    /// `client_credentials` grant against `base_url/connect/token`.
    pub async fn new(base_url: &str, credentials: ClientCredentials) -> Result<Self, ApiError> {
        let base_url = base_url.trim_end_matches('/');
        let transport = HyperTransport::new()?;
        let shared: Arc<dyn Transport> = Arc::new(transport.clone());
        let source = ClientCredentialsTokenSource::new(
            &format!("{}/connect/token", base_url),
            credentials,
            shared,
        )?;
        let providers = TokenProviderRegistry::builder()
            .register(USER_API, source)
            .build();

        let options = HttpApiOptions::builder()
            .http_host(format!("{}/api/", base_url))
            .use_camel_case(true)
            .token_providers(Arc::new(providers))
            .build()?;
        let executor = ApiExecutor::new(options, transport);

        let registry = DescriptorRegistry::new();
        Ok(Self {
            get_user: registry.get_or_build(&user_api::get_user()).await?,
            search_users: registry.get_or_build(&user_api::search_users()).await?,
            create_user: registry.get_or_build(&user_api::create_user()).await?,
            me: registry.get_or_build(&user_api::me()).await?,
            executor,
        })
    }

    pub async fn get_user(&self, id: u64) -> Result<User, ApiError> {
        self.executor
            .invoke_json(&self.get_user, vec![Argument::value(id)])
            .await
    }

    pub async fn search_users(
        &self,
        query: &SearchQuery,
        cancel: CancellationToken,
    ) -> Result<Vec<User>, ApiError> {
        self.executor
            .invoke_json(
                &self.search_users,
                vec![Argument::serialize(query)?, Argument::from(cancel)],
            )
            .await
    }

    pub async fn create_user(&self, user: &User, tenant: &str) -> Result<User, ApiError> {
        self.executor
            .invoke_json(
                &self.create_user,
                vec![Argument::serialize(user)?, Argument::value(tenant.to_string())],
            )
            .await
    }

    pub async fn me(&self) -> Result<User, ApiError> {
        self.executor.invoke_json(&self.me, Vec::new()).await
    }

    pub fn executor(&self) -> &ApiExecutor {
        &self.executor
    }
}
