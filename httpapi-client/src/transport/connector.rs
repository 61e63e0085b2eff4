//! TLS connector setup for the hyper client.
//!
//! HTTPS needs a crypto provider and a source of trust anchors:
//!
//! - **Crypto providers** (choose one): `tls-ring` (default with `tls`) or `tls-aws-lc`
//! - **Root certificates** (choose one): `tls-native-roots` (default with `tls`)
//!   or `tls-webpki-roots`
//!
//! Without a feature-gated provider, a globally installed rustls
//! `CryptoProvider` is used if there is one.

use std::sync::Arc;

use httpapi_core::ApiError;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::ClientConfig;

/// Whether TLS can be configured from the enabled features alone.
#[inline]
pub const fn has_tls_support() -> bool {
    cfg!(any(feature = "tls-ring", feature = "tls-aws-lc"))
        && cfg!(any(feature = "tls-native-roots", feature = "tls-webpki-roots"))
}

/// Pick a crypto provider: feature-gated first, then the global default.
fn crypto_provider() -> Option<Arc<rustls::crypto::CryptoProvider>> {
    #[cfg(feature = "tls-ring")]
    return Some(Arc::new(rustls::crypto::ring::default_provider()));

    #[cfg(all(feature = "tls-aws-lc", not(feature = "tls-ring")))]
    return Some(Arc::new(rustls::crypto::aws_lc_rs::default_provider()));

    #[cfg(not(any(feature = "tls-ring", feature = "tls-aws-lc")))]
    rustls::crypto::CryptoProvider::get_default().cloned()
}

/// Trust anchors from the enabled root-certificate feature.
fn root_store() -> rustls::RootCertStore {
    #[allow(unused_mut)]
    let mut roots = rustls::RootCertStore::empty();

    // Prefer native over webpki if both are enabled
    #[cfg(feature = "tls-native-roots")]
    {
        let native = rustls_native_certs::load_native_certs();
        if !native.errors.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::debug!("errors loading native certs: {:?}", native.errors);
        }
        roots.add_parsable_certificates(native.certs);
    }

    #[cfg(all(feature = "tls-webpki-roots", not(feature = "tls-native-roots")))]
    {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    roots
}

/// Build the default TLS configuration from the enabled features.
pub fn default_tls_config() -> Result<ClientConfig, ApiError> {
    if !cfg!(any(feature = "tls-native-roots", feature = "tls-webpki-roots")) {
        return Err(ApiError::configuration(
            "HTTPS requires TLS root certificates: enable `tls-native-roots` or `tls-webpki-roots`",
        ));
    }
    let provider = crypto_provider().ok_or_else(|| {
        ApiError::configuration(
            "HTTPS requires a crypto provider: enable `tls-ring` or `tls-aws-lc`, \
             or install one with `CryptoProvider::install_default()`",
        )
    })?;
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ApiError::configuration(format!("invalid TLS protocol versions: {}", e)))?
        .with_root_certificates(root_store())
        .with_no_client_auth();
    Ok(config)
}

/// Wrap `http` in a connector that speaks both `http://` and `https://`.
pub(crate) fn build_https_connector(
    config: ClientConfig,
    http: HttpConnector,
) -> HttpsConnector<HttpConnector> {
    HttpsConnectorBuilder::new()
        .with_tls_config(config)
        .https_or_http()
        .enable_all_versions()
        .wrap_connector(http)
}
