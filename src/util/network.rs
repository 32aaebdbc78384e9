// Copyright (c) 2023 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

use log::error;
use rustls::ClientConfig;
use rustls_platform_verifier::ConfigVerifierExt;
use std::sync::Arc;
use std::time::Duration;

/// Create a WebSocket client for `ws://` and `wss://` connections.
///
/// TLS certificates are verified with the platform verifier. If the platform verifier can't be
/// initialized, only plain `ws://` connections are supported.
pub fn new_websocket_client(connection_timeout: Duration) -> awc::Client {
    // fails if a provider has already been installed, which is fine
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    match ClientConfig::with_platform_verifier() {
        Ok(mut config) => {
            // http2 has (or at least had) issues with wss. Needs further investigation.
            config.alpn_protocols = vec![b"http/1.1".to_vec()];

            let connector = awc::Connector::new()
                .timeout(connection_timeout)
                .rustls_0_23(Arc::new(config));
            awc::Client::builder()
                .timeout(connection_timeout)
                .connector(connector)
                .finish()
        }
        Err(e) => {
            error!("Failed to initialize TLS certificate verifier: {e}");
            awc::Client::builder().timeout(connection_timeout).finish()
        }
    }
}
