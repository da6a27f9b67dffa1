use anyhow::{Context, Result, anyhow};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tonic::client::Grpc;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::{Ascii, MetadataMap, MetadataValue};
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tracing::{debug, info};

use crate::config::Config;
use crate::instruments::InstrumentsServiceClient;

const AUTHORIZATION: &str = "authorization";
const APP_NAME: &str = "x-app-name";
const TRACKING_ID: &str = "x-tracking-id";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("rpc failed: {0}")]
    Status(#[from] tonic::Status),
    #[error("request cancelled")]
    Cancelled,
}

impl ServiceError {
    /// Response metadata value attached to a failed call, if the server sent one.
    pub fn header(&self, key: &str) -> Option<String> {
        match self {
            ServiceError::Status(status) => status
                .metadata()
                .get(key)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
            ServiceError::Cancelled => None,
        }
    }

    /// True only when the session was cancelled. A `Cancelled` status from
    /// the transport (e.g. an expired request timeout) is an ordinary failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ServiceError::Cancelled)
    }
}

#[derive(Clone)]
struct RequestMetadata {
    authorization: MetadataValue<Ascii>,
    app_name: MetadataValue<Ascii>,
}

impl RequestMetadata {
    fn new(config: &Config) -> Result<Self> {
        let authorization = MetadataValue::try_from(format!("Bearer {}", config.token.trim()))
            .map_err(|_| anyhow!("APIToken contains characters not allowed in a header"))?;
        let app_name = MetadataValue::try_from(config.app_name.as_str())
            .map_err(|_| anyhow!("AppName {:?} is not a valid header value", config.app_name))?;
        Ok(Self {
            authorization,
            app_name,
        })
    }

    fn apply(&self, map: &mut MetadataMap) {
        map.insert(AUTHORIZATION, self.authorization.clone());
        map.insert(APP_NAME, self.app_name.clone());
    }
}

/// Per-service handle on the shared channel: authenticates every request
/// and abandons it as soon as the session is cancelled.
#[derive(Clone)]
pub(crate) struct ServiceChannel {
    grpc: Grpc<Channel>,
    metadata: RequestMetadata,
    cancel: CancellationToken,
}

impl ServiceChannel {
    pub(crate) async fn unary<Req, Resp>(
        &self,
        path: &'static str,
        message: Req,
    ) -> Result<Resp, ServiceError>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        if self.cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }
        debug!("rpc -> {path}");
        let mut request = tonic::Request::new(message);
        self.metadata.apply(request.metadata_mut());

        let mut grpc = self.grpc.clone();
        let call = async move {
            grpc.ready()
                .await
                .map_err(|e| tonic::Status::unknown(format!("service was not ready: {e}")))?;
            let codec = tonic_prost::ProstCodec::<Req, Resp>::default();
            grpc.unary(request, PathAndQuery::from_static(path), codec)
                .await
        };

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ServiceError::Cancelled),
            res = call => res?,
        };
        if let Some(id) = response
            .metadata()
            .get(TRACKING_ID)
            .and_then(|v| v.to_str().ok())
        {
            debug!("rpc <- {path} tracking id {id}");
        }
        Ok(response.into_inner())
    }
}

#[cfg(test)]
impl ServiceChannel {
    /// Channel that dials `uri` on first use.
    pub(crate) fn lazy(uri: &'static str, cancel: CancellationToken) -> Self {
        let config = Config::from_yaml("APIToken: t\n").expect("static config");
        Self {
            grpc: Grpc::new(Endpoint::from_static(uri).connect_lazy()),
            metadata: RequestMetadata::new(&config).expect("static metadata"),
            cancel,
        }
    }
}

/// Connection to the API. Service handles borrow its channel; `stop`
/// consumes the client so the channel is released once.
pub struct Client {
    channel: Channel,
    metadata: RequestMetadata,
    cancel: CancellationToken,
    endpoint: String,
}

impl Client {
    pub async fn connect(config: &Config, cancel: CancellationToken) -> Result<Self> {
        let metadata = RequestMetadata::new(config)?;
        let uri = config.endpoint_uri();
        let mut endpoint = Endpoint::from_shared(uri.clone())
            .with_context(|| format!("invalid endpoint {uri}"))?
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout());
        if uri.starts_with("https://") {
            endpoint = endpoint.tls_config(ClientTlsConfig::new().with_webpki_roots())?;
        }

        debug!("connecting to {uri}");
        let channel = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(anyhow!("cancelled while connecting to {uri}")),
            res = endpoint.connect() => res.with_context(|| format!("failed to connect to {uri}"))?,
        };
        info!("connected to {uri}");

        Ok(Self {
            channel,
            metadata,
            cancel,
            endpoint: uri,
        })
    }

    pub fn instruments(&self) -> InstrumentsServiceClient {
        InstrumentsServiceClient::new(ServiceChannel {
            grpc: Grpc::new(self.channel.clone()),
            metadata: self.metadata.clone(),
            cancel: self.cancel.clone(),
        })
    }

    pub async fn stop(self) -> Result<()> {
        info!("closing client connection to {}", self.endpoint);
        drop(self.channel);
        Ok(())
    }
}
