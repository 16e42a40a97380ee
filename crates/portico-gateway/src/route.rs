//! Routes binding an HTTP pattern to an RPC method.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::request::Parts;
use http::uri::PathAndQuery;
use http::StatusCode;
use tonic::Status;

use crate::bridge::{override_status, HeaderForwarder, RequestAttributes, ResponseHeaders};
use crate::connection::RpcConnection;
use crate::error::MarshalError;
use crate::marshal::{Marshaler, MarshalerRegistry};
use crate::message::{merge_fields, Message};
use crate::status::{error_response, http_status, json_response, response, ErrorBody, HttpResponse};

/// Translation settings shared by every route.
#[derive(Debug, Clone, Default)]
pub struct Translation {
    /// Request header forwarding.
    pub forwarder: HeaderForwarder,
    /// Response header mapping.
    pub response_headers: ResponseHeaders,
    /// Content marshalers.
    pub marshalers: MarshalerRegistry,
}

/// One matched HTTP request on its way to the RPC listener.
#[derive(Debug)]
pub struct GatewayCall<'a> {
    /// Request head.
    pub parts: &'a Parts,
    /// Request body, already decompressed.
    pub body: Bytes,
    /// Matched route pattern.
    pub pattern: &'a str,
    /// Captured path parameters.
    pub params: HashMap<String, String>,
    /// TCP peer.
    pub peer: Option<SocketAddr>,
    /// Connection to the RPC listener.
    pub connection: &'a RpcConnection,
    /// Translation settings.
    pub translation: &'a Translation,
}

impl GatewayCall<'_> {
    fn header(&self, name: http::header::HeaderName) -> Option<&str> {
        self.parts.headers.get(name).and_then(|value| value.to_str().ok())
    }

    fn attributes(&self) -> RequestAttributes<'_> {
        RequestAttributes {
            method: &self.parts.method,
            uri: &self.parts.uri,
            headers: &self.parts.headers,
            route: self.pattern,
            peer: self.peer,
        }
    }
}

/// Handles one matched request.
#[async_trait]
pub trait RouteHandler: Send + Sync + 'static {
    /// Translates the call and writes the HTTP response.
    async fn handle(&self, call: GatewayCall<'_>) -> HttpResponse;
}

/// Where the request body goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyRule {
    /// The whole body is the request message.
    Whole,
    /// The body is ignored; query parameters fill the message.
    Query,
}

/// A unary RPC method exposed on an HTTP route.
pub struct UnaryRoute<Req, Resp> {
    method: PathAndQuery,
    body: BodyRule,
    _messages: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> std::fmt::Debug for UnaryRoute<Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnaryRoute")
            .field("method", &self.method)
            .field("body", &self.body)
            .finish()
    }
}

impl<Req: Message, Resp: Message> UnaryRoute<Req, Resp> {
    /// Route to `method`, e.g. `/example.Example/Login`, taking the whole
    /// body as the request.
    pub fn new(method: &'static str) -> Self {
        Self {
            method: PathAndQuery::from_static(method),
            body: BodyRule::Whole,
            _messages: PhantomData,
        }
    }

    /// Fills the request from query parameters instead of the body.
    #[must_use]
    pub fn query(mut self) -> Self {
        self.body = BodyRule::Query;
        self
    }

    /// RPC method path.
    pub fn method(&self) -> &str {
        self.method.as_str()
    }

    async fn request_message(&self, call: &GatewayCall<'_>, inbound: Marshaler) -> Result<Req, MarshalError> {
        let message = match self.body {
            BodyRule::Whole => {
                let content_type = call.header(CONTENT_TYPE).unwrap_or_default();
                inbound.decode::<Req>(call.body.clone(), content_type).await?
            }
            BodyRule::Query => Req::default(),
        };

        let query: Vec<(String, String)> = match self.body {
            BodyRule::Query => call
                .parts
                .uri
                .query()
                .map(serde_urlencoded::from_str::<Vec<(String, String)>>)
                .transpose()
                .map_err(MarshalError::decode)?
                .unwrap_or_default(),
            BodyRule::Whole => Vec::new(),
        };

        let fields = call
            .params
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .chain(
                query
                    .iter()
                    .filter(|(name, _)| !call.params.contains_key(name))
                    .map(|(name, value)| (name.as_str(), value.as_str())),
            );
        merge_fields(message, fields)
    }

    fn success(
        &self,
        call: &GatewayCall<'_>,
        outbound: Marshaler,
        reply: tonic::Response<Resp>,
    ) -> HttpResponse {
        let (metadata, message, _) = reply.into_parts();
        let status = override_status(&metadata).unwrap_or(StatusCode::OK);

        let mut http_response = match message.as_http_body() {
            Some(body) => response(status, &body.content_type, body.data.clone()),
            None => match outbound.encode(&message) {
                Ok(bytes) => response(status, outbound.content_type(), bytes),
                Err(error) => {
                    tracing::error!(%error, method = %self.method, "failed to encode response");
                    return error_response(
                        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                        error.rpc_code(),
                        error.to_string(),
                    );
                }
            },
        };
        call.translation
            .response_headers
            .apply(&metadata, http_response.headers_mut());
        http_response
    }

    fn failure(&self, call: &GatewayCall<'_>, status: &Status) -> HttpResponse {
        let http = override_status(status.metadata()).unwrap_or_else(|| http_status(status.code()));
        tracing::debug!(
            method = %self.method,
            code = ?status.code(),
            http_status = http.as_u16(),
            "RPC call failed"
        );

        let mut http_response = json_response(http, &ErrorBody::from(status));
        call.translation
            .response_headers
            .apply(status.metadata(), http_response.headers_mut());
        http_response
    }
}

#[async_trait]
impl<Req: Message, Resp: Message> RouteHandler for UnaryRoute<Req, Resp> {
    async fn handle(&self, call: GatewayCall<'_>) -> HttpResponse {
        let registry = &call.translation.marshalers;
        let inbound = registry.inbound(call.header(CONTENT_TYPE));
        let outbound = registry.outbound(call.header(ACCEPT), inbound);

        let message = match self.request_message(&call, inbound).await {
            Ok(message) => message,
            Err(error) => {
                tracing::debug!(%error, marshaler = %inbound, "failed to decode request");
                return error_response(
                    StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::BAD_REQUEST),
                    error.rpc_code(),
                    error.to_string(),
                );
            }
        };

        let mut request = tonic::Request::new(message);
        *request.metadata_mut() = call.translation.forwarder.incoming(call.attributes());

        match call.connection.unary::<Req, Resp>(self.method.clone(), request).await {
            Ok(reply) => self.success(&call, outbound, reply),
            Err(status) => self.failure(&call, &status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct ListItemsReq {
        username: String,
        item: String,
    }

    impl Message for ListItemsReq {}

    #[test]
    fn test_route_builder() {
        let route = UnaryRoute::<ListItemsReq, serde_json::Value>::new("/example.Example/ListItems").query();
        assert_eq!(route.method(), "/example.Example/ListItems");
        assert_eq!(route.body, BodyRule::Query);
        assert!(format!("{route:?}").contains("ListItems"));
    }
}
