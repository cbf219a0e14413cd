// src/middleware/client.rs

use std::{convert::Infallible, net::SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts},
};

use crate::models::approval::ClientMetadata;

/// IP e User-Agent de quem assina. Atrás de proxy vale o primeiro X-Forwarded-For.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo(pub ClientMetadata);

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = header_value(parts, "x-forwarded-for")
            .and_then(|list| list.split(',').next().map(|ip| ip.trim().to_string()));

        let ip = forwarded
            .or_else(|| header_value(parts, "x-real-ip"))
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            });

        Ok(ClientInfo(ClientMetadata {
            ip,
            user_agent: header_value(parts, header::USER_AGENT.as_str()),
        }))
    }
}
