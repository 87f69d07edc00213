/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;

use thiserror::Error;

use snirelay_tls::ClientHelloParseError;

#[derive(Error, Debug)]
pub enum ServerTaskForbiddenError {
    #[error("target dest denied")]
    DestDenied,
    #[error("target resolves to a local address")]
    SelfLoopTarget,
}

#[derive(Error, Debug)]
pub enum ServerTaskError {
    #[error("forbidden by rule: {0}")]
    ForbiddenByRule(#[from] ServerTaskForbiddenError),
    #[error("invalid client hello: {0}")]
    InvalidClientHello(ClientHelloParseError),
    #[error("invalid client protocol: {0}")]
    InvalidClientProtocol(&'static str),
    #[error("tcp read from client: {0:?}")]
    ClientTcpReadFailed(io::Error),
    #[error("tcp write to client: {0:?}")]
    ClientTcpWriteFailed(io::Error),
    #[error("client app timeout: {0}")]
    ClientAppTimeout(&'static str),
    #[error("upstream not connected: {0:?}")]
    UpstreamNotConnected(io::Error),
    #[error("upstream connect timeout")]
    UpstreamConnectTimeout,
    #[error("read from upstream: {0:?}")]
    UpstreamReadFailed(io::Error),
    #[error("write to upstream: {0:?}")]
    UpstreamWriteFailed(io::Error),
    #[error("closed by client")]
    ClosedByClient,
    #[error("idle for {0}s")]
    Idle(u64),
    #[error("finished")]
    Finished, // this isn't an error, for log only
}

impl ServerTaskError {
    pub fn brief(&self) -> &'static str {
        match self {
            ServerTaskError::ForbiddenByRule(_) => "ForbiddenByRule",
            ServerTaskError::InvalidClientHello(_) => "InvalidClientHello",
            ServerTaskError::InvalidClientProtocol(_) => "InvalidClientProtocol",
            ServerTaskError::ClientTcpReadFailed(_) => "ClientTcpReadFailed",
            ServerTaskError::ClientTcpWriteFailed(_) => "ClientTcpWriteFailed",
            ServerTaskError::ClientAppTimeout(_) => "ClientAppTimeout",
            ServerTaskError::UpstreamNotConnected(_) => "UpstreamNotConnected",
            ServerTaskError::UpstreamConnectTimeout => "UpstreamConnectTimeout",
            ServerTaskError::UpstreamReadFailed(_) => "UpstreamReadFailed",
            ServerTaskError::UpstreamWriteFailed(_) => "UpstreamWriteFailed",
            ServerTaskError::ClosedByClient => "ClosedByClient",
            ServerTaskError::Idle(_) => "Idle",
            ServerTaskError::Finished => "Finished",
        }
    }
}

pub type ServerTaskResult<T> = Result<T, ServerTaskError>;
