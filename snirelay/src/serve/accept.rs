/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use log::{debug, error, info, warn};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::Instant;

use snirelay_tls::{record_is_complete, ClientHelloInfo};

use super::{
    CommonTaskContext, RelayTask, ServerTaskError, ServerTaskForbiddenError, ServerTaskResult,
    SessionConnectionStats,
};

const HELLO_BUFFER_SIZE: usize = 4096;
const HELLO_READ_TIMEOUT: Duration = Duration::from_secs(30);
const UPSTREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Drives one accepted connection from hello read to relay end.
pub(crate) struct ClientHelloAcceptTask {
    ctx: CommonTaskContext,
    time_accepted: Instant,
}

impl ClientHelloAcceptTask {
    pub(crate) fn new(ctx: CommonTaskContext) -> Self {
        ClientHelloAcceptTask {
            ctx,
            time_accepted: Instant::now(),
        }
    }

    pub(crate) async fn into_running(self, stream: TcpStream) {
        let conn_id = self.ctx.conn_id;
        let time_accepted = self.time_accepted;
        let session_stats = Arc::new(SessionConnectionStats::default());
        let _alive_guard = self.ctx.binding_stats.add_task();

        let e = match self.run(stream, &session_stats).await {
            Ok(_) => ServerTaskError::Finished,
            Err(e) => e,
        };
        let uptime = time_accepted.elapsed();
        let uploaded = session_stats.uploaded();
        let downloaded = session_stats.downloaded();
        match &e {
            ServerTaskError::Finished | ServerTaskError::Idle(_) => {
                info!(
                    "{conn_id} done ({}), uptime {uptime:?}, uploaded {uploaded} bytes, \
                     downloaded {downloaded} bytes",
                    e.brief()
                );
            }
            ServerTaskError::ForbiddenByRule(reason) => {
                info!("{conn_id} rejected: {reason}");
            }
            ServerTaskError::UpstreamNotConnected(_) | ServerTaskError::UpstreamConnectTimeout => {
                warn!("{conn_id} {e}");
            }
            _ => {
                error!(
                    "{conn_id} {}: {e}, uptime {uptime:?}, uploaded {uploaded} bytes, \
                     downloaded {downloaded} bytes",
                    e.brief()
                );
            }
        }
    }

    async fn run(
        self,
        mut stream: TcpStream,
        session_stats: &Arc<SessionConnectionStats>,
    ) -> ServerTaskResult<()> {
        let conn_id = self.ctx.conn_id;

        let mut hello_buf = BytesMut::with_capacity(HELLO_BUFFER_SIZE);
        match tokio::time::timeout(
            HELLO_READ_TIMEOUT,
            read_client_hello(&mut stream, &mut hello_buf),
        )
        .await
        {
            Ok(r) => r?,
            Err(_) => {
                return Err(ServerTaskError::ClientAppTimeout(
                    "timeout to read client hello",
                ));
            }
        }

        let hello = ClientHelloInfo::parse(&hello_buf)
            .map_err(ServerTaskError::InvalidClientHello)?;
        debug!("{conn_id} client hello for host [{}]", hello.sni_host);

        if let Some(acl) = &self.ctx.acl {
            if !acl.check_access(&hello.sni_host) {
                return Err(ServerTaskForbiddenError::DestDenied.into());
            }
        }
        if let Some(self_addrs) = &self.ctx.self_addrs {
            if crate::resolve::is_self_target(&hello.sni_host, self_addrs).await {
                return Err(ServerTaskForbiddenError::SelfLoopTarget.into());
            }
        }

        let ups_addr = self.ctx.upstream_addr(&hello.sni_host);
        let ups_stream = match tokio::time::timeout(
            UPSTREAM_CONNECT_TIMEOUT,
            TcpStream::connect(ups_addr.as_str()),
        )
        .await
        {
                Ok(Ok(s)) => s,
                Ok(Err(e)) => return Err(ServerTaskError::UpstreamNotConnected(e)),
                Err(_) => return Err(ServerTaskError::UpstreamConnectTimeout),
            };
        info!(
            "{conn_id} client {} connected to {ups_addr}",
            self.ctx.client_addr
        );

        RelayTask::new(self.ctx, Arc::clone(session_stats))
            .run(stream, hello_buf, ups_stream)
            .await
    }
}

/// Keep reading until the buffer holds one complete handshake record. A
/// full buffer without one means this is not usable TLS traffic.
async fn read_client_hello(stream: &mut TcpStream, buf: &mut BytesMut) -> ServerTaskResult<()> {
    loop {
        if record_is_complete(buf) {
            return Ok(());
        }
        if buf.len() >= HELLO_BUFFER_SIZE {
            return Err(ServerTaskError::InvalidClientProtocol(
                "no complete client hello record in the first 4096 bytes",
            ));
        }
        match stream.read_buf(buf).await {
            Ok(0) => return Err(ServerTaskError::ClosedByClient),
            Ok(_) => {}
            Err(e) => return Err(ServerTaskError::ClientTcpReadFailed(e)),
        }
    }
}
