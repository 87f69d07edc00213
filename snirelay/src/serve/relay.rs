/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use snirelay_io::{OptionalInterval, StreamCopy, StreamCopyConfig, StreamCopyError};

use super::stats::session_wrapper_stats_pair;
use super::{CommonTaskContext, ServerTaskError, ServerTaskResult, SessionConnectionStats};

const IDLE_CHECK_PERIOD: Duration = Duration::from_secs(1);

/// Relays bytes in both directions until either side closes, an I/O error
/// occurs, or the session stays idle past the configured threshold. Both
/// copy directions and the idle check run in one select loop, dropping the
/// socket halves on return is what unblocks and closes everything.
pub(crate) struct RelayTask {
    ctx: CommonTaskContext,
    session_stats: Arc<SessionConnectionStats>,
}

impl RelayTask {
    pub(crate) fn new(ctx: CommonTaskContext, session_stats: Arc<SessionConnectionStats>) -> Self {
        RelayTask { ctx, session_stats }
    }

    pub(crate) async fn run(
        self,
        clt_stream: TcpStream,
        clt_r_buf: BytesMut,
        ups_stream: TcpStream,
    ) -> ServerTaskResult<()> {
        let (mut clt_r, mut clt_w) = clt_stream.into_split();
        let (mut ups_r, mut ups_w) = ups_stream.into_split();

        let (upload_stats, download_stats) =
            session_wrapper_stats_pair(&self.ctx.binding_stats, &self.session_stats);
        let copy_config = StreamCopyConfig::default();
        // the buffered hello bytes go out to the upstream first
        let mut clt_to_ups = StreamCopy::with_data(
            &mut clt_r,
            &mut ups_w,
            &copy_config,
            clt_r_buf.into(),
            upload_stats,
        );
        let mut ups_to_clt = StreamCopy::new(&mut ups_r, &mut clt_w, &copy_config, download_stats);

        let mut idle_interval = self.idle_interval();
        let mut idle_count = 0u64;
        let max_idle_count = self.ctx.binding.idle_close_seconds.max(0) as u64;

        loop {
            tokio::select! {
                r = &mut clt_to_ups => {
                    return match r {
                        Ok(_) => {
                            let _ = clt_to_ups.writer().shutdown().await;
                            debug!("{} client side finished", self.ctx.conn_id);
                            self.drain_ups_to_clt(ups_to_clt, idle_interval, idle_count, max_idle_count).await
                        }
                        Err(StreamCopyError::ReadFailed(e)) => Err(ServerTaskError::ClientTcpReadFailed(e)),
                        Err(StreamCopyError::WriteFailed(e)) => {
                            let _ = ups_to_clt.write_flush().await;
                            Err(ServerTaskError::UpstreamWriteFailed(e))
                        }
                    };
                }
                r = &mut ups_to_clt => {
                    return match r {
                        Ok(_) => {
                            let _ = ups_to_clt.writer().shutdown().await;
                            debug!("{} upstream side finished", self.ctx.conn_id);
                            self.drain_clt_to_ups(clt_to_ups, idle_interval, idle_count, max_idle_count).await
                        }
                        Err(StreamCopyError::ReadFailed(e)) => Err(ServerTaskError::UpstreamReadFailed(e)),
                        Err(StreamCopyError::WriteFailed(e)) => {
                            let _ = clt_to_ups.write_flush().await;
                            Err(ServerTaskError::ClientTcpWriteFailed(e))
                        }
                    };
                }
                _ = idle_interval.tick() => {
                    if clt_to_ups.is_idle() && ups_to_clt.is_idle() {
                        idle_count += 1;
                        if idle_count > max_idle_count {
                            return Err(ServerTaskError::Idle(idle_count));
                        }
                    } else {
                        idle_count = 0;

                        clt_to_ups.reset_active();
                        ups_to_clt.reset_active();
                    }
                }
            }
        }
    }

    fn idle_interval(&self) -> OptionalInterval {
        if self.ctx.binding.idle_close_seconds >= 0 {
            OptionalInterval::with(tokio::time::interval_at(
                Instant::now() + IDLE_CHECK_PERIOD,
                IDLE_CHECK_PERIOD,
            ))
        } else {
            OptionalInterval::default()
        }
    }

    async fn drain_ups_to_clt<R, W>(
        &self,
        mut ups_to_clt: StreamCopy<'_, R, W>,
        mut idle_interval: OptionalInterval,
        mut idle_count: u64,
        max_idle_count: u64,
    ) -> ServerTaskResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            tokio::select! {
                r = &mut ups_to_clt => {
                    return match r {
                        Ok(_) => {
                            let _ = ups_to_clt.writer().shutdown().await;
                            debug!("{} upstream side finished", self.ctx.conn_id);
                            Ok(())
                        }
                        Err(StreamCopyError::ReadFailed(e)) => Err(ServerTaskError::UpstreamReadFailed(e)),
                        Err(StreamCopyError::WriteFailed(e)) => Err(ServerTaskError::ClientTcpWriteFailed(e)),
                    };
                }
                _ = idle_interval.tick() => {
                    if ups_to_clt.is_idle() {
                        idle_count += 1;
                        if idle_count > max_idle_count {
                            return Err(ServerTaskError::Idle(idle_count));
                        }
                    } else {
                        idle_count = 0;
                        ups_to_clt.reset_active();
                    }
                }
            }
        }
    }

    async fn drain_clt_to_ups<R, W>(
        &self,
        mut clt_to_ups: StreamCopy<'_, R, W>,
        mut idle_interval: OptionalInterval,
        mut idle_count: u64,
        max_idle_count: u64,
    ) -> ServerTaskResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            tokio::select! {
                r = &mut clt_to_ups => {
                    return match r {
                        Ok(_) => {
                            let _ = clt_to_ups.writer().shutdown().await;
                            debug!("{} client side finished", self.ctx.conn_id);
                            Ok(())
                        }
                        Err(StreamCopyError::ReadFailed(e)) => Err(ServerTaskError::ClientTcpReadFailed(e)),
                        Err(StreamCopyError::WriteFailed(e)) => Err(ServerTaskError::UpstreamWriteFailed(e)),
                    };
                }
                _ = idle_interval.tick() => {
                    if clt_to_ups.is_idle() {
                        idle_count += 1;
                        if idle_count > max_idle_count {
                            return Err(ServerTaskError::Idle(idle_count));
                        }
                    } else {
                        idle_count = 0;
                        clt_to_ups.reset_active();
                    }
                }
            }
        }
    }
}
