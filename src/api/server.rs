//! TCP accept loop
//!
//! One Tokio task per connection, HTTP/1.1 only. Shutdown is signalled through
//! a watch channel; connections already being served finish on their own.

use super::{AppContext, routes};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct ApiServer {
    listener: TcpListener,
    ctx: Arc<AppContext>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ApiServer {
    /// Binds `addr`. Port 0 picks a free port; see [`ApiServer::local_addr`].
    pub async fn bind(
        addr: SocketAddr,
        ctx: Arc<AppContext>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            ctx,
            shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves until the shutdown signal is received.
    pub async fn run(self) -> std::io::Result<()> {
        info!("Server is running at http://{}", self.local_addr()?);

        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("Accepted connection from {peer}");
                            spawn_connection(stream, self.ctx.clone());
                        }
                        Err(e) => warn!("Failed to accept connection: {e}"),
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Server shutting down");
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

fn spawn_connection(stream: TcpStream, ctx: Arc<AppContext>) {
    tokio::spawn(async move {
        let service = service_fn(move |req: Request<Incoming>| {
            let ctx = ctx.clone();
            async move { Ok::<_, Infallible>(routes::handle(req, ctx).await) }
        });

        if let Err(e) = http1::Builder::new()
            .serve_connection(TokioIo::new(stream), service)
            .await
        {
            let message = e.to_string();
            if e.is_incomplete_message() || message.contains("connection reset") {
                debug!("Connection ended: {e}");
            } else {
                warn!("Connection error: {e}");
            }
        }
    });
}
