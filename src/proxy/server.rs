//! Proxy server implementation

use crate::config::ProxyConfig;
use crate::error::Result;
use crate::logging::log_stats;
use crate::proxy::handler::ConnectionHandler;
use crate::proxy::pool::WorkerPool;
use crate::proxy::state::{StateController, StateWatcher};
use crate::proxy::stats::{spawn_reporter, Stats};
use crate::{log_error, log_info};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct ProxyServer {
    config: Arc<ProxyConfig>,
    stats: Arc<Stats>,
}

/// Create the listening socket with SO_REUSEADDR and the configured backlog
fn create_listener(addr: SocketAddr, config: &ProxyConfig) -> Result<TcpListener> {
    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;

    let backlog = i32::try_from(config.backlog).unwrap_or(i32::MAX);
    socket.listen(backlog)?;

    Ok(TcpListener::from_std(socket.into())?)
}

impl ProxyServer {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            config: Arc::new(config),
            stats: Arc::new(Stats::new()),
        }
    }

    pub fn stats(&self) -> Arc<Stats> {
        Arc::clone(&self.stats)
    }

    /// Bind the listener and launch the worker pool, stats reporter and
    /// accept loop.
    ///
    /// A bind failure is logged and returned to the caller; nothing is retried.
    pub async fn start(self) -> Result<RunningServer> {
        self.config.validate()?;

        let listener = match self.bind().await {
            Ok(listener) => listener,
            Err(e) => {
                error!(
                    "Failed to bind {}:{}: {}",
                    self.config.bind_host, self.config.bind_port, e
                );
                return Err(e);
            }
        };
        let local_addr = listener.local_addr()?;
        let state = StateController::new();

        log_info!("Proxy server listening on {}", local_addr);
        log_info!(
            "Max workers: {}, queue capacity: {}, buffer size: {} bytes",
            self.config.max_workers,
            self.config.queue_capacity,
            self.config.buffer_size
        );

        let handler = Arc::new(ConnectionHandler::new(Arc::clone(&self.config), Arc::clone(&self.stats)));
        let pool = WorkerPool::start(self.config.max_workers, self.config.queue_capacity, handler);

        let reporter = self
            .config
            .stats_interval()
            .map(|every| spawn_reporter(Arc::clone(&self.stats), every, state.subscribe()));

        let acceptor = tokio::spawn(accept_loop(listener, pool, Arc::clone(&self.stats), state.subscribe()));

        Ok(RunningServer {
            local_addr,
            stats: self.stats,
            state,
            acceptor,
            reporter,
        })
    }

    async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.bind_addr().await?;
        create_listener(addr, &self.config)
    }
}

/// Handle to a started server
pub struct RunningServer {
    local_addr: SocketAddr,
    stats: Arc<Stats>,
    state: StateController,
    acceptor: JoinHandle<WorkerPool>,
    reporter: Option<JoinHandle<()>>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    /// Stop accepting, close the listener and wait for in-flight connections
    /// to finish on their own. Active relays are never cut short.
    pub async fn stop(self) {
        self.state.stop();
        log_info!("Stopping proxy server...");

        match self.acceptor.await {
            Ok(pool) => {
                let queued = pool.queued();
                let active = self.stats.active_connections();
                if queued + active as usize > 0 {
                    info!("Waiting for {} active and {} queued connections to finish", active, queued);
                }
                pool.shutdown().await;
            }
            Err(e) => error!("Accept loop failed: {}", e),
        }

        if let Some(reporter) = self.reporter {
            if let Err(e) = reporter.await {
                error!("Stats reporter failed: {}", e);
            }
        }

        log_stats(&self.stats.snapshot());
        log_info!("Proxy server stopped");
    }
}

/// Accept connections and dispatch them until the server stops. Returns the
/// pool so the caller can drain it after the listener is closed.
async fn accept_loop(listener: TcpListener, pool: WorkerPool, stats: Arc<Stats>, mut state: StateWatcher) -> WorkerPool {
    loop {
        tokio::select! {
            biased;
            _ = state.stopped() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("New connection from {}", peer);
                    if let Err(rejected) = pool.dispatch(stream, peer) {
                        stats.record_rejected();
                        warn!("Rejecting connection from {}: {}", rejected.job.peer, rejected.reason);
                    }
                }
                Err(e) => {
                    if state.is_stopped() {
                        break;
                    }
                    log_error!("Failed to accept connection: {}", e);
                }
            },
        }
    }

    drop(listener);
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoggingConfig;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn test_config() -> ProxyConfig {
        ProxyConfig {
            bind_host: "127.0.0.1".to_string(),
            bind_port: 0,
            upstream_connect_timeout_secs: 2,
            relay_poll_interval_ms: 100,
            stats_interval_secs: 0,
            logging: LoggingConfig {
                enable_file_logging: false,
                ..LoggingConfig::default()
            },
            ..ProxyConfig::default()
        }
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn read_all(stream: &mut TcpStream) -> Vec<u8> {
        let mut received = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut received))
            .await
            .expect("client read timed out")
            .unwrap();
        received
    }

    /// Upstream that records the request it receives, replies and closes
    async fn one_shot_upstream(reply: &'static [u8]) -> (u16, JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            buf.truncate(n);
            socket.write_all(reply).await.unwrap();
            buf
        });
        (port, task)
    }

    /// Upstream that echoes back whatever it receives
    async fn echo_upstream() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let (mut reader, mut writer) = socket.split();
            let _ = tokio::io::copy(&mut reader, &mut writer).await;
        });
        port
    }

    #[tokio::test]
    async fn test_http_forward_is_byte_exact() {
        let (port, upstream) = one_shot_upstream(b"HTTP/1.1 200 OK\r\n\r\nHello").await;
        let server = ProxyServer::new(test_config()).start().await.unwrap();

        let request = format!("GET http://127.0.0.1:{}/ HTTP/1.1\r\nHost: example.com\r\n\r\n", port);
        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        client.write_all(request.as_bytes()).await.unwrap();

        assert_eq!(read_all(&mut client).await, b"HTTP/1.1 200 OK\r\n\r\nHello");
        assert_eq!(upstream.await.unwrap(), request.as_bytes());

        let stats = Arc::clone(server.stats());
        wait_until(|| stats.active_connections() == 0).await;
        assert_eq!(stats.total_requests(), 1);
        assert_eq!(stats.errors(), 0);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_connect_tunnel_passes_bytes_unaltered() {
        let port = echo_upstream().await;
        let server = ProxyServer::new(test_config()).start().await.unwrap();

        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        client
            .write_all(format!("CONNECT 127.0.0.1:{} HTTP/1.1\r\n\r\n", port).as_bytes())
            .await
            .unwrap();

        let mut established = vec![0u8; b"HTTP/1.1 200 Connection Established\r\n\r\n".len()];
        client.read_exact(&mut established).await.unwrap();
        assert_eq!(established, b"HTTP/1.1 200 Connection Established\r\n\r\n");

        let payload: Vec<u8> = (0..=255u8).cycle().take(40_000).collect();
        client.write_all(&payload).await.unwrap();
        let mut echoed = vec![0u8; payload.len()];
        client.read_exact(&mut echoed).await.unwrap();
        assert_eq!(echoed, payload);

        drop(client);
        let stats = Arc::clone(server.stats());
        wait_until(|| stats.active_connections() == 0).await;
        assert_eq!(stats.errors(), 0);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_bytes_sent_with_connect_head_are_not_tunneled() {
        let port = echo_upstream().await;
        let server = ProxyServer::new(test_config()).start().await.unwrap();

        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        client
            .write_all(format!("CONNECT 127.0.0.1:{} HTTP/1.1\r\n\r\nEARLY", port).as_bytes())
            .await
            .unwrap();

        let mut established = vec![0u8; CONNECT_OK_LEN];
        client.read_exact(&mut established).await.unwrap();

        // Only what follows the 200 reaches the upstream and comes back
        client.write_all(b"after").await.unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"after");

        drop(client);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_malformed_request_line_closes_without_response() {
        let server = ProxyServer::new(test_config()).start().await.unwrap();

        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        client.write_all(b"GARBAGE\r\n\r\n").await.unwrap();

        assert!(read_all(&mut client).await.is_empty());
        assert_eq!(server.stats().errors(), 1);
        assert_eq!(server.stats().total_requests(), 1);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_missing_host_closes_without_response() {
        let server = ProxyServer::new(test_config()).start().await.unwrap();

        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        client.write_all(b"GET /index.html HTTP/1.1\r\nAccept: */*\r\n\r\n").await.unwrap();

        assert!(read_all(&mut client).await.is_empty());
        assert_eq!(server.stats().errors(), 1);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_unresolvable_upstream_gets_500() {
        let server = ProxyServer::new(test_config()).start().await.unwrap();

        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        client
            .write_all(b"CONNECT nonexistent.invalid:443 HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        assert_eq!(read_all(&mut client).await, b"HTTP/1.1 500 Internal Server Error\r\n\r\n");
        assert_eq!(server.stats().errors(), 1);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_refused_upstream_gets_500() {
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = closed.local_addr().unwrap().port();
        drop(closed);

        let server = ProxyServer::new(test_config()).start().await.unwrap();

        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        let request = format!("GET http://127.0.0.1:{}/ HTTP/1.1\r\n\r\n", port);
        client.write_all(request.as_bytes()).await.unwrap();

        assert_eq!(read_all(&mut client).await, b"HTTP/1.1 500 Internal Server Error\r\n\r\n");
        assert_eq!(server.stats().errors(), 1);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_bad_connect_target_gets_500() {
        let server = ProxyServer::new(test_config()).start().await.unwrap();

        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        client.write_all(b"CONNECT example.com HTTP/1.1\r\n\r\n").await.unwrap();

        assert_eq!(read_all(&mut client).await, b"HTTP/1.1 500 Internal Server Error\r\n\r\n");
        assert_eq!(server.stats().errors(), 1);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_empty_connection_is_not_an_error() {
        let server = ProxyServer::new(test_config()).start().await.unwrap();
        let stats = Arc::clone(server.stats());

        let client = TcpStream::connect(server.local_addr()).await.unwrap();
        wait_until(|| stats.active_connections() == 1).await;

        drop(client);
        wait_until(|| stats.active_connections() == 0).await;
        assert_eq!(stats.total_requests(), 0);
        assert_eq!(stats.errors(), 0);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_client_read_timeout_counts_error_without_response() {
        let config = ProxyConfig {
            client_read_timeout_secs: 1,
            ..test_config()
        };
        let server = ProxyServer::new(config).start().await.unwrap();
        let stats = Arc::clone(server.stats());

        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        let started = std::time::Instant::now();

        assert!(read_all(&mut client).await.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(900));

        wait_until(|| stats.active_connections() == 0).await;
        assert_eq!(stats.errors(), 1);
        assert_eq!(stats.total_requests(), 0);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_stop_waits_for_active_tunnel() {
        let port = echo_upstream().await;
        let server = ProxyServer::new(test_config()).start().await.unwrap();
        let addr = server.local_addr();
        let stats = Arc::clone(server.stats());

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(format!("CONNECT 127.0.0.1:{} HTTP/1.1\r\n\r\n", port).as_bytes())
            .await
            .unwrap();
        let mut established = vec![0u8; CONNECT_OK_LEN];
        client.read_exact(&mut established).await.unwrap();

        let stopping = tokio::spawn(server.stop());
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!stopping.is_finished(), "stop must not cut an active tunnel");

        // The tunnel still works while the server drains
        client.write_all(b"still here").await.unwrap();
        let mut buf = [0u8; 10];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"still here");

        // New connections are no longer accepted
        assert!(TcpStream::connect(addr).await.is_err());

        drop(client);
        tokio::time::timeout(Duration::from_secs(5), stopping)
            .await
            .expect("stop should finish once the tunnel closes")
            .unwrap();
        assert_eq!(stats.active_connections(), 0);
    }

    const CONNECT_OK_LEN: usize = b"HTTP/1.1 200 Connection Established\r\n\r\n".len();

    #[tokio::test]
    async fn test_full_queue_fast_closes_new_connections() {
        let config = ProxyConfig {
            max_workers: 1,
            queue_capacity: 1,
            ..test_config()
        };
        let server = ProxyServer::new(config).start().await.unwrap();
        let addr = server.local_addr();
        let stats = Arc::clone(server.stats());

        // Occupies the only worker: it waits for a request that never comes
        let busy = TcpStream::connect(addr).await.unwrap();
        wait_until(|| stats.active_connections() == 1).await;

        // Fills the single queue slot
        let queued = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut rejected = TcpStream::connect(addr).await.unwrap();
        wait_until(|| stats.rejected() == 1).await;
        assert!(read_all(&mut rejected).await.is_empty());
        assert_eq!(stats.active_connections(), 1);

        drop(busy);
        drop(queued);
        server.stop().await;
        assert_eq!(stats.active_connections(), 0);
        assert_eq!(stats.errors(), 0);
    }

    #[tokio::test]
    async fn test_stop_joins_stats_reporter() {
        let config = ProxyConfig {
            stats_interval_secs: 1,
            ..test_config()
        };
        let server = ProxyServer::new(config).start().await.unwrap();

        // Let the reporter emit at least one snapshot before stopping
        tokio::time::sleep(Duration::from_millis(1200)).await;

        tokio::time::timeout(Duration::from_secs(2), server.stop())
            .await
            .expect("stop should join the reporter promptly");
    }

    /// Log sink shared with a test-local subscriber
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test]
    async fn test_bind_failure_is_fatal_and_logged() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let config = ProxyConfig {
            bind_port: port,
            ..test_config()
        };

        assert!(ProxyServer::new(config).start().await.is_err());

        let logged = logs.contents();
        assert!(logged.contains("ERROR"), "missing error record: {}", logged);
        assert!(logged.contains(&format!("Failed to bind 127.0.0.1:{}", port)), "{}", logged);
    }
}
