//! Common test utilities: an in-process listener and a line-oriented
//! test client.
//!
//! Every test server binds 127.0.0.1 port 0, so suites run in parallel
//! without port clashes. The shared `DataStream` is exposed so tests can
//! tap the fan-out directly.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use aprshub::config::{ListenerConfig, ListenerMode};
use aprshub::listener::Listener;
use aprshub::stats::Stats;
use aprshub::stream::DataStream;

pub const SERVER_ID: &str = "T2TEST";

pub struct TestServer {
    pub listener: Arc<Listener>,
    pub stream: Arc<DataStream>,
    pub global_stats: Arc<Stats>,
    pub addr: SocketAddr,
}

/// Start one listener on an ephemeral port.
pub async fn start_server(mode: ListenerMode, filter: &str) -> Result<TestServer> {
    let stream = DataStream::new(100);
    let global_stats = Arc::new(Stats::new());

    let config = ListenerConfig {
        name: "test".to_string(),
        mode,
        protocol: "tcp".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        visible: true,
        filter: filter.to_string(),
    };
    let listener = Listener::new(
        config,
        SERVER_ID.to_string(),
        1024,
        stream.clone(),
        global_stats.clone(),
    );
    listener.clone().start().await?;
    let addr = listener
        .local_addr()
        .context("listener has no bound address")?;

    Ok(TestServer {
        listener,
        stream,
        global_stats,
        addr,
    })
}

pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let socket = TcpStream::connect(addr).await?;
        let (read_half, write_half) = socket.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }

    /// Connect, consume the banner, log in, consume the logresp.
    pub async fn login(addr: SocketAddr, callsign: &str, pass: i32, extra: &str) -> Result<Self> {
        let mut client = Self::connect(addr).await?;
        client.read_line().await.context("no banner")?;

        let mut command = format!("user {} pass {} vers testclient 1.0", callsign, pass);
        if !extra.is_empty() {
            command.push(' ');
            command.push_str(extra);
        }
        client.send_line(&command).await?;
        client.read_line().await.context("no logresp")?;
        Ok(client)
    }

    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        Ok(())
    }

    /// Read one line, trimmed, within two seconds.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = tokio::time::timeout(Duration::from_secs(2), self.reader.read_line(&mut line))
            .await
            .context("timed out waiting for a line")??;
        if n == 0 {
            bail!("connection closed");
        }
        Ok(line.trim_end().to_string())
    }

    /// Assert that nothing arrives (EOF also counts) within the window.
    pub async fn expect_silence(&mut self, window: Duration) -> Result<()> {
        let mut line = String::new();
        match tokio::time::timeout(window, self.reader.read_line(&mut line)).await {
            Err(_) => Ok(()),
            Ok(Ok(0)) => Ok(()),
            Ok(Ok(_)) => bail!("unexpected line: {}", line.trim_end()),
            Ok(Err(e)) => Err(e.into()),
        }
    }

    /// Assert that the server closes the connection within the window.
    pub async fn expect_eof(&mut self, window: Duration) -> Result<()> {
        let mut line = String::new();
        match tokio::time::timeout(window, self.reader.read_line(&mut line)).await {
            Ok(Ok(0)) => Ok(()),
            // A reset on an already-torn-down socket also means closed
            Ok(Err(_)) => Ok(()),
            Ok(Ok(_)) => bail!("expected EOF, got line: {}", line.trim_end()),
            Err(_) => bail!("connection still open after {:?}", window),
        }
    }
}
