//! TCP transport helpers.

use std::time::Duration;

use tokio::net::TcpStream;

use crate::{Error, Result};

/// Dials a binkp peer with a bounded connect timeout.
///
/// Name resolution and connection establishment both count against the
/// timeout; the stream comes back with `TCP_NODELAY` set, as command
/// frames are small and latency-sensitive.
pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let target = format!("{host}:{port}");
    log::debug!("connecting to {target}");
    let stream = tokio::time::timeout(timeout, TcpStream::connect(&target))
        .await
        .map_err(|_| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connect to {target} timed out"),
            ))
        })??;
    stream.set_nodelay(true)?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refused_connection_is_an_io_error() {
        // Port 1 on localhost is essentially never listening.
        let result = connect("127.0.0.1", 1, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
