use std::{
  fmt,
  future::Future,
  io,
  net::{AddrParseError, SocketAddr},
  path::PathBuf,
  pin::Pin,
  str::FromStr,
  task::{Context, Poll},
};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_stream::{wrappers::UnixListenerStream, StreamExt};
use tonic::transport::{server::Connected, Server};
use tracing::{debug, info};

use csi_proto::{Controller, ControllerService};

/// Address the CSI gRPC API is served on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
  Unix(PathBuf),
  Tcp(SocketAddr),
}

#[derive(Debug, Error)]
pub enum EndpointError {
  #[error("unsupported endpoint scheme: {0}")]
  UnknownScheme(String),

  #[error("endpoint {0} has an empty socket path")]
  EmptyPath(String),

  #[error("invalid tcp address {addr}")]
  InvalidAddress {
    addr: String,
    #[source]
    source: AddrParseError,
  },
}

impl FromStr for Endpoint {
  type Err = EndpointError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if let Some(path) = s.strip_prefix("unix://") {
      if path.is_empty() {
        return Err(EndpointError::EmptyPath(s.to_owned()));
      }
      return Ok(Endpoint::Unix(PathBuf::from(path)));
    }

    if let Some(addr) = s.strip_prefix("tcp://") {
      return addr
        .parse()
        .map(Endpoint::Tcp)
        .map_err(|source| EndpointError::InvalidAddress {
          addr: addr.to_owned(),
          source,
        });
    }

    Err(EndpointError::UnknownScheme(s.to_owned()))
  }
}

impl fmt::Display for Endpoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
      Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
    }
  }
}

#[derive(Debug, Error)]
pub enum ServeError {
  #[error("failed to remove stale socket {}", path.display())]
  RemoveSocket {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to bind {}", path.display())]
  Bind {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Transport(#[from] tonic::transport::Error),
}

/// Serves the Identity and Controller services on `endpoint` until
/// `shutdown` resolves.
pub async fn serve<T, F>(
  endpoint: &Endpoint,
  controller: Controller<T>,
  shutdown: F,
) -> Result<(), ServeError>
where
  T: ControllerService,
  F: Future<Output = ()>,
{
  let router = Server::builder()
    .add_service(controller.identity_server())
    .add_service(controller.controller_server());

  match endpoint {
    Endpoint::Tcp(addr) => {
      info!(%endpoint, "serving CSI");
      router.serve_with_shutdown(*addr, shutdown).await?;
    }

    Endpoint::Unix(path) => {
      match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed stale socket"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => (),
        Err(source) => {
          return Err(ServeError::RemoveSocket {
            path: path.clone(),
            source,
          })
        }
      }

      let listener =
        tokio::net::UnixListener::bind(path).map_err(|source| ServeError::Bind {
          path: path.clone(),
          source,
        })?;
      let incoming = UnixListenerStream::new(listener).map(|stream| stream.map(UnixStream));

      info!(%endpoint, "serving CSI");
      router
        .serve_with_incoming_shutdown(incoming, shutdown)
        .await?;
    }
  }

  info!("server stopped");
  Ok(())
}

/// A unix socket connection tonic can serve on.
#[derive(Debug)]
struct UnixStream(tokio::net::UnixStream);

impl Connected for UnixStream {
  fn remote_addr(&self) -> Option<SocketAddr> {
    None
  }
}

impl AsyncRead for UnixStream {
  fn poll_read(
    mut self: Pin<&mut Self>,
    cx: &mut Context<'_>,
    buf: &mut ReadBuf<'_>,
  ) -> Poll<io::Result<()>> {
    Pin::new(&mut self.0).poll_read(cx, buf)
  }
}

impl AsyncWrite for UnixStream {
  fn poll_write(
    mut self: Pin<&mut Self>,
    cx: &mut Context<'_>,
    buf: &[u8],
  ) -> Poll<io::Result<usize>> {
    Pin::new(&mut self.0).poll_write(cx, buf)
  }

  fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Pin::new(&mut self.0).poll_flush(cx)
  }

  fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Pin::new(&mut self.0).poll_shutdown(cx)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use test_case::test_case;

  #[test_case("unix:///csi/csi.sock" => Endpoint::Unix("/csi/csi.sock".into()) ; "unix")]
  #[test_case("unix://relative.sock" => Endpoint::Unix("relative.sock".into()) ; "relative unix")]
  #[test_case("tcp://127.0.0.1:10000" => Endpoint::Tcp(([127, 0, 0, 1], 10000).into()) ; "tcp")]
  #[test_case("tcp://[::1]:10000" => Endpoint::Tcp("[::1]:10000".parse().unwrap()) ; "tcp v6")]
  fn parse(s: &str) -> Endpoint {
    s.parse().unwrap()
  }

  #[test]
  fn parse_errors() {
    assert!(matches!(
      "unix://".parse::<Endpoint>(),
      Err(EndpointError::EmptyPath(_))
    ));
    assert!(matches!(
      "tcp://localhost".parse::<Endpoint>(),
      Err(EndpointError::InvalidAddress { .. })
    ));
    assert!(matches!(
      "/csi/csi.sock".parse::<Endpoint>(),
      Err(EndpointError::UnknownScheme(_))
    ));
  }

  #[test]
  fn display_round_trips() {
    for s in &["unix:///csi/csi.sock", "tcp://127.0.0.1:10000"] {
      assert_eq!(s.parse::<Endpoint>().unwrap().to_string(), *s);
    }
  }

  #[tokio::test]
  async fn serve_replaces_stale_socket_and_stops() {
    use crate::{backend::MemoryDiskBackend, registry::VolumeRegistry, server::ControllerServer};
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("csi.sock");
    std::fs::write(&path, b"stale").unwrap();

    let server = ControllerServer::new("test.csi", VolumeRegistry::new(MemoryDiskBackend::new()));
    let controller = Controller::new(Arc::new(server));

    serve(&Endpoint::Unix(path.clone()), controller, async {})
      .await
      .unwrap();
  }
}
