use super::{CompletionSender, FetchRequest, Transport};
use crate::error::TransportError;
use bytes::Bytes;
use std::path::PathBuf;

/// Reads resources relative to `root` on a tokio runtime
#[derive(Debug, Clone)]
pub struct FsTransport {
    root: PathBuf,
    runtime: tokio::runtime::Handle,
}

impl FsTransport {
    pub fn new(root: impl Into<PathBuf>, runtime: tokio::runtime::Handle) -> Self {
        Self {
            root: root.into(),
            runtime,
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

impl Transport for FsTransport {
    fn fetch(&self, request: FetchRequest, completions: CompletionSender) {
        let path = self.root.join(&request.url);
        tracing::trace!("Reading {:?}", path);
        let completion = completions.pending(request.ticket);
        self.runtime.spawn(async move {
            let result = match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(Bytes::from(bytes)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    Err(TransportError::NotFound)
                }
                Err(err) => Err(TransportError::Io(err.to_string())),
            };
            completion.complete(result);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Completion, Ticket};
    use std::time::Duration;

    fn fetch(transport: &FsTransport, url: &str) -> Completion {
        let (send, recv) = crossbeam_channel::unbounded();
        transport.fetch(
            FetchRequest {
                ticket: Ticket(1),
                url: url.to_string(),
            },
            CompletionSender::new(send),
        );
        recv.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_reads_file_relative_to_root() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let root = std::env::temp_dir().join(format!("lode_fs_{}", std::process::id()));
        std::fs::create_dir_all(root.join("img")).unwrap();
        std::fs::write(root.join("img/a.bin"), [1u8, 2, 3]).unwrap();

        let transport = FsTransport::new(&root, runtime.handle().clone());
        let completion = fetch(&transport, "img/a.bin");
        assert_eq!(completion.ticket, Ticket(1));
        assert_eq!(completion.result.unwrap().as_ref(), &[1, 2, 3]);

        let missing = fetch(&transport, "img/missing.bin");
        assert_eq!(missing.result, Err(TransportError::NotFound));

        std::fs::remove_dir_all(&root).unwrap();
    }
}
