use super::{CompletionSender, FetchRequest, Transport};
use crate::error::TransportError;
use bytes::Bytes;

/// Fetches resources relative to `base_url` with reqwest on a tokio runtime
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    runtime: tokio::runtime::Handle,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, runtime: tokio::runtime::Handle) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            runtime,
        }
    }

    fn resolve(&self, url: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    }
}

/// 404 is a missing resource, any other non-2xx status a failed response
fn check_status(status: reqwest::StatusCode) -> Result<(), TransportError> {
    if status == reqwest::StatusCode::NOT_FOUND {
        Err(TransportError::NotFound)
    } else if !status.is_success() {
        Err(TransportError::Status(status.as_u16()))
    } else {
        Ok(())
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, request: FetchRequest, completions: CompletionSender) {
        let client = self.client.clone();
        let url = self.resolve(&request.url);
        let completion = completions.pending(request.ticket);
        self.runtime.spawn(async move {
            let result: Result<Bytes, TransportError> = async {
                let response = client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|err| TransportError::Io(err.to_string()))?;
                check_status(response.status())?;
                response
                    .bytes()
                    .await
                    .map_err(|err| TransportError::Io(err.to_string()))
            }
            .await;
            if let Err(err) = result.as_ref() {
                tracing::debug!("GET {} failed: {}", url, err);
            }
            completion.complete(result);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_joins_single_slash() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let transport = HttpTransport::new("http://localhost:8000/", runtime.handle().clone());
        assert_eq!(
            transport.resolve("/img/a.png"),
            "http://localhost:8000/img/a.png"
        );
        assert_eq!(transport.resolve("img/a.png"), "http://localhost:8000/img/a.png");
    }

    #[test]
    fn test_status_classification() {
        use reqwest::StatusCode;
        assert_eq!(check_status(StatusCode::OK), Ok(()));
        assert_eq!(check_status(StatusCode::NO_CONTENT), Ok(()));
        assert_eq!(
            check_status(StatusCode::NOT_FOUND),
            Err(TransportError::NotFound)
        );
        assert_eq!(
            check_status(StatusCode::SERVICE_UNAVAILABLE),
            Err(TransportError::Status(503))
        );
        assert_eq!(
            check_status(StatusCode::FORBIDDEN),
            Err(TransportError::Status(403))
        );
        assert_eq!(
            check_status(StatusCode::MOVED_PERMANENTLY),
            Err(TransportError::Status(301))
        );
    }
}
