//! External policy callbacks.
//!
//! A policy decision that the local store already allowed can be vetoed by
//! external endpoints (compliance engines, audit sinks). Every configured URL
//! receives the decision; the call passes only if all of them answer `200 OK`.
//!
//! - GET sends the decision as URL-encoded query parameters.
//! - Any other method sends it as a JSON body.
//! - With several URLs the requests run concurrently. The first failure aborts
//!   the requests still in flight; dropping the returned future aborts all of them.

use reqwest::{Client, Method, StatusCode, header::CONTENT_TYPE};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};
use url::Url;

use crate::error::AppError;

/// Decision payload sent to callback endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PolicyRequest {
    pub domain: String,
    pub subject: String,
    pub subject_type: String,
    pub subject_kind: String,
    pub subject_relation: String,
    pub object: String,
    pub object_type: String,
    pub object_kind: String,
    pub relation: String,
    pub permission: String,
}

impl PolicyRequest {
    fn query_pairs(&self) -> [(&'static str, &str); 10] {
        [
            ("domain", self.domain.as_str()),
            ("subject", self.subject.as_str()),
            ("subject_type", self.subject_type.as_str()),
            ("subject_kind", self.subject_kind.as_str()),
            ("subject_relation", self.subject_relation.as_str()),
            ("object", self.object.as_str()),
            ("object_type", self.object_type.as_str()),
            ("object_kind", self.object_kind.as_str()),
            ("relation", self.relation.as_str()),
            ("permission", self.permission.as_str()),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct CallbackAuthorizer {
    client: Client,
    method: Method,
    urls: Vec<Url>,
}

impl CallbackAuthorizer {
    /// Only GET and POST are accepted.
    pub fn new(client: Client, method: &str, urls: &[String]) -> Result<Self, AppError> {
        let method = match method.to_ascii_uppercase().as_str() {
            "GET" => Method::GET,
            "POST" => Method::POST,
            other => {
                return Err(AppError::malformed(format!(
                    "unsupported callback method {other}"
                )));
            }
        };

        let urls = urls
            .iter()
            .map(|raw| {
                Url::parse(raw)
                    .map_err(|e| AppError::malformed(format!("invalid callback url {raw}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            client,
            method,
            urls,
        })
    }

    /// An authorizer with no endpoints; every decision passes.
    pub fn disabled() -> Self {
        Self {
            client: Client::new(),
            method: Method::POST,
            urls: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.urls.is_empty()
    }

    pub async fn authorize(&self, req: &PolicyRequest) -> Result<(), AppError> {
        match self.urls.as_slice() {
            [] => Ok(()),
            [url] => send(self.client.clone(), self.method.clone(), url.clone(), req.clone()).await,
            urls => self.fan_out(urls, req).await,
        }
    }

    async fn fan_out(&self, urls: &[Url], req: &PolicyRequest) -> Result<(), AppError> {
        let mut tasks = JoinSet::new();
        for url in urls {
            tasks.spawn(send(
                self.client.clone(),
                self.method.clone(),
                url.clone(),
                req.clone(),
            ));
        }

        let mut first_err = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => {
                    error!(error = %e, "callback task failed");
                    Err(AppError::Internal)
                }
            };

            if let Err(e) = outcome
                && first_err.is_none()
            {
                tasks.abort_all();
                first_err = Some(e);
            }
        }

        first_err.map_or(Ok(()), Err)
    }
}

async fn send(client: Client, method: Method, url: Url, req: PolicyRequest) -> Result<(), AppError> {
    let target = url.to_string();

    let builder = if method == Method::GET {
        let mut url = url;
        url.query_pairs_mut().extend_pairs(req.query_pairs());
        client
            .get(url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
    } else {
        client.request(method, url).json(&req)
    };

    let resp = builder.send().await.map_err(|source| {
        warn!(url = %target, error = %source, "callback request failed");
        AppError::CallbackFailed {
            url: target.clone(),
            source,
        }
    })?;

    let status = resp.status();
    if status != StatusCode::OK {
        warn!(url = %target, status = status.as_u16(), "callback rejected policy");
        return Err(AppError::CallbackDenied {
            url: target,
            status: status.as_u16(),
        });
    }

    debug!(url = %target, "callback accepted policy");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

    use super::*;
    use crate::error::ErrorKind;

    fn request() -> PolicyRequest {
        PolicyRequest {
            domain: "domain-1".to_string(),
            subject: "user-1".to_string(),
            subject_type: "user".to_string(),
            object: "group-1".to_string(),
            object_type: "group".to_string(),
            permission: "g_update".to_string(),
            ..PolicyRequest::default()
        }
    }

    #[tokio::test]
    async fn no_urls_always_passes() {
        let cb = CallbackAuthorizer::new(Client::new(), "POST", &[]).unwrap();
        assert!(!cb.is_enabled());
        cb.authorize(&request()).await.unwrap();
    }

    #[test]
    fn rejects_unsupported_method_and_bad_url() {
        let err = CallbackAuthorizer::new(Client::new(), "PATCH", &[]).unwrap_err();
        assert!(err.is(ErrorKind::Validation));

        let err =
            CallbackAuthorizer::new(Client::new(), "get", &["not a url".to_string()]).unwrap_err();
        assert!(err.is(ErrorKind::Validation));
    }

    #[tokio::test]
    async fn post_sends_json_body() {
        let mock_server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/authz"))
            .and(matchers::header("content-type", "application/json"))
            .and(matchers::body_json(serde_json::json!({
                "domain": "domain-1",
                "subject": "user-1",
                "subject_type": "user",
                "subject_kind": "",
                "subject_relation": "",
                "object": "group-1",
                "object_type": "group",
                "object_kind": "",
                "relation": "",
                "permission": "g_update",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = format!("{}/authz", mock_server.uri());
        let cb = CallbackAuthorizer::new(Client::new(), "POST", &[url]).unwrap();
        cb.authorize(&request()).await.unwrap();
    }

    #[tokio::test]
    async fn get_sends_query_params() {
        let mock_server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/authz"))
            .and(matchers::query_param("subject", "user-1"))
            .and(matchers::query_param("object", "group-1"))
            .and(matchers::query_param("permission", "g_update"))
            .and(matchers::header(
                "content-type",
                "application/x-www-form-urlencoded",
            ))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = format!("{}/authz", mock_server.uri());
        let cb = CallbackAuthorizer::new(Client::new(), "GET", &[url]).unwrap();
        cb.authorize(&request()).await.unwrap();
    }

    #[tokio::test]
    async fn non_200_is_an_authorization_error() {
        let mock_server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let cb = CallbackAuthorizer::new(Client::new(), "POST", &[mock_server.uri()]).unwrap();
        let err = cb.authorize(&request()).await.unwrap_err();
        assert!(err.is(ErrorKind::Authorization));
        assert!(matches!(err, AppError::CallbackDenied { status: 204, .. }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_authorization_error() {
        let cb = CallbackAuthorizer::new(Client::new(), "POST", &["http://127.0.0.1:1/".to_string()])
            .unwrap();
        let err = cb.authorize(&request()).await.unwrap_err();
        assert!(matches!(err, AppError::CallbackFailed { .. }));
        assert!(err.is(ErrorKind::Authorization));
    }

    #[tokio::test]
    async fn all_endpoints_must_allow() {
        let mock_server = MockServer::start().await;
        for path in ["/a", "/b", "/c"] {
            Mock::given(matchers::method("POST"))
                .and(matchers::path(path))
                .respond_with(ResponseTemplate::new(200))
                .expect(1)
                .mount(&mock_server)
                .await;
        }

        let urls: Vec<String> = ["/a", "/b", "/c"]
            .iter()
            .map(|p| format!("{}{}", mock_server.uri(), p))
            .collect();
        let cb = CallbackAuthorizer::new(Client::new(), "POST", &urls).unwrap();
        cb.authorize(&request()).await.unwrap();
    }

    #[tokio::test]
    async fn one_failing_endpoint_fails_the_fan_out() {
        let mock_server = MockServer::start().await;
        for path in ["/ok-1", "/ok-2"] {
            Mock::given(matchers::method("POST"))
                .and(matchers::path(path))
                .respond_with(ResponseTemplate::new(200))
                .expect(1)
                .mount(&mock_server)
                .await;
        }
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/deny"))
            .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(300)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let urls: Vec<String> = ["/ok-1", "/deny", "/ok-2"]
            .iter()
            .map(|p| format!("{}{}", mock_server.uri(), p))
            .collect();
        let cb = CallbackAuthorizer::new(Client::new(), "POST", &urls).unwrap();

        let err = cb.authorize(&request()).await.unwrap_err();
        assert!(err.is(ErrorKind::Authorization));
        assert!(matches!(err, AppError::CallbackDenied { status: 500, .. }));
        // the successful endpoints were still called: verified by `.expect(1)` on drop
    }

    #[tokio::test]
    async fn dropped_authorize_returns_without_waiting_for_slow_endpoints() {
        let mock_server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .expect(2)
            .mount(&mock_server)
            .await;

        let urls: Vec<String> = ["/a", "/b"]
            .iter()
            .map(|p| format!("{}{}", mock_server.uri(), p))
            .collect();
        let cb = CallbackAuthorizer::new(Client::new(), "POST", &urls).unwrap();

        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(Duration::from_millis(200), cb.authorize(&request())).await;
        assert!(outcome.is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
        // both requests were in flight when the caller gave up
        assert_eq!(mock_server.received_requests().await.unwrap().len(), 2);
    }

    /// Accepts one connection, never answers, and reports when the client
    /// hangs up.
    async fn silent_endpoint() -> (String, tokio::sync::oneshot::Receiver<()>) {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/authz", listener.local_addr().unwrap());
        let (closed_tx, closed_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            while let Ok(n) = socket.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
            let _ = closed_tx.send(());
        });
        (url, closed_rx)
    }

    #[tokio::test]
    async fn dropping_authorize_closes_pending_callback_requests() {
        let (first, first_closed) = silent_endpoint().await;
        let (second, second_closed) = silent_endpoint().await;
        let cb = CallbackAuthorizer::new(Client::new(), "POST", &[first, second]).unwrap();

        let outcome = tokio::time::timeout(Duration::from_millis(200), cb.authorize(&request())).await;
        assert!(outcome.is_err());

        for closed in [first_closed, second_closed] {
            tokio::time::timeout(Duration::from_secs(5), closed)
                .await
                .expect("callback connection left open")
                .unwrap();
        }
    }
}
