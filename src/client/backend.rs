//! Backend Client
//!
//! Thin async client over the platform's REST and edge-function endpoints.
//! Connection failures are retried with exponential backoff. Timeouts are
//! retried only for GET and DELETE, since a timed-out POST or PATCH may already
//! have reached the server. Status errors are returned as they are.

use crate::config::ResolvedConfig;
use crate::error::{Result, YardlineError};
use backoff::ExponentialBackoff;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

const PREFER_REPRESENTATION: &str = "return=representation";

/// Whether a request may safely be sent twice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replay {
    Idempotent,
    Once,
}

/// Handle to the backend platform
#[derive(Debug, Clone)]
pub struct BackendClient {
    /// Inner reqwest client, carries the `apikey` header
    http: Client,

    rest_url: String,
    functions_url: String,
    admin_contact: String,

    /// `Bearer <anon key>` or `Bearer <user jwt>`
    authorization: HeaderValue,

    /// Per-request timeout, from connect to the end of the body
    request_timeout: Duration,

    /// How long transient failures are retried
    retry_window: Duration,
}

impl BackendClient {
    /// Build the client for a resolved config.
    ///
    /// Returns `None` (and logs an error) when the url or key is empty or the
    /// HTTP client cannot be built. Callers treat `None` as backend unavailable.
    pub fn from_config(config: &ResolvedConfig) -> Option<Self> {
        if !config.is_complete() {
            tracing::error!(
                source = %config.source,
                has_url = !config.backend_url.is_empty(),
                has_key = !config.api_key.is_empty(),
                "Backend url or public key is empty; backend client not created"
            );
            return None;
        }

        match Self::with_endpoints(
            config.rest_endpoint(),
            config.functions_endpoint(),
            &config.api_key,
            config.admin_contact.clone(),
        ) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::error!(error = %e, "Failed to create backend client");
                None
            }
        }
    }

    /// Build a client against explicit REST and functions base urls
    pub fn with_endpoints(
        rest_url: impl Into<String>,
        functions_url: impl Into<String>,
        api_key: &str,
        admin_contact: impl Into<String>,
    ) -> Result<Self> {
        let mut key = HeaderValue::from_str(api_key)?;
        key.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert("apikey", key);

        let http = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| YardlineError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            rest_url: rest_url.into().trim_end_matches('/').to_string(),
            functions_url: functions_url.into().trim_end_matches('/').to_string(),
            admin_contact: admin_contact.into(),
            authorization: bearer(api_key)?,
            request_timeout: Duration::from_secs(30),
            retry_window: Duration::from_secs(20),
        })
    }

    /// Same client, acting as a signed-in user
    pub fn with_access_token(&self, access_token: &str) -> Result<Self> {
        let mut client = self.clone();
        client.authorization = bearer(access_token)?;
        Ok(client)
    }

    /// Same client with a different retry window for transient failures
    pub fn with_retry_window(mut self, window: Duration) -> Self {
        self.retry_window = window;
        self
    }

    /// Same client with a different per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn rest_url(&self) -> &str {
        &self.rest_url
    }

    pub fn functions_url(&self) -> &str {
        &self.functions_url
    }

    pub fn admin_contact(&self) -> &str {
        &self.admin_contact
    }

    /// Read rows: `GET /rest/v1/<table>?<query>`
    pub async fn select<T: DeserializeOwned>(&self, table: &str, query: &str) -> Result<Vec<T>> {
        let url = self.table_url(table, query);
        let resp = self
            .send_with_retry(table, Replay::Idempotent, || self.http.get(&url))
            .await?;
        read_json(resp, table).await
    }

    /// Insert rows and return them as stored
    pub async fn insert<B, T>(&self, table: &str, rows: &B) -> Result<Vec<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.table_url(table, "");
        let resp = self
            .send_with_retry(table, Replay::Once, || {
                self.http
                    .post(&url)
                    .header("Prefer", PREFER_REPRESENTATION)
                    .json(rows)
            })
            .await?;
        read_json(resp, table).await
    }

    /// Update rows matching `filter` and return them
    pub async fn update<B, T>(&self, table: &str, filter: &str, changes: &B) -> Result<Vec<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.table_url(table, filter);
        let resp = self
            .send_with_retry(table, Replay::Once, || {
                self.http
                    .patch(&url)
                    .header("Prefer", PREFER_REPRESENTATION)
                    .json(changes)
            })
            .await?;
        read_json(resp, table).await
    }

    /// Delete rows matching `filter`
    pub async fn delete(&self, table: &str, filter: &str) -> Result<()> {
        let url = self.table_url(table, filter);
        self.send_with_retry(table, Replay::Idempotent, || self.http.delete(&url))
            .await?;
        Ok(())
    }

    /// Call an edge function: `POST <functions>/<name>`
    pub async fn invoke<B, T>(&self, function: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.functions_url, function);
        let resp = self
            .send_with_retry(function, Replay::Once, || self.http.post(&url).json(body))
            .await?;
        read_json(resp, function).await
    }

    fn table_url(&self, table: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}/{}", self.rest_url, table)
        } else {
            format!("{}/{}?{}", self.rest_url, table, query.trim_start_matches('?'))
        }
    }

    /// Send a request, retrying connection failures, and timeouts when `replay` allows
    async fn send_with_retry<F>(&self, target: &str, replay: Replay, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(self.retry_window),
            max_interval: Duration::from_secs(5),
            initial_interval: Duration::from_millis(200),
            multiplier: 2.0,
            ..Default::default()
        };

        let build = &build;
        let authorization = &self.authorization;
        let timeout = self.request_timeout;
        backoff::future::retry(policy, move || async move {
            let resp = build()
                .header(AUTHORIZATION, authorization.clone())
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| {
                    let err = YardlineError::from(e);
                    let retry = match &err {
                        YardlineError::Connection(_) => true,
                        YardlineError::Timeout(_) => replay == Replay::Idempotent,
                        _ => false,
                    };
                    if retry {
                        tracing::debug!(target_name = target, error = %err, "Transient backend error, retrying");
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })?;
            check_status(resp, target).await.map_err(backoff::Error::permanent)
        })
        .await
    }
}

fn bearer(token: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))?;
    value.set_sensitive(true);
    Ok(value)
}

async fn check_status(resp: Response, target: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = match resp.text().await {
        Ok(body) => body,
        Err(e) => format!("<unreadable body: {}>", e),
    };
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(YardlineError::Auth(format!("{} returned {}: {}", target, status, body)));
    }

    Err(YardlineError::Request(format!(
        "{} failed with status {}: {}",
        target, status, body
    )))
}

async fn read_json<T: DeserializeOwned>(resp: Response, target: &str) -> Result<T> {
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| {
        let excerpt: String = body.chars().take(500).collect();
        YardlineError::Response(format!(
            "Failed to parse {} response: {}. Body: {}",
            target, e, excerpt
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigSource;
    use crate::test_support::capture_logs;
    use mockito::Matcher;
    use serde::Deserialize;
    use serde_json::json;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Job {
        id: u32,
        status: String,
    }

    fn client_for(server: &mockito::Server) -> BackendClient {
        BackendClient::with_endpoints(
            format!("{}/rest/v1", server.url()),
            format!("{}/functions/v1", server.url()),
            "anon-key",
            "admin@example.com",
        )
        .unwrap()
    }

    #[test]
    fn test_from_config_derives_endpoints() {
        let config = ResolvedConfig {
            backend_url: "https://abc.supabase.co".to_string(),
            api_key: "anon-key".to_string(),
            admin_contact: "admin@example.com".to_string(),
            source: ConfigSource::EnvironmentVariable,
        };
        let client = BackendClient::from_config(&config).unwrap();
        assert_eq!(client.rest_url(), "https://abc.supabase.co/rest/v1");
        assert_eq!(client.functions_url(), "https://abc.functions.supabase.co");
        assert_eq!(client.admin_contact(), "admin@example.com");
    }

    #[test]
    fn test_from_config_rejects_empty_values() {
        let mut config = ResolvedConfig {
            backend_url: String::new(),
            api_key: "anon-key".to_string(),
            admin_contact: String::new(),
            source: ConfigSource::BuiltInFallback,
        };
        assert!(BackendClient::from_config(&config).is_none());

        config.backend_url = "https://abc.supabase.co".to_string();
        config.api_key = String::new();
        assert!(BackendClient::from_config(&config).is_none());
    }

    #[test]
    fn test_missing_config_logs_error() {
        let config = ResolvedConfig {
            backend_url: "https://abc.supabase.co".to_string(),
            api_key: String::new(),
            admin_contact: String::new(),
            source: ConfigSource::BuiltInFallback,
        };

        let (client, logs) = capture_logs(|| BackendClient::from_config(&config));

        assert!(client.is_none());
        assert!(logs.contains("ERROR"));
        assert!(logs.contains("backend client not created"));
        assert!(logs.contains("has_key=false"));
    }

    #[test]
    fn test_invalid_key_is_config_error() {
        let err = BackendClient::with_endpoints("http://a", "http://b", "bad\nkey", "").unwrap_err();
        assert!(matches!(err, YardlineError::Config(_)));
    }

    #[tokio::test]
    async fn test_select_sends_public_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/jobs")
            .match_query(Matcher::UrlEncoded("status".into(), "eq.open".into()))
            .match_header("apikey", "anon-key")
            .match_header("authorization", "Bearer anon-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id":1,"status":"open"},{"id":2,"status":"open"}]"#)
            .create_async()
            .await;

        let rows: Vec<Job> = client_for(&server).select("jobs", "status=eq.open").await.unwrap();

        mock.assert_async().await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], Job { id: 2, status: "open".to_string() });
    }

    #[tokio::test]
    async fn test_insert_asks_for_representation() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/v1/quote_requests")
            .match_header("prefer", "return=representation")
            .match_body(Matcher::Json(json!({"id": 7, "status": "pending"})))
            .with_status(201)
            .with_body(r#"[{"id":7,"status":"pending"}]"#)
            .create_async()
            .await;

        let rows: Vec<Job> = client_for(&server)
            .insert("quote_requests", &json!({"id": 7, "status": "pending"}))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(rows, vec![Job { id: 7, status: "pending".to_string() }]);
    }

    #[tokio::test]
    async fn test_update_with_user_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PATCH", "/rest/v1/jobs")
            .match_query(Matcher::UrlEncoded("id".into(), "eq.3".into()))
            .match_header("apikey", "anon-key")
            .match_header("authorization", "Bearer user-jwt")
            .with_status(200)
            .with_body(r#"[{"id":3,"status":"done"}]"#)
            .create_async()
            .await;

        let client = client_for(&server).with_access_token("user-jwt").unwrap();
        let rows: Vec<Job> = client
            .update("jobs", "id=eq.3", &json!({"status": "done"}))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(rows[0].status, "done");
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/payments")
            .with_status(401)
            .with_body(r#"{"message":"Invalid API key"}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .select::<serde_json::Value>("payments", "")
            .await
            .unwrap_err();
        assert!(matches!(err, YardlineError::Auth(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/functions/v1/create-payment-intent")
            .with_status(500)
            .with_body("boom")
            .expect(1)
            .create_async()
            .await;

        let err = client_for(&server)
            .invoke::<_, serde_json::Value>("create-payment-intent", &json!({"amount": 1200}))
            .await
            .unwrap_err();

        mock.assert_async().await;
        match err {
            YardlineError::Request(msg) => assert!(msg.contains("500") && msg.contains("boom")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bad_json_is_response_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/jobs")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = client_for(&server).select::<Job>("jobs", "").await.unwrap_err();
        assert!(matches!(err, YardlineError::Response(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_gives_up_after_window() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let client = BackendClient::with_endpoints(
            format!("http://127.0.0.1:{}/rest/v1", port),
            format!("http://127.0.0.1:{}/functions/v1", port),
            "anon-key",
            "",
        )
        .unwrap()
        .with_retry_window(Duration::from_millis(300));

        let err = client.delete("jobs", "id=eq.1").await.unwrap_err();
        assert!(matches!(err, YardlineError::Connection(_)));
        assert!(err.is_transient());
    }

    /// Accepts connections and never answers; returns its base url and the accept count
    fn stalled_server() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);
        std::thread::spawn(move || {
            let mut held = Vec::new();
            for stream in listener.incoming().flatten() {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(stream);
            }
        });
        (base, accepted)
    }

    fn stalled_client(base: &str) -> BackendClient {
        BackendClient::with_endpoints(
            format!("{}/rest/v1", base),
            format!("{}/functions/v1", base),
            "anon-key",
            "",
        )
        .unwrap()
        .with_request_timeout(Duration::from_millis(150))
        .with_retry_window(Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_timed_out_post_is_sent_once() {
        let (base, accepted) = stalled_server();

        let err = stalled_client(&base)
            .invoke::<_, serde_json::Value>("create-payment-intent", &json!({"amount": 1200}))
            .await
            .unwrap_err();

        assert!(matches!(err, YardlineError::Timeout(_)));
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timed_out_patch_is_sent_once() {
        let (base, accepted) = stalled_server();

        let err = stalled_client(&base)
            .update::<_, Job>("jobs", "id=eq.3", &json!({"status": "done"}))
            .await
            .unwrap_err();

        assert!(matches!(err, YardlineError::Timeout(_)));
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timed_out_get_is_retried() {
        let (base, accepted) = stalled_server();

        let err = stalled_client(&base).select::<Job>("jobs", "").await.unwrap_err();

        assert!(matches!(err, YardlineError::Timeout(_)));
        assert!(accepted.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_unreadable_error_body_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(
                    b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 100\r\n\r\nshort",
                );
            }
        });

        let err = stalled_client(&base).delete("jobs", "id=eq.1").await.unwrap_err();

        match err {
            YardlineError::Request(msg) => {
                assert!(msg.contains("500"));
                assert!(msg.contains("<unreadable body:"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
