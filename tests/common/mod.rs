//! Common test utilities for E2E tests

#![allow(dead_code)]

use github_login::{AppState, config};
use tokio::net::TcpListener;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Test server instance backed by a stub GitHub
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub github: MockServer,
    /// Does not follow redirects, so redirect responses can be inspected
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        let github = MockServer::start().await;

        // Create test configuration
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                public_url: "http://localhost:3000".to_string(),
            },
            github: config::GitHubConfig {
                client_id: "test-client-id".to_string(),
                client_secret: "test-client-secret".to_string(),
                redirect_url: "http://localhost:3000/oauth2/callback".to_string(),
                scopes: vec!["user".to_string()],
                authorize_url: format!("{}/login/oauth/authorize", github.uri()),
                token_url: format!("{}/login/oauth/access_token", github.uri()),
                device_authorization_url: format!("{}/login/device/code", github.uri()),
                api_base_url: github.uri(),
                request_timeout_seconds: 5,
            },
            auth: config::AuthConfig {
                session_secret: Some("test-secret-key-32-bytes-long!!!".to_string()),
                session_max_age: 3600,
                max_sessions: 100,
            },
        };

        // Initialize app state
        let state = AppState::new(config).unwrap();

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = github_login::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            github,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// GET with an optional session cookie
    pub async fn get(&self, path: &str, cookie: Option<&str>) -> reqwest::Response {
        let mut request = self.client.get(self.url(path));
        if let Some(cookie) = cookie {
            request = request.header("Cookie", cookie);
        }
        request.send().await.expect("request succeeds")
    }

    /// Start the login flow
    ///
    /// Returns the `session=...` cookie pair and the CSRF state GitHub
    /// would echo back.
    pub async fn start_login(&self, cookie: Option<&str>) -> (String, String) {
        let response = self.get("/auth/github", cookie).await;
        assert_eq!(response.status(), 303);

        let location = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .expect("location header");
        let state = url::Url::parse(location)
            .unwrap()
            .query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
            .expect("state parameter");

        let cookie = match cookie {
            Some(cookie) => cookie.to_string(),
            None => session_cookie_from(&response).expect("new session sets a cookie"),
        };

        (cookie, state)
    }

    /// Run the login flow through a successful callback
    pub async fn login(&self, code: &str) -> String {
        let (cookie, state) = self.start_login(None).await;
        let response = self
            .get(
                &format!("/oauth2/callback?code={code}&state={state}"),
                Some(cookie.as_str()),
            )
            .await;
        assert_eq!(response.status(), 307);
        cookie
    }

    /// Stub the token endpoint to grant `access_token` for `code`
    pub async fn grant_code(&self, code: &str, access_token: &str) {
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .and(body_string_contains(format!("code={code}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": access_token,
                "token_type": "bearer",
                "scope": "user"
            })))
            .mount(&self.github)
            .await;
    }

    /// Stub the token endpoint to grant a token for `code` that is already
    /// inside the expiry window
    pub async fn grant_short_lived_code(
        &self,
        code: &str,
        access_token: &str,
        refresh_token: Option<&str>,
    ) {
        let mut body = serde_json::json!({
            "access_token": access_token,
            "token_type": "bearer",
            "scope": "user",
            "expires_in": 10
        });
        if let Some(refresh_token) = refresh_token {
            body["refresh_token"] = serde_json::json!(refresh_token);
            body["refresh_token_expires_in"] = serde_json::json!(15_897_600);
        }

        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .and(body_string_contains(format!("code={code}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.github)
            .await;
    }

    /// Stub the token endpoint to exchange `refresh_token` for `access_token`
    pub async fn grant_refresh(&self, refresh_token: &str, access_token: &str) {
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains(format!("refresh_token={refresh_token}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": access_token,
                "token_type": "bearer",
                "expires_in": 28_800
            })))
            .mount(&self.github)
            .await;
    }

    /// Stub the token endpoint to fail every refresh with a server error
    pub async fn fail_refresh(&self) {
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&self.github)
            .await;
    }

    /// Refresh exchanges the stub GitHub received
    pub async fn refresh_requests(&self) -> Vec<wiremock::Request> {
        self.github_requests("/login/oauth/access_token")
            .await
            .into_iter()
            .filter(|request| {
                String::from_utf8_lossy(&request.body).contains("grant_type=refresh_token")
            })
            .collect()
    }

    /// Stub the token endpoint to reject `code`
    pub async fn reject_code(&self, code: &str) {
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .and(body_string_contains(format!("code={code}")))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "bad_verification_code",
                "error_description": "The code passed is incorrect or expired."
            })))
            .mount(&self.github)
            .await;
    }

    /// Stub `GET /user` for requests bearing `access_token`
    pub async fn serve_user(&self, access_token: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", format!("Bearer {access_token}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.github)
            .await;
    }

    /// Requests the stub GitHub received on `path`
    pub async fn github_requests(&self, request_path: &str) -> Vec<wiremock::Request> {
        self.github
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.url.path() == request_path)
            .collect()
    }
}

/// Extract `session=<value>` from a response's Set-Cookie headers
pub fn session_cookie_from(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("session="))
        .and_then(|v| v.split(';').next())
        .map(ToString::to_string)
}
