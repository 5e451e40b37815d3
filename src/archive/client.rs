//! HTTP implementation of the library collaborators

use super::book::{BookInfo, BookUrl, Credentials, sanitize_title};
use super::{ArchiveError, Authenticator, LoanManager, LoanStatus, LocatorResolver};
use crate::config::{ArchiveConfig, HttpConfig};
use crate::session::Session;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::Form;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Error text the loan service returns for books that are free to read
pub const NOT_BORROWABLE: &str =
    "This book is not available to borrow at this time. Please try again later.";

const LOGIN_PATH: &str = "/account/login";
const LOAN_PATH: &str = "/services/loans/loan/";

/// Longest response body quoted in an error
const BODY_SNIPPET_CHARS: usize = 300;

#[derive(Debug, Deserialize)]
struct Redirect {
    url: String,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    data: ManifestData,
}

#[derive(Debug, Deserialize)]
struct ManifestData {
    #[serde(rename = "brOptions")]
    br_options: ReaderOptions,
    #[serde(default = "empty_object")]
    metadata: Value,
}

#[derive(Debug, Deserialize)]
struct ReaderOptions {
    #[serde(rename = "bookTitle")]
    book_title: String,
    #[serde(default)]
    data: Vec<Vec<PageEntry>>,
}

#[derive(Debug, Deserialize)]
struct PageEntry {
    uri: String,
}

#[derive(Debug, Default, Deserialize)]
struct LoanReply {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    success: bool,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_CHARS).collect()
}

fn decode<T: DeserializeOwned>(context: &'static str, body: &str) -> Result<T, ArchiveError> {
    serde_json::from_str(body).map_err(|e| ArchiveError::Decode {
        context,
        reason: e.to_string(),
    })
}

/// Protocol-relative manifest addresses get the https scheme
fn absolute_url(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https:{}", url)
    }
}

/// Talks to the lending library's account, loan and reader endpoints
#[derive(Debug, Clone)]
pub struct ArchiveClient {
    base_url: String,
    user_agent: String,
    http: HttpConfig,
}

impl ArchiveClient {
    pub fn new(archive: &ArchiveConfig, http: &HttpConfig) -> Self {
        Self {
            base_url: archive.base_url.trim_end_matches('/').to_string(),
            user_agent: archive.user_agent.clone(),
            http: http.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_text(
        &self,
        session: &Session,
        url: &str,
        context: &'static str,
    ) -> Result<String, ArchiveError> {
        let response = session.client().get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ArchiveError::UnexpectedResponse {
                context,
                status: status.as_u16(),
                body: snippet(&body),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl Authenticator for ArchiveClient {
    async fn login(&self, credentials: &Credentials) -> Result<Session, ArchiveError> {
        let session = Session::new(&self.http, &self.user_agent)?;
        let login_url = self.endpoint(LOGIN_PATH);

        // Picks up the cookies the login form expects
        session.client().get(&login_url).send().await?;

        let form = Form::new()
            .text("username", credentials.email.clone())
            .text("password", credentials.password.clone())
            .text("submit_by_js", "true");

        let response = session.client().post(&login_url).multipart(form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if body.contains("bad_login") {
            warn!(email = %credentials.email, "Login rejected");
            return Err(ArchiveError::InvalidCredentials);
        }
        if body.contains("Successful login") {
            info!(email = %credentials.email, "Logged in");
            return Ok(session);
        }

        Err(ArchiveError::UnexpectedResponse {
            context: "logging in",
            status: status.as_u16(),
            body: snippet(&body),
        })
    }
}

#[async_trait]
impl LocatorResolver for ArchiveClient {
    async fn resolve(&self, session: &Session, book: &BookUrl) -> Result<BookInfo, ArchiveError> {
        let body = self.get_text(session, book.as_str(), "opening the book page").await?;
        let redirect: Redirect = decode("opening the book page", &body)?;

        let manifest_url = absolute_url(&redirect.url);
        debug!(book_id = book.id(), url = %manifest_url, "Fetching book manifest");

        let body = self.get_text(session, &manifest_url, "reading the book manifest").await?;
        let manifest: Manifest = decode("reading the book manifest", &body)?;
        let data = manifest.data;

        let locators: Vec<String> = data
            .br_options
            .data
            .into_iter()
            .flatten()
            .map(|page| page.uri)
            .collect();

        if locators.len() < 2 {
            return Err(ArchiveError::NotEnoughPages(locators.len()));
        }

        let mut title = sanitize_title(&data.br_options.book_title);
        if title.is_empty() {
            title = book.id().to_string();
        }

        info!(book_id = book.id(), title = %title, pages = locators.len(), "Found pages");

        Ok(BookInfo {
            title,
            locators,
            metadata: data.metadata,
        })
    }
}

#[async_trait]
impl LoanManager for ArchiveClient {
    async fn acquire(&self, session: &Session, book_id: &str) -> Result<LoanStatus, ArchiveError> {
        let response = session
            .client()
            .post(self.endpoint(LOAN_PATH))
            .form(&[("action", "grant_access"), ("identifier", book_id)])
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::BAD_REQUEST {
            let reply: LoanReply = serde_json::from_str(&body).unwrap_or_default();
            return match reply.error.as_deref() {
                Some(NOT_BORROWABLE) => {
                    info!(book_id, "Book does not need to be borrowed");
                    Ok(LoanStatus::NotRequired)
                }
                Some(error) => Err(ArchiveError::Loan(format!(
                    "Failed to borrow {}: {}",
                    book_id, error
                ))),
                None => Err(ArchiveError::Loan(format!(
                    "Failed to borrow {}: {}",
                    book_id,
                    snippet(&body)
                ))),
            };
        }

        if body.contains("token") {
            debug!(book_id, "Loan granted");
            return Ok(LoanStatus::Borrowed);
        }

        Err(ArchiveError::Loan(format!(
            "Failed to borrow {}, the book may not be available to you (HTTP {})",
            book_id,
            status.as_u16()
        )))
    }

    async fn release(&self, session: &Session, book_id: &str) -> Result<(), ArchiveError> {
        let response = session
            .client()
            .post(self.endpoint(LOAN_PATH))
            .form(&[("action", "return_loan"), ("identifier", book_id)])
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::OK {
            let reply: LoanReply = serde_json::from_str(&body).unwrap_or_default();
            if reply.success {
                info!(book_id, "Book returned");
                return Ok(());
            }
        }

        Err(ArchiveError::Loan(format!(
            "Failed to return {} (HTTP {})",
            book_id,
            status.as_u16()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ArchiveClient {
        let archive = ArchiveConfig {
            base_url: server.uri(),
            ..ArchiveConfig::default()
        };
        ArchiveClient::new(&archive, &HttpConfig::default())
    }

    fn session() -> Session {
        Session::new(&HttpConfig::default(), "bookfetch-test").unwrap()
    }

    #[test]
    fn test_absolute_url() {
        assert_eq!(
            absolute_url("//ia800.us.archive.org/BookReaderJSIA.php?id=x"),
            "https://ia800.us.archive.org/BookReaderJSIA.php?id=x"
        );
        assert_eq!(absolute_url("http://127.0.0.1:9/m"), "http://127.0.0.1:9/m");
    }

    #[tokio::test]
    async fn test_login_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "test-cookie=1; Path=/"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .and(body_string_contains("name=\"submit_by_js\""))
            .and(body_string_contains("reader@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"status\":\"Successful login\"}"))
            .expect(1)
            .mount(&server)
            .await;

        let credentials = Credentials::new("reader@example.com", "secret");
        assert!(client(&server).login(&credentials).await.is_ok());
    }

    #[tokio::test]
    async fn test_login_bad_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"status\":\"bad_login\"}"))
            .mount(&server)
            .await;

        let err = client(&server)
            .login(&Credentials::new("reader@example.com", "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_login_unexpected_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = client(&server)
            .login(&Credentials::new("reader@example.com", "secret"))
            .await
            .unwrap_err();
        match err {
            ArchiveError::UnexpectedResponse { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("Unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_book() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/details/mybook"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"url": format!("{}/manifest/mybook", server.uri())})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/manifest/mybook"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "brOptions": {
                        "bookTitle": " A Tale: of Two Cities ",
                        "data": [
                            [{"uri": "https://img/1?id=mybook"}],
                            [{"uri": "https://img/2?id=mybook"}, {"uri": "https://img/3?id=mybook"}]
                        ]
                    },
                    "metadata": {"creator": "Dickens"}
                }
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let book = BookUrl::parse(&format!("{}/details/mybook", server.uri()), client.base_url()).unwrap();
        let info = client.resolve(&session(), &book).await.unwrap();

        assert_eq!(info.title, "A_Tale_of_Two_Cities");
        assert_eq!(
            info.locators,
            vec!["https://img/1?id=mybook", "https://img/2?id=mybook", "https://img/3?id=mybook"]
        );
        assert_eq!(info.metadata["creator"], "Dickens");
    }

    #[tokio::test]
    async fn test_resolve_single_page_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/details/tiny"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"url": format!("{}/manifest/tiny", server.uri())})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/manifest/tiny"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"brOptions": {"bookTitle": "Tiny", "data": [[{"uri": "https://img/1"}]]}}
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let book = BookUrl::parse(&format!("{}/details/tiny", server.uri()), client.base_url()).unwrap();
        let err = client.resolve(&session(), &book).await.unwrap_err();

        assert!(matches!(err, ArchiveError::NotEnoughPages(1)));
    }

    #[tokio::test]
    async fn test_resolve_malformed_manifest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/details/broken"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        let client = client(&server);
        let book = BookUrl::parse(&format!("{}/details/broken", server.uri()), client.base_url()).unwrap();
        let err = client.resolve(&session(), &book).await.unwrap_err();

        assert!(matches!(err, ArchiveError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_acquire_loan() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOAN_PATH))
            .and(body_string_contains("action=grant_access"))
            .and(body_string_contains("identifier=mybook"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "token": "abc"})))
            .mount(&server)
            .await;

        let status = client(&server).acquire(&session(), "mybook").await.unwrap();
        assert_eq!(status, LoanStatus::Borrowed);
    }

    #[tokio::test]
    async fn test_acquire_open_access_book() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOAN_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": NOT_BORROWABLE})))
            .mount(&server)
            .await;

        let status = client(&server).acquire(&session(), "free").await.unwrap();
        assert_eq!(status, LoanStatus::NotRequired);
    }

    #[tokio::test]
    async fn test_acquire_refused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOAN_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "No copies available"})))
            .mount(&server)
            .await;

        let err = client(&server).acquire(&session(), "busy").await.unwrap_err();
        match err {
            ArchiveError::Loan(reason) => assert!(reason.contains("No copies available")),
            other => panic!("Unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_acquire_without_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOAN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
            .mount(&server)
            .await;

        let err = client(&server).acquire(&session(), "mybook").await.unwrap_err();
        assert!(matches!(err, ArchiveError::Loan(_)));
    }

    #[tokio::test]
    async fn test_release_loan() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOAN_PATH))
            .and(body_string_contains("action=return_loan"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .mount(&server)
            .await;

        assert!(client(&server).release(&session(), "mybook").await.is_ok());
    }

    #[tokio::test]
    async fn test_release_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOAN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
            .mount(&server)
            .await;

        assert!(matches!(
            client(&server).release(&session(), "mybook").await,
            Err(ArchiveError::Loan(_))
        ));
    }
}
