mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tempfile::tempdir;
use tupl_core::error::TransportError;
use tupl_core::protocol::{DeferredLinkProtocol, SiteDescriptor, SiteProtocol, UploadTask};
use tupl_core::session::UploadSession;
use tupl_core::transport::{MockTransport, Page, Transport, UploadForm};

use common::{anon_site, link_page, token_page, tokenless_page, ANON_URL};

const TIMEOUT: Duration = Duration::from_secs(7200);

fn session(transport: MockTransport, total: usize) -> UploadSession {
    UploadSession::new(Arc::new(transport), 2, total, TIMEOUT)
}

fn free_site() -> SiteDescriptor {
    let protocol = DeferredLinkProtocol::new(
        "index_nojs.pl",
        Regex::new(r#"<form action="/(.*?)" enctype="multipart/form-data""#).unwrap(),
        Regex::new(r#"suivante: <a class="underline" href="(.*?)""#).unwrap(),
        "ufile",
    )
    .with_field("mail1", "");
    SiteDescriptor::new("http://dl.free.fr/", 1 << 30, Arc::new(protocol))
}

const FREE_ENTRY: &str =
    r#"<form action="/upload.pl" enctype="multipart/form-data" method="post">"#;
const FREE_POLL_URL: &str = "http://dl.free.fr/rm.pl?h=abc";

#[tokio::test]
async fn token_form_uploads_with_scraped_token() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("a.rar");
    fs::write(&file, b"data").unwrap();

    let mut transport = MockTransport::new();
    transport
        .expect_get()
        .withf(|url| url == ANON_URL)
        .times(1)
        .returning(|_| Ok(token_page("secret")));
    transport
        .expect_post_multipart()
        .withf(|url, form, timeout| {
            url == ANON_URL
                && form.file_field == "file"
                && form.file_name == "abc.rar"
                && form.fields == vec![("_token".to_string(), "secret".to_string())]
                && *timeout == TIMEOUT
        })
        .times(1)
        .returning(|_, form, _| Ok(link_page(&form.file_name)));

    let site = anon_site(1 << 20);
    let session = session(transport, 1);
    let task = UploadTask::new(&file, "abc.rar");
    let outcome = site.protocol.upload(&site, &session, &task).await.unwrap();

    assert_eq!(outcome.name, "a.rar");
    assert_eq!(outcome.url.as_deref(), Some("https://anonfile.com/id/abc.rar"));
    assert_eq!(session.succeeded(), 1);
}

#[tokio::test]
async fn missing_token_fails_before_posting() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("a.rar");
    fs::write(&file, b"data").unwrap();

    let mut transport = MockTransport::new();
    transport.expect_get().returning(|_| Ok(tokenless_page()));
    transport.expect_post_multipart().never();

    let site = anon_site(1 << 20);
    let session = session(transport, 1);
    let outcome = site
        .protocol
        .upload(&site, &session, &UploadTask::new(&file, "x.rar"))
        .await
        .unwrap();

    assert!(!outcome.is_uploaded());
    assert_eq!(session.succeeded(), 0);
}

#[tokio::test]
async fn unparsable_result_reverts_the_optimistic_count() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("a.rar");
    fs::write(&file, b"data").unwrap();

    let mut transport = MockTransport::new();
    transport.expect_get().returning(|_| Ok(token_page("t")));
    transport.expect_post_multipart().times(1).returning(|_, _, _| {
        Ok(Page {
            body: "<html>upload failed</html>".to_string(),
            final_url: ANON_URL.to_string(),
        })
    });

    let site = anon_site(1 << 20);
    let session = session(transport, 1);
    let outcome = site
        .protocol
        .upload(&site, &session, &UploadTask::new(&file, "x.rar"))
        .await
        .unwrap();

    assert_eq!(outcome.url, None);
    assert_eq!(session.succeeded(), 0, "POST succeeded but parse failed");
}

#[tokio::test]
async fn oversized_file_is_never_posted() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("big.bin");
    fs::write(&file, vec![0u8; 64]).unwrap();

    let mut transport = MockTransport::new();
    transport.expect_get().returning(|_| Ok(token_page("t")));
    transport.expect_post_multipart().never();

    let site = anon_site(16);
    let session = session(transport, 1);
    let outcome = site
        .protocol
        .upload(&site, &session, &UploadTask::new(&file, "x.bin"))
        .await
        .unwrap();
    assert_eq!(outcome.url, None);
}

#[tokio::test]
async fn network_failure_is_an_absent_result_not_an_error() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("a.rar");
    fs::write(&file, b"data").unwrap();

    let mut transport = MockTransport::new();
    transport
        .expect_get()
        .returning(|_| Err(TransportError::Io(std::io::Error::other("connection reset"))));
    transport.expect_post_multipart().never();

    let site = anon_site(1 << 20);
    let session = session(transport, 1);
    let outcome = site
        .protocol
        .upload(&site, &session, &UploadTask::new(&file, "x.rar"))
        .await;
    assert_eq!(outcome.unwrap().url, None);
}

#[tokio::test]
async fn task_without_a_file_name_is_a_contract_violation() {
    let mut transport = MockTransport::new();
    transport.expect_get().never();
    let site = anon_site(1 << 20);
    let session = session(transport, 1);
    let result = site
        .protocol
        .upload(&site, &session, &UploadTask::new("/", "x.rar"))
        .await;
    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn deferred_link_polls_until_the_link_appears() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("movie.mkv");
    fs::write(&file, b"frames").unwrap();

    let mut transport = MockTransport::new();
    transport
        .expect_get()
        .withf(|url| url == "http://dl.free.fr/index_nojs.pl")
        .times(1)
        .returning(|_| {
            Ok(Page {
                body: FREE_ENTRY.to_string(),
                final_url: "http://dl.free.fr/index_nojs.pl".to_string(),
            })
        });
    transport
        .expect_post_multipart()
        .withf(|url, form, _| {
            url == "http://dl.free.fr/upload.pl"
                && form.file_field == "ufile"
                && form.fields == vec![("mail1".to_string(), String::new())]
        })
        .times(1)
        .returning(|_, _, _| {
            Ok(Page {
                body: "redirecting".to_string(),
                final_url: FREE_POLL_URL.to_string(),
            })
        });
    let mut polls = 0;
    transport
        .expect_get()
        .withf(|url| url == FREE_POLL_URL)
        .times(3)
        .returning(move |_| {
            polls += 1;
            let body = if polls < 3 {
                "still processing".to_string()
            } else {
                r#"page suivante: <a class="underline" href="http://dl.free.fr/getfile.pl?file=/xyz">"#
                    .to_string()
            };
            Ok(Page {
                body,
                final_url: FREE_POLL_URL.to_string(),
            })
        });

    let site = free_site();
    let session = session(transport, 1);
    let started = tokio::time::Instant::now();
    let outcome = site
        .protocol
        .upload(&site, &session, &UploadTask::new(&file, "r4nd.mkv"))
        .await
        .unwrap();

    assert_eq!(
        outcome.url.as_deref(),
        Some("http://dl.free.fr/getfile.pl?file=/xyz")
    );
    assert_eq!(session.succeeded(), 1);
    let waited = started.elapsed();
    assert!(
        waited >= Duration::from_secs(10) && waited < Duration::from_secs(15),
        "two 5s waits, got {waited:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn deferred_link_gives_up_after_its_budget() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("movie.mkv");
    fs::write(&file, b"frames").unwrap();

    let mut transport = MockTransport::new();
    transport
        .expect_get()
        .withf(|url| url.ends_with("index_nojs.pl"))
        .returning(|_| {
            Ok(Page {
                body: FREE_ENTRY.to_string(),
                final_url: String::new(),
            })
        });
    transport.expect_post_multipart().times(1).returning(|_, _, _| {
        Ok(Page {
            body: String::new(),
            final_url: FREE_POLL_URL.to_string(),
        })
    });
    transport
        .expect_get()
        .withf(|url| url == FREE_POLL_URL)
        .returning(|_| {
            Ok(Page {
                body: "still processing".to_string(),
                final_url: FREE_POLL_URL.to_string(),
            })
        });

    let site = free_site();
    let session = session(transport, 1);
    let started = tokio::time::Instant::now();
    let outcome = site
        .protocol
        .upload(&site, &session, &UploadTask::new(&file, "r4nd.mkv"))
        .await
        .unwrap();

    assert_eq!(outcome.url, None);
    assert_eq!(session.succeeded(), 0, "timed-out upload is not counted");
    assert!(started.elapsed() >= Duration::from_secs(30 * 60));
}

/// Serves the entry page and accepts the POST, then never answers a poll.
struct StalledPoll;

#[async_trait]
impl Transport for StalledPoll {
    async fn get(&self, url: &str) -> Result<Page, TransportError> {
        if url.ends_with("index_nojs.pl") {
            return Ok(Page {
                body: FREE_ENTRY.to_string(),
                final_url: url.to_string(),
            });
        }
        std::future::pending().await
    }

    async fn post_multipart(
        &self,
        _url: &str,
        _form: UploadForm,
        _timeout: Duration,
    ) -> Result<Page, TransportError> {
        Ok(Page {
            body: String::new(),
            final_url: FREE_POLL_URL.to_string(),
        })
    }
}

#[tokio::test(start_paused = true)]
async fn hung_poll_request_still_ends_at_the_budget() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("movie.mkv");
    fs::write(&file, b"frames").unwrap();

    let site = free_site();
    let session = UploadSession::new(Arc::new(StalledPoll), 1, 1, TIMEOUT);
    let started = tokio::time::Instant::now();
    let outcome = site
        .protocol
        .upload(&site, &session, &UploadTask::new(&file, "r4nd.mkv"))
        .await
        .unwrap();

    assert_eq!(outcome, tupl_core::protocol::UploadOutcome::failed("movie.mkv"));
    assert_eq!(session.succeeded(), 0);
    let waited = started.elapsed();
    assert!(
        waited >= Duration::from_secs(30 * 60) && waited < Duration::from_secs(31 * 60),
        "gave up after {waited:?}"
    );
}
