#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tupl_core::error::TransportError;
use tupl_core::protocol::{SiteDescriptor, TokenFormProtocol};
use tupl_core::transport::{Page, Transport, UploadForm};

pub const ANON_URL: &str = "https://anonfile.com/";

pub fn token_page(token: &str) -> Page {
    Page {
        body: format!(r#"<form><input name="_token" value="{token}"></form>"#),
        final_url: ANON_URL.to_string(),
    }
}

pub fn tokenless_page() -> Page {
    Page {
        body: "<html>maintenance</html>".to_string(),
        final_url: ANON_URL.to_string(),
    }
}

pub fn link_page(file_name: &str) -> Page {
    Page {
        body: format!(
            r#"<input class="file-input" type="text" value="https://anonfile.com/id/{file_name}">"#
        ),
        final_url: ANON_URL.to_string(),
    }
}

pub fn anon_site(max_file_size: u64) -> SiteDescriptor {
    let protocol = TokenFormProtocol::new(
        Regex::new(r#"name="_token" value="(.*?)""#).unwrap(),
        Regex::new(r#"file-input" type="text" value="(.*?)""#).unwrap(),
        "_token",
        "file",
    );
    SiteDescriptor::new(ANON_URL, max_file_size, Arc::new(protocol))
}

pub fn write_files(dir: &Path, names: &[&str]) {
    for name in names {
        fs::write(dir.join(name), format!("contents of {name}")).unwrap();
    }
}

/// Token-form fake: GETs pop scripted pages (a token page once the script
/// runs out), POSTs answer with a link built from the uploaded file name and
/// optionally take some simulated time. Tracks how many POSTs overlap.
#[derive(Default)]
pub struct ScriptedTransport {
    gets: Mutex<VecDeque<Page>>,
    post_delay: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub posts: Mutex<Vec<UploadForm>>,
}

impl ScriptedTransport {
    pub fn new(gets: Vec<Page>, post_delay: Duration) -> Self {
        Self {
            gets: Mutex::new(gets.into()),
            post_delay,
            ..Default::default()
        }
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, _url: &str) -> Result<Page, TransportError> {
        let next = self.gets.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| token_page("tok")))
    }

    async fn post_multipart(
        &self,
        _url: &str,
        form: UploadForm,
        _timeout: Duration,
    ) -> Result<Page, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.post_delay.is_zero() {
            tokio::time::sleep(self.post_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let page = link_page(&form.file_name);
        self.posts.lock().unwrap().push(form);
        Ok(page)
    }
}
