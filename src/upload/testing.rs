//! In-memory [`Backend`] for exercising the upload core.

use crate::api::{Backend, FinalizeData, InitSessionData, PresignedUrls};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) const FINAL_URL: &str = "https://cache.test/object";

pub(crate) fn whole_url(file_name: &str) -> String {
    format!("https://cache.test/whole/{file_name}")
}

pub(crate) fn part_url(index: u64) -> String {
    format!("https://parts.test/{index}")
}

pub(crate) fn session_data(upload_id: &str, part_size: u64, total_parts: u64) -> InitSessionData {
    InitSessionData {
        upload_id: Some(upload_id.to_string()),
        part_size: Some(part_size),
        total_parts: Some(total_parts),
        uploaded_parts: Some(Vec::new()),
        presigned_urls: Some(PresignedUrls::ByPartNumber(
            (1..=total_parts).map(|i| (i.to_string(), part_url(i))).collect(),
        )),
    }
}

#[derive(Clone)]
pub(crate) enum FinalizeReply {
    Url(String),
    MissingUrl,
    Status(u16),
    /// The request never got an answer.
    Transport,
}

pub(crate) struct MockBackend {
    session: Option<InitSessionData>,
    finalize: Mutex<FinalizeReply>,
    failures: Mutex<HashMap<String, u32>>,
    delays: Mutex<HashMap<String, Duration>>,
    stored: Mutex<HashMap<String, Vec<u8>>>,
    puts: AtomicUsize,
    fetches: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockBackend {
    /// `None` makes session negotiation fail at the transport level.
    pub(crate) fn new(session: Option<InitSessionData>) -> Self {
        Self {
            session,
            finalize: Mutex::new(FinalizeReply::Url(FINAL_URL.to_string())),
            failures: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            stored: Mutex::new(HashMap::new()),
            puts: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// The next `times` PUTs to `url` answer 503.
    pub(crate) fn fail_times(&self, url: &str, times: u32) {
        self.failures.lock().unwrap().insert(url.to_string(), times);
    }

    /// Every PUT to `url`, or whole-file upload landing at `url`, takes
    /// `delay` before answering.
    pub(crate) fn delay(&self, url: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
    }

    pub(crate) fn set_finalize(&self, reply: FinalizeReply) {
        *self.finalize.lock().unwrap() = reply;
    }

    pub(crate) fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn stored(&self, url: &str) -> Option<Vec<u8>> {
        self.stored.lock().unwrap().get(url).cloned()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn init_session(&self, _file_extension: &str, _size: u64) -> Result<InitSessionData> {
        self.session
            .clone()
            .ok_or_else(|| Error::UploadError("connection refused".to_string()))
    }

    async fn put_part(&self, url: &str, data: Bytes) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.lock().unwrap().get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(url).filter(|n| **n > 0) {
                *remaining -= 1;
                return Err(Error::UploadError(
                    "Status 503 Service Unavailable".to_string(),
                ));
            }
        }

        self.stored
            .lock()
            .unwrap()
            .insert(url.to_string(), data.to_vec());
        Ok(())
    }

    async fn fetch_url(&self, _upload_id: &str) -> Result<FinalizeData> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let reply = self.finalize.lock().unwrap().clone();
        match reply {
            FinalizeReply::Url(url) => Ok(FinalizeData { url: Some(url) }),
            FinalizeReply::MissingUrl => Ok(FinalizeData { url: None }),
            FinalizeReply::Status(status) => Err(Error::FinalizeError(format!("Status {status}"))),
            FinalizeReply::Transport => Err(Error::UploadError("connection reset".to_string())),
        }
    }

    async fn upload_whole(&self, file_name: &str, data: Bytes) -> Result<String> {
        let url = whole_url(file_name);
        let delay = self.delays.lock().unwrap().get(&url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.stored.lock().unwrap().insert(url.clone(), data.to_vec());
        Ok(url)
    }
}
