pub mod coordinator;
pub mod finalize;
pub mod multipart;
pub mod part;
pub mod progress;
pub mod segment;
pub mod session;
pub mod single;

#[cfg(test)]
pub(crate) mod testing;

use crate::api::{Backend, Client};
use crate::config::Config;
use crate::error::{Error, Result};
use progress::{ProgressReporter, ProgressSink};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub use part::RetryPolicy;

pub const DEFAULT_PARALLEL: usize = 4;

/// Options for uploading a file
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Maximum number of parts uploaded at once.
    pub parallel: usize,
    pub retry: RetryPolicy,
    /// Abort sibling parts still in flight once one part fails for good.
    pub cancel_on_failure: bool,
    /// Upload the whole file in one request instead of in parts.
    pub single: bool,
    /// Overall deadline for the whole upload.
    pub deadline: Option<Duration>,
    pub cancel: CancellationToken,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            parallel: DEFAULT_PARALLEL,
            retry: RetryPolicy::default(),
            cancel_on_failure: false,
            single: false,
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }
}

/// Upload a file to the remote cache and return its URL
///
/// `on_progress` receives non-decreasing values in `0..=100`; 100 is sent
/// only once the URL is known.
///
/// # Errors
///
/// Returns an error if:
/// - The file does not exist
/// - The upload operation fails
pub async fn upload_file(
    config: &Config,
    file_path: &str,
    options: UploadOptions,
    on_progress: ProgressSink,
) -> Result<String> {
    let backend = Arc::new(Client::new(config.clone()));
    upload_with_backend(backend, file_path, options, on_progress).await
}

/// [`upload_file`] against any [`Backend`].
///
/// # Errors
///
/// Same as [`upload_file`]; additionally [`Error::Timeout`] once
/// `options.deadline` passes.
pub async fn upload_with_backend<B: Backend + ?Sized + 'static>(
    backend: Arc<B>,
    file_path: &str,
    options: UploadOptions,
    on_progress: ProgressSink,
) -> Result<String> {
    let path = Path::new(file_path);
    let is_file = tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(Error::ConfigError(format!("File not found: {file_path}")));
    }

    let reporter = Arc::new(ProgressReporter::new(on_progress));
    let cancel = options.cancel.child_token();

    let run = async {
        if options.single {
            single::upload_single_part(&*backend, path, &cancel, &reporter).await
        } else {
            multipart::upload_multipart(backend.clone(), path, &options, &cancel, &reporter).await
        }
    };

    match options.deadline {
        Some(deadline) => match tokio::time::timeout(deadline, run).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                Err(Error::Timeout(deadline))
            }
        },
        None => run.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::testing::{
        FINAL_URL, FinalizeReply, MockBackend, part_url, session_data, whole_url,
    };
    use std::io::Write;
    use std::sync::Mutex;

    fn source_file(len: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".bin").tempfile().unwrap();
        let bytes: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();
        file
    }

    fn recording() -> (ProgressSink, Arc<Mutex<Vec<u8>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: ProgressSink = Arc::new(move |p| sink_seen.lock().unwrap().push(p));
        (sink, seen)
    }

    fn fast_options() -> UploadOptions {
        UploadOptions {
            retry: RetryPolicy {
                attempts: 3,
                backoff_base: Duration::from_millis(100),
                attempt_timeout: Some(Duration::from_secs(5)),
            },
            ..UploadOptions::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunked_upload_end_to_end() {
        let file = source_file(250);
        let backend = Arc::new(MockBackend::new(Some(session_data("u1", 100, 3))));
        let (sink, seen) = recording();

        let url = upload_with_backend(
            backend.clone(),
            file.path().to_str().unwrap(),
            fast_options(),
            sink,
        )
        .await
        .unwrap();

        assert_eq!(url, FINAL_URL);
        let original = std::fs::read(file.path()).unwrap();
        assert_eq!(backend.stored(&part_url(1)).unwrap(), original[0..100]);
        assert_eq!(backend.stored(&part_url(2)).unwrap(), original[100..200]);
        assert_eq!(backend.stored(&part_url(3)).unwrap(), original[200..250]);

        let seen = seen.lock().unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen[seen.len() - 2..], [99, 100]);
        assert_eq!(seen.iter().filter(|&&p| p == 100).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_completion_reaches_99_then_100() {
        let file = source_file(400);
        let backend = Arc::new(MockBackend::new(Some(session_data("u1", 100, 4))));
        // complete in order 3, 1, 4, 2
        backend.delay(&part_url(3), Duration::from_millis(10));
        backend.delay(&part_url(1), Duration::from_millis(20));
        backend.delay(&part_url(4), Duration::from_millis(30));
        backend.delay(&part_url(2), Duration::from_millis(40));
        let (sink, seen) = recording();

        upload_with_backend(
            backend,
            file.path().to_str().unwrap(),
            fast_options(),
            sink,
        )
        .await
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![25, 50, 75, 99, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_part_failure_fails_upload_without_finalize() {
        let file = source_file(250);
        let backend = Arc::new(MockBackend::new(Some(session_data("u1", 100, 3))));
        backend.fail_times(&part_url(2), 3);
        let (sink, seen) = recording();

        let err = upload_with_backend(
            backend.clone(),
            file.path().to_str().unwrap(),
            fast_options(),
            sink,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            Error::PartUploadError {
                part_index: 2,
                attempts: 3,
                ..
            }
        ));
        assert_eq!(backend.fetch_count(), 0);
        assert!(!seen.lock().unwrap().contains(&100));
    }

    #[tokio::test]
    async fn test_missing_presigned_url_fails_before_any_put() {
        let file = source_file(250);
        let mut data = session_data("u1", 100, 3);
        data.presigned_urls = Some(crate::api::PresignedUrls::List(vec![
            crate::api::PresignedUrlPart {
                part_number: 1,
                url: part_url(1),
            },
            crate::api::PresignedUrlPart {
                part_number: 3,
                url: part_url(3),
            },
        ]));
        let backend = Arc::new(MockBackend::new(Some(data)));
        let (sink, _) = recording();

        let err = upload_with_backend(
            backend.clone(),
            file.path().to_str().unwrap(),
            fast_options(),
            sink,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::SessionError(msg) if msg.contains("part 2")));
        assert_eq!(backend.put_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finalize_failure_withholds_100() {
        let file = source_file(250);
        let backend = Arc::new(MockBackend::new(Some(session_data("u1", 100, 3))));
        backend.set_finalize(FinalizeReply::Status(500));
        let (sink, seen) = recording();

        let err = upload_with_backend(
            backend.clone(),
            file.path().to_str().unwrap(),
            fast_options(),
            sink,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::FinalizeError(_)));
        assert_eq!(backend.put_count(), 3);
        assert_eq!(seen.lock().unwrap().last(), Some(&99));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let backend = Arc::new(MockBackend::new(Some(session_data("u1", 100, 3))));
        let (sink, _) = recording();

        let err = upload_with_backend(backend, "/definitely/not/here.bin", fast_options(), sink)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_empty_file_is_rejected() {
        let file = source_file(0);
        let backend = Arc::new(MockBackend::new(Some(session_data("u1", 100, 1))));
        let (sink, _) = recording();

        let err = upload_with_backend(
            backend.clone(),
            file.path().to_str().unwrap(),
            fast_options(),
            sink,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::ConfigError(_)));
        assert_eq!(backend.put_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancels_upload() {
        let file = source_file(200);
        let backend = Arc::new(MockBackend::new(Some(session_data("u1", 100, 2))));
        backend.delay(&part_url(2), Duration::from_secs(600));
        let (sink, _) = recording();

        let options = UploadOptions {
            deadline: Some(Duration::from_secs(30)),
            retry: RetryPolicy {
                attempt_timeout: None,
                ..fast_options().retry
            },
            ..fast_options()
        };

        let err = upload_with_backend(
            backend.clone(),
            file.path().to_str().unwrap(),
            options,
            sink,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_secs(30)));
        tokio::time::sleep(Duration::from_secs(1200)).await;
        assert!(backend.stored(&part_url(2)).is_none());
        assert_eq!(backend.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let file = source_file(200);
        let backend = Arc::new(MockBackend::new(Some(session_data("u1", 100, 2))));
        let (sink, _) = recording();
        let options = fast_options();
        options.cancel.cancel();

        let err = upload_with_backend(
            backend.clone(),
            file.path().to_str().unwrap(),
            options,
            sink,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(backend.put_count(), 0);
    }

    #[tokio::test]
    async fn test_single_shot_cancelled_before_start() {
        let file = source_file(64);
        let backend = Arc::new(MockBackend::new(None));
        let (sink, seen) = recording();
        let options = UploadOptions {
            single: true,
            ..fast_options()
        };
        options.cancel.cancel();

        let err = upload_with_backend(
            backend.clone(),
            file.path().to_str().unwrap(),
            options,
            sink,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        let name = file.path().file_name().unwrap().to_str().unwrap();
        assert!(backend.stored(&whole_url(name)).is_none());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_shot_cancelled_mid_request() {
        let file = source_file(64);
        let name = file.path().file_name().unwrap().to_str().unwrap().to_string();
        let backend = Arc::new(MockBackend::new(None));
        backend.delay(&whole_url(&name), Duration::from_secs(60));
        let (sink, seen) = recording();
        let options = UploadOptions {
            single: true,
            ..fast_options()
        };

        let canceller = options.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let err = upload_with_backend(
            backend.clone(),
            file.path().to_str().unwrap(),
            options,
            sink,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(backend.stored(&whole_url(&name)).is_none());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_single_shot_upload() {
        let file = source_file(64);
        let backend = Arc::new(MockBackend::new(None));
        let (sink, seen) = recording();
        let options = UploadOptions {
            single: true,
            ..fast_options()
        };

        let url = upload_with_backend(
            backend.clone(),
            file.path().to_str().unwrap(),
            options,
            sink,
        )
        .await
        .unwrap();

        let name = file.path().file_name().unwrap().to_str().unwrap();
        assert_eq!(url, whole_url(name));
        assert_eq!(backend.stored(&url).unwrap().len(), 64);
        assert_eq!(*seen.lock().unwrap(), vec![100]);
    }
}
