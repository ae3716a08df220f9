#![allow(missing_docs)]

mod common;

use async_trait::async_trait;
use bytes::Bytes;
use common::{MemoryTransport, RecordingListener, eventually, logger, manager};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use unftp_client::{
    DataSource, ErrorCode, Operation, Request, RequestState, RequestsManager,
    notification::RequestEvent,
    options::ProgressPolicy,
};
use unftp_transport_fs::Filesystem;

fn completed_paths(events: &[RequestEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            RequestEvent::DirectoryCreated { request } | RequestEvent::Deleted { request } => Some(request.path().to_string()),
            RequestEvent::ListedDetails { request, .. } => Some(request.path().to_string()),
            RequestEvent::Uploaded { request, .. } | RequestEvent::Downloaded { request, .. } => Some(request.path().to_string()),
            _ => None,
        })
        .collect()
}

fn slow_file() -> Vec<u8> {
    (0..64 * 1024).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn adds_are_queued_until_started() {
    let transport = Arc::new(MemoryTransport::new());
    let listener = RecordingListener::new();
    let manager = manager(&transport, &listener).build().unwrap();

    let requests = vec![
        manager.add_request_for_create_directory("/a"),
        manager.add_request_for_list_directory("/"),
        manager.add_request_for_delete_file("/x.txt"),
    ];
    assert_eq!(manager.remaining_requests(), 3);
    assert!(!manager.is_processing());

    listener
        .wait_until("scheduled events", |events| {
            events.iter().filter(|e| matches!(e, RequestEvent::Scheduled { .. })).count() == 3
        })
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(requests.iter().all(|r| r.state() == RequestState::Pending));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn requests_run_in_insertion_order() {
    let transport = Arc::new(MemoryTransport::new().with_file("/old.txt", b"bye"));
    let listener = RecordingListener::new();
    let manager = manager(&transport, &listener).build().unwrap();

    manager.add_request_for_create_directory("/one");
    manager.add_request_for_create_directory("/two/");
    manager.add_request_for_delete_file("/old.txt");
    manager.add_request_for_list_directory("/");
    manager.start_processing_requests();
    listener.wait_for_queue_completed(1).await;

    assert_eq!(completed_paths(&listener.events()), vec!["/one/", "/two/", "/old.txt", "/"]);
    assert!(transport.has_dir("/one/"));
    assert!(transport.file("/old.txt").is_none());
    assert_eq!(manager.remaining_requests(), 0);
    assert!(!manager.is_processing());
    assert!(matches!(listener.events().last(), Some(RequestEvent::QueueCompleted)));
}

#[tokio::test]
async fn autostart_runs_on_add() {
    let transport = Arc::new(MemoryTransport::new());
    let listener = RecordingListener::new();
    let manager = manager(&transport, &listener).autostart(true).build().unwrap();

    let request = manager.add_request_for_create_directory("/auto");
    listener.wait_for_queue_completed(1).await;
    assert_eq!(request.state(), RequestState::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn never_more_than_one_request_at_a_time() {
    let transport = Arc::new(
        MemoryTransport::new()
            .with_file("/1.bin", &slow_file())
            .with_file("/2.bin", &slow_file())
            .with_feed(8192, Duration::from_millis(2)),
    );
    let listener = RecordingListener::new();
    let manager = manager(&transport, &listener).chunk_size(4096).build().unwrap();
    let dir = tempfile::TempDir::new().unwrap();

    manager.add_request_for_download_file("/1.bin", dir.path().join("1.bin"));
    manager.add_request_for_create_directory("/between");
    manager.add_request_for_download_file("/2.bin", dir.path().join("2.bin"));
    manager.add_request_for_list_directory("/");
    manager.start_processing_requests();
    // Starting twice changes nothing.
    manager.start_processing_requests();
    listener.wait_for_queue_completed(1).await;

    assert_eq!(transport.max_concurrent(), 1);
    assert_eq!(listener.queue_completions(), 1);
    assert_eq!(std::fs::read(dir.path().join("2.bin")).unwrap(), slow_file());
}

#[tokio::test]
async fn cancelling_a_queued_request_is_silent() {
    let transport = Arc::new(MemoryTransport::new().with_file("/big.bin", &slow_file()).with_feed(4096, Duration::from_millis(5)));
    let listener = RecordingListener::new();
    let manager = manager(&transport, &listener).build().unwrap();
    let dir = tempfile::TempDir::new().unwrap();

    let running = manager.add_request_for_download_file("/big.bin", dir.path().join("big.bin"));
    let queued = manager.add_request_for_create_directory("/never");
    manager.start_processing_requests();

    assert!(manager.cancel_request(&queued));
    assert_eq!(manager.remaining_requests(), 0);
    assert!(!manager.cancel_request(&queued));
    listener.wait_for_queue_completed(1).await;

    assert_eq!(running.state(), RequestState::Completed);
    assert_eq!(queued.state(), RequestState::Cancelled);
    assert!(!transport.has_dir("/never/"));
    let events = listener.events_of(&queued);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], RequestEvent::Scheduled { .. }));
}

#[tokio::test]
async fn cancelling_the_running_request_reports_once_and_moves_on() {
    let transport = Arc::new(MemoryTransport::new().with_file("/big.bin", &slow_file()).with_feed(1024, Duration::from_millis(10)));
    let listener = RecordingListener::new();
    let manager = manager(&transport, &listener).chunk_size(1024).build().unwrap();
    let dir = tempfile::TempDir::new().unwrap();

    let running = manager.add_request_for_download_file("/big.bin", dir.path().join("big.bin"));
    let next = manager.add_request_for_create_directory("/next");
    manager.start_processing_requests();
    listener
        .wait_until("download progress", |events| events.iter().any(|e| matches!(e, RequestEvent::Progress { .. })))
        .await;

    assert!(manager.cancel_request(&running));
    listener.wait_for_queue_completed(1).await;

    let failures = listener.failures_of(&running);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].code(), ErrorCode::Cancelled);
    assert_eq!(running.state(), RequestState::Cancelled);
    assert!(running.total_bytes_received() < slow_file().len() as u64);
    assert_eq!(next.state(), RequestState::Completed);
    assert!(!manager.cancel_request(&running));
    assert!(!dir.path().join("big.bin").exists());
}

#[tokio::test]
async fn stop_cancels_everything_without_notifications() {
    let transport = Arc::new(MemoryTransport::new().with_file("/big.bin", &slow_file()).with_feed(1024, Duration::from_millis(10)));
    let listener = RecordingListener::new();
    let manager = manager(&transport, &listener).chunk_size(1024).build().unwrap();
    let dir = tempfile::TempDir::new().unwrap();

    let running = manager.add_request_for_download_file("/big.bin", dir.path().join("big.bin"));
    let queued = vec![
        manager.add_request_for_create_directory("/q1"),
        manager.add_request_for_create_directory("/q2"),
    ];
    manager.start_processing_requests();
    listener
        .wait_until("download progress", |events| events.iter().any(|e| matches!(e, RequestEvent::Progress { .. })))
        .await;

    manager.stop_and_cancel_all_requests();
    assert_eq!(manager.remaining_requests(), 0);
    assert!(!manager.is_processing());
    assert!(manager.current_request().is_none());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(running.state(), RequestState::Cancelled);
    assert!(queued.iter().all(|r| r.state() == RequestState::Cancelled));
    assert!(listener.failures_of(&running).is_empty());
    assert_eq!(listener.queue_completions(), 0);

    // The manager keeps working after a stop.
    let later = manager.add_request_for_create_directory("/later");
    manager.start_processing_requests();
    listener.wait_for_queue_completed(1).await;
    assert_eq!(later.state(), RequestState::Completed);
    assert_eq!(transport.max_concurrent(), 1);
}

#[tokio::test]
async fn existing_local_file_is_kept_unless_listener_agrees() {
    let remote = tempfile::TempDir::new().unwrap();
    let local = tempfile::TempDir::new().unwrap();
    std::fs::write(remote.path().join("report.txt"), b"fresh content").unwrap();
    let target = local.path().join("report.txt");
    std::fs::write(&target, b"stale").unwrap();

    let refusing = RecordingListener::new();
    let manager = RequestsManager::builder("localhost", Arc::new(Filesystem::new(remote.path())))
        .listener(&refusing)
        .logger(logger())
        .build()
        .unwrap();
    let request = manager.add_request_for_download_file("/report.txt", &target);
    manager.start_processing_requests();
    refusing.wait_for_queue_completed(1).await;
    assert_eq!(refusing.failures_of(&request)[0].code(), ErrorCode::FileAlreadyExists);
    assert_eq!(std::fs::read(&target).unwrap(), b"stale");

    let agreeing = RecordingListener::overwriting();
    let manager = RequestsManager::builder("localhost", Arc::new(Filesystem::new(remote.path())))
        .listener(&agreeing)
        .logger(logger())
        .build()
        .unwrap();
    let request = manager.add_request_for_download_file("/report.txt", &target);
    manager.start_processing_requests();
    agreeing.wait_for_queue_completed(1).await;
    assert_eq!(request.state(), RequestState::Completed);
    assert_eq!(std::fs::read(&target).unwrap(), b"fresh content");
    assert_eq!(request.percent_completed(), 100.0);
    assert!(
        agreeing
            .events_of(&request)
            .iter()
            .any(|e| matches!(e, RequestEvent::Downloaded { bytes: 13, .. }))
    );
}

#[tokio::test]
async fn download_into_a_directory_fails() {
    let transport = Arc::new(MemoryTransport::new().with_file("/f", b"data"));
    let listener = RecordingListener::overwriting();
    let manager = manager(&transport, &listener).build().unwrap();
    let dir = tempfile::TempDir::new().unwrap();

    let request = manager.add_request_for_download_file("/f", dir.path());
    manager.start_processing_requests();
    listener.wait_for_queue_completed(1).await;
    assert_eq!(request.error().map(|e| e.code()), Some(ErrorCode::CantOverwriteDirectory));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn upload_of_a_mebibyte_goes_in_chunks() {
    let transport = Arc::new(MemoryTransport::new());
    let listener = RecordingListener::new();
    let manager = manager(&transport, &listener).build().unwrap();
    let dir = tempfile::TempDir::new().unwrap();
    let content: Vec<u8> = (0..1024 * 1024).map(|i| (i % 253) as u8).collect();
    let local = dir.path().join("upload.bin");
    std::fs::write(&local, &content).unwrap();

    let request = manager.add_request_for_upload_file(&local, "/upload.bin");
    manager.start_processing_requests();
    listener.wait_for_queue_completed(1).await;

    assert_eq!(request.state(), RequestState::Completed);
    assert_eq!(request.percent_completed(), 100.0);
    assert_eq!(request.total_bytes_sent(), 1024 * 1024);
    assert!(transport.writes().iter().all(|w| *w <= 32768));
    assert_eq!(transport.file("/upload.bin").unwrap(), content);

    let percents: Vec<f32> = listener
        .events_of(&request)
        .iter()
        .filter_map(|e| match e {
            RequestEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(percents.last().copied(), Some(100.0));
}

#[tokio::test]
async fn stalled_download_times_out() {
    let transport = Arc::new(MemoryTransport::new().with_file("/slow", b"never arrives").stalled());
    let listener = RecordingListener::new();
    let manager = manager(&transport, &listener).timeout(Duration::from_millis(100)).build().unwrap();
    let dir = tempfile::TempDir::new().unwrap();

    let request = manager.add_request_for_download_file("/slow", dir.path().join("slow"));
    manager.start_processing_requests();
    listener.wait_for_queue_completed(1).await;

    assert_eq!(listener.failures_of(&request)[0].code(), ErrorCode::StreamTimedOut);
    assert_eq!(request.state(), RequestState::Failed);
    assert!(!request.did_open_stream());
}

#[tokio::test]
async fn listing_keeps_server_order() {
    let transport = Arc::new(MemoryTransport::new().with_listing(
        "-rw-r--r-- 1 ftp ftp 12 Jan 01 2020 a.txt\r\ndrwxr-xr-x 2 ftp ftp 0 Jan 01 2020 b\r\n",
    ));
    let listener = RecordingListener::new();
    let manager = manager(&transport, &listener).build().unwrap();

    let request = manager.add_request_for_list_directory("/pub");
    manager.start_processing_requests();
    listener.wait_for_queue_completed(1).await;

    assert_eq!(request.path(), "/pub/");
    let events = listener.events_of(&request);
    match (&events[1], &events[2]) {
        (RequestEvent::ListedNames { names, .. }, RequestEvent::ListedDetails { entries, .. }) => {
            assert_eq!(names, &vec!["a.txt".to_string(), "b".to_string()]);
            assert_eq!(entries[0].size, Some(12));
            assert!(entries[1].is_directory());
        }
        other => panic!("unexpected events {:?}", other),
    }
}

#[tokio::test]
async fn unknown_sizes_report_bytes_when_asked() {
    let transport = Arc::new(MemoryTransport::new().with_file("/f", &[1u8; 10_000]).without_size());
    let listener = RecordingListener::new();
    let manager = manager(&transport, &listener)
        .progress_policy(ProgressPolicy::ReportBytes)
        .chunk_size(4096)
        .build()
        .unwrap();
    let dir = tempfile::TempDir::new().unwrap();

    let request = manager.add_request_for_download_file("/f", dir.path().join("f"));
    manager.start_processing_requests();
    listener.wait_for_queue_completed(1).await;

    assert_eq!(request.state(), RequestState::Completed);
    assert_eq!(request.maximum_size(), None);
    assert_eq!(request.percent_completed(), 0.0);
    let events = listener.events_of(&request);
    assert!(!events.iter().any(|e| matches!(e, RequestEvent::Progress { .. })));
    assert!(events.iter().any(|e| matches!(e, RequestEvent::Transferred { bytes: 10_000, .. })));
}

#[tokio::test]
async fn truncated_download_is_detected() {
    let transport = Arc::new(MemoryTransport::new().with_file("/short", b"12345").announcing_size("/short", 10));
    let listener = RecordingListener::new();
    let manager = manager(&transport, &listener).build().unwrap();
    let dir = tempfile::TempDir::new().unwrap();

    let request = manager.add_request_for_download_file("/short", dir.path().join("short"));
    manager.start_processing_requests();
    listener.wait_for_queue_completed(1).await;
    assert_eq!(request.error().map(|e| e.code()), Some(ErrorCode::MissingRequestDataAvailable));
    assert!(!dir.path().join("short").exists());
}

#[rstest]
#[case(550, ErrorCode::ServerFileNotAvailable)]
#[case(530, ErrorCode::ServerUserNotLoggedIn)]
#[case(450, ErrorCode::ServerResourceBusy)]
#[case(452, ErrorCode::ServerStorageAllocationExceeded)]
#[tokio::test]
async fn server_replies_are_mapped(#[case] reply: u16, #[case] expected: ErrorCode) {
    let transport = Arc::new(MemoryTransport::new().with_reply("/denied/", reply));
    let listener = RecordingListener::new();
    let manager = manager(&transport, &listener).build().unwrap();

    let request = manager.add_request_for_create_directory("/denied");
    manager.start_processing_requests();
    listener.wait_for_queue_completed(1).await;

    assert_eq!(request.state(), RequestState::Failed);
    assert_eq!(listener.failures_of(&request)[0].code(), expected);
    assert_eq!(request.error().map(|e| e.code()), Some(expected));
}

#[tokio::test]
async fn late_rejection_fails_the_upload() {
    let transport = Arc::new(MemoryTransport::new().rejecting_on_close(552));
    let listener = RecordingListener::new();
    let manager = manager(&transport, &listener).build().unwrap();
    let dir = tempfile::TempDir::new().unwrap();
    let local = dir.path().join("big");
    std::fs::write(&local, [0u8; 100]).unwrap();

    let request = manager.add_request_for_upload_file(&local, "/big");
    manager.start_processing_requests();
    listener.wait_for_queue_completed(1).await;
    assert_eq!(request.error().map(|e| e.code()), Some(ErrorCode::ServerStorageAllocationExceeded));
}

#[tokio::test]
async fn missing_hostname_fails_before_touching_the_server() {
    let transport = Arc::new(MemoryTransport::new());
    let listener = RecordingListener::new();
    let manager = RequestsManager::builder("", transport.clone())
        .listener(&listener)
        .logger(logger())
        .build()
        .unwrap();

    let request = manager.add_request_for_list_directory("/");
    manager.start_processing_requests();
    listener.wait_for_queue_completed(1).await;
    assert_eq!(listener.failures_of(&request)[0].code(), ErrorCode::HostnameIsNil);
    assert_eq!(transport.calls(), 0);
}

#[derive(Debug)]
struct EmptySource;

#[async_trait]
impl DataSource for EmptySource {
    async fn data_size(&self, _request: &Request) -> Option<u64> {
        None
    }

    async fn data(&self, _request: &Request) -> io::Result<Option<Bytes>> {
        Ok(None)
    }
}

#[tokio::test]
async fn upload_without_data_fails() {
    let transport = Arc::new(MemoryTransport::new());
    let listener = RecordingListener::new();
    let manager = manager(&transport, &listener).data_source(Arc::new(EmptySource)).build().unwrap();

    let request = manager.add_request_for_upload_file("/unused", "/empty");
    manager.start_processing_requests();
    listener.wait_for_queue_completed(1).await;
    assert_eq!(request.error().map(|e| e.code()), Some(ErrorCode::SentDataIsNil));
    assert!(transport.file("/empty").is_none());
}

#[tokio::test]
async fn empty_local_file_uploads_fine() {
    let transport = Arc::new(MemoryTransport::new());
    let listener = RecordingListener::new();
    let manager = manager(&transport, &listener).build().unwrap();
    let dir = tempfile::TempDir::new().unwrap();
    let local = dir.path().join("empty");
    std::fs::write(&local, b"").unwrap();

    let request = manager.add_request_for_upload_file(&local, "/empty");
    manager.start_processing_requests();
    listener.wait_for_queue_completed(1).await;
    assert_eq!(request.state(), RequestState::Completed);
    assert_eq!(transport.file("/empty"), Some(vec![]));
}

#[rstest]
#[case::file("/doomed.txt", false)]
#[case::directory("/doomed/", true)]
#[tokio::test]
async fn delete_picks_file_or_directory(#[case] path: &str, #[case] directory: bool) {
    let remote = tempfile::TempDir::new().unwrap();
    let name = path.trim_matches('/');
    if directory {
        std::fs::create_dir(remote.path().join(name)).unwrap();
    } else {
        std::fs::write(remote.path().join(name), b"x").unwrap();
    }
    let listener = RecordingListener::new();
    let manager = RequestsManager::builder("localhost", Arc::new(Filesystem::new(remote.path())))
        .listener(&listener)
        .logger(logger())
        .build()
        .unwrap();

    let request = if directory {
        manager.add_request_for_delete_directory(path)
    } else {
        manager.add_request_for_delete_file(path)
    };
    assert_eq!(request.operation(), &Operation::DeleteFileOrDirectory);
    manager.start_processing_requests();
    listener.wait_for_queue_completed(1).await;

    assert!(listener.events_of(&request).iter().any(|e| matches!(e, RequestEvent::Deleted { .. })));
    assert!(!remote.path().join(name).exists());
}

#[tokio::test]
async fn dropped_listener_does_not_stop_processing() {
    let transport = Arc::new(MemoryTransport::new());
    let listener = RecordingListener::new();
    let manager = manager(&transport, &listener).build().unwrap();
    drop(listener);

    let request = manager.add_request_for_create_directory("/quiet");
    manager.start_processing_requests();
    tokio::time::timeout(Duration::from_secs(10), async {
        while request.state() != RequestState::Completed {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert!(transport.has_dir("/quiet/"));
}

#[tokio::test]
async fn stop_during_a_command_reports_nothing() {
    let transport = Arc::new(MemoryTransport::new().with_command_delay(Duration::from_millis(200)));
    let listener = RecordingListener::new();
    let manager = manager(&transport, &listener).build().unwrap();

    let request = manager.add_request_for_create_directory("/slow");
    manager.start_processing_requests();
    eventually("mkd to reach the server", || transport.calls() == 1).await;
    manager.stop_and_cancel_all_requests();

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(request.state(), RequestState::Cancelled);
    let events = listener.events_of(&request);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], RequestEvent::Scheduled { .. }));
    assert_eq!(listener.queue_completions(), 0);
    assert!(!transport.has_dir("/slow/"));
}

#[tokio::test]
async fn cancelling_a_command_in_flight_fails_it_once() {
    let transport = Arc::new(
        MemoryTransport::new()
            .with_file("/gone.txt", b"x")
            .with_command_delay(Duration::from_millis(200)),
    );
    let listener = RecordingListener::new();
    let manager = manager(&transport, &listener).build().unwrap();

    let request = manager.add_request_for_delete_file("/gone.txt");
    let next = manager.add_request_for_list_directory("/");
    manager.start_processing_requests();
    eventually("delete to reach the server", || transport.calls() == 1).await;

    assert!(manager.cancel_request(&request));
    listener.wait_for_queue_completed(1).await;
    let failures = listener.failures_of(&request);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].code(), ErrorCode::Cancelled);
    assert!(!listener.events_of(&request).iter().any(|e| matches!(e, RequestEvent::Deleted { .. })));
    assert_eq!(next.state(), RequestState::Completed);
}

// Hands out `blocks` blocks of 1 KiB, pausing before each.
#[derive(Debug)]
struct TrickleSource {
    blocks: usize,
    handed_out: AtomicUsize,
}

#[async_trait]
impl DataSource for TrickleSource {
    async fn data_size(&self, _request: &Request) -> Option<u64> {
        Some(self.blocks as u64 * 1024)
    }

    async fn data(&self, _request: &Request) -> io::Result<Option<Bytes>> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if self.handed_out.fetch_add(1, Ordering::SeqCst) < self.blocks {
            Ok(Some(Bytes::from(vec![7u8; 1024])))
        } else {
            Ok(None)
        }
    }
}

#[tokio::test]
async fn cancelling_a_running_upload() {
    let transport = Arc::new(MemoryTransport::new());
    let listener = RecordingListener::new();
    let source = Arc::new(TrickleSource {
        blocks: 100,
        handed_out: AtomicUsize::new(0),
    });
    let manager = manager(&transport, &listener).data_source(source).build().unwrap();

    let request = manager.add_request_for_upload_file("/unused", "/trickle.bin");
    manager.start_processing_requests();
    listener
        .wait_until("upload progress", |events| events.iter().any(|e| matches!(e, RequestEvent::Progress { .. })))
        .await;
    assert!(manager.cancel_request(&request));
    listener.wait_for_queue_completed(1).await;

    assert_eq!(request.state(), RequestState::Cancelled);
    let failures = listener.failures_of(&request);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].code(), ErrorCode::Cancelled);
    assert!(request.total_bytes_sent() < 100 * 1024);
    assert!(!listener.events_of(&request).iter().any(|e| matches!(e, RequestEvent::Uploaded { .. })));
    assert!(transport.file("/trickle.bin").is_none());
}

#[tokio::test]
async fn stop_during_a_stalled_listing() {
    let transport = Arc::new(MemoryTransport::new().stalled());
    let listener = RecordingListener::new();
    let manager = manager(&transport, &listener).build().unwrap();

    let request = manager.add_request_for_list_directory("/");
    manager.start_processing_requests();
    eventually("listing channel to open", || request.did_open_stream()).await;
    manager.stop_and_cancel_all_requests();

    eventually("listing to stop", || request.state() == RequestState::Cancelled).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(listener.events_of(&request).len(), 1);
    assert_eq!(listener.queue_completions(), 0);
}

#[tokio::test]
async fn cancelling_a_stalled_listing() {
    let transport = Arc::new(MemoryTransport::new().stalled());
    let listener = RecordingListener::new();
    let manager = manager(&transport, &listener).build().unwrap();

    let request = manager.add_request_for_list_directory("/");
    manager.start_processing_requests();
    eventually("listing channel to open", || request.did_open_stream()).await;
    assert!(manager.cancel_request(&request));

    listener.wait_for_queue_completed(1).await;
    assert_eq!(listener.failures_of(&request)[0].code(), ErrorCode::Cancelled);
    assert!(!listener.events_of(&request).iter().any(|e| matches!(e, RequestEvent::ListedNames { .. })));
}

#[tokio::test]
async fn stalled_upload_times_out() {
    let transport = Arc::new(MemoryTransport::new().stalling_writes());
    let listener = RecordingListener::new();
    let manager = manager(&transport, &listener).timeout(Duration::from_millis(100)).build().unwrap();
    let dir = tempfile::TempDir::new().unwrap();
    let local = dir.path().join("payload");
    std::fs::write(&local, [1u8; 4096]).unwrap();

    let request = manager.add_request_for_upload_file(&local, "/payload");
    manager.start_processing_requests();
    listener.wait_for_queue_completed(1).await;

    assert_eq!(listener.failures_of(&request)[0].code(), ErrorCode::StreamTimedOut);
    assert_eq!(request.total_bytes_sent(), 0);
    assert!(transport.file("/payload").is_none());
}
