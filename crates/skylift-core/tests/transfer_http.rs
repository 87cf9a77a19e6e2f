use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use sha2::{Digest, Sha256};

use skylift_backend::{
    Branch, EventSink, InstallEvent, PatchEdge, PatchHost, ProbeOutcome, TransferError,
    TransferOutcome,
};
use skylift_core::{DistributionConfig, HttpPatchHost, download_resumable, ensure_runtime};

struct Fixture {
    base_url: String,
    hits: Arc<Mutex<Vec<String>>>,
}

impl Fixture {
    fn hits(&self) -> Vec<String> {
        self.hits.lock().expect("hit log").clone()
    }
}

/// Tiny single-purpose HTTP server for exercising the transfer layer
/// against real sockets. Serves a fixed path-to-body map; optionally
/// honors byte-range requests with 206 responses.
fn spawn_fixture(
    honor_ranges: bool,
    build_files: impl FnOnce(&str) -> HashMap<String, Vec<u8>>,
) -> Fixture {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind fixture listener");
    let base_url = format!("http://{}", listener.local_addr().expect("fixture local addr"));
    let files = Arc::new(build_files(&base_url));
    let hits = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&hits);
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            let files = Arc::clone(&files);
            let log = Arc::clone(&log);
            thread::spawn(move || {
                let _ = handle_connection(stream, &files, honor_ranges, &log);
            });
        }
    });

    Fixture { base_url, hits }
}

fn handle_connection(
    mut stream: TcpStream,
    files: &HashMap<String, Vec<u8>>,
    honor_ranges: bool,
    log: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    let clone = stream.try_clone()?;
    let mut reader = BufReader::new(clone);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line)? == 0 {
        return Ok(());
    }
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("/").to_string();

    let mut range_offset = None;
    for _ in 0..64 {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        if line == "\r\n" || line == "\n" {
            break;
        }
        let lower = line.to_ascii_lowercase();
        if let Some(value) = lower.strip_prefix("range:") {
            range_offset = value
                .trim()
                .strip_prefix("bytes=")
                .and_then(|spec| spec.trim_end_matches('-').parse::<u64>().ok());
        }
    }

    log.lock().expect("hit log").push(match range_offset {
        Some(offset) => format!("{method} {path} range={offset}"),
        None => format!("{method} {path}"),
    });

    let Some(body) = files.get(&path) else {
        let response = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
        stream.write_all(response.as_bytes())?;
        return stream.flush();
    };

    if method == "HEAD" {
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(response.as_bytes())?;
        return stream.flush();
    }

    match range_offset {
        Some(offset) if honor_ranges && offset < body.len() as u64 => {
            let from = usize::try_from(offset).expect("offset fits usize");
            let rest = &body[from..];
            let response = format!(
                "HTTP/1.1 206 Partial Content\r\nContent-Type: application/octet-stream\r\nContent-Range: bytes {offset}-{}/{}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len() - 1,
                body.len(),
                rest.len()
            );
            stream.write_all(response.as_bytes())?;
            stream.write_all(rest)?;
        }
        _ => {
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(response.as_bytes())?;
            stream.write_all(body)?;
        }
    }
    stream.flush()
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn resumed_download_matches_clean_full_download() {
    let body = payload(64 * 1024);
    let served = body.clone();
    let fixture = spawn_fixture(true, move |_| {
        HashMap::from([("/patch.pwr".to_string(), served)])
    });

    let dir = tempfile::tempdir().expect("create temp dir");
    let client = reqwest::Client::new();
    let url = format!("{}/patch.pwr", fixture.base_url);

    let clean_dest = dir.path().join("clean.pwr");
    download_resumable(
        &client,
        &url,
        &clean_dest,
        Some(body.len() as u64),
        &EventSink::disabled(),
    )
    .await
    .expect("clean download");

    let resumed_dest = dir.path().join("resumed.pwr");
    std::fs::write(dir.path().join("resumed.pwr.part"), &body[..1000]).expect("seed partial file");
    let outcome = download_resumable(
        &client,
        &url,
        &resumed_dest,
        Some(body.len() as u64),
        &EventSink::disabled(),
    )
    .await
    .expect("resumed download");

    assert!(matches!(outcome, TransferOutcome::Downloaded { bytes } if bytes == body.len() as u64));
    let clean = std::fs::read(&clean_dest).expect("read clean download");
    let resumed = std::fs::read(&resumed_dest).expect("read resumed download");
    assert_eq!(clean, resumed);
    assert_eq!(resumed, body);

    let hits = fixture.hits();
    assert!(
        hits.iter().any(|hit| hit == "GET /patch.pwr range=1000"),
        "resume should request a byte range, saw {hits:?}"
    );
}

#[tokio::test]
async fn range_ignoring_host_restarts_from_zero() {
    let body = payload(8 * 1024);
    let served = body.clone();
    let fixture = spawn_fixture(false, move |_| {
        HashMap::from([("/patch.pwr".to_string(), served)])
    });

    let dir = tempfile::tempdir().expect("create temp dir");
    let dest = dir.path().join("patch.pwr");
    std::fs::write(dir.path().join("patch.pwr.part"), b"stale bytes from a dead transfer")
        .expect("seed stale partial file");

    let client = reqwest::Client::new();
    let outcome = download_resumable(
        &client,
        &format!("{}/patch.pwr", fixture.base_url),
        &dest,
        Some(body.len() as u64),
        &EventSink::disabled(),
    )
    .await
    .expect("restarted download");

    assert!(matches!(outcome, TransferOutcome::Downloaded { .. }));
    assert_eq!(std::fs::read(&dest).expect("read download"), body);
}

#[tokio::test]
async fn declared_size_mismatch_fails_and_cleans_up() {
    let body = payload(4096);
    let served = body.clone();
    let fixture = spawn_fixture(true, move |_| {
        HashMap::from([("/patch.pwr".to_string(), served)])
    });

    let dir = tempfile::tempdir().expect("create temp dir");
    let dest = dir.path().join("patch.pwr");
    let client = reqwest::Client::new();

    let error = download_resumable(
        &client,
        &format!("{}/patch.pwr", fixture.base_url),
        &dest,
        Some(4101),
        &EventSink::disabled(),
    )
    .await
    .expect_err("mismatched size should fail");

    assert!(matches!(
        error,
        TransferError::SizeMismatch {
            expected: 4101,
            actual: 4096,
            ..
        }
    ));
    assert!(!dest.exists(), "no final file should be left behind");
    assert!(
        !dir.path().join("patch.pwr.part").exists(),
        "partial file should be deleted on mismatch"
    );
}

#[tokio::test]
async fn matching_cached_file_is_reused_without_traffic() {
    let body = payload(2048);
    let served = body.clone();
    let fixture = spawn_fixture(true, move |_| {
        HashMap::from([("/patch.pwr".to_string(), served)])
    });

    let dir = tempfile::tempdir().expect("create temp dir");
    let dest = dir.path().join("patch.pwr");
    std::fs::write(&dest, &body).expect("seed cached file");

    let client = reqwest::Client::new();
    let outcome = download_resumable(
        &client,
        &format!("{}/patch.pwr", fixture.base_url),
        &dest,
        Some(body.len() as u64),
        &EventSink::disabled(),
    )
    .await
    .expect("cache hit");

    assert!(matches!(outcome, TransferOutcome::Cached));
    assert!(fixture.hits().is_empty(), "cache hit must not touch the host");
}

#[tokio::test]
async fn corrupt_cached_file_is_discarded_and_refetched() {
    let body = payload(2048);
    let served = body.clone();
    let fixture = spawn_fixture(true, move |_| {
        HashMap::from([("/patch.pwr".to_string(), served)])
    });

    let dir = tempfile::tempdir().expect("create temp dir");
    let dest = dir.path().join("patch.pwr");
    std::fs::write(&dest, b"truncated junk").expect("seed corrupt cached file");

    let client = reqwest::Client::new();
    let (events, mut receiver) = EventSink::channel();
    let outcome = download_resumable(
        &client,
        &format!("{}/patch.pwr", fixture.base_url),
        &dest,
        Some(body.len() as u64),
        &events,
    )
    .await
    .expect("refetch after corrupt cache");

    assert!(matches!(outcome, TransferOutcome::Downloaded { .. }));
    assert_eq!(std::fs::read(&dest).expect("read download"), body);

    let mut saw_corrupt_notice = false;
    while let Ok(event) = receiver.try_recv() {
        if matches!(
            &event,
            InstallEvent::Status(message) if message == "File corrupted, re-downloading..."
        ) {
            saw_corrupt_notice = true;
        }
    }
    assert!(saw_corrupt_notice, "user should be told about the re-download");
}

#[tokio::test]
async fn http_host_probes_and_fetches_patches() {
    let body = payload(2048);
    let served = body.clone();
    let fixture = spawn_fixture(true, move |_| {
        HashMap::from([("/release/0/1.pwr".to_string(), served)])
    });

    let host = HttpPatchHost::new(DistributionConfig::new(fixture.base_url.clone()))
        .expect("build host");
    let branch = Branch::new("release");

    let present = host.probe(&branch, PatchEdge::new(0, 1)).await;
    assert_eq!(present, ProbeOutcome::Present { length: Some(2048) });

    let absent = host.probe(&branch, PatchEdge::new(0, 2)).await;
    assert_eq!(absent, ProbeOutcome::Absent);

    let dir = tempfile::tempdir().expect("create temp dir");
    let dest = dir.path().join("release_0_1.pwr");
    let outcome = host
        .fetch_patch(&branch, PatchEdge::new(0, 1), &dest, &EventSink::disabled())
        .await
        .expect("fetch patch");

    assert!(matches!(outcome, TransferOutcome::Downloaded { bytes: 2048 }));
    assert_eq!(std::fs::read(&dest).expect("read patch"), body);
}

#[tokio::test]
async fn unreachable_host_reports_unreachable_not_absent() {
    // Discard-protocol port; nothing should be listening there.
    let host = HttpPatchHost::new(DistributionConfig::new("http://127.0.0.1:9"))
        .expect("build host");

    let outcome = host
        .probe(&Branch::new("release"), PatchEdge::new(0, 1))
        .await;

    assert_eq!(outcome, ProbeOutcome::Unreachable);
}

#[tokio::test]
async fn mirror_base_substitutes_for_unreachable_primary() {
    let body = payload(1024);
    let served = body.clone();
    let fixture = spawn_fixture(true, move |_| {
        HashMap::from([("/release/0/1.pwr".to_string(), served)])
    });

    let mut config =
        DistributionConfig::new("http://127.0.0.1:9").with_mirror(fixture.base_url.clone());
    config.use_mirror = true;
    let host = HttpPatchHost::new(config).expect("build host");
    let branch = Branch::new("release");

    let outcome = host.probe(&branch, PatchEdge::new(0, 1)).await;
    assert_eq!(outcome, ProbeOutcome::Present { length: Some(1024) });

    let dir = tempfile::tempdir().expect("create temp dir");
    let dest = dir.path().join("release_0_1.pwr");
    host.fetch_patch(&branch, PatchEdge::new(0, 1), &dest, &EventSink::disabled())
        .await
        .expect("fetch via mirror");
    assert_eq!(std::fs::read(&dest).expect("read patch"), body);
}

#[tokio::test]
async fn runtime_provisions_from_manifest_and_archive() {
    let binary_name = if cfg!(windows) { "java.exe" } else { "java" };

    let mut zip_bytes = Vec::new();
    {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut zip_bytes));
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
        writer.add_directory("jre-21/", options).expect("add dir");
        writer
            .add_directory("jre-21/bin/", options)
            .expect("add bin dir");
        writer
            .start_file(format!("jre-21/bin/{binary_name}"), options)
            .expect("start java entry");
        writer.write_all(b"#!jre-stub").expect("write java entry");
        writer.finish().expect("finish zip");
    }
    let digest = format!("{:x}", Sha256::digest(&zip_bytes));

    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    };
    let fixture = spawn_fixture(true, move |base| {
        let manifest = format!(
            r#"{{"version":"21.0.2","download_url":{{"{os}":{{"{arch}":{{"url":"{base}/jre.zip","sha256":"{digest}"}}}}}}}}"#,
            os = std::env::consts::OS,
        );
        HashMap::from([
            ("/manifest.json".to_string(), manifest.into_bytes()),
            ("/jre.zip".to_string(), zip_bytes),
        ])
    });

    let dir = tempfile::tempdir().expect("create temp dir");
    let runtime_dir = dir.path().join("runtime");
    let client = reqwest::Client::new();

    let java = ensure_runtime(
        &client,
        Some(&format!("{}/manifest.json", fixture.base_url)),
        &runtime_dir,
        &EventSink::disabled(),
    )
    .await
    .expect("provision runtime");

    assert_eq!(java, runtime_dir.join("bin").join(binary_name));
    assert_eq!(std::fs::read(&java).expect("read java stub"), b"#!jre-stub");
    assert!(
        !runtime_dir.join("jre-21").exists(),
        "wrapper directory should be flattened away"
    );
    assert!(
        !runtime_dir.with_extension("zip").exists(),
        "downloaded archive should be cleaned up"
    );
}
