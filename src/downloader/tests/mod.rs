use super::test_helpers::*;
use crate::error::Error;
use crate::types::{DownloadRequest, Event, HistoryStatus, Phase, TaskId, TaskPoll};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod direct;

/// Build a ZIP archive in memory from (name, content) pairs
fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = ::zip::ZipWriter::new(&mut cursor);
        let options = ::zip::write::FileOptions::default();
        for (name, content) in files {
            writer.start_file(*name, options).unwrap();
            std::io::Write::write_all(&mut writer, content).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

/// Names of the `.part` files left in `dir`
fn part_files(dir: &std::path::Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| name.ends_with(".part"))
                .collect()
        })
        .unwrap_or_default()
}

/// Poll until `dir` holds no `.part` file, failing the test after 5 seconds
async fn wait_for_no_part_files(dir: &std::path::Path) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !part_files(dir).is_empty() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "partial files left behind: {:?}",
            part_files(dir)
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// HTTP server that announces `announced` bytes, sends `sent` of them, then stalls
async fn stalling_server(announced: u64, sent: usize) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\n\r\n",
                    announced
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&vec![0x5Au8; sent]).await;
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_secs(60)).await;
            });
        }
    });
    format!("http://{}", addr)
}
