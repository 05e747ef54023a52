use super::*;

#[tokio::test]
async fn test_direct_download_reaches_100_percent() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/roms/metroid.sfc"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 1_000_000]))
        .mount(&mock_server)
        .await;

    let (downloader, temp_dir) = create_test_downloader().await;
    let mut events = downloader.subscribe();

    let id = downloader
        .start(DownloadRequest::new(
            format!("{}/roms/metroid.sfc", mock_server.uri()),
            "snes",
            "Super Metroid",
        ))
        .await
        .unwrap();

    let outcome = wait_for_outcome(&downloader, id).await;
    assert!(outcome.success, "{outcome:?}");
    assert_eq!(outcome.message, "Download_OK : Super Metroid");

    let file = temp_dir.path().join("roms/snes/Super Metroid.sfc");
    assert_eq!(std::fs::metadata(&file).unwrap().len(), 1_000_000);
    assert!(part_files(&temp_dir.path().join("roms/snes")).is_empty());

    let progress: Vec<_> = drain_events(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            Event::Progress { id: pid, progress } if pid == id => Some(progress),
            _ => None,
        })
        .collect();
    let last = progress.last().unwrap();
    assert_eq!(last.bytes_done, 1_000_000);
    assert_eq!(last.total_bytes, 1_000_000);
    assert_eq!(last.percent, 100.0);
    assert!(progress.iter().all(|p| (0.0..=100.0).contains(&p.percent)));

    let history = downloader.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, HistoryStatus::DownloadOk);
    assert_eq!(history[0].progress, 100.0);
    assert_eq!(history[0].task_id, Some(id));
    assert!(downloader.active_tasks().is_empty());
}

#[tokio::test]
async fn test_direct_404_fails_without_leaving_a_file() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.zip"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (downloader, temp_dir) = create_test_downloader().await;
    let id = downloader
        .start(
            DownloadRequest::new(format!("{}/gone.zip", mock_server.uri()), "gba", "Golden Sun")
                .with_extract(true),
        )
        .await
        .unwrap();

    let outcome = wait_for_outcome(&downloader, id).await;
    assert!(!outcome.success);
    assert!(outcome.message.contains("Golden Sun"), "{}", outcome.message);
    assert!(outcome.message.starts_with("Erreur : "));

    assert!(!temp_dir.path().join("roms/gba/Golden Sun.zip").exists());
    assert!(part_files(&temp_dir.path().join("roms/gba")).is_empty());
    assert_eq!(downloader.history()[0].status, HistoryStatus::Error);
}

#[tokio::test]
async fn test_unknown_size_keeps_percent_at_zero() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // Chunked response: no Content-Length
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;
        let body = vec![9u8; 5000];
        let mut response =
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n".to_vec();
        response.extend_from_slice(format!("{:x}\r\n", body.len()).as_bytes());
        response.extend_from_slice(&body);
        response.extend_from_slice(b"\r\n0\r\n\r\n");
        socket.write_all(&response).await.unwrap();
        socket.flush().await.unwrap();
    });

    let (downloader, temp_dir) = create_test_downloader().await;
    let mut events = downloader.subscribe();
    let id = downloader
        .start(DownloadRequest::new(
            format!("http://{}/pong.a26", addr),
            "atari2600",
            "Pong",
        ))
        .await
        .unwrap();

    let outcome = wait_for_outcome(&downloader, id).await;
    assert!(outcome.success, "{outcome:?}");
    assert_eq!(
        std::fs::metadata(temp_dir.path().join("roms/atari2600/Pong.a26"))
            .unwrap()
            .len(),
        5000
    );

    for event in drain_events(&mut events) {
        if let Event::Progress { progress, .. } = event {
            assert_eq!(progress.total_bytes, 0);
            assert_eq!(progress.percent, 0.0);
        }
    }
}

#[tokio::test]
async fn test_unwritable_platform_folder_fails_before_network() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let (downloader, temp_dir) = create_test_downloader_with(|_| {}).await;
    // A plain file where the platform folder should be
    std::fs::create_dir_all(temp_dir.path().join("roms")).unwrap();
    std::fs::write(temp_dir.path().join("roms/n64"), b"not a dir").unwrap();

    let id = downloader
        .start(DownloadRequest::new(
            format!("{}/mario64.z64", mock_server.uri()),
            "n64",
            "Super Mario 64",
        ))
        .await
        .unwrap();

    let outcome = wait_for_outcome(&downloader, id).await;
    assert!(!outcome.success);
    assert!(outcome.message.contains("not writable"), "{}", outcome.message);
}

#[tokio::test]
async fn test_concurrent_tasks_finish_independently() {
    let mock_server = MockServer::start().await;
    for i in 0..4 {
        Mock::given(method("GET"))
            .and(path(format!("/game{i}.gb")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![i as u8; 10_000 + i]))
            .mount(&mock_server)
            .await;
    }

    let (downloader, temp_dir) = create_test_downloader().await;
    let mut ids = Vec::new();
    for i in 0..4 {
        ids.push(
            downloader
                .start(DownloadRequest::new(
                    format!("{}/game{i}.gb", mock_server.uri()),
                    "gb",
                    format!("Game {i}"),
                ))
                .await
                .unwrap(),
        );
    }

    for (i, id) in ids.iter().enumerate() {
        let outcome = wait_for_outcome(&downloader, *id).await;
        assert_eq!(outcome.message, format!("Download_OK : Game {i}"));
        let len = std::fs::metadata(temp_dir.path().join(format!("roms/gb/Game {i}.gb")))
            .unwrap()
            .len();
        assert_eq!(len, 10_000 + i as u64);
    }

    let unique: std::collections::HashSet<TaskId> = ids.iter().copied().collect();
    assert_eq!(unique.len(), 4);
    assert!(
        downloader
            .history()
            .iter()
            .all(|e| e.status == HistoryStatus::DownloadOk)
    );
}

#[tokio::test]
async fn test_history_survives_restart() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"rom".to_vec()))
        .mount(&mock_server)
        .await;

    let (downloader, temp_dir) = create_test_downloader().await;
    let id = downloader
        .start(DownloadRequest::new(
            format!("{}/kirby.gb", mock_server.uri()),
            "gb",
            "Kirby",
        ))
        .await
        .unwrap();
    wait_for_outcome(&downloader, id).await;

    let reopened = crate::RomDownloader::new(test_config(temp_dir.path()))
        .await
        .unwrap();
    let history = reopened.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].name, "Kirby");
    assert_eq!(history[0].status, HistoryStatus::DownloadOk);
    assert_eq!(history[0].message, "Download_OK : Kirby");
}
