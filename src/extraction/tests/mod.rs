use crate::config::ExtractionConfig;
use crate::error::{Error, ExtractionError};
use crate::extraction::*;
use crate::types::{ArchiveType, Phase, ProgressSink, ProgressState};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingSink {
    snapshots: Mutex<Vec<ProgressState>>,
}

impl ProgressSink for RecordingSink {
    fn report(&self, progress: ProgressState) {
        self.snapshots.lock().unwrap().push(progress);
    }
}

impl RecordingSink {
    fn snapshots(&self) -> Vec<ProgressState> {
        self.snapshots.lock().unwrap().clone()
    }
}

/// Create a ZIP archive from (name, content) pairs; names ending in '/' become directories
fn create_zip_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Deflated);
    for (name, content) in files {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            std::io::Write::write_all(&mut writer, content).unwrap();
        }
    }
    writer.finish().unwrap();
}

async fn run_extraction(
    archive: &Path,
    dest: &Path,
) -> (crate::error::Result<crate::types::ExtractionReport>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let result = extract_archive(
        archive,
        dest,
        sink.clone(),
        &CancellationToken::new(),
        &ExtractionConfig::default(),
    )
    .await;
    (result, sink)
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

#[test]
fn test_detect_archive_type() {
    assert_eq!(
        detect_archive_type(Path::new("Game.ZIP")),
        Some(ArchiveType::Zip)
    );
    assert_eq!(
        detect_archive_type(Path::new("/roms/psx/Game.rar")),
        Some(ArchiveType::Rar)
    );
    assert_eq!(detect_archive_type(Path::new("Game.7z")), None);
    assert_eq!(detect_archive_type(Path::new("Game.iso")), None);
    assert_eq!(detect_archive_type(Path::new("Game")), None);
    assert!(is_archive(Path::new("a.zip")));
    assert!(!is_archive(Path::new("a.chd")));
}

// ---------------------------------------------------------------------------
// ZIP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_zip_extraction_reports_bytes_and_deletes_archive() {
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("snes");
    std::fs::create_dir_all(&dest).unwrap();
    let archive = dest.join("Game.zip");

    let rom = vec![0xAAu8; 300_000];
    let readme = b"have fun".to_vec();
    create_zip_archive(&archive, &[("Game.sfc", &rom), ("readme.txt", &readme)]);

    let (result, sink) = run_extraction(&archive, &dest).await;
    let report = result.unwrap();

    assert!(!archive.exists(), "archive must be deleted after success");
    assert_eq!(report.files.len(), 2);
    assert_eq!(std::fs::read(dest.join("Game.sfc")).unwrap(), rom);
    assert_eq!(report.renamed, None);

    let snapshots = sink.snapshots();
    let first = snapshots.first().unwrap();
    assert_eq!(first.phase, Phase::Extracting);
    assert_eq!(first.bytes_done, 0);
    let total = (rom.len() + readme.len()) as u64;
    assert_eq!(first.total_bytes, total);

    let last = snapshots.last().unwrap();
    assert_eq!(last.bytes_done, total);
    assert_eq!(last.percent, 100.0);
    for pair in snapshots.windows(2) {
        assert!(pair[1].bytes_done >= pair[0].bytes_done);
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_zip_extraction_normalizes_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("psx");
    let archive = temp_dir.path().join("Disc.zip");
    create_zip_archive(
        &archive,
        &[("Disc/", b""), ("Disc/track01.bin", b"data"), ("Disc/game.cue", b"cue")],
    );

    let (result, _) = run_extraction(&archive, &dest).await;
    result.unwrap();

    let dir_mode = std::fs::metadata(dest.join("Disc")).unwrap().permissions().mode();
    let file_mode = std::fs::metadata(dest.join("Disc/track01.bin"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(dir_mode & 0o777, 0o755);
    assert_eq!(file_mode & 0o777, 0o644);
}

#[tokio::test]
async fn test_corrupt_zip_fails_and_archive_is_still_deleted() {
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("snes");
    let archive = temp_dir.path().join("Broken.zip");
    std::fs::write(&archive, b"this is not a zip file").unwrap();

    let (result, _) = run_extraction(&archive, &dest).await;

    assert!(matches!(
        result,
        Err(Error::Extraction(ExtractionError::Failed { .. }))
    ));
    assert!(!archive.exists(), "archive must be deleted after failure");
}

#[tokio::test]
async fn test_zip_skips_entries_escaping_destination() {
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("inner").join("gba");
    let archive = temp_dir.path().join("Evil.zip");
    create_zip_archive(&archive, &[("../escaped.txt", b"x"), ("ok.gba", b"rom")]);

    let (result, _) = run_extraction(&archive, &dest).await;
    let report = result.unwrap();

    assert_eq!(report.files, vec![dest.join("ok.gba")]);
    assert!(!temp_dir.path().join("inner").join("escaped.txt").exists());
}

#[tokio::test]
async fn test_cancelled_extraction_deletes_archive() {
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("snes");
    let archive = temp_dir.path().join("Game.zip");
    create_zip_archive(&archive, &[("Game.sfc", b"rom")]);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = extract_archive(
        &archive,
        &dest,
        Arc::new(RecordingSink::default()),
        &cancel,
        &ExtractionConfig::default(),
    )
    .await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(!archive.exists());
    assert!(!dest.join("Game.sfc").exists());
}

#[tokio::test]
async fn test_unsupported_format() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("Game.7z");
    std::fs::write(&archive, b"7z").unwrap();

    let (result, _) = run_extraction(&archive, temp_dir.path()).await;
    assert!(matches!(
        result,
        Err(Error::Extraction(ExtractionError::Unsupported { .. }))
    ));
}

// ---------------------------------------------------------------------------
// Rename rule
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_ps3_single_directory_gets_suffix() {
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("ps3");
    std::fs::create_dir_all(dest.join("Already Here.ps3")).unwrap();
    let archive = dest.join("Demon's Souls.zip");
    create_zip_archive(
        &archive,
        &[
            ("Demon's Souls/PS3_GAME/PARAM.SFO", b"sfo"),
            ("Demon's Souls/PS3_DISC.SFB", b"sfb"),
        ],
    );

    let (result, _) = run_extraction(&archive, &dest).await;
    let report = result.unwrap();

    let old = dest.join("Demon's Souls");
    let new = dest.join("Demon's Souls.ps3");
    assert_eq!(report.renamed, Some((old.clone(), new.clone())));
    assert!(!old.exists());
    assert!(new.join("PS3_GAME/PARAM.SFO").exists());
    assert!(report.files.iter().all(|f| f.starts_with(&new)));
}

#[tokio::test]
async fn test_ps3_directory_next_to_loose_file_gets_suffix() {
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("ps3");
    let archive = temp_dir.path().join("Game.zip");
    create_zip_archive(
        &archive,
        &[
            ("Game/PS3_GAME/PARAM.SFO", b"sfo"),
            ("readme.txt", b"burn with care"),
        ],
    );

    let (result, _) = run_extraction(&archive, &dest).await;
    let report = result.unwrap();

    let new = dest.join("Game.ps3");
    assert_eq!(report.renamed, Some((dest.join("Game"), new.clone())));
    assert!(new.join("PS3_GAME/PARAM.SFO").exists());
    assert!(!dest.join("Game").exists());
    assert!(dest.join("readme.txt").exists());
    assert!(report.files.contains(&dest.join("readme.txt")));
}

#[tokio::test]
async fn test_ps3_multiple_directories_are_left_alone() {
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("ps3");
    let archive = temp_dir.path().join("Pack.zip");
    create_zip_archive(&archive, &[("GameA/EBOOT.BIN", b"a"), ("GameB/EBOOT.BIN", b"b")]);

    let (result, _) = run_extraction(&archive, &dest).await;
    let report = result.unwrap();

    assert_eq!(report.renamed, None);
    assert!(dest.join("GameA").is_dir());
    assert!(dest.join("GameB").is_dir());
}

#[tokio::test]
async fn test_rename_rule_only_for_configured_platform() {
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("psx");
    let archive = temp_dir.path().join("Game.zip");
    create_zip_archive(&archive, &[("Game/disc.bin", b"bin")]);

    let (result, _) = run_extraction(&archive, &dest).await;
    assert_eq!(result.unwrap().renamed, None);
    assert!(dest.join("Game").is_dir());
}

// ---------------------------------------------------------------------------
// RAR
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_corrupt_rar_fails_and_archive_is_still_deleted() {
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("n64");
    let archive: PathBuf = temp_dir.path().join("Broken.rar");
    std::fs::write(&archive, b"Rar!\x1a\x07\x00 definitely truncated").unwrap();

    let (result, sink) = run_extraction(&archive, &dest).await;

    assert!(matches!(result, Err(Error::Extraction(_))));
    assert!(!archive.exists(), "archive must be deleted after failure");
    assert!(sink.snapshots().is_empty());
}
