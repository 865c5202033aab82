use crate::db::*;
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_fresh_database_reports_clean_shutdown() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    assert!(!db.was_unclean_shutdown().await.unwrap());

    db.close().await;
}

#[tokio::test]
async fn test_start_without_shutdown_is_unclean() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.set_clean_start().await.unwrap();
    assert!(db.was_unclean_shutdown().await.unwrap());

    db.set_clean_shutdown().await.unwrap();
    assert!(!db.was_unclean_shutdown().await.unwrap());

    db.close().await;
}

#[tokio::test]
async fn test_marker_survives_reopen() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    db.set_clean_start().await.unwrap();
    db.close().await;

    let db = Database::new(temp_file.path()).await.unwrap();
    assert!(db.was_unclean_shutdown().await.unwrap());

    db.close().await;
}
