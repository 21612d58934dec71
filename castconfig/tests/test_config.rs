use castconfig::Config;
use std::time::Duration;
use tempfile::TempDir;

/// Charge une configuration dans un répertoire temporaire
fn load_in_tempdir() -> (TempDir, Config) {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = Config::load_config(temp_dir.path().to_str().unwrap()).unwrap();
    (temp_dir, config)
}

#[test]
fn test_load_creates_config_file() {
    let (temp_dir, config) = load_in_tempdir();
    assert!(temp_dir.path().join("config.yaml").exists());
    assert_eq!(config.config_dir(), temp_dir.path().to_str().unwrap());
    assert_eq!(config.get_transcode_port().unwrap(), 8182);
}

#[test]
fn test_load_merges_user_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        temp_dir.path().join("config.yaml"),
        "host:\n  http_port: 9000\nreconciler:\n  give_up_secs: 30\n",
    )
    .unwrap();

    let config = Config::load_config(temp_dir.path().to_str().unwrap()).unwrap();
    assert_eq!(config.get_http_port(), 9000);
    assert_eq!(config.get_give_up().unwrap(), Duration::from_secs(30));
    // Les valeurs absentes du fichier viennent des défauts intégrés
    assert_eq!(config.get_cast_port().unwrap(), 8009);
}

#[test]
fn test_load_merges_mixed_case_sections() {
    let temp_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        temp_dir.path().join("config.yaml"),
        "Reconciler:\n  Grace_Secs: 2\n",
    )
    .unwrap();

    let config = Config::load_config(temp_dir.path().to_str().unwrap()).unwrap();
    assert_eq!(config.get_grace().unwrap(), Duration::from_secs(2));
    // Les autres clés de la section gardent leurs défauts
    assert_eq!(config.get_stale().unwrap(), Duration::from_secs(10));
    assert_eq!(config.get_give_up().unwrap(), Duration::from_secs(60));
}

#[test]
fn test_setter_persists_to_disk() {
    let (temp_dir, config) = load_in_tempdir();
    config.set_http_port(9100).unwrap();

    let reloaded = Config::load_config(temp_dir.path().to_str().unwrap()).unwrap();
    assert_eq!(reloaded.get_http_port(), 9100);
}

#[test]
fn test_device_udn_is_stable() {
    let (temp_dir, config) = load_in_tempdir();
    let first = config.get_device_udn("mediarenderer", "Kitchen").unwrap();
    let second = config.get_device_udn("mediarenderer", "Kitchen").unwrap();
    assert_eq!(first, second);
    assert!(!first.starts_with("uuid:"));

    let reloaded = Config::load_config(temp_dir.path().to_str().unwrap()).unwrap();
    assert_eq!(
        reloaded.get_device_udn("mediarenderer", "Kitchen").unwrap(),
        first
    );

    let other = config.get_device_udn("mediarenderer", "Lounge").unwrap();
    assert_ne!(other, first);
}

#[test]
fn test_set_device_udn_strips_prefix() {
    let (_temp_dir, config) = load_in_tempdir();
    config
        .set_device_udn("mediarenderer", "Office", "uuid:1234".to_string())
        .unwrap();
    assert_eq!(
        config.get_device_udn("mediarenderer", "Office").unwrap(),
        "1234"
    );
}

#[test]
fn test_in_memory_config_does_not_write() {
    let config = Config::from_yaml_str("transcode:\n  max_in_progress: 1\n").unwrap();
    config.set_ffmpeg_path("/usr/bin/ffmpeg".to_string()).unwrap();
    assert_eq!(config.get_ffmpeg_path().unwrap(), "/usr/bin/ffmpeg");
    assert_eq!(config.get_transcode_max_in_progress().unwrap(), 1);
    assert_eq!(config.config_dir(), "");
}
