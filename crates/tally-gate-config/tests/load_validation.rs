//! Config load validation tests for tally-gate-config.
// crates/tally-gate-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards (path, size, encoding, ranges).
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

use std::io::Write;
use std::path::Path;

use tally_gate_config::ConfigError;
use tally_gate_config::TallyGateConfig;
use tally_gate_store_sqlite::SqliteStoreMode;
use tempfile::NamedTempFile;

type TestResult = Result<(), String>;

fn assert_invalid(result: Result<TallyGateConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

fn write_config(contents: &str) -> Result<NamedTempFile, String> {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(contents.as_bytes()).map_err(|err| err.to_string())?;
    Ok(file)
}

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    let path = Path::new(&long_path);
    assert_invalid(TallyGateConfig::load(Some(path)), "config path exceeds max length")?;
    Ok(())
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    let path = Path::new(&long_component);
    assert_invalid(TallyGateConfig::load(Some(path)), "config path component too long")?;
    Ok(())
}

#[test]
fn load_rejects_missing_explicit_file() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("absent.toml");
    assert_invalid(TallyGateConfig::load(Some(&path)), "config io error")?;
    Ok(())
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    let payload = vec![b'a'; 1_048_577];
    file.write_all(&payload).map_err(|err| err.to_string())?;
    assert_invalid(TallyGateConfig::load(Some(file.path())), "config file exceeds size limit")?;
    Ok(())
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&[0xFF, 0xFE, 0xFF]).map_err(|err| err.to_string())?;
    assert_invalid(TallyGateConfig::load(Some(file.path())), "config file must be utf-8")?;
    Ok(())
}

#[test]
fn load_rejects_malformed_toml() -> TestResult {
    let file = write_config("[store\npath = ")?;
    assert_invalid(TallyGateConfig::load(Some(file.path())), "config parse error")?;
    Ok(())
}

#[test]
fn load_rejects_unknown_journal_mode() -> TestResult {
    let file = write_config("[store]\njournal_mode = \"memory\"\n")?;
    assert_invalid(TallyGateConfig::load(Some(file.path())), "config parse error")?;
    Ok(())
}

#[test]
fn load_rejects_zero_busy_timeout() -> TestResult {
    let file = write_config("[store]\nbusy_timeout_ms = 0\n")?;
    assert_invalid(TallyGateConfig::load(Some(file.path())), "store.busy_timeout_ms")?;
    Ok(())
}

#[test]
fn load_rejects_excessive_busy_timeout() -> TestResult {
    let file = write_config("[store]\nbusy_timeout_ms = 60001\n")?;
    assert_invalid(TallyGateConfig::load(Some(file.path())), "store.busy_timeout_ms")?;
    Ok(())
}

#[test]
fn load_rejects_empty_store_path() -> TestResult {
    let file = write_config("[store]\npath = \"  \"\n")?;
    assert_invalid(TallyGateConfig::load(Some(file.path())), "store.path must be non-empty")?;
    Ok(())
}

#[test]
fn load_rejects_blank_log_filter() -> TestResult {
    let file = write_config("[logging]\nfilter = \"\"\n")?;
    assert_invalid(TallyGateConfig::load(Some(file.path())), "logging.filter must be non-empty")?;
    Ok(())
}

#[test]
fn load_accepts_full_config() -> TestResult {
    let file = write_config(
        "[store]\npath = \"votes.db\"\nbusy_timeout_ms = 60000\njournal_mode = \
         \"delete\"\n\n[logging]\nfilter = \"tally_gate_store_sqlite=debug\"\nansi = true\n",
    )?;
    let config = TallyGateConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    if config.store.journal_mode != SqliteStoreMode::Delete {
        return Err("journal_mode not applied".to_string());
    }
    if config.store.busy_timeout_ms != 60_000 || !config.logging.ansi {
        return Err("store or logging settings not applied".to_string());
    }
    if config.logging.filter != "tally_gate_store_sqlite=debug" {
        return Err(format!("unexpected filter {}", config.logging.filter));
    }
    Ok(())
}

#[test]
fn empty_file_uses_defaults() -> TestResult {
    let file = write_config("")?;
    let config = TallyGateConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    if config.store.path != Path::new("tally-gate.db") {
        return Err(format!("unexpected default path {}", config.store.path.display()));
    }
    if config.logging.filter != "info" || config.logging.ansi {
        return Err("unexpected logging defaults".to_string());
    }
    Ok(())
}
